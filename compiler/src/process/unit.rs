// unit.rs — `[SharpMeasuresUnit]` processing

use serde::Serialize;

use super::{at, Processer, TypeContext};
use crate::diag::{codes, Diagnostic};
use crate::raw::{HasLocations, RawUnit, UnitLocations};
use crate::types::{Location, NamedType};
use crate::validity::{Outcome, Validity};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedUnit {
    pub quantity: NamedType,
    pub bias_term: bool,
    pub locations: UnitLocations,
}

impl HasLocations for ProcessedUnit {
    fn attribute_location(&self) -> Location {
        self.locations.attribute
    }
}

pub trait UnitProcessingDiagnostics {
    fn null_quantity(&self, ctx: &TypeContext, raw: &RawUnit) -> Option<Diagnostic>;
}

pub struct DefaultUnitProcessingDiagnostics;

impl UnitProcessingDiagnostics for DefaultUnitProcessingDiagnostics {
    fn null_quantity(&self, ctx: &TypeContext, raw: &RawUnit) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0111,
            at(raw.locations.quantity, raw.locations.attribute),
            format!("the quantity of unit '{}' must not be null", ctx.ty),
        ))
    }
}

pub struct UnitProcesser<'a> {
    diagnostics: &'a dyn UnitProcessingDiagnostics,
}

impl<'a> UnitProcesser<'a> {
    pub fn new(diagnostics: &'a dyn UnitProcessingDiagnostics) -> Self {
        Self { diagnostics }
    }
}

impl Processer<TypeContext, RawUnit, ProcessedUnit> for UnitProcesser<'_> {
    fn process(&self, ctx: &TypeContext, raw: &RawUnit) -> Outcome<ProcessedUnit> {
        Validity::conditional_without_diagnostics(raw.locations.explicitly_set_quantity())
            .validate(|| {
                Validity::conditional(raw.quantity.is_some(), || {
                    self.diagnostics.null_quantity(ctx, raw)
                })
            })
            .merge(|| match &raw.quantity {
                Some(quantity) if !quantity.is_empty() => Outcome::result(ProcessedUnit {
                    quantity: quantity.clone(),
                    bias_term: raw.bias_term,
                    locations: raw.locations,
                }),
                _ => Outcome::empty(),
            })
    }
}
