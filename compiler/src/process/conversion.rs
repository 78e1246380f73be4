// conversion.rs — `[ConvertibleQuantity]` processing

use std::collections::BTreeSet;

use serde::Serialize;

use super::{at, Processer};
use crate::diag::{codes, Diagnostic};
use crate::raw::{ConvertibleQuantityLocations, EnumArg, HasLocations, RawConvertibleQuantity};
use crate::types::{Location, NamedType};
use crate::validity::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConversionDirection {
    /// From the declaring quantity to the listed ones.
    Onedirectional,
    /// From the listed quantities to the declaring one.
    Antidirectional,
    Bidirectional,
}

impl ConversionDirection {
    const MEMBERS: [(&'static str, ConversionDirection); 3] = [
        ("Onedirectional", ConversionDirection::Onedirectional),
        ("Antidirectional", ConversionDirection::Antidirectional),
        ("Bidirectional", ConversionDirection::Bidirectional),
    ];

    fn from_arg(arg: &EnumArg) -> Option<Self> {
        from_arg(&Self::MEMBERS, arg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CastOperatorBehaviour {
    None,
    Explicit,
    Implicit,
}

impl CastOperatorBehaviour {
    const MEMBERS: [(&'static str, CastOperatorBehaviour); 3] = [
        ("None", CastOperatorBehaviour::None),
        ("Explicit", CastOperatorBehaviour::Explicit),
        ("Implicit", CastOperatorBehaviour::Implicit),
    ];

    fn from_arg(arg: &EnumArg) -> Option<Self> {
        from_arg(&Self::MEMBERS, arg)
    }
}

/// Raw integers index the members in declaration order.
fn from_arg<T: Copy>(members: &[(&str, T)], arg: &EnumArg) -> Option<T> {
    match arg {
        EnumArg::Member(name) => members.iter().find(|(n, _)| n == name).map(|&(_, v)| v),
        EnumArg::Int(i) => usize::try_from(*i).ok().and_then(|i| members.get(i)).map(|&(_, v)| v),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedConversion {
    /// Listing order, without repeats or the declaring type.
    pub quantities: Vec<NamedType>,
    pub direction: ConversionDirection,
    pub cast_operator_behaviour: CastOperatorBehaviour,
    pub locations: ConvertibleQuantityLocations,
}

impl HasLocations for ProcessedConversion {
    fn attribute_location(&self) -> Location {
        self.locations.attribute
    }
}

/// Quantities listed so far across every `[ConvertibleQuantity]` of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionContext {
    pub ty: NamedType,
    pub listed: BTreeSet<NamedType>,
}

impl ConversionContext {
    pub fn new(ty: NamedType) -> Self {
        Self {
            ty,
            listed: BTreeSet::new(),
        }
    }
}

pub trait ConversionProcessingDiagnostics {
    fn empty_list(&self, ctx: &ConversionContext, raw: &RawConvertibleQuantity) -> Option<Diagnostic>;
    fn null_quantity(&self, ctx: &ConversionContext, raw: &RawConvertibleQuantity) -> Option<Diagnostic>;
    fn convertible_to_self(&self, ctx: &ConversionContext, raw: &RawConvertibleQuantity) -> Option<Diagnostic>;
    fn duplicate_quantity(&self, ctx: &ConversionContext, raw: &RawConvertibleQuantity, quantity: &NamedType) -> Option<Diagnostic>;
    fn unrecognized_direction(&self, ctx: &ConversionContext, raw: &RawConvertibleQuantity) -> Option<Diagnostic>;
    fn unrecognized_cast_behaviour(&self, ctx: &ConversionContext, raw: &RawConvertibleQuantity) -> Option<Diagnostic>;
}

pub struct DefaultConversionProcessingDiagnostics;

impl ConversionProcessingDiagnostics for DefaultConversionProcessingDiagnostics {
    fn empty_list(&self, ctx: &ConversionContext, raw: &RawConvertibleQuantity) -> Option<Diagnostic> {
        Some(Diagnostic::warning(
            codes::W0304,
            raw.locations.attribute,
            format!("'ConvertibleQuantity' on '{}' lists no quantities and has no effect", ctx.ty),
        ))
    }

    fn null_quantity(&self, ctx: &ConversionContext, raw: &RawConvertibleQuantity) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0111,
            at(raw.locations.quantities, raw.locations.attribute),
            format!("quantities '{}' converts to must not be null", ctx.ty),
        ))
    }

    fn convertible_to_self(&self, ctx: &ConversionContext, raw: &RawConvertibleQuantity) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0620,
            at(raw.locations.quantities, raw.locations.attribute),
            format!("'{}' is listed as convertible to itself", ctx.ty),
        ))
    }

    fn duplicate_quantity(&self, ctx: &ConversionContext, raw: &RawConvertibleQuantity, quantity: &NamedType) -> Option<Diagnostic> {
        Some(Diagnostic::warning(
            codes::W0621,
            at(raw.locations.quantities, raw.locations.attribute),
            format!("'{}' is already convertible to '{}'", ctx.ty, quantity),
        ))
    }

    fn unrecognized_direction(&self, _ctx: &ConversionContext, raw: &RawConvertibleQuantity) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0110,
            at(raw.locations.direction, raw.locations.attribute),
            "unrecognized conversion direction; expected a QuantityConversionDirection member",
        ))
    }

    fn unrecognized_cast_behaviour(&self, _ctx: &ConversionContext, raw: &RawConvertibleQuantity) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0110,
            at(raw.locations.cast_operator_behaviour, raw.locations.attribute),
            "unrecognized cast operator behaviour; expected a ConversionOperatorBehaviour member",
        ))
    }
}

pub struct ConversionProcesser<'a> {
    diagnostics: &'a dyn ConversionProcessingDiagnostics,
}

impl<'a> ConversionProcesser<'a> {
    pub fn new(diagnostics: &'a dyn ConversionProcessingDiagnostics) -> Self {
        Self { diagnostics }
    }
}

impl Processer<ConversionContext, RawConvertibleQuantity, ProcessedConversion> for ConversionProcesser<'_> {
    fn process(&self, ctx: &ConversionContext, raw: &RawConvertibleQuantity) -> Outcome<ProcessedConversion> {
        let Some(direction) = ConversionDirection::from_arg(&raw.direction) else {
            return Outcome::empty_with(self.diagnostics.unrecognized_direction(ctx, raw));
        };
        let Some(cast_operator_behaviour) = CastOperatorBehaviour::from_arg(&raw.cast_operator_behaviour) else {
            return Outcome::empty_with(self.diagnostics.unrecognized_cast_behaviour(ctx, raw));
        };
        let entries = raw.quantities.as_deref().unwrap_or_default();
        if entries.is_empty() {
            return Outcome::empty_with(self.diagnostics.empty_list(ctx, raw));
        }

        let mut diagnostics = Vec::new();
        let mut quantities: Vec<NamedType> = Vec::new();
        for entry in entries {
            match entry {
                None => diagnostics.extend(self.diagnostics.null_quantity(ctx, raw)),
                Some(ty) if ty.is_empty() => {}
                Some(ty) if *ty == ctx.ty => diagnostics.extend(self.diagnostics.convertible_to_self(ctx, raw)),
                Some(ty) if ctx.listed.contains(ty) || quantities.contains(ty) => {
                    diagnostics.extend(self.diagnostics.duplicate_quantity(ctx, raw, ty));
                }
                Some(ty) => quantities.push(ty.clone()),
            }
        }
        Outcome::result_with(
            ProcessedConversion {
                quantities,
                direction,
                cast_operator_behaviour,
                locations: raw.locations,
            },
            diagnostics,
        )
    }

    fn on_success(&self, ctx: &mut ConversionContext, product: &ProcessedConversion) {
        ctx.listed.extend(product.quantities.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, errors, only_type, process_source, warnings};
    use super::*;

    #[test]
    fn listings_are_checked_across_attributes() {
        let (processed, diags) = process_source(
            r#"
            [SharpMeasuresScalar(typeof(UnitOfLength))]
            [ConvertibleQuantity(typeof(Distance), typeof(Length), null)]
            [ConvertibleQuantity(typeof(Distance), typeof(Height), ConversionDirection = QuantityConversionDirection.Bidirectional)]
            [ConvertibleQuantity]
            partial class Length { }
            "#,
        );
        assert_eq!(codes(&diags), vec!["E0620", "E0111", "W0621", "W0304"]);
        assert_eq!(errors(&diags).len(), 2);
        assert_eq!(warnings(&diags).len(), 2);
        let conversions = &only_type(&processed).scalars[0].conversions;
        let listed: Vec<Vec<&str>> = conversions
            .iter()
            .map(|c| c.quantities.iter().map(|t| t.name.as_str()).collect())
            .collect();
        assert_eq!(listed, vec![vec!["Distance"], vec!["Height"]]);
        assert_eq!(conversions[1].direction, ConversionDirection::Bidirectional);
        assert_eq!(conversions[0].cast_operator_behaviour, CastOperatorBehaviour::Explicit);
    }

    #[test]
    fn enum_members_resolve_by_name_or_index() {
        assert_eq!(
            CastOperatorBehaviour::from_arg(&EnumArg::Int(2)),
            Some(CastOperatorBehaviour::Implicit)
        );
        assert_eq!(ConversionDirection::from_arg(&EnumArg::Member("Sideways".into())), None);
    }
}
