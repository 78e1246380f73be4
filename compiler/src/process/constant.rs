// constant.rs — `[ScalarConstant]` / `[VectorConstant]` processing
//
// Preconditions: the declaring type carries a quantity of the matching kind.
// Postconditions: names and multiples are identifiers, unique per type, and
//   never shared between one constant's name and another's multiples; a
//   constant's name differs from its own multiples; values are finite.
// Failure modes: an invalid constant is dropped with a diagnostic.
// Side effects: none.

use std::collections::BTreeSet;

use serde::Serialize;

use super::at;
use super::unit_instance::{interpret_plural, is_identifier};
use super::Processer;
use crate::diag::{codes, Diagnostic};
use crate::raw::{ConstantLocations, HasLocations, RawConstant, RawConstantValue};
use crate::types::{Location, NamedType};
use crate::validity::{Outcome, Validity};

const DEFAULT_MULTIPLES: &str = "MultiplesOf[*]";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConstantValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedConstant {
    pub name: String,
    pub unit_instance_name: String,
    pub value: ConstantValue,
    /// `None` when multiples are disabled.
    pub multiples: Option<String>,
    pub locations: ConstantLocations,
}

impl HasLocations for ProcessedConstant {
    fn attribute_location(&self) -> Location {
        self.locations.attribute
    }
}

/// Constant names and multiples claimed so far on one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantContext {
    pub ty: NamedType,
    pub names: BTreeSet<String>,
    pub multiples: BTreeSet<String>,
}

impl ConstantContext {
    pub fn new(ty: NamedType) -> Self {
        Self {
            ty,
            names: BTreeSet::new(),
            multiples: BTreeSet::new(),
        }
    }
}

// ── Diagnostics ──────────────────────────────────────────────────────────

pub trait ConstantProcessingDiagnostics {
    fn invalid_name(&self, ctx: &ConstantContext, raw: &RawConstant) -> Option<Diagnostic>;
    fn duplicate_name(&self, ctx: &ConstantContext, raw: &RawConstant, name: &str) -> Option<Diagnostic>;
    fn name_reserved_by_multiples(&self, ctx: &ConstantContext, raw: &RawConstant, name: &str) -> Option<Diagnostic>;
    fn invalid_unit_instance_name(&self, ctx: &ConstantContext, raw: &RawConstant) -> Option<Diagnostic>;
    fn multiples_disabled_but_named(&self, ctx: &ConstantContext, raw: &RawConstant) -> Option<Diagnostic>;
    fn invalid_multiples(&self, ctx: &ConstantContext, raw: &RawConstant, multiples: Option<&str>) -> Option<Diagnostic>;
    fn duplicate_multiples(&self, ctx: &ConstantContext, raw: &RawConstant, multiples: &str) -> Option<Diagnostic>;
    fn multiples_reserved_by_name(&self, ctx: &ConstantContext, raw: &RawConstant, multiples: &str) -> Option<Diagnostic>;
    fn name_and_multiples_identical(&self, ctx: &ConstantContext, raw: &RawConstant, name: &str) -> Option<Diagnostic>;
    fn invalid_value(&self, ctx: &ConstantContext, raw: &RawConstant) -> Option<Diagnostic>;
}

pub struct DefaultConstantProcessingDiagnostics;

impl ConstantProcessingDiagnostics for DefaultConstantProcessingDiagnostics {
    fn invalid_name(&self, ctx: &ConstantContext, raw: &RawConstant) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0600,
            at(raw.locations.name, raw.locations.attribute),
            format!("constant names on '{}' must be non-empty identifiers", ctx.ty),
        ))
    }

    fn duplicate_name(&self, ctx: &ConstantContext, raw: &RawConstant, name: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0601,
            at(raw.locations.name, raw.locations.attribute),
            format!("'{}' already defines a constant named '{}'", ctx.ty, name),
        ))
    }

    fn name_reserved_by_multiples(&self, ctx: &ConstantContext, raw: &RawConstant, name: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0602,
            at(raw.locations.name, raw.locations.attribute),
            format!("'{}' is already the multiples of another constant on '{}'", name, ctx.ty),
        ))
    }

    fn invalid_unit_instance_name(&self, _ctx: &ConstantContext, raw: &RawConstant) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0603,
            at(raw.locations.unit_instance_name, raw.locations.attribute),
            format!(
                "constant '{}' must name a non-empty unit instance",
                raw.name.as_deref().unwrap_or_default()
            ),
        ))
    }

    fn multiples_disabled_but_named(&self, _ctx: &ConstantContext, raw: &RawConstant) -> Option<Diagnostic> {
        Some(
            Diagnostic::error(
                codes::E0608,
                at(raw.locations.multiples, raw.locations.attribute),
                format!(
                    "constant '{}' disables multiples but names them",
                    raw.name.as_deref().unwrap_or_default()
                ),
            )
            .with_hint("remove `Multiples` or set `GenerateMultiplesProperty = true`"),
        )
    }

    fn invalid_multiples(&self, _ctx: &ConstantContext, raw: &RawConstant, multiples: Option<&str>) -> Option<Diagnostic> {
        Some(
            Diagnostic::error(
                codes::E0604,
                at(raw.locations.multiples, raw.locations.attribute),
                format!(
                    "multiples of '{}' must be a non-empty identifier, found {}",
                    raw.name.as_deref().unwrap_or_default(),
                    multiples.map_or_else(|| "null".to_string(), |m| format!("'{}'", m))
                ),
            )
            .with_hint("`[*]` in a multiples name is replaced by the constant name"),
        )
    }

    fn duplicate_multiples(&self, ctx: &ConstantContext, raw: &RawConstant, multiples: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0605,
            at(raw.locations.multiples, raw.locations.attribute),
            format!("'{}' already uses '{}' as the multiples of a constant", ctx.ty, multiples),
        ))
    }

    fn multiples_reserved_by_name(&self, ctx: &ConstantContext, raw: &RawConstant, multiples: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0606,
            at(raw.locations.multiples, raw.locations.attribute),
            format!("'{}' is already the name of a constant on '{}'", multiples, ctx.ty),
        ))
    }

    fn name_and_multiples_identical(&self, _ctx: &ConstantContext, raw: &RawConstant, name: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0607,
            at(raw.locations.multiples, raw.locations.attribute),
            format!("constant '{}' uses its own name for its multiples", name),
        ))
    }

    fn invalid_value(&self, _ctx: &ConstantContext, raw: &RawConstant) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0609,
            at(raw.locations.value, raw.locations.attribute),
            format!(
                "value of constant '{}' must be finite",
                raw.name.as_deref().unwrap_or_default()
            ),
        ))
    }
}

// ── Processer ────────────────────────────────────────────────────────────

pub struct ConstantProcesser<'a> {
    diagnostics: &'a dyn ConstantProcessingDiagnostics,
}

impl<'a> ConstantProcesser<'a> {
    pub fn new(diagnostics: &'a dyn ConstantProcessingDiagnostics) -> Self {
        Self { diagnostics }
    }

    fn name(&self, ctx: &ConstantContext, raw: &RawConstant) -> Outcome<String> {
        let name = raw.name.as_deref().unwrap_or_default();
        Validity::conditional(is_identifier(name), || self.diagnostics.invalid_name(ctx, raw))
            .validate(|| {
                Validity::conditional(!ctx.names.contains(name), || {
                    self.diagnostics.duplicate_name(ctx, raw, name)
                })
            })
            .validate(|| {
                Validity::conditional(!ctx.multiples.contains(name), || {
                    self.diagnostics.name_reserved_by_multiples(ctx, raw, name)
                })
            })
            .transform(|| name.to_string())
    }

    fn multiples(&self, ctx: &ConstantContext, raw: &RawConstant, name: &str) -> Outcome<Option<String>> {
        if !raw.generate_multiples {
            return if raw.locations.explicitly_set_multiples() {
                Outcome::empty_with(self.diagnostics.multiples_disabled_but_named(ctx, raw))
            } else {
                Outcome::result(None)
            };
        }
        let written = if raw.locations.explicitly_set_multiples() {
            match raw.multiples.as_deref() {
                Some(form) if !form.is_empty() => form,
                other => return Outcome::empty_with(self.diagnostics.invalid_multiples(ctx, raw, other)),
            }
        } else {
            DEFAULT_MULTIPLES
        };
        let multiples = interpret_plural(name, Some(written));
        Validity::conditional(is_identifier(&multiples), || {
            self.diagnostics.invalid_multiples(ctx, raw, Some(&multiples))
        })
        .validate(|| {
            Validity::conditional(multiples != name, || {
                self.diagnostics.name_and_multiples_identical(ctx, raw, name)
            })
        })
        .validate(|| {
            Validity::conditional(!ctx.multiples.contains(&multiples), || {
                self.diagnostics.duplicate_multiples(ctx, raw, &multiples)
            })
        })
        .validate(|| {
            Validity::conditional(!ctx.names.contains(&multiples), || {
                self.diagnostics.multiples_reserved_by_name(ctx, raw, &multiples)
            })
        })
        .transform(|| Some(multiples.clone()))
    }

    fn value(&self, ctx: &ConstantContext, raw: &RawConstant) -> Outcome<ConstantValue> {
        let value = match &raw.value {
            RawConstantValue::Scalar(Some(v)) if v.is_finite() => Some(ConstantValue::Scalar(*v)),
            RawConstantValue::Vector(Some(components))
                if !components.is_empty() && components.iter().all(|c| c.is_finite()) =>
            {
                Some(ConstantValue::Vector(components.clone()))
            }
            _ => None,
        };
        match value {
            Some(value) => Outcome::result(value),
            None => Outcome::empty_with(self.diagnostics.invalid_value(ctx, raw)),
        }
    }
}

impl Processer<ConstantContext, RawConstant, ProcessedConstant> for ConstantProcesser<'_> {
    fn process(&self, ctx: &ConstantContext, raw: &RawConstant) -> Outcome<ProcessedConstant> {
        self.name(ctx, raw).and_then(|name| {
            let unit_instance_name = raw.unit_instance_name.as_deref().unwrap_or_default();
            Validity::conditional(!unit_instance_name.is_empty(), || {
                self.diagnostics.invalid_unit_instance_name(ctx, raw)
            })
            .merge(|| self.multiples(ctx, raw, &name))
            .and_then(|multiples| {
                self.value(ctx, raw).map(|value| ProcessedConstant {
                    name,
                    unit_instance_name: unit_instance_name.to_string(),
                    value,
                    multiples,
                    locations: raw.locations,
                })
            })
        })
    }

    fn on_success(&self, ctx: &mut ConstantContext, product: &ProcessedConstant) {
        ctx.names.insert(product.name.clone());
        if let Some(multiples) = &product.multiples {
            ctx.multiples.insert(multiples.clone());
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
