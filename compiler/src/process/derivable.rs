// derivable.rs — `[DerivableUnit]` processing
//
// Preconditions: the declaring type carries a unit; `bias_term` reflects it.
// Postconditions: every `{N}` placeholder indexes the signature and every
//   signature element is referenced. IDs and signatures are unique per unit.
// Failure modes: an invalid derivation is dropped with a diagnostic.
// Side effects: none.

use std::collections::BTreeSet;

use serde::Serialize;

use super::{at, Processer};
use crate::diag::{codes, Diagnostic};
use crate::raw::{DerivableUnitLocations, HasLocations, RawDerivableUnit};
use crate::types::{DerivableSignature, Location, NamedType};
use crate::validity::{Outcome, Validity};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedDerivableUnit {
    pub derivation_id: Option<String>,
    pub expression: String,
    pub signature: DerivableSignature,
    pub permutations: bool,
    pub locations: DerivableUnitLocations,
}

impl HasLocations for ProcessedDerivableUnit {
    fn attribute_location(&self) -> Location {
        self.locations.attribute
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivableUnitContext {
    pub ty: NamedType,
    pub bias_term: bool,
    /// The unit declares more than one derivation.
    pub multiple: bool,
    pub ids: BTreeSet<String>,
    pub signatures: BTreeSet<DerivableSignature>,
}

impl DerivableUnitContext {
    pub fn new(ty: NamedType, bias_term: bool, multiple: bool) -> Self {
        Self {
            ty,
            bias_term,
            multiple,
            ids: BTreeSet::new(),
            signatures: BTreeSet::new(),
        }
    }
}

pub trait DerivableUnitProcessingDiagnostics {
    fn unit_includes_bias_term(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit) -> Option<Diagnostic>;
    fn multiple_but_not_named(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit) -> Option<Diagnostic>;
    fn duplicate_id(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit, id: &str) -> Option<Diagnostic>;
    fn invalid_expression(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit) -> Option<Diagnostic>;
    fn invalid_signature(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit) -> Option<Diagnostic>;
    fn unmatched_unit(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit, index: usize) -> Option<Diagnostic>;
    fn unit_not_included(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit, index: usize) -> Option<Diagnostic>;
    fn permutations_redundant(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit) -> Option<Diagnostic>;
    fn duplicate_signature(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit, signature: &DerivableSignature) -> Option<Diagnostic>;
}

pub struct DefaultDerivableUnitProcessingDiagnostics;

impl DerivableUnitProcessingDiagnostics for DefaultDerivableUnitProcessingDiagnostics {
    fn unit_includes_bias_term(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0119,
            raw.locations.attribute,
            format!("unit '{}' includes a bias term and cannot be derived", ctx.ty),
        ))
    }

    fn multiple_but_not_named(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit) -> Option<Diagnostic> {
        Some(
            Diagnostic::error(
                codes::E0117,
                raw.locations.attribute,
                format!("unit '{}' declares several derivations, so each needs an ID", ctx.ty),
            )
            .with_hint("set `DerivationID`"),
        )
    }

    fn duplicate_id(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit, id: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0116,
            at(raw.locations.derivation_id, raw.locations.attribute),
            format!("unit '{}' already has a derivation with ID '{}'", ctx.ty, id),
        ))
    }

    fn invalid_expression(&self, _ctx: &DerivableUnitContext, raw: &RawDerivableUnit) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0112,
            at(raw.locations.expression, raw.locations.attribute),
            "derivation expression must be a non-empty string",
        ))
    }

    fn invalid_signature(&self, _ctx: &DerivableUnitContext, raw: &RawDerivableUnit) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0113,
            at(raw.locations.signature, raw.locations.attribute),
            "derivation signature must be a non-empty list of unit types",
        ))
    }

    fn unmatched_unit(&self, _ctx: &DerivableUnitContext, raw: &RawDerivableUnit, index: usize) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0114,
            at(raw.locations.expression, raw.locations.attribute),
            format!(
                "expression references {{{}}}, but the signature has {} element(s)",
                index,
                raw.signature.as_ref().map_or(0, Vec::len)
            ),
        ))
    }

    fn unit_not_included(&self, _ctx: &DerivableUnitContext, raw: &RawDerivableUnit, index: usize) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0115,
            at(raw.locations.expression, raw.locations.attribute),
            format!("expression never references signature element {{{}}}", index),
        ))
    }

    fn permutations_redundant(&self, _ctx: &DerivableUnitContext, raw: &RawDerivableUnit) -> Option<Diagnostic> {
        Some(Diagnostic::warning(
            codes::W0120,
            at(raw.locations.permutations, raw.locations.attribute),
            "`Permutations` has no effect on this signature",
        ))
    }

    fn duplicate_signature(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit, signature: &DerivableSignature) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0118,
            at(raw.locations.signature, raw.locations.attribute),
            format!("unit '{}' already has a derivation with signature {}", ctx.ty, signature),
        ))
    }
}

/// Indices of the `{N}` placeholders in `expression`, in order of appearance.
pub fn placeholders(expression: &str) -> Vec<usize> {
    let mut found = Vec::new();
    let mut rest = expression;
    while let Some(open) = rest.find('{') {
        rest = &rest[open + 1..];
        let Some(close) = rest.find('}') else { break };
        let inner = &rest[..close];
        if !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = inner.parse() {
                found.push(index);
            }
            rest = &rest[close + 1..];
        }
    }
    found
}

pub struct DerivableUnitProcesser<'a> {
    diagnostics: &'a dyn DerivableUnitProcessingDiagnostics,
}

impl<'a> DerivableUnitProcesser<'a> {
    pub fn new(diagnostics: &'a dyn DerivableUnitProcessingDiagnostics) -> Self {
        Self { diagnostics }
    }

    fn placeholders_match(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit, expression: &str, len: usize) -> Validity {
        let used = placeholders(expression);
        let unmatched: Vec<Diagnostic> = used
            .iter()
            .filter(|&&i| i >= len)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|&i| self.diagnostics.unmatched_unit(ctx, raw, i))
            .collect();
        if !unmatched.is_empty() {
            return Validity::invalid_all(unmatched);
        }
        let unused: Vec<usize> = (0..len).filter(|i| !used.contains(i)).collect();
        if unused.is_empty() {
            return Validity::valid();
        }
        Validity::invalid_all(
            unused
                .into_iter()
                .filter_map(|i| self.diagnostics.unit_not_included(ctx, raw, i))
                .collect(),
        )
    }

    fn signature(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit, elements: &[Option<NamedType>]) -> Outcome<DerivableSignature> {
        if elements.iter().any(Option::is_none) {
            return Outcome::empty_with(self.diagnostics.invalid_signature(ctx, raw));
        }
        let signature: Vec<NamedType> = elements.iter().flatten().cloned().collect();
        if signature.iter().any(NamedType::is_empty) {
            return Outcome::empty();
        }
        Outcome::result(DerivableSignature(signature))
    }
}

impl Processer<DerivableUnitContext, RawDerivableUnit, ProcessedDerivableUnit> for DerivableUnitProcesser<'_> {
    fn process(&self, ctx: &DerivableUnitContext, raw: &RawDerivableUnit) -> Outcome<ProcessedDerivableUnit> {
        let id = raw.derivation_id.as_deref().filter(|id| !id.is_empty());
        let expression = raw.expression.as_deref().unwrap_or_default();
        let elements = raw.signature.as_deref().unwrap_or_default();

        Validity::conditional_without_diagnostics(raw.locations.explicitly_set_expression())
            .validate(|| {
                Validity::conditional(!ctx.bias_term, || {
                    self.diagnostics.unit_includes_bias_term(ctx, raw)
                })
            })
            .validate(|| {
                Validity::conditional(id.is_some() || !ctx.multiple, || {
                    self.diagnostics.multiple_but_not_named(ctx, raw)
                })
            })
            .validate(|| match id {
                Some(id) if ctx.ids.contains(id) => {
                    Validity::invalid(self.diagnostics.duplicate_id(ctx, raw, id))
                }
                _ => Validity::valid(),
            })
            .validate(|| {
                Validity::conditional(!expression.is_empty(), || {
                    self.diagnostics.invalid_expression(ctx, raw)
                })
            })
            .validate(|| {
                Validity::conditional(!elements.is_empty(), || {
                    self.diagnostics.invalid_signature(ctx, raw)
                })
            })
            .validate(|| self.placeholders_match(ctx, raw, expression, elements.len()))
            .validate(|| {
                let redundant = elements.len() == 1 || elements.windows(2).all(|w| w[0] == w[1]);
                if raw.permutations && redundant {
                    Validity::valid_with(self.diagnostics.permutations_redundant(ctx, raw))
                } else {
                    Validity::valid()
                }
            })
            .merge(|| self.signature(ctx, raw, elements))
            .and_then(|signature| {
                Validity::conditional(!ctx.signatures.contains(&signature), || {
                    self.diagnostics.duplicate_signature(ctx, raw, &signature)
                })
                .transform(|| ProcessedDerivableUnit {
                    derivation_id: id.map(str::to_string),
                    expression: expression.to_string(),
                    signature,
                    permutations: raw.permutations,
                    locations: raw.locations,
                })
            })
    }

    fn on_success(&self, ctx: &mut DerivableUnitContext, product: &ProcessedDerivableUnit) {
        if let Some(id) = &product.derivation_id {
            ctx.ids.insert(id.clone());
        }
        ctx.signatures.insert(product.signature.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, only_type, process_source, warnings};
    use super::*;

    fn derivations(unit: &str, attributes: &str) -> (Vec<ProcessedDerivableUnit>, Vec<Diagnostic>) {
        let source = format!("{} {} partial class UnitOfSpeed {{ }}", unit, attributes);
        let (processed, diags) = process_source(&source);
        (only_type(&processed).units[0].derivations.clone(), diags)
    }

    const UNIT: &str = "[SharpMeasuresUnit(typeof(Speed))]";

    #[test]
    fn placeholder_scan() {
        assert_eq!(placeholders("{0} / {1}"), vec![0, 1]);
        assert_eq!(placeholders("{1} * {1} {x} {"), vec![1, 1]);
        assert_eq!(placeholders("none"), Vec::<usize>::new());
    }

    #[test]
    fn valid_derivation() {
        let (list, diags) = derivations(
            UNIT,
            "[DerivableUnit(\"{0} / {1}\", typeof(UnitOfLength), typeof(UnitOfTime))]",
        );
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(list[0].signature.len(), 2);
        assert_eq!(list[0].derivation_id, None);
    }

    #[test]
    fn bias_term_blocks_derivation() {
        let (list, diags) = derivations(
            "[SharpMeasuresUnit(typeof(Speed), BiasTerm = true)]",
            "[DerivableUnit(\"{0}\", typeof(UnitOfLength))]",
        );
        assert!(list.is_empty());
        assert_eq!(codes(&diags), vec!["E0119"]);
    }

    #[test]
    fn several_derivations_need_ids() {
        let (list, diags) = derivations(
            UNIT,
            r#"
            [DerivableUnit("{0}", typeof(UnitOfLength))]
            [DerivableUnit("a", "{0}", typeof(UnitOfTime))]
            [DerivableUnit("a", "{0}", typeof(UnitOfMass))]
            "#,
        );
        assert_eq!(list.len(), 1);
        assert_eq!(codes(&diags), vec!["E0117", "E0116"]);
    }

    #[test]
    fn placeholder_mismatches() {
        let (list, diags) = derivations(
            UNIT,
            r#"
            [DerivableUnit("x", "{2}", typeof(UnitOfLength))]
            [DerivableUnit("y", "{0}", typeof(UnitOfLength), typeof(UnitOfTime), typeof(UnitOfMass))]
            "#,
        );
        assert!(list.is_empty());
        assert_eq!(codes(&diags), vec!["E0114", "E0115", "E0115"]);
    }

    #[test]
    fn redundant_permutations_still_valid() {
        let (list, diags) = derivations(
            UNIT,
            "[DerivableUnit(\"{0} * {1}\", typeof(UnitOfLength), typeof(UnitOfLength), Permutations = true)]",
        );
        assert_eq!(list.len(), 1);
        assert_eq!(warnings(&diags).len(), 1);
        assert_eq!(codes(&diags), vec!["W0120"]);
    }

    #[test]
    fn null_element_and_duplicate_signature() {
        let (list, diags) = derivations(
            UNIT,
            r#"
            [DerivableUnit("a", "{0}", typeof(UnitOfLength))]
            [DerivableUnit("b", "{0}", typeof(UnitOfLength))]
            [DerivableUnit("c", "{0}", new[] { null })]
            "#,
        );
        assert_eq!(list.len(), 1);
        assert_eq!(codes(&diags), vec!["E0118", "E0113"]);
    }
}
