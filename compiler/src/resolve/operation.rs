// operation.rs — Vector operation resolution and dimensional validation
//
// Preconditions: operations were processed on a vector, group or member.
// Postconditions: result and other resolve to quantities; cross products
//   only involve dimension 3; dot products yield scalars from operands that
//   share a dimension.
// Failure modes: a failing operation is dropped; its siblings survive.
// Side effects: none.

use std::collections::BTreeSet;

use serde::Serialize;

use super::{QuantityRef, ResolutionContext};
use crate::diag::{codes, Diagnostic};
use crate::population::{DefinitionKind, Populations};
use crate::process::at;
use crate::process::operation::{OperatorType, Position, ProcessedVectorOperation};
use crate::raw::VectorOperationLocations;
use crate::types::NamedType;
use crate::validity::{Outcome, Validity};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedVectorOperation {
    pub operator_type: OperatorType,
    pub position: Position,
    pub name: String,
    pub mirrored_name: Option<String>,
    pub result: QuantityRef,
    pub other: QuantityRef,
    pub locations: VectorOperationLocations,
}

/// Which operand of a cross product lacks dimension 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossOperand {
    Declaring,
    Result,
    Other,
}

impl CrossOperand {
    fn describe(self) -> &'static str {
        match self {
            Self::Declaring => "declaring vector",
            Self::Result => "result",
            Self::Other => "other operand",
        }
    }
}

pub trait VectorOperationResolutionDiagnostics {
    fn cross_product_scalar_result(&self, ctx: &ResolutionContext, operation: &ProcessedVectorOperation) -> Option<Diagnostic>;
    fn operand_not_vector(&self, ctx: &ResolutionContext, operation: &ProcessedVectorOperation) -> Option<Diagnostic>;
    fn result_not_quantity(&self, ctx: &ResolutionContext, operation: &ProcessedVectorOperation) -> Option<Diagnostic>;
    fn other_not_vector(&self, ctx: &ResolutionContext, operation: &ProcessedVectorOperation) -> Option<Diagnostic>;
    fn cross_product_requires_dimension_3(&self, ctx: &ResolutionContext, operation: &ProcessedVectorOperation, operand: CrossOperand, ty: &NamedType) -> Option<Diagnostic>;
    fn dot_product_dimension_mismatch(&self, ctx: &ResolutionContext, operation: &ProcessedVectorOperation) -> Option<Diagnostic>;
    fn dot_product_vector_result(&self, ctx: &ResolutionContext, operation: &ProcessedVectorOperation) -> Option<Diagnostic>;
}

pub struct DefaultVectorOperationResolutionDiagnostics;

impl VectorOperationResolutionDiagnostics for DefaultVectorOperationResolutionDiagnostics {
    fn cross_product_scalar_result(&self, _ctx: &ResolutionContext, operation: &ProcessedVectorOperation) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0430,
            at(operation.locations.operator_type, operation.locations.attribute),
            format!("cross product '{}' cannot yield scalar '{}'", operation.name, operation.result),
        ))
    }

    fn operand_not_vector(&self, _ctx: &ResolutionContext, operation: &ProcessedVectorOperation) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0431,
            at(operation.locations.other, operation.locations.attribute),
            format!("other operand must be a vector, '{}' is a scalar", operation.other),
        ))
    }

    fn result_not_quantity(&self, _ctx: &ResolutionContext, operation: &ProcessedVectorOperation) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0432,
            at(operation.locations.result, operation.locations.attribute),
            format!("result '{}' is not a quantity", operation.result),
        ))
    }

    fn other_not_vector(&self, _ctx: &ResolutionContext, operation: &ProcessedVectorOperation) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0433,
            at(operation.locations.other, operation.locations.attribute),
            format!("other operand '{}' is not a vector quantity", operation.other),
        ))
    }

    fn cross_product_requires_dimension_3(&self, _ctx: &ResolutionContext, operation: &ProcessedVectorOperation, operand: CrossOperand, ty: &NamedType) -> Option<Diagnostic> {
        let field = match operand {
            CrossOperand::Declaring => None,
            CrossOperand::Result => operation.locations.result,
            CrossOperand::Other => operation.locations.other,
        };
        Some(Diagnostic::error(
            codes::E0434,
            at(field, operation.locations.attribute),
            format!(
                "cross product '{}' requires dimension 3, {} '{}' lacks it",
                operation.name,
                operand.describe(),
                ty
            ),
        ))
    }

    fn dot_product_dimension_mismatch(&self, ctx: &ResolutionContext, operation: &ProcessedVectorOperation) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0435,
            at(operation.locations.other, operation.locations.attribute),
            format!(
                "dot product '{}' of '{}' and '{}' has no common dimension",
                operation.name, ctx.ty, operation.other
            ),
        ))
    }

    fn dot_product_vector_result(&self, _ctx: &ResolutionContext, operation: &ProcessedVectorOperation) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0436,
            at(operation.locations.result, operation.locations.attribute),
            format!("dot product '{}' must yield a scalar, '{}' is a vector", operation.name, operation.result),
        ))
    }
}

/// Declared as any quantity kind, cleanly or not.
fn declared_quantity(populations: &Populations, ty: &NamedType) -> bool {
    DefinitionKind::ALL
        .into_iter()
        .filter(|&kind| kind != DefinitionKind::Unit)
        .any(|kind| populations.declares_as(kind, ty))
}

/// Resolve one operation declared on `ctx.ty`, whose dimensions are
/// `declaring`.
pub fn resolve_operation(
    strategy: &dyn VectorOperationResolutionDiagnostics,
    ctx: &ResolutionContext,
    declaring: &BTreeSet<u32>,
    operation: &ProcessedVectorOperation,
) -> Outcome<ResolvedVectorOperation> {
    let (result, other) = match (
        QuantityRef::lookup(ctx.populations, &operation.result),
        QuantityRef::lookup(ctx.populations, &operation.other),
    ) {
        (Some(result), Some(other)) => (result, other),
        (result, other) => {
            // Duplicated or outranked quantities were reported where declared.
            let mut diagnostics = Vec::new();
            if result.is_none() && !declared_quantity(ctx.populations, &operation.result) {
                diagnostics.extend(strategy.result_not_quantity(ctx, operation));
            }
            if other.is_none() && !declared_quantity(ctx.populations, &operation.other) {
                diagnostics.extend(strategy.other_not_vector(ctx, operation));
            }
            return Outcome::empty_with_all(diagnostics);
        }
    };

    let scalar_result = result.is_scalar();
    let cross = operation.operator_type == OperatorType::Cross;
    let other_dimensions = other.dimensions(ctx.populations);

    Validity::conditional(!(scalar_result && cross), || {
        strategy.cross_product_scalar_result(ctx, operation)
    })
    .validate(|| {
        Validity::conditional(other.is_vector(), || strategy.operand_not_vector(ctx, operation))
    })
    .validate(|| match (scalar_result, cross) {
        (false, true) => {
            let operands = [
                (CrossOperand::Declaring, &ctx.ty, declaring.clone()),
                (CrossOperand::Result, result.ty(), result.dimensions(ctx.populations)),
                (CrossOperand::Other, other.ty(), other_dimensions.clone()),
            ];
            let lacking: Vec<_> = operands
                .iter()
                .filter(|(_, _, dimensions)| !dimensions.contains(&3))
                .collect();
            let diagnostics = lacking
                .iter()
                .filter_map(|(operand, ty, _)| {
                    strategy.cross_product_requires_dimension_3(ctx, operation, *operand, ty)
                })
                .collect();
            Validity::conditional_without_diagnostics(lacking.is_empty())
                .and(Validity::valid_with_all(diagnostics))
        }
        (true, false) => Validity::conditional(!declaring.is_disjoint(&other_dimensions), || {
            strategy.dot_product_dimension_mismatch(ctx, operation)
        }),
        (false, false) => Validity::invalid(strategy.dot_product_vector_result(ctx, operation)),
        (true, true) => Validity::valid(),
    })
    .transform(|| ResolvedVectorOperation {
        operator_type: operation.operator_type,
        position: operation.position,
        name: operation.name.clone(),
        mirrored_name: operation.mirrored_name.clone(),
        result,
        other,
        locations: operation.locations,
    })
}

/// Resolve every operation, dropping the ones that fail.
pub fn resolve_operations(
    strategy: &dyn VectorOperationResolutionDiagnostics,
    ctx: &ResolutionContext,
    declaring: &BTreeSet<u32>,
    operations: &[ProcessedVectorOperation],
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ResolvedVectorOperation> {
    operations
        .iter()
        .filter_map(|operation| resolve_operation(strategy, ctx, declaring, operation).drain_into(diagnostics))
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, resolve_source};
    use super::*;

    const BASE: &str = r#"
        [SharpMeasuresUnit(typeof(Length))] [FixedUnitInstance("Metre")] partial class UnitOfLength { }
        [SharpMeasuresScalar(typeof(UnitOfLength))] partial class Length { }
        [SharpMeasuresScalar(typeof(UnitOfLength))] partial class Area { }
        [SharpMeasuresVector(typeof(UnitOfLength))] partial class Size2 { }
        [SharpMeasuresVector(typeof(UnitOfLength))] partial class Normal3 { }
        [SharpMeasuresVectorGroup(typeof(UnitOfLength))] partial class Position { }
        [SharpMeasuresVectorGroupMember(typeof(Position))] partial class Position3 { }
    "#;

    fn declared_on(declaring: &str, operations: &str) -> Vec<&'static str> {
        let (_, diags) = resolve_source(&format!(
            "{}\n[SharpMeasuresVector(typeof(UnitOfLength))]\n{}\npartial class {} {{ }}",
            BASE, operations, declaring
        ));
        codes(&diags)
    }

    #[test]
    fn valid_dot_and_cross() {
        let (system, diags) = resolve_source(&format!(
            "{}\n{}",
            BASE,
            r#"[SharpMeasuresVector(typeof(UnitOfLength))]
               [VectorOperation(typeof(Area), typeof(Position))]
               [VectorOperation(typeof(Normal3), typeof(Position3), OperatorType = VectorOperatorType.Cross)]
               partial class Arrow3 { }"#
        ));
        assert!(diags.is_empty(), "{:?}", diags);
        let arrow = system.vectors.iter().find(|v| v.ty.to_string() == "Arrow3").unwrap();
        assert_eq!(arrow.operations.len(), 2);
        assert!(arrow.operations[0].result.is_scalar());
        assert!(matches!(arrow.operations[1].other, QuantityRef::Member(_)));
    }

    #[test]
    fn operands_must_be_quantities() {
        assert_eq!(
            declared_on("Arrow3", "[VectorOperation(typeof(UnitOfLength), typeof(Nothing))]"),
            vec!["E0432", "E0433"]
        );
        assert_eq!(
            declared_on("Arrow3", "[VectorOperation(typeof(Area), typeof(Length))]"),
            vec!["E0431"]
        );
    }

    #[test]
    fn cross_product_rules() {
        assert_eq!(
            declared_on(
                "Arrow3",
                "[VectorOperation(typeof(Area), typeof(Normal3), OperatorType = VectorOperatorType.Cross)]"
            ),
            vec!["E0430"]
        );
        assert_eq!(
            declared_on(
                "Arrow2",
                "[VectorOperation(typeof(Size2), typeof(Normal3), OperatorType = VectorOperatorType.Cross)]"
            ),
            vec!["E0434", "E0434"]
        );
        // A scalar result is reported alone, even when the other operand is a scalar too.
        assert_eq!(
            declared_on(
                "Arrow3",
                "[VectorOperation(typeof(Area), typeof(Length), OperatorType = VectorOperatorType.Cross)]"
            ),
            vec!["E0430"]
        );
    }

    #[test]
    fn duplicated_operands_are_not_reported_again() {
        let (system, diags) = resolve_source(&format!(
            "{}\n{}",
            BASE,
            r#"[SharpMeasuresScalar(typeof(UnitOfLength))] partial class Area { }
               [SharpMeasuresVector(typeof(UnitOfLength))]
               [VectorOperation(typeof(Area), typeof(Position))]
               [VectorOperation(typeof(Length), typeof(Area))]
               partial class Arrow3 { }"#
        ));
        assert_eq!(codes(&diags), vec!["E0500"]);
        let arrow = system.vectors.iter().find(|v| v.ty.to_string() == "Arrow3").unwrap();
        assert!(arrow.operations.is_empty());
    }

    #[test]
    fn dot_product_rules() {
        assert_eq!(
            declared_on("Arrow3", "[VectorOperation(typeof(Area), typeof(Size2))]"),
            vec!["E0435"]
        );
        assert_eq!(
            declared_on("Arrow3", "[VectorOperation(typeof(Normal3), typeof(Position3))]"),
            vec!["E0436"]
        );
    }
}
