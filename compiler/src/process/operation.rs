// operation.rs — `[VectorOperation]` processing and naming policy
//
// Preconditions: the declaring type carries a vector, group or member.
// Postconditions: names are defaulted from operator and position; a
//   mirrored name exists iff the operation mirrors; `(name, other)` pairs
//   are unique per declaring type, mirrored pairs included.
// Failure modes: an invalid operation is dropped with a diagnostic.
// Side effects: none.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::{at, Processer};
use crate::diag::{codes, Diagnostic};
use crate::raw::{EnumArg, HasLocations, RawVectorOperation, VectorOperationLocations};
use crate::types::{Location, NamedType};
use crate::validity::{Outcome, Validity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OperatorType {
    Dot,
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Position {
    Left,
    Right,
}

impl OperatorType {
    pub fn from_arg(arg: &EnumArg) -> Option<Self> {
        match arg {
            EnumArg::Member(m) if m == "Dot" => Some(Self::Dot),
            EnumArg::Member(m) if m == "Cross" => Some(Self::Cross),
            EnumArg::Int(0) => Some(Self::Dot),
            EnumArg::Int(1) => Some(Self::Cross),
            _ => None,
        }
    }
}

impl Position {
    pub fn from_arg(arg: &EnumArg) -> Option<Self> {
        match arg {
            EnumArg::Member(m) if m == "Left" => Some(Self::Left),
            EnumArg::Member(m) if m == "Right" => Some(Self::Right),
            EnumArg::Int(0) => Some(Self::Left),
            EnumArg::Int(1) => Some(Self::Right),
            _ => None,
        }
    }

    pub fn swapped(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl fmt::Display for OperatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dot => write!(f, "Dot"),
            Self::Cross => write!(f, "Cross"),
        }
    }
}

/// Method name used when `Name` is not written.
pub fn default_name(operator: OperatorType, position: Position) -> &'static str {
    match (operator, position) {
        (OperatorType::Dot, _) => "Dot",
        (OperatorType::Cross, Position::Left) => "Cross",
        (OperatorType::Cross, Position::Right) => "CrossInto",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedVectorOperation {
    pub operator_type: OperatorType,
    pub position: Position,
    pub name: String,
    /// Present iff the operation is mirrored.
    pub mirrored_name: Option<String>,
    pub result: NamedType,
    pub other: NamedType,
    pub locations: VectorOperationLocations,
}

impl ProcessedVectorOperation {
    pub fn mirrors(&self) -> bool {
        self.mirrored_name.is_some()
    }
}

impl HasLocations for ProcessedVectorOperation {
    fn attribute_location(&self) -> Location {
        self.locations.attribute
    }
}

/// `(method name, other operand)` pairs claimed on one declaring type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorOperationContext {
    pub ty: NamedType,
    pub reserved: BTreeSet<(String, NamedType)>,
}

impl VectorOperationContext {
    pub fn new(ty: NamedType) -> Self {
        Self {
            ty,
            reserved: BTreeSet::new(),
        }
    }

    fn is_reserved(&self, name: &str, other: &NamedType) -> bool {
        self.reserved.contains(&(name.to_string(), other.clone()))
    }
}

pub trait VectorOperationProcessingDiagnostics {
    fn unrecognized_operator(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation) -> Option<Diagnostic>;
    fn unrecognized_position(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation) -> Option<Diagnostic>;
    fn not_mirrorable(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation) -> Option<Diagnostic>;
    fn invalid_name(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation, location: Location) -> Option<Diagnostic>;
    fn mirror_disabled_but_named(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation) -> Option<Diagnostic>;
    fn duplicate_name(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation, name: &str) -> Option<Diagnostic>;
    fn duplicate_mirrored_name(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation, name: &str) -> Option<Diagnostic>;
}

pub struct DefaultVectorOperationProcessingDiagnostics;

impl VectorOperationProcessingDiagnostics for DefaultVectorOperationProcessingDiagnostics {
    fn unrecognized_operator(&self, _ctx: &VectorOperationContext, raw: &RawVectorOperation) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0110,
            at(raw.locations.operator_type, raw.locations.attribute),
            "unrecognized `VectorOperatorType`; expected `Dot` or `Cross`",
        ))
    }

    fn unrecognized_position(&self, _ctx: &VectorOperationContext, raw: &RawVectorOperation) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0110,
            at(raw.locations.position, raw.locations.attribute),
            "unrecognized `VectorOperationPosition`; expected `Left` or `Right`",
        ))
    }

    fn not_mirrorable(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation) -> Option<Diagnostic> {
        let location = raw
            .locations
            .mirrored_name
            .or(raw.locations.mirror)
            .unwrap_or(raw.locations.attribute);
        Some(Diagnostic::warning(
            codes::W0414,
            location,
            format!("this operation on '{}' cannot be mirrored; mirroring is ignored", ctx.ty),
        ))
    }

    fn invalid_name(&self, _ctx: &VectorOperationContext, _raw: &RawVectorOperation, location: Location) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0410,
            location,
            "operation name must be a non-empty string",
        ))
    }

    fn mirror_disabled_but_named(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation) -> Option<Diagnostic> {
        Some(
            Diagnostic::error(
                codes::E0413,
                at(raw.locations.mirrored_name, raw.locations.attribute),
                format!("operation on '{}' sets `MirroredName` but disables mirroring", ctx.ty),
            )
            .with_hint("remove `MirroredName` or `Mirror = false`"),
        )
    }

    fn duplicate_name(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation, name: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0411,
            at(raw.locations.name, raw.locations.attribute),
            format!(
                "'{}' already defines operation '{}' with operand '{}'",
                ctx.ty,
                name,
                raw.other.as_ref().map(ToString::to_string).unwrap_or_default()
            ),
        ))
    }

    fn duplicate_mirrored_name(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation, name: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0412,
            at(raw.locations.mirrored_name, raw.locations.attribute),
            format!(
                "'{}' already defines operation '{}' with operand '{}' (mirrored)",
                ctx.ty,
                name,
                raw.other.as_ref().map(ToString::to_string).unwrap_or_default()
            ),
        ))
    }
}

pub struct VectorOperationProcesser<'a> {
    diagnostics: &'a dyn VectorOperationProcessingDiagnostics,
}

impl<'a> VectorOperationProcesser<'a> {
    pub fn new(diagnostics: &'a dyn VectorOperationProcessingDiagnostics) -> Self {
        Self { diagnostics }
    }

    /// A written name must be non-null and non-empty.
    fn written_name(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation, value: &Option<String>, location: Option<Location>) -> Validity {
        match location {
            Some(location) if value.as_deref().map_or(true, str::is_empty) => {
                Validity::invalid(self.diagnostics.invalid_name(ctx, raw, location))
            }
            _ => Validity::valid(),
        }
    }

    fn build(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation, operator: OperatorType, position: Position) -> Outcome<ProcessedVectorOperation> {
        let (Some(result), Some(other)) = (raw.result.clone(), raw.other.clone()) else {
            return Outcome::empty();
        };
        let l = &raw.locations;
        let is_self = other == ctx.ty;
        let mirrors = raw.mirror && !is_self && operator == OperatorType::Cross;
        let name = raw
            .name
            .clone()
            .unwrap_or_else(|| default_name(operator, position).to_string());
        let mirrored_name = mirrors.then(|| {
            raw.mirrored_name
                .clone()
                .unwrap_or_else(|| default_name(operator, position.swapped()).to_string())
        });

        let self_unmirrorable =
            is_self && ((l.explicitly_set_mirror() && raw.mirror) || l.explicitly_set_mirrored_name());
        let mirrorability = if self_unmirrorable {
            Validity::valid_with(self.diagnostics.not_mirrorable(ctx, raw))
        } else {
            Validity::valid()
        };
        mirrorability
            .validate(|| self.written_name(ctx, raw, &raw.name, l.name))
            .validate(|| self.written_name(ctx, raw, &raw.mirrored_name, l.mirrored_name))
            .validate(|| {
                let disabled = l.explicitly_set_mirrored_name() && !is_self && l.explicitly_set_mirror() && !raw.mirror;
                Validity::conditional(!disabled, || self.diagnostics.mirror_disabled_but_named(ctx, raw))
            })
            .validate(|| {
                let dot_named = operator == OperatorType::Dot && l.explicitly_set_mirrored_name() && !is_self;
                if dot_named {
                    Validity::valid_with(self.diagnostics.not_mirrorable(ctx, raw))
                } else {
                    Validity::valid()
                }
            })
            .validate(|| {
                Validity::conditional(!ctx.is_reserved(&name, &other), || {
                    self.diagnostics.duplicate_name(ctx, raw, &name)
                })
            })
            .validate(|| match &mirrored_name {
                Some(mirrored) if ctx.is_reserved(mirrored, &other) => {
                    Validity::invalid(self.diagnostics.duplicate_mirrored_name(ctx, raw, mirrored))
                }
                _ => Validity::valid(),
            })
            .transform(|| ProcessedVectorOperation {
                operator_type: operator,
                position,
                name,
                mirrored_name,
                result,
                other,
                locations: raw.locations,
            })
    }
}

impl Processer<VectorOperationContext, RawVectorOperation, ProcessedVectorOperation> for VectorOperationProcesser<'_> {
    fn process(&self, ctx: &VectorOperationContext, raw: &RawVectorOperation) -> Outcome<ProcessedVectorOperation> {
        let set_and_defined = |ty: &Option<NamedType>| ty.as_ref().is_some_and(|t| !t.is_empty());
        let operator = OperatorType::from_arg(&raw.operator_type);
        let position = Position::from_arg(&raw.position);

        Validity::conditional_without_diagnostics(set_and_defined(&raw.result) && set_and_defined(&raw.other))
            .validate(|| {
                Validity::conditional(operator.is_some(), || self.diagnostics.unrecognized_operator(ctx, raw))
                    .and(Validity::conditional(position.is_some(), || {
                        self.diagnostics.unrecognized_position(ctx, raw)
                    }))
            })
            .merge(|| match (operator, position) {
                (Some(operator), Some(position)) => self.build(ctx, raw, operator, position),
                _ => Outcome::empty(),
            })
    }

    fn on_success(&self, ctx: &mut VectorOperationContext, product: &ProcessedVectorOperation) {
        ctx.reserved.insert((product.name.clone(), product.other.clone()));
        if let Some(mirrored) = &product.mirrored_name {
            ctx.reserved.insert((mirrored.clone(), product.other.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, only_type, process_source};
    use super::*;

    fn operations(attributes: &str) -> (Vec<ProcessedVectorOperation>, Vec<&'static str>) {
        let source = format!(
            "[SharpMeasuresVector(typeof(UnitOfLength))] {} partial class Position3 {{ }}",
            attributes
        );
        let (processed, diags) = process_source(&source);
        (only_type(&processed).vectors[0].operations.clone(), codes(&diags))
    }

    #[test]
    fn cross_defaults_mirror() {
        let (ops, diags) = operations(
            "[VectorOperation(typeof(Torque3), typeof(Force3), OperatorType = VectorOperatorType.Cross)]",
        );
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(ops[0].name, "Cross");
        assert_eq!(ops[0].mirrored_name.as_deref(), Some("CrossInto"));
    }

    #[test]
    fn right_position_swaps_names() {
        let (ops, _) = operations(
            "[VectorOperation(typeof(T3), typeof(F3), OperatorType = VectorOperatorType.Cross, Position = VectorOperationPosition.Right)]",
        );
        assert_eq!(ops[0].name, "CrossInto");
        assert_eq!(ops[0].mirrored_name.as_deref(), Some("Cross"));
    }

    #[test]
    fn dot_and_self_do_not_mirror() {
        let (ops, diags) = operations(
            r#"
            [VectorOperation(typeof(Scalar), typeof(Force3))]
            [VectorOperation(typeof(Area3), typeof(Position3), OperatorType = VectorOperatorType.Cross)]
            "#,
        );
        assert!(diags.is_empty());
        assert_eq!(ops[0].name, "Dot");
        assert!(!ops[0].mirrors());
        assert!(!ops[1].mirrors());
    }

    #[test]
    fn self_with_mirror_warns() {
        let (ops, diags) = operations(
            "[VectorOperation(typeof(Area3), typeof(Position3), OperatorType = VectorOperatorType.Cross, Mirror = true)]",
        );
        assert_eq!(ops.len(), 1);
        assert_eq!(diags, vec!["W0414"]);
    }

    #[test]
    fn dot_with_mirrored_name_warns() {
        let (ops, diags) = operations(
            r#"[VectorOperation(typeof(S), typeof(F3), MirroredName = "Other")]"#,
        );
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].mirrored_name, None);
        assert_eq!(diags, vec!["W0414"]);
    }

    #[test]
    fn invalid_names_and_disabled_mirror() {
        let (ops, diags) = operations(
            r#"
            [VectorOperation(typeof(S), typeof(F3), Name = "")]
            [VectorOperation(typeof(S), typeof(F3), MirroredName = null)]
            [VectorOperation(typeof(T3), typeof(F3), OperatorType = VectorOperatorType.Cross, MirroredName = "X", Mirror = false)]
            "#,
        );
        assert!(ops.is_empty());
        assert_eq!(diags, vec!["E0410", "E0410", "E0413"]);
    }

    #[test]
    fn unrecognized_enum_values() {
        let (ops, diags) = operations(
            "[VectorOperation(typeof(S), typeof(F3), OperatorType = 7, Position = VectorOperationPosition.Up)]",
        );
        assert!(ops.is_empty());
        assert_eq!(diags, vec!["E0110", "E0110"]);
    }

    #[test]
    fn duplicate_names_including_mirrored() {
        let (ops, diags) = operations(
            r#"
            [VectorOperation(typeof(S), typeof(F3))]
            [VectorOperation(typeof(S2), typeof(F3))]
            [VectorOperation(typeof(S3), typeof(G3))]
            [VectorOperation(typeof(T3), typeof(F3), OperatorType = VectorOperatorType.Cross)]
            [VectorOperation(typeof(T3), typeof(F3), OperatorType = VectorOperatorType.Cross, Name = "Other")]
            "#,
        );
        assert_eq!(ops.len(), 3);
        assert_eq!(diags, vec!["E0411", "E0412"]);
    }

    #[test]
    fn enum_from_int() {
        assert_eq!(OperatorType::from_arg(&EnumArg::Int(1)), Some(OperatorType::Cross));
        assert_eq!(Position::from_arg(&EnumArg::Int(2)), None);
    }
}
