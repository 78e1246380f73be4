// schema.rs — Marker-attribute schema and argument binding
//
// Describes each recognized attribute: its constructor overloads, its named
// properties, the argument kind each slot expects, and whether it may repeat
// on one declaration. `bind` matches a parsed attribute against its schema and
// produces arguments keyed by canonical parameter name.
//
// Preconditions: `attr` is a parsed attribute whose name maps to `kind`.
// Postconditions: every produced argument has the kind its slot expects, or
//   is a type slot holding `NamedType::empty()` after a reported mismatch.
// Failure modes: arity failures drop the attribute (`args == None`); slot
//   failures drop only that argument. All are reported as diagnostics.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::ast::{ArgStyle, Attribute, AttributeArg, Expr, Span, TypeRef};
use crate::diag::{codes, Diagnostic};
use crate::types::{FileId, Location, NamedType};

// ── Attribute kinds ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AttributeKind {
    Unit,
    FixedUnitInstance,
    UnitInstanceAlias,
    DerivedUnitInstance,
    PrefixedUnitInstance,
    ScaledUnitInstance,
    BiasedUnitInstance,
    DerivableUnit,
    Scalar,
    Vector,
    VectorGroup,
    VectorGroupMember,
    VectorOperation,
    IncludeUnits,
    ExcludeUnits,
    SpecializedScalar,
    SpecializedVector,
    SpecializedVectorGroup,
    ScalarConstant,
    VectorConstant,
    ConvertibleQuantity,
    IncludeBases,
    ExcludeBases,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 23] = [
        AttributeKind::Unit,
        AttributeKind::FixedUnitInstance,
        AttributeKind::UnitInstanceAlias,
        AttributeKind::DerivedUnitInstance,
        AttributeKind::PrefixedUnitInstance,
        AttributeKind::ScaledUnitInstance,
        AttributeKind::BiasedUnitInstance,
        AttributeKind::DerivableUnit,
        AttributeKind::Scalar,
        AttributeKind::Vector,
        AttributeKind::VectorGroup,
        AttributeKind::VectorGroupMember,
        AttributeKind::VectorOperation,
        AttributeKind::IncludeUnits,
        AttributeKind::ExcludeUnits,
        AttributeKind::SpecializedScalar,
        AttributeKind::SpecializedVector,
        AttributeKind::SpecializedVectorGroup,
        AttributeKind::ScalarConstant,
        AttributeKind::VectorConstant,
        AttributeKind::ConvertibleQuantity,
        AttributeKind::IncludeBases,
        AttributeKind::ExcludeBases,
    ];

    /// Source names, without the `Attribute` suffix.
    pub fn names(self) -> &'static [&'static str] {
        match self {
            AttributeKind::Unit => &["SharpMeasuresUnit"],
            AttributeKind::FixedUnitInstance => &["FixedUnitInstance"],
            AttributeKind::UnitInstanceAlias => &["UnitInstanceAlias"],
            AttributeKind::DerivedUnitInstance => &["DerivedUnitInstance"],
            AttributeKind::PrefixedUnitInstance => &["PrefixedUnitInstance"],
            AttributeKind::ScaledUnitInstance => &["ScaledUnitInstance"],
            AttributeKind::BiasedUnitInstance => &["BiasedUnitInstance"],
            AttributeKind::DerivableUnit => &["DerivableUnit"],
            AttributeKind::Scalar => &["SharpMeasuresScalar"],
            AttributeKind::Vector => &["SharpMeasuresVector"],
            AttributeKind::VectorGroup => &["SharpMeasuresVectorGroup"],
            AttributeKind::VectorGroupMember => {
                &["SharpMeasuresVectorGroupMember", "ResizedSharpMeasuresVector"]
            }
            AttributeKind::VectorOperation => &["VectorOperation"],
            AttributeKind::IncludeUnits => &["IncludeUnits"],
            AttributeKind::ExcludeUnits => &["ExcludeUnits"],
            AttributeKind::SpecializedScalar => &["SpecializedSharpMeasuresScalar"],
            AttributeKind::SpecializedVector => &["SpecializedSharpMeasuresVector"],
            AttributeKind::SpecializedVectorGroup => &["SpecializedSharpMeasuresVectorGroup"],
            AttributeKind::ScalarConstant => &["ScalarConstant"],
            AttributeKind::VectorConstant => &["VectorConstant"],
            AttributeKind::ConvertibleQuantity => &["ConvertibleQuantity"],
            AttributeKind::IncludeBases => &["IncludeBases", "IncludeUnitBases"],
            AttributeKind::ExcludeBases => &["ExcludeBases", "ExcludeUnitBases"],
        }
    }

    /// Recognize an attribute by the last segment of its written name.
    pub fn from_name(written: &str) -> Option<Self> {
        let name = written.strip_suffix("Attribute").unwrap_or(written);
        Self::ALL
            .into_iter()
            .find(|kind| kind.names().contains(&name))
    }

    pub fn display_name(self) -> &'static str {
        self.names()[0]
    }

    pub fn schema(self) -> &'static AttributeSchema {
        match self {
            AttributeKind::Unit => &UNIT_SCHEMA,
            AttributeKind::FixedUnitInstance => &FIXED_SCHEMA,
            AttributeKind::UnitInstanceAlias => &ALIAS_SCHEMA,
            AttributeKind::DerivedUnitInstance => &DERIVED_SCHEMA,
            AttributeKind::PrefixedUnitInstance => &PREFIXED_SCHEMA,
            AttributeKind::ScaledUnitInstance => &SCALED_SCHEMA,
            AttributeKind::BiasedUnitInstance => &BIASED_SCHEMA,
            AttributeKind::DerivableUnit => &DERIVABLE_SCHEMA,
            AttributeKind::Scalar => &SCALAR_SCHEMA,
            AttributeKind::Vector => &VECTOR_SCHEMA,
            AttributeKind::VectorGroup => &GROUP_SCHEMA,
            AttributeKind::VectorGroupMember => &MEMBER_SCHEMA,
            AttributeKind::VectorOperation => &OPERATION_SCHEMA,
            AttributeKind::IncludeUnits => &INCLUDE_SCHEMA,
            AttributeKind::ExcludeUnits => &EXCLUDE_SCHEMA,
            AttributeKind::SpecializedScalar => &SPECIALIZED_SCALAR_SCHEMA,
            AttributeKind::SpecializedVector => &SPECIALIZED_VECTOR_SCHEMA,
            AttributeKind::SpecializedVectorGroup => &SPECIALIZED_GROUP_SCHEMA,
            AttributeKind::ScalarConstant => &SCALAR_CONSTANT_SCHEMA,
            AttributeKind::VectorConstant => &VECTOR_CONSTANT_SCHEMA,
            AttributeKind::ConvertibleQuantity => &CONVERTIBLE_SCHEMA,
            AttributeKind::IncludeBases => &INCLUDE_SCHEMA,
            AttributeKind::ExcludeBases => &EXCLUDE_SCHEMA,
        }
    }

    pub fn is_repeatable(self) -> bool {
        self.schema().repeatable
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ── Parameter names ──────────────────────────────────────────────────────

/// Canonical slot names. Raw definitions look arguments up by these.
pub mod param {
    pub const NAME: &str = "Name";
    pub const PLURAL: &str = "PluralForm";
    pub const ORIGINAL: &str = "OriginalUnitInstance";
    pub const UNITS: &str = "Units";
    pub const DERIVATION_ID: &str = "DerivationID";
    pub const PREFIX: &str = "Prefix";
    pub const SCALE: &str = "Scale";
    pub const BIAS: &str = "Bias";
    pub const EXPRESSION: &str = "Expression";
    pub const SIGNATURE: &str = "Signature";
    pub const PERMUTATIONS: &str = "Permutations";
    pub const QUANTITY: &str = "Quantity";
    pub const BIAS_TERM: &str = "BiasTerm";
    pub const UNIT: &str = "Unit";
    pub const VECTOR: &str = "Vector";
    pub const SCALAR: &str = "Scalar";
    pub const DIMENSION: &str = "Dimension";
    pub const USE_UNIT_BIAS: &str = "UseUnitBias";
    pub const IMPLEMENT_SUM: &str = "ImplementSum";
    pub const IMPLEMENT_DIFFERENCE: &str = "ImplementDifference";
    pub const DIFFERENCE: &str = "Difference";
    pub const DEFAULT_UNIT_INSTANCE_NAME: &str = "DefaultUnitInstanceName";
    pub const DEFAULT_UNIT_INSTANCE_SYMBOL: &str = "DefaultUnitInstanceSymbol";
    pub const RECIPROCAL: &str = "Reciprocal";
    pub const SQUARE: &str = "Square";
    pub const CUBE: &str = "Cube";
    pub const SQUARE_ROOT: &str = "SquareRoot";
    pub const CUBE_ROOT: &str = "CubeRoot";
    pub const VECTOR_GROUP: &str = "VectorGroup";
    pub const RESULT: &str = "Result";
    pub const OTHER: &str = "Other";
    pub const OPERATOR_TYPE: &str = "OperatorType";
    pub const POSITION: &str = "Position";
    pub const MIRRORED_NAME: &str = "MirroredName";
    pub const MIRROR: &str = "Mirror";
    pub const UNIT_INSTANCES: &str = "UnitInstances";
    pub const ORIGINAL_QUANTITY: &str = "OriginalQuantity";
    pub const INHERIT_DERIVATIONS: &str = "InheritDerivations";
    pub const INHERIT_CONSTANTS: &str = "InheritConstants";
    pub const INHERIT_CONVERSIONS: &str = "InheritConversions";
    pub const INHERIT_BASES: &str = "InheritBases";
    pub const INHERIT_UNITS: &str = "InheritUnits";
    pub const UNIT_INSTANCE_NAME: &str = "UnitInstanceName";
    pub const VALUE: &str = "Value";
    pub const GENERATE_MULTIPLES: &str = "GenerateMultiplesProperty";
    pub const MULTIPLES: &str = "Multiples";
    pub const QUANTITIES: &str = "Quantities";
    pub const CONVERSION_DIRECTION: &str = "ConversionDirection";
    pub const CAST_OPERATOR_BEHAVIOUR: &str = "CastOperatorBehaviour";
}

// ── Schema types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Type,
    Str,
    Bool,
    Int,
    /// Integer or real.
    Number,
    /// Member of the named enum, or a raw integer.
    Enum(&'static str),
    /// `MetricPrefixName`/`BinaryPrefixName` member, or a raw integer.
    Prefix,
    TypeArray,
    StrArray,
    NumberArray,
}

impl ArgKind {
    fn describe(self) -> &'static str {
        match self {
            ArgKind::Type => "a type (typeof)",
            ArgKind::Str => "a string",
            ArgKind::Bool => "a boolean",
            ArgKind::Int => "an integer",
            ArgKind::Number => "a number",
            ArgKind::Enum(name) => name,
            ArgKind::Prefix => "a metric or binary prefix",
            ArgKind::TypeArray => "an array of types",
            ArgKind::StrArray => "an array of strings",
            ArgKind::NumberArray => "an array of numbers",
        }
    }

    fn element(self) -> Option<ArgKind> {
        match self {
            ArgKind::TypeArray => Some(ArgKind::Type),
            ArgKind::StrArray => Some(ArgKind::Str),
            ArgKind::NumberArray => Some(ArgKind::Number),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub kind: ArgKind,
    /// `params T[]`: absorbs every remaining positional argument.
    pub variadic: bool,
}

const fn p(name: &'static str, kind: ArgKind) -> Param {
    Param {
        name,
        kind,
        variadic: false,
    }
}

const fn rest(name: &'static str, kind: ArgKind) -> Param {
    Param {
        name,
        kind,
        variadic: true,
    }
}

#[derive(Debug)]
pub struct AttributeSchema {
    pub overloads: &'static [&'static [Param]],
    pub properties: &'static [Param],
    pub repeatable: bool,
}

impl AttributeSchema {
    fn property(&self, name: &str) -> Option<&Param> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

// ── Schema table ─────────────────────────────────────────────────────────

use param::*;
use ArgKind::*;

static UNIT_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[p(QUANTITY, Type)]],
    properties: &[p(BIAS_TERM, Bool)],
    repeatable: false,
};

static FIXED_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[p(NAME, Str)], &[p(NAME, Str), p(PLURAL, Str)]],
    properties: &[],
    repeatable: false,
};

static ALIAS_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[
        &[p(NAME, Str), p(ORIGINAL, Str)],
        &[p(NAME, Str), p(PLURAL, Str), p(ORIGINAL, Str)],
    ],
    properties: &[],
    repeatable: true,
};

static DERIVED_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[
        &[p(NAME, Str), p(UNITS, StrArray)],
        &[p(NAME, Str), p(PLURAL, Str), p(UNITS, StrArray)],
        &[
            p(NAME, Str),
            p(PLURAL, Str),
            p(DERIVATION_ID, Str),
            p(UNITS, StrArray),
        ],
    ],
    properties: &[p(DERIVATION_ID, Str)],
    repeatable: true,
};

static PREFIXED_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[
        &[p(NAME, Str), p(ORIGINAL, Str), p(PREFIX, Prefix)],
        &[p(NAME, Str), p(PLURAL, Str), p(ORIGINAL, Str), p(PREFIX, Prefix)],
    ],
    properties: &[],
    repeatable: true,
};

static SCALED_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[
        &[p(NAME, Str), p(ORIGINAL, Str), p(SCALE, Number)],
        &[p(NAME, Str), p(PLURAL, Str), p(ORIGINAL, Str), p(SCALE, Number)],
    ],
    properties: &[],
    repeatable: true,
};

static BIASED_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[
        &[p(NAME, Str), p(ORIGINAL, Str), p(BIAS, Number)],
        &[p(NAME, Str), p(PLURAL, Str), p(ORIGINAL, Str), p(BIAS, Number)],
    ],
    properties: &[],
    repeatable: true,
};

static DERIVABLE_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[
        &[p(EXPRESSION, Str), rest(SIGNATURE, TypeArray)],
        &[p(DERIVATION_ID, Str), p(EXPRESSION, Str), rest(SIGNATURE, TypeArray)],
    ],
    properties: &[p(DERIVATION_ID, Str), p(PERMUTATIONS, Bool)],
    repeatable: true,
};

static SCALAR_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[p(UNIT, Type)]],
    properties: &[
        p(VECTOR, Type),
        p(USE_UNIT_BIAS, Bool),
        p(IMPLEMENT_SUM, Bool),
        p(IMPLEMENT_DIFFERENCE, Bool),
        p(DIFFERENCE, Type),
        p(DEFAULT_UNIT_INSTANCE_NAME, Str),
        p(DEFAULT_UNIT_INSTANCE_SYMBOL, Str),
        p(RECIPROCAL, Type),
        p(SQUARE, Type),
        p(CUBE, Type),
        p(SQUARE_ROOT, Type),
        p(CUBE_ROOT, Type),
    ],
    repeatable: false,
};

static VECTOR_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[p(UNIT, Type)]],
    properties: &[
        p(DIMENSION, Int),
        p(SCALAR, Type),
        p(IMPLEMENT_SUM, Bool),
        p(IMPLEMENT_DIFFERENCE, Bool),
        p(DIFFERENCE, Type),
        p(DEFAULT_UNIT_INSTANCE_NAME, Str),
        p(DEFAULT_UNIT_INSTANCE_SYMBOL, Str),
    ],
    repeatable: false,
};

static GROUP_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[p(UNIT, Type)]],
    properties: &[
        p(SCALAR, Type),
        p(IMPLEMENT_SUM, Bool),
        p(IMPLEMENT_DIFFERENCE, Bool),
        p(DIFFERENCE, Type),
        p(DEFAULT_UNIT_INSTANCE_NAME, Str),
        p(DEFAULT_UNIT_INSTANCE_SYMBOL, Str),
    ],
    repeatable: false,
};

static MEMBER_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[p(VECTOR_GROUP, Type)]],
    properties: &[p(DIMENSION, Int)],
    repeatable: false,
};

static OPERATION_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[p(RESULT, Type), p(OTHER, Type)]],
    properties: &[
        p(OPERATOR_TYPE, Enum("VectorOperatorType")),
        p(POSITION, Enum("VectorOperationPosition")),
        p(NAME, Str),
        p(MIRRORED_NAME, Str),
        p(MIRROR, Bool),
    ],
    repeatable: true,
};

static INCLUDE_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[rest(UNIT_INSTANCES, StrArray)]],
    properties: &[],
    repeatable: false,
};

static EXCLUDE_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[rest(UNIT_INSTANCES, StrArray)]],
    properties: &[],
    repeatable: false,
};

static SPECIALIZED_SCALAR_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[p(ORIGINAL_QUANTITY, Type)]],
    properties: &[
        p(INHERIT_DERIVATIONS, Bool),
        p(INHERIT_CONSTANTS, Bool),
        p(INHERIT_CONVERSIONS, Bool),
        p(INHERIT_BASES, Bool),
        p(INHERIT_UNITS, Bool),
        p(VECTOR, Type),
        p(IMPLEMENT_SUM, Bool),
        p(IMPLEMENT_DIFFERENCE, Bool),
        p(DIFFERENCE, Type),
        p(DEFAULT_UNIT_INSTANCE_NAME, Str),
        p(DEFAULT_UNIT_INSTANCE_SYMBOL, Str),
        p(RECIPROCAL, Type),
        p(SQUARE, Type),
        p(CUBE, Type),
        p(SQUARE_ROOT, Type),
        p(CUBE_ROOT, Type),
    ],
    repeatable: false,
};

static SPECIALIZED_VECTOR_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[p(ORIGINAL_QUANTITY, Type)]],
    properties: &[
        p(INHERIT_DERIVATIONS, Bool),
        p(INHERIT_CONSTANTS, Bool),
        p(INHERIT_CONVERSIONS, Bool),
        p(INHERIT_UNITS, Bool),
        p(SCALAR, Type),
        p(IMPLEMENT_SUM, Bool),
        p(IMPLEMENT_DIFFERENCE, Bool),
        p(DIFFERENCE, Type),
        p(DEFAULT_UNIT_INSTANCE_NAME, Str),
        p(DEFAULT_UNIT_INSTANCE_SYMBOL, Str),
    ],
    repeatable: false,
};

static SPECIALIZED_GROUP_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[p(ORIGINAL_QUANTITY, Type)]],
    properties: &[
        p(INHERIT_DERIVATIONS, Bool),
        p(INHERIT_CONSTANTS, Bool),
        p(INHERIT_CONVERSIONS, Bool),
        p(INHERIT_UNITS, Bool),
        p(SCALAR, Type),
        p(IMPLEMENT_SUM, Bool),
        p(IMPLEMENT_DIFFERENCE, Bool),
        p(DIFFERENCE, Type),
        p(DEFAULT_UNIT_INSTANCE_NAME, Str),
        p(DEFAULT_UNIT_INSTANCE_SYMBOL, Str),
    ],
    repeatable: false,
};

static SCALAR_CONSTANT_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[p(NAME, Str), p(UNIT_INSTANCE_NAME, Str), p(VALUE, Number)]],
    properties: &[p(GENERATE_MULTIPLES, Bool), p(MULTIPLES, Str)],
    repeatable: true,
};

static VECTOR_CONSTANT_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[p(NAME, Str), p(UNIT_INSTANCE_NAME, Str), rest(VALUE, NumberArray)]],
    properties: &[p(GENERATE_MULTIPLES, Bool), p(MULTIPLES, Str)],
    repeatable: true,
};

static CONVERTIBLE_SCHEMA: AttributeSchema = AttributeSchema {
    overloads: &[&[rest(QUANTITIES, TypeArray)]],
    properties: &[
        p(CONVERSION_DIRECTION, Enum("QuantityConversionDirection")),
        p(CAST_OPERATOR_BEHAVIOUR, Enum("ConversionOperatorBehaviour")),
    ],
    repeatable: true,
};

/// Stable textual rendering of the whole table, hashed into build provenance.
pub fn describe() -> String {
    let mut out = String::new();
    for kind in AttributeKind::ALL {
        let schema = kind.schema();
        out.push_str(&format!("{:?} {:?}\n", kind, kind.names()));
        for overload in schema.overloads {
            out.push_str(&format!("  ctor {:?}\n", overload));
        }
        out.push_str(&format!("  props {:?}\n", schema.properties));
        out.push_str(&format!("  repeatable {}\n", schema.repeatable));
    }
    out
}

// ── Bound values ─────────────────────────────────────────────────────────

/// An evaluated attribute argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Type(NamedType),
    Enum { ty: Option<String>, member: String },
    Array(Vec<ArgValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundArg {
    pub value: ArgValue,
    pub location: Location,
}

/// Arguments keyed by canonical parameter name.
pub type BoundArgs = BTreeMap<&'static str, BoundArg>;

pub struct Binding {
    pub args: Option<BoundArgs>,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Binding ──────────────────────────────────────────────────────────────

/// Bind `attr` against `kind`'s schema. `resolve` turns a written type into
/// its bound identity.
pub fn bind(
    attr: &Attribute,
    kind: AttributeKind,
    file: FileId,
    resolve: &dyn Fn(&TypeRef) -> NamedType,
) -> Binding {
    let schema = kind.schema();
    let loc = |span: Span| Location::new(file, span);
    let mut diagnostics = Vec::new();

    let positional: Vec<&AttributeArg> = attr
        .args
        .iter()
        .filter(|a| a.style == ArgStyle::Positional)
        .collect();
    let by_parameter: Vec<&AttributeArg> = attr
        .args
        .iter()
        .filter(|a| a.style == ArgStyle::Parameter)
        .collect();

    let Some(overload) = select_overload(schema, &positional, &by_parameter) else {
        diagnostics.push(arity_diagnostic(
            schema,
            kind,
            positional.len() + by_parameter.len(),
            loc(attr.span),
        ));
        return Binding {
            args: None,
            diagnostics,
        };
    };

    // Slots: (param, exprs, span). Variadic slots may take several exprs.
    let mut slots: Vec<(&Param, Vec<&Expr>, Span, bool)> = Vec::new();
    for (i, param) in overload.iter().enumerate() {
        if param.variadic {
            let taken = &positional[i.min(positional.len())..];
            let named_elsewhere = by_parameter.iter().any(|a| {
                a.name
                    .as_ref()
                    .is_some_and(|n| n.name.eq_ignore_ascii_case(param.name))
            });
            if taken.is_empty() && named_elsewhere {
                continue;
            }
            let span: Span = match (taken.first(), taken.last()) {
                (Some(first), Some(last)) => (first.span.start..last.span.end).into(),
                _ => attr.span,
            };
            let single_array = taken.len() == 1
                && matches!(taken[0].value, Expr::Array(..) | Expr::Null(_));
            let exprs = taken.iter().map(|a| &a.value).collect();
            slots.push((param, exprs, span, !single_array));
        } else if let Some(arg) = positional.get(i) {
            slots.push((param, vec![&arg.value], arg.span, false));
        }
    }

    let mut args = BoundArgs::new();
    let mut seen: Vec<&'static str> = slots.iter().map(|(p, ..)| p.name).collect();

    for arg in &by_parameter {
        let name = arg.name.as_ref().map_or("", |n| n.name.as_str());
        // `select_overload` guarantees the parameter exists in the overload.
        let Some(param) = overload.iter().find(|p| p.name.eq_ignore_ascii_case(name)) else {
            continue;
        };
        if seen.contains(&param.name) {
            diagnostics.push(duplicate_argument(param.name, kind, loc(arg.span)));
            continue;
        }
        seen.push(param.name);
        slots.push((param, vec![&arg.value], arg.span, false));
    }

    for arg in attr.args.iter().filter(|a| a.style == ArgStyle::Property) {
        let name = arg.name.as_ref().map_or("", |n| n.name.as_str());
        let Some(param) = schema.property(name) else {
            diagnostics.push(
                Diagnostic::error(
                    codes::E0002,
                    loc(arg.span),
                    format!("'{}' has no property named '{}'", kind, name),
                )
                .with_hint(format!(
                    "known properties: {}",
                    schema
                        .properties
                        .iter()
                        .map(|p| p.name)
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            );
            continue;
        };
        if seen.contains(&param.name) {
            diagnostics.push(duplicate_argument(param.name, kind, loc(arg.span)));
            continue;
        }
        seen.push(param.name);
        slots.push((param, vec![&arg.value], arg.span, false));
    }

    for (param, exprs, span, gathered) in slots {
        let location = loc(span);
        let value = if gathered {
            let element = param.kind.element().unwrap_or(param.kind);
            Some(ArgValue::Array(
                exprs
                    .into_iter()
                    .filter_map(|e| evaluate(e, element, kind, param, file, resolve, &mut diagnostics))
                    .collect(),
            ))
        } else {
            exprs
                .first()
                .and_then(|e| evaluate(e, param.kind, kind, param, file, resolve, &mut diagnostics))
        };
        if let Some(value) = value {
            args.insert(param.name, BoundArg { value, location });
        }
    }

    Binding {
        args: Some(args),
        diagnostics,
    }
}

fn select_overload(
    schema: &AttributeSchema,
    positional: &[&AttributeArg],
    by_parameter: &[&AttributeArg],
) -> Option<&'static [Param]> {
    let count = positional.len() + by_parameter.len();
    let applicable: Vec<&'static [Param]> = schema
        .overloads
        .iter()
        .copied()
        .filter(|params| {
            let variadic = params.last().is_some_and(|p| p.variadic);
            let arity_ok = if variadic {
                count + 1 >= params.len()
            } else {
                count == params.len()
            };
            arity_ok
                && by_parameter.iter().all(|arg| {
                    let name = arg.name.as_ref().map_or("", |n| n.name.as_str());
                    params
                        .iter()
                        .position(|p| p.name.eq_ignore_ascii_case(name))
                        .is_some_and(|i| i >= positional.len())
                })
        })
        .collect();

    applicable
        .iter()
        .copied()
        .find(|params| {
            positional.iter().enumerate().all(|(i, arg)| {
                let param = params.get(i).or(params.last());
                param.is_some_and(|p| {
                    let kind = if p.variadic && !matches!(arg.value, Expr::Array(..)) {
                        p.kind.element().unwrap_or(p.kind)
                    } else {
                        p.kind
                    };
                    fits(&arg.value, kind)
                })
            })
        })
        .or_else(|| applicable.first().copied())
}

fn arity_diagnostic(
    schema: &AttributeSchema,
    kind: AttributeKind,
    count: usize,
    location: Location,
) -> Diagnostic {
    let variadic = schema
        .overloads
        .iter()
        .any(|o| o.last().is_some_and(|p| p.variadic));
    let max = schema.overloads.iter().map(|o| o.len()).max().unwrap_or(0);
    if !variadic && count > max {
        return Diagnostic::error(
            codes::E0003,
            location,
            format!(
                "too many arguments to '{}': expected at most {}, found {}",
                kind, max, count
            ),
        );
    }
    let missing = schema
        .overloads
        .iter()
        .filter(|o| o.len() > count)
        .min_by_key(|o| o.len())
        .and_then(|o| o.get(count))
        .map_or("argument", |p| p.name);
    Diagnostic::error(
        codes::E0004,
        location,
        format!("'{}' is missing required argument '{}'", kind, missing),
    )
}

fn duplicate_argument(name: &str, kind: AttributeKind, location: Location) -> Diagnostic {
    Diagnostic::error(
        codes::E0006,
        location,
        format!("argument '{}' of '{}' is given more than once", name, kind),
    )
}

/// Whether `expr` can bind to a slot of `kind` without a mismatch.
fn fits(expr: &Expr, kind: ArgKind) -> bool {
    match (kind, expr) {
        (_, Expr::Null(_)) => !matches!(
            kind,
            ArgKind::Bool | ArgKind::Int | ArgKind::Number | ArgKind::Enum(_) | ArgKind::Prefix
        ),
        (ArgKind::Type, Expr::TypeOf(..)) => true,
        (ArgKind::Str, Expr::Str(..) | Expr::NameOf(..)) => true,
        (ArgKind::Bool, Expr::Bool(..)) => true,
        (ArgKind::Int, Expr::Int(..)) => true,
        (ArgKind::Number, Expr::Int(..) | Expr::Float(..)) => true,
        (ArgKind::Enum(_) | ArgKind::Prefix, Expr::Int(..)) => true,
        (ArgKind::Enum(name), Expr::Member(path)) => {
            path.is_simple() || enum_type_of(path).is_some_and(|t| t == name)
        }
        (ArgKind::Prefix, Expr::Member(path)) => {
            path.is_simple()
                || enum_type_of(path)
                    .is_some_and(|t| t == "MetricPrefixName" || t == "BinaryPrefixName")
        }
        (ArgKind::TypeArray | ArgKind::StrArray | ArgKind::NumberArray, Expr::Array(items, _)) => {
            let element = kind.element().unwrap_or(kind);
            items.iter().all(|e| fits(e, element))
        }
        _ => false,
    }
}

fn enum_type_of(path: &super::ast::Path) -> Option<&str> {
    let n = path.segments.len();
    (n >= 2).then(|| path.segments[n - 2].name.as_str())
}

#[allow(clippy::too_many_arguments)]
fn evaluate(
    expr: &Expr,
    expected: ArgKind,
    kind: AttributeKind,
    param: &Param,
    file: FileId,
    resolve: &dyn Fn(&TypeRef) -> NamedType,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<ArgValue> {
    if !fits(expr, expected) {
        diagnostics.push(Diagnostic::error(
            codes::E0005,
            Location::new(file, expr.span()),
            format!(
                "argument '{}' of '{}' expects {}",
                param.name,
                kind,
                expected.describe()
            ),
        ));
        // A type slot keeps the undefined type so the raw builder sees it was set.
        return (expected == ArgKind::Type).then(|| ArgValue::Type(NamedType::empty()));
    }
    let value = match expr {
        Expr::Null(_) => ArgValue::Null,
        Expr::TypeOf(t, _) => ArgValue::Type(resolve(t)),
        Expr::Str(s, _) => ArgValue::Str(s.clone()),
        Expr::NameOf(path, _) => ArgValue::Str(path.last().to_string()),
        Expr::Bool(b, _) => ArgValue::Bool(*b),
        Expr::Int(v, _) if expected == ArgKind::Number => ArgValue::Float(*v as f64),
        Expr::Int(v, _) => ArgValue::Int(*v),
        Expr::Float(v, _) => ArgValue::Float(*v),
        Expr::Member(path) => ArgValue::Enum {
            ty: enum_type_of(path).map(str::to_string),
            member: path.last().to_string(),
        },
        Expr::Array(items, _) => {
            let element = expected.element().unwrap_or(expected);
            ArgValue::Array(
                items
                    .iter()
                    .filter_map(|e| evaluate(e, element, kind, param, file, resolve, diagnostics))
                    .collect(),
            )
        }
    };
    Some(value)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ast::{Item, TypeDecl};
    use crate::scan::parser::parse;

    fn first_attribute(source: &str) -> Attribute {
        let unit = parse(source).unit.expect("parse failed");
        let Some(Item::Type(TypeDecl { attributes, .. })) = unit.items.into_iter().next() else {
            panic!("expected type")
        };
        attributes.into_iter().next().expect("expected attribute")
    }

    fn bind_src(source: &str) -> Binding {
        let attr = first_attribute(source);
        let kind = AttributeKind::from_name(attr.name.last()).expect("unknown attribute");
        bind(&attr, kind, FileId(0), &|t: &TypeRef| {
            NamedType::new("", t.path.last(), t.args.len() as u32)
        })
    }

    fn codes_of(diags: &[Diagnostic]) -> Vec<&'static str> {
        diags.iter().filter_map(|d| d.code.map(|c| c.0)).collect()
    }

    #[test]
    fn names_with_and_without_suffix() {
        assert_eq!(
            AttributeKind::from_name("SharpMeasuresScalarAttribute"),
            Some(AttributeKind::Scalar)
        );
        assert_eq!(
            AttributeKind::from_name("ResizedSharpMeasuresVector"),
            Some(AttributeKind::VectorGroupMember)
        );
        assert_eq!(AttributeKind::from_name("Serializable"), None);
    }

    #[test]
    fn overload_by_arity() {
        let b = bind_src(r#"[FixedUnitInstance("Metre", "Metres")] partial class U;"#);
        let args = b.args.unwrap();
        assert_eq!(args[param::PLURAL].value, ArgValue::Str("Metres".into()));
        assert!(b.diagnostics.is_empty());
    }

    #[test]
    fn overload_by_kind() {
        let b = bind_src(
            r#"[DerivableUnit("velocity", "{0} / {1}", typeof(L), typeof(T))] partial class U;"#,
        );
        let args = b.args.unwrap();
        assert_eq!(args[param::DERIVATION_ID].value, ArgValue::Str("velocity".into()));
        let ArgValue::Array(items) = &args[param::SIGNATURE].value else {
            panic!("expected gathered signature")
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn variadic_accepts_explicit_array() {
        let b = bind_src(r#"[IncludeUnits(new[] { "Metre", "Foot" })] partial class S;"#);
        let args = b.args.unwrap();
        assert!(
            matches!(&args[param::UNIT_INSTANCES].value, ArgValue::Array(items) if items.len() == 2)
        );
    }

    #[test]
    fn enum_members_and_ints() {
        let b = bind_src(
            "[VectorOperation(typeof(A), typeof(B), OperatorType = VectorOperatorType.Cross, Position = 1)] partial class V;",
        );
        let args = b.args.unwrap();
        assert_eq!(
            args[param::OPERATOR_TYPE].value,
            ArgValue::Enum {
                ty: Some("VectorOperatorType".into()),
                member: "Cross".into()
            }
        );
        assert_eq!(args[param::POSITION].value, ArgValue::Int(1));
    }

    #[test]
    fn unknown_property() {
        let b = bind_src("[SharpMeasuresScalar(typeof(U), Colour = 3)] partial class S;");
        assert_eq!(codes_of(&b.diagnostics), vec!["E0002"]);
        assert!(b.args.is_some());
    }

    #[test]
    fn too_many_and_missing() {
        let b = bind_src("[SharpMeasuresScalar(typeof(U), typeof(V))] partial class S;");
        assert_eq!(codes_of(&b.diagnostics), vec!["E0003"]);
        assert!(b.args.is_none());

        let b = bind_src("[SharpMeasuresScalar] partial class S;");
        assert_eq!(codes_of(&b.diagnostics), vec!["E0004"]);
        assert!(b.diagnostics[0].message.contains("Unit"));
    }

    #[test]
    fn type_mismatch_binds_empty_type() {
        let b = bind_src(r#"[SharpMeasuresScalar("Length")] partial class S;"#);
        assert_eq!(codes_of(&b.diagnostics), vec!["E0005"]);
        assert_eq!(
            b.args.unwrap()[param::UNIT].value,
            ArgValue::Type(NamedType::empty())
        );
    }

    #[test]
    fn other_mismatch_drops_argument() {
        let b = bind_src(r#"[SharpMeasuresVector(typeof(U), Dimension = "3")] partial class V;"#);
        assert_eq!(codes_of(&b.diagnostics), vec!["E0005"]);
        assert!(!b.args.unwrap().contains_key(param::DIMENSION));
    }

    #[test]
    fn duplicate_argument() {
        let b = bind_src(
            r#"[DerivedUnitInstance("A", "As", "id", new[] { "x" }, DerivationID = "id")] partial class U;"#,
        );
        assert_eq!(codes_of(&b.diagnostics), vec!["E0006"]);
    }

    #[test]
    fn parameter_named_argument() {
        let b = bind_src(r#"[UnitInstanceAlias("Metre", originalUnitInstance: "Meter")] partial class U;"#);
        let args = b.args.unwrap();
        assert_eq!(args[param::ORIGINAL].value, ArgValue::Str("Meter".into()));
        assert!(b.diagnostics.is_empty());
    }

    #[test]
    fn int_widens_to_number() {
        let b = bind_src(r#"[ScaledUnitInstance("Kilometre", "Metre", 1000)] partial class U;"#);
        assert_eq!(b.args.unwrap()[param::SCALE].value, ArgValue::Float(1000.0));
    }

    #[test]
    fn vector_constant_gathers_components() {
        let b = bind_src(r#"[VectorConstant("Unit", "Metre", 1, 0.5, 0)] partial class P3;"#);
        assert!(b.diagnostics.is_empty(), "{:?}", b.diagnostics);
        let args = b.args.unwrap();
        assert_eq!(
            args[param::VALUE].value,
            ArgValue::Array(vec![ArgValue::Float(1.0), ArgValue::Float(0.5), ArgValue::Float(0.0)])
        );
    }

    #[test]
    fn base_lists_accept_both_spellings() {
        assert_eq!(AttributeKind::from_name("IncludeUnitBases"), Some(AttributeKind::IncludeBases));
        assert_eq!(AttributeKind::from_name("ExcludeBasesAttribute"), Some(AttributeKind::ExcludeBases));
        assert!(!AttributeKind::IncludeBases.is_repeatable());
        assert!(AttributeKind::ConvertibleQuantity.is_repeatable());
    }

    #[test]
    fn specialized_quantity_names_its_original() {
        let b = bind_src(
            "[SpecializedSharpMeasuresScalar(typeof(Length), InheritUnits = false)] partial class Distance;",
        );
        let args = b.args.unwrap();
        assert_eq!(
            args[param::ORIGINAL_QUANTITY].value,
            ArgValue::Type(NamedType::new("", "Length", 0))
        );
        assert_eq!(args[param::INHERIT_UNITS].value, ArgValue::Bool(false));
    }

    #[test]
    fn schema_description_is_stable() {
        assert_eq!(describe(), describe());
        assert!(describe().contains("VectorOperation"));
    }
}
