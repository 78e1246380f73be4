// raw.rs — Raw definition builder
//
// Turns scanner candidates into typed raw definitions, one per attribute
// occurrence, grouped into one `RawType` bundle per declared type. Each raw
// definition carries a `…Locations` companion recording which arguments were
// written and where. Defaults for omitted optional arguments are applied
// here; nothing is validated.
//
// Preconditions: candidates come from `scan::scan` (slot kinds already fit).
// Postconditions: bundles appear in first-candidate order; definitions keep
//   candidate order within each bundle.
// Failure modes: none. Missing required arguments become `None`.
// Side effects: none.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::scan::schema::{param, ArgValue, AttributeKind, BoundArgs};
use crate::scan::Candidate;
use crate::types::{Location, NamedType};

// ── Locations companions ─────────────────────────────────────────────────

/// Anything that knows the attribute it was declared by.
pub trait HasLocations {
    fn attribute_location(&self) -> Location;
}

macro_rules! locations {
    ($(#[$meta:meta])* $name:ident { $($field:ident: $param:expr => $setter:ident),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub struct $name {
            pub attribute: Location,
            $(pub $field: Option<Location>,)*
        }

        impl $name {
            fn collect(args: &BoundArgs, attribute: Location) -> Self {
                Self {
                    attribute,
                    $($field: args.get($param).map(|a| a.location),)*
                }
            }

            $(
                pub fn $setter(&self) -> bool {
                    self.$field.is_some()
                }
            )*
        }
    };
}

locations! {
    UnitLocations {
        quantity: param::QUANTITY => explicitly_set_quantity,
        bias_term: param::BIAS_TERM => explicitly_set_bias_term,
    }
}

locations! {
    UnitInstanceLocations {
        name: param::NAME => explicitly_set_name,
        plural: param::PLURAL => explicitly_set_plural,
        original: param::ORIGINAL => explicitly_set_original,
        derivation_id: param::DERIVATION_ID => explicitly_set_derivation_id,
        units: param::UNITS => explicitly_set_units,
        prefix: param::PREFIX => explicitly_set_prefix,
        scale: param::SCALE => explicitly_set_scale,
        bias: param::BIAS => explicitly_set_bias,
    }
}

locations! {
    DerivableUnitLocations {
        derivation_id: param::DERIVATION_ID => explicitly_set_derivation_id,
        expression: param::EXPRESSION => explicitly_set_expression,
        signature: param::SIGNATURE => explicitly_set_signature,
        permutations: param::PERMUTATIONS => explicitly_set_permutations,
    }
}

locations! {
    /// Shared by scalars, vectors, and vector groups and their specialized
    /// forms; kinds that lack a field never set it.
    QuantityLocations {
        original_quantity: param::ORIGINAL_QUANTITY => explicitly_set_original_quantity,
        unit: param::UNIT => explicitly_set_unit,
        vector: param::VECTOR => explicitly_set_vector,
        scalar: param::SCALAR => explicitly_set_scalar,
        dimension: param::DIMENSION => explicitly_set_dimension,
        use_unit_bias: param::USE_UNIT_BIAS => explicitly_set_use_unit_bias,
        implement_sum: param::IMPLEMENT_SUM => explicitly_set_implement_sum,
        implement_difference: param::IMPLEMENT_DIFFERENCE => explicitly_set_implement_difference,
        difference: param::DIFFERENCE => explicitly_set_difference,
        default_unit_instance_name: param::DEFAULT_UNIT_INSTANCE_NAME => explicitly_set_default_unit_instance_name,
        default_unit_instance_symbol: param::DEFAULT_UNIT_INSTANCE_SYMBOL => explicitly_set_default_unit_instance_symbol,
        reciprocal: param::RECIPROCAL => explicitly_set_reciprocal,
        square: param::SQUARE => explicitly_set_square,
        cube: param::CUBE => explicitly_set_cube,
        square_root: param::SQUARE_ROOT => explicitly_set_square_root,
        cube_root: param::CUBE_ROOT => explicitly_set_cube_root,
    }
}

locations! {
    VectorGroupMemberLocations {
        group: param::VECTOR_GROUP => explicitly_set_group,
        dimension: param::DIMENSION => explicitly_set_dimension,
    }
}

locations! {
    VectorOperationLocations {
        result: param::RESULT => explicitly_set_result,
        other: param::OTHER => explicitly_set_other,
        operator_type: param::OPERATOR_TYPE => explicitly_set_operator_type,
        position: param::POSITION => explicitly_set_position,
        name: param::NAME => explicitly_set_name,
        mirrored_name: param::MIRRORED_NAME => explicitly_set_mirrored_name,
        mirror: param::MIRROR => explicitly_set_mirror,
    }
}

locations! {
    UnitListLocations {
        items: param::UNIT_INSTANCES => explicitly_set_items,
    }
}

locations! {
    ConstantLocations {
        name: param::NAME => explicitly_set_name,
        unit_instance_name: param::UNIT_INSTANCE_NAME => explicitly_set_unit_instance_name,
        value: param::VALUE => explicitly_set_value,
        generate_multiples: param::GENERATE_MULTIPLES => explicitly_set_generate_multiples,
        multiples: param::MULTIPLES => explicitly_set_multiples,
    }
}

locations! {
    ConvertibleQuantityLocations {
        quantities: param::QUANTITIES => explicitly_set_quantities,
        direction: param::CONVERSION_DIRECTION => explicitly_set_direction,
        cast_operator_behaviour: param::CAST_OPERATOR_BEHAVIOUR => explicitly_set_cast_operator_behaviour,
    }
}

// ── Argument shapes ──────────────────────────────────────────────────────

/// An enum-typed argument as written: a member name, or a raw integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum EnumArg {
    Member(String),
    Int(i64),
}

/// Prefix of a prefixed unit instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum PrefixArg {
    Metric(String),
    Binary(String),
    /// Member written without its enum type.
    Unqualified(String),
    Int(i64),
}

// ── Raw definitions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawUnit {
    pub quantity: Option<NamedType>,
    pub bias_term: bool,
    pub locations: UnitLocations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum UnitInstanceKind {
    Fixed,
    Alias,
    Derived,
    Prefixed,
    Scaled,
    Biased,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RawUnitInstanceKind {
    Fixed,
    Alias {
        original: Option<String>,
    },
    Derived {
        derivation_id: Option<String>,
        units: Option<Vec<Option<String>>>,
    },
    Prefixed {
        original: Option<String>,
        prefix: Option<PrefixArg>,
    },
    Scaled {
        original: Option<String>,
        scale: Option<f64>,
    },
    Biased {
        original: Option<String>,
        bias: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawUnitInstance {
    pub name: Option<String>,
    pub plural: Option<String>,
    pub definition: RawUnitInstanceKind,
    pub locations: UnitInstanceLocations,
}

impl RawUnitInstance {
    pub fn kind(&self) -> UnitInstanceKind {
        match self.definition {
            RawUnitInstanceKind::Fixed => UnitInstanceKind::Fixed,
            RawUnitInstanceKind::Alias { .. } => UnitInstanceKind::Alias,
            RawUnitInstanceKind::Derived { .. } => UnitInstanceKind::Derived,
            RawUnitInstanceKind::Prefixed { .. } => UnitInstanceKind::Prefixed,
            RawUnitInstanceKind::Scaled { .. } => UnitInstanceKind::Scaled,
            RawUnitInstanceKind::Biased { .. } => UnitInstanceKind::Biased,
        }
    }

    /// The instance this one modifies, for alias/prefixed/scaled/biased.
    pub fn original(&self) -> Option<Option<&str>> {
        match &self.definition {
            RawUnitInstanceKind::Alias { original }
            | RawUnitInstanceKind::Prefixed { original, .. }
            | RawUnitInstanceKind::Scaled { original, .. }
            | RawUnitInstanceKind::Biased { original, .. } => Some(original.as_deref()),
            RawUnitInstanceKind::Fixed | RawUnitInstanceKind::Derived { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawDerivableUnit {
    pub derivation_id: Option<String>,
    pub expression: Option<String>,
    pub signature: Option<Vec<Option<NamedType>>>,
    pub permutations: bool,
    pub locations: DerivableUnitLocations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawScalar {
    pub unit: Option<NamedType>,
    pub vector: Option<NamedType>,
    pub use_unit_bias: bool,
    pub implement_sum: bool,
    pub implement_difference: bool,
    pub difference: Option<NamedType>,
    pub default_unit_instance_name: Option<String>,
    pub default_unit_instance_symbol: Option<String>,
    pub reciprocal: Option<NamedType>,
    pub square: Option<NamedType>,
    pub cube: Option<NamedType>,
    pub square_root: Option<NamedType>,
    pub cube_root: Option<NamedType>,
    pub locations: QuantityLocations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawVector {
    pub unit: Option<NamedType>,
    pub dimension: Option<i64>,
    pub scalar: Option<NamedType>,
    pub implement_sum: bool,
    pub implement_difference: bool,
    pub difference: Option<NamedType>,
    pub default_unit_instance_name: Option<String>,
    pub default_unit_instance_symbol: Option<String>,
    pub locations: QuantityLocations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawVectorGroup {
    pub unit: Option<NamedType>,
    pub scalar: Option<NamedType>,
    pub implement_sum: bool,
    pub implement_difference: bool,
    pub difference: Option<NamedType>,
    pub default_unit_instance_name: Option<String>,
    pub default_unit_instance_symbol: Option<String>,
    pub locations: QuantityLocations,
}

/// Which inherited collections a specialized quantity takes over from its
/// original. Every flag defaults to `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Inheritance {
    pub derivations: bool,
    pub constants: bool,
    pub conversions: bool,
    /// Scalars only.
    pub bases: bool,
    pub units: bool,
}

impl Inheritance {
    fn collect(args: &BoundArgs) -> Self {
        Self {
            derivations: flag(args, param::INHERIT_DERIVATIONS, true),
            constants: flag(args, param::INHERIT_CONSTANTS, true),
            conversions: flag(args, param::INHERIT_CONVERSIONS, true),
            bases: flag(args, param::INHERIT_BASES, true),
            units: flag(args, param::INHERIT_UNITS, true),
        }
    }
}

/// Unwritten optional fields stay `None` so they can be inherited.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawSpecializedScalar {
    pub original: Option<NamedType>,
    pub inheritance: Inheritance,
    pub vector: Option<NamedType>,
    pub implement_sum: Option<bool>,
    pub implement_difference: Option<bool>,
    pub difference: Option<NamedType>,
    pub default_unit_instance_name: Option<String>,
    pub default_unit_instance_symbol: Option<String>,
    pub reciprocal: Option<NamedType>,
    pub square: Option<NamedType>,
    pub cube: Option<NamedType>,
    pub square_root: Option<NamedType>,
    pub cube_root: Option<NamedType>,
    pub locations: QuantityLocations,
}

/// A specialized vector or vector group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawSpecializedVector {
    pub original: Option<NamedType>,
    pub inheritance: Inheritance,
    pub scalar: Option<NamedType>,
    pub implement_sum: Option<bool>,
    pub implement_difference: Option<bool>,
    pub difference: Option<NamedType>,
    pub default_unit_instance_name: Option<String>,
    pub default_unit_instance_symbol: Option<String>,
    pub locations: QuantityLocations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RawConstantValue {
    Scalar(Option<f64>),
    Vector(Option<Vec<f64>>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawConstant {
    pub name: Option<String>,
    pub unit_instance_name: Option<String>,
    pub value: RawConstantValue,
    pub generate_multiples: bool,
    pub multiples: Option<String>,
    pub locations: ConstantLocations,
}

impl RawConstant {
    pub fn is_scalar(&self) -> bool {
        matches!(self.value, RawConstantValue::Scalar(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawConvertibleQuantity {
    pub quantities: Option<Vec<Option<NamedType>>>,
    pub direction: EnumArg,
    pub cast_operator_behaviour: EnumArg,
    pub locations: ConvertibleQuantityLocations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawVectorGroupMember {
    pub group: Option<NamedType>,
    pub dimension: Option<i64>,
    pub locations: VectorGroupMemberLocations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawVectorOperation {
    pub result: Option<NamedType>,
    pub other: Option<NamedType>,
    pub operator_type: EnumArg,
    pub position: EnumArg,
    pub name: Option<String>,
    pub mirrored_name: Option<String>,
    pub mirror: bool,
    pub locations: VectorOperationLocations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitListKind {
    Include,
    Exclude,
    IncludeBases,
    ExcludeBases,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawUnitList {
    pub kind: UnitListKind,
    pub items: Option<Vec<Option<String>>>,
    pub locations: UnitListLocations,
}

macro_rules! has_locations {
    ($($ty:ty),* $(,)?) => {
        $(impl HasLocations for $ty {
            fn attribute_location(&self) -> Location {
                self.locations.attribute
            }
        })*
    };
}

has_locations!(
    RawUnit,
    RawUnitInstance,
    RawDerivableUnit,
    RawScalar,
    RawVector,
    RawVectorGroup,
    RawVectorGroupMember,
    RawVectorOperation,
    RawUnitList,
    RawSpecializedScalar,
    RawSpecializedVector,
    RawConstant,
    RawConvertibleQuantity,
);

// ── Bundles ──────────────────────────────────────────────────────────────

/// Every raw definition attached to one declared type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawType {
    pub ty: NamedType,
    pub location: Location,
    pub units: Vec<RawUnit>,
    pub instances: Vec<RawUnitInstance>,
    pub derivations: Vec<RawDerivableUnit>,
    pub scalars: Vec<RawScalar>,
    pub vectors: Vec<RawVector>,
    pub groups: Vec<RawVectorGroup>,
    pub members: Vec<RawVectorGroupMember>,
    pub specialized_scalars: Vec<RawSpecializedScalar>,
    pub specialized_vectors: Vec<RawSpecializedVector>,
    pub specialized_groups: Vec<RawSpecializedVector>,
    pub inclusions: Vec<RawUnitList>,
    pub exclusions: Vec<RawUnitList>,
    pub base_inclusions: Vec<RawUnitList>,
    pub base_exclusions: Vec<RawUnitList>,
    pub constants: Vec<RawConstant>,
    pub conversions: Vec<RawConvertibleQuantity>,
    pub operations: Vec<RawVectorOperation>,
}

impl RawType {
    fn new(ty: NamedType, location: Location) -> Self {
        Self {
            ty,
            location,
            units: Vec::new(),
            instances: Vec::new(),
            derivations: Vec::new(),
            scalars: Vec::new(),
            vectors: Vec::new(),
            groups: Vec::new(),
            members: Vec::new(),
            specialized_scalars: Vec::new(),
            specialized_vectors: Vec::new(),
            specialized_groups: Vec::new(),
            inclusions: Vec::new(),
            exclusions: Vec::new(),
            base_inclusions: Vec::new(),
            base_exclusions: Vec::new(),
            constants: Vec::new(),
            conversions: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Number of raw definitions of every kind.
    pub fn definition_count(&self) -> usize {
        self.units.len()
            + self.instances.len()
            + self.derivations.len()
            + self.scalars.len()
            + self.vectors.len()
            + self.groups.len()
            + self.members.len()
            + self.specialized_scalars.len()
            + self.specialized_vectors.len()
            + self.specialized_groups.len()
            + self.inclusions.len()
            + self.exclusions.len()
            + self.base_inclusions.len()
            + self.base_exclusions.len()
            + self.constants.len()
            + self.conversions.len()
            + self.operations.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawPopulation {
    pub types: Vec<RawType>,
}

// ── Builder ──────────────────────────────────────────────────────────────

pub fn build(candidates: &[Candidate]) -> RawPopulation {
    let mut index: BTreeMap<NamedType, usize> = BTreeMap::new();
    let mut types: Vec<RawType> = Vec::new();

    for candidate in candidates {
        let slot = *index.entry(candidate.ty.clone()).or_insert_with(|| {
            types.push(RawType::new(candidate.ty.clone(), candidate.type_location));
            types.len() - 1
        });
        add(&mut types[slot], candidate);
    }

    RawPopulation { types }
}

fn add(bundle: &mut RawType, candidate: &Candidate) {
    let args = &candidate.args;
    let at = candidate.attribute_location;
    match candidate.kind {
        AttributeKind::Unit => bundle.units.push(RawUnit {
            quantity: type_arg(args, param::QUANTITY),
            bias_term: flag(args, param::BIAS_TERM, false),
            locations: UnitLocations::collect(args, at),
        }),
        AttributeKind::FixedUnitInstance
        | AttributeKind::UnitInstanceAlias
        | AttributeKind::DerivedUnitInstance
        | AttributeKind::PrefixedUnitInstance
        | AttributeKind::ScaledUnitInstance
        | AttributeKind::BiasedUnitInstance => {
            bundle.instances.push(unit_instance(candidate.kind, args, at))
        }
        AttributeKind::DerivableUnit => bundle.derivations.push(RawDerivableUnit {
            derivation_id: string(args, param::DERIVATION_ID),
            expression: string(args, param::EXPRESSION),
            signature: types(args, param::SIGNATURE),
            permutations: flag(args, param::PERMUTATIONS, false),
            locations: DerivableUnitLocations::collect(args, at),
        }),
        AttributeKind::Scalar => bundle.scalars.push(RawScalar {
            unit: type_arg(args, param::UNIT),
            vector: type_arg(args, param::VECTOR),
            use_unit_bias: flag(args, param::USE_UNIT_BIAS, false),
            implement_sum: flag(args, param::IMPLEMENT_SUM, true),
            implement_difference: flag(args, param::IMPLEMENT_DIFFERENCE, true),
            difference: type_arg(args, param::DIFFERENCE),
            default_unit_instance_name: string(args, param::DEFAULT_UNIT_INSTANCE_NAME),
            default_unit_instance_symbol: string(args, param::DEFAULT_UNIT_INSTANCE_SYMBOL),
            reciprocal: type_arg(args, param::RECIPROCAL),
            square: type_arg(args, param::SQUARE),
            cube: type_arg(args, param::CUBE),
            square_root: type_arg(args, param::SQUARE_ROOT),
            cube_root: type_arg(args, param::CUBE_ROOT),
            locations: QuantityLocations::collect(args, at),
        }),
        AttributeKind::Vector => bundle.vectors.push(RawVector {
            unit: type_arg(args, param::UNIT),
            dimension: int(args, param::DIMENSION),
            scalar: type_arg(args, param::SCALAR),
            implement_sum: flag(args, param::IMPLEMENT_SUM, true),
            implement_difference: flag(args, param::IMPLEMENT_DIFFERENCE, true),
            difference: type_arg(args, param::DIFFERENCE),
            default_unit_instance_name: string(args, param::DEFAULT_UNIT_INSTANCE_NAME),
            default_unit_instance_symbol: string(args, param::DEFAULT_UNIT_INSTANCE_SYMBOL),
            locations: QuantityLocations::collect(args, at),
        }),
        AttributeKind::VectorGroup => bundle.groups.push(RawVectorGroup {
            unit: type_arg(args, param::UNIT),
            scalar: type_arg(args, param::SCALAR),
            implement_sum: flag(args, param::IMPLEMENT_SUM, true),
            implement_difference: flag(args, param::IMPLEMENT_DIFFERENCE, true),
            difference: type_arg(args, param::DIFFERENCE),
            default_unit_instance_name: string(args, param::DEFAULT_UNIT_INSTANCE_NAME),
            default_unit_instance_symbol: string(args, param::DEFAULT_UNIT_INSTANCE_SYMBOL),
            locations: QuantityLocations::collect(args, at),
        }),
        AttributeKind::VectorGroupMember => bundle.members.push(RawVectorGroupMember {
            group: type_arg(args, param::VECTOR_GROUP),
            dimension: int(args, param::DIMENSION),
            locations: VectorGroupMemberLocations::collect(args, at),
        }),
        AttributeKind::VectorOperation => bundle.operations.push(RawVectorOperation {
            result: type_arg(args, param::RESULT),
            other: type_arg(args, param::OTHER),
            operator_type: enum_arg(args, param::OPERATOR_TYPE)
                .unwrap_or_else(|| EnumArg::Member("Dot".into())),
            position: enum_arg(args, param::POSITION)
                .unwrap_or_else(|| EnumArg::Member("Left".into())),
            name: string(args, param::NAME),
            mirrored_name: string(args, param::MIRRORED_NAME),
            mirror: flag(args, param::MIRROR, true),
            locations: VectorOperationLocations::collect(args, at),
        }),
        AttributeKind::IncludeUnits => bundle.inclusions.push(unit_list(UnitListKind::Include, args, at)),
        AttributeKind::ExcludeUnits => bundle.exclusions.push(unit_list(UnitListKind::Exclude, args, at)),
        AttributeKind::IncludeBases => bundle
            .base_inclusions
            .push(unit_list(UnitListKind::IncludeBases, args, at)),
        AttributeKind::ExcludeBases => bundle
            .base_exclusions
            .push(unit_list(UnitListKind::ExcludeBases, args, at)),
        AttributeKind::SpecializedScalar => bundle.specialized_scalars.push(RawSpecializedScalar {
            original: type_arg(args, param::ORIGINAL_QUANTITY),
            inheritance: Inheritance::collect(args),
            vector: type_arg(args, param::VECTOR),
            implement_sum: optional_flag(args, param::IMPLEMENT_SUM),
            implement_difference: optional_flag(args, param::IMPLEMENT_DIFFERENCE),
            difference: type_arg(args, param::DIFFERENCE),
            default_unit_instance_name: string(args, param::DEFAULT_UNIT_INSTANCE_NAME),
            default_unit_instance_symbol: string(args, param::DEFAULT_UNIT_INSTANCE_SYMBOL),
            reciprocal: type_arg(args, param::RECIPROCAL),
            square: type_arg(args, param::SQUARE),
            cube: type_arg(args, param::CUBE),
            square_root: type_arg(args, param::SQUARE_ROOT),
            cube_root: type_arg(args, param::CUBE_ROOT),
            locations: QuantityLocations::collect(args, at),
        }),
        AttributeKind::SpecializedVector => bundle.specialized_vectors.push(specialized_vector(args, at)),
        AttributeKind::SpecializedVectorGroup => bundle.specialized_groups.push(specialized_vector(args, at)),
        AttributeKind::ScalarConstant => bundle
            .constants
            .push(constant(RawConstantValue::Scalar(number(args, param::VALUE)), args, at)),
        AttributeKind::VectorConstant => bundle
            .constants
            .push(constant(RawConstantValue::Vector(numbers(args, param::VALUE)), args, at)),
        AttributeKind::ConvertibleQuantity => bundle.conversions.push(RawConvertibleQuantity {
            quantities: types(args, param::QUANTITIES),
            direction: enum_arg(args, param::CONVERSION_DIRECTION)
                .unwrap_or_else(|| EnumArg::Member("Onedirectional".into())),
            cast_operator_behaviour: enum_arg(args, param::CAST_OPERATOR_BEHAVIOUR)
                .unwrap_or_else(|| EnumArg::Member("Explicit".into())),
            locations: ConvertibleQuantityLocations::collect(args, at),
        }),
    }
}

fn specialized_vector(args: &BoundArgs, at: Location) -> RawSpecializedVector {
    RawSpecializedVector {
        original: type_arg(args, param::ORIGINAL_QUANTITY),
        inheritance: Inheritance {
            bases: false,
            ..Inheritance::collect(args)
        },
        scalar: type_arg(args, param::SCALAR),
        implement_sum: optional_flag(args, param::IMPLEMENT_SUM),
        implement_difference: optional_flag(args, param::IMPLEMENT_DIFFERENCE),
        difference: type_arg(args, param::DIFFERENCE),
        default_unit_instance_name: string(args, param::DEFAULT_UNIT_INSTANCE_NAME),
        default_unit_instance_symbol: string(args, param::DEFAULT_UNIT_INSTANCE_SYMBOL),
        locations: QuantityLocations::collect(args, at),
    }
}

fn constant(value: RawConstantValue, args: &BoundArgs, at: Location) -> RawConstant {
    RawConstant {
        name: string(args, param::NAME),
        unit_instance_name: string(args, param::UNIT_INSTANCE_NAME),
        value,
        generate_multiples: flag(args, param::GENERATE_MULTIPLES, true),
        multiples: string(args, param::MULTIPLES),
        locations: ConstantLocations::collect(args, at),
    }
}

fn unit_instance(kind: AttributeKind, args: &BoundArgs, at: Location) -> RawUnitInstance {
    let original = || string(args, param::ORIGINAL);
    let definition = match kind {
        AttributeKind::UnitInstanceAlias => RawUnitInstanceKind::Alias {
            original: original(),
        },
        AttributeKind::DerivedUnitInstance => RawUnitInstanceKind::Derived {
            derivation_id: string(args, param::DERIVATION_ID),
            units: strings(args, param::UNITS),
        },
        AttributeKind::PrefixedUnitInstance => RawUnitInstanceKind::Prefixed {
            original: original(),
            prefix: prefix_arg(args, param::PREFIX),
        },
        AttributeKind::ScaledUnitInstance => RawUnitInstanceKind::Scaled {
            original: original(),
            scale: number(args, param::SCALE),
        },
        AttributeKind::BiasedUnitInstance => RawUnitInstanceKind::Biased {
            original: original(),
            bias: number(args, param::BIAS),
        },
        _ => RawUnitInstanceKind::Fixed,
    };
    RawUnitInstance {
        name: string(args, param::NAME),
        plural: string(args, param::PLURAL),
        definition,
        locations: UnitInstanceLocations::collect(args, at),
    }
}

fn unit_list(kind: UnitListKind, args: &BoundArgs, at: Location) -> RawUnitList {
    RawUnitList {
        kind,
        items: strings(args, param::UNIT_INSTANCES),
        locations: UnitListLocations::collect(args, at),
    }
}

// ── Argument conversion ──

fn value<'a>(args: &'a BoundArgs, name: &str) -> Option<&'a ArgValue> {
    args.get(name).map(|a| &a.value)
}

fn string(args: &BoundArgs, name: &str) -> Option<String> {
    match value(args, name)? {
        ArgValue::Str(s) => Some(s.clone()),
        _ => None,
    }
}

fn type_arg(args: &BoundArgs, name: &str) -> Option<NamedType> {
    match value(args, name)? {
        ArgValue::Type(t) => Some(t.clone()),
        _ => None,
    }
}

fn flag(args: &BoundArgs, name: &str, default: bool) -> bool {
    match value(args, name) {
        Some(ArgValue::Bool(b)) => *b,
        _ => default,
    }
}

fn optional_flag(args: &BoundArgs, name: &str) -> Option<bool> {
    match value(args, name)? {
        ArgValue::Bool(b) => Some(*b),
        _ => None,
    }
}

fn int(args: &BoundArgs, name: &str) -> Option<i64> {
    match value(args, name)? {
        ArgValue::Int(v) => Some(*v),
        _ => None,
    }
}

fn number(args: &BoundArgs, name: &str) -> Option<f64> {
    match value(args, name)? {
        ArgValue::Float(v) => Some(*v),
        ArgValue::Int(v) => Some(*v as f64),
        _ => None,
    }
}

fn enum_arg(args: &BoundArgs, name: &str) -> Option<EnumArg> {
    match value(args, name)? {
        ArgValue::Enum { member, .. } => Some(EnumArg::Member(member.clone())),
        ArgValue::Int(v) => Some(EnumArg::Int(*v)),
        _ => None,
    }
}

fn prefix_arg(args: &BoundArgs, name: &str) -> Option<PrefixArg> {
    match value(args, name)? {
        ArgValue::Enum { ty, member } => Some(match ty.as_deref() {
            Some("MetricPrefixName") => PrefixArg::Metric(member.clone()),
            Some("BinaryPrefixName") => PrefixArg::Binary(member.clone()),
            _ => PrefixArg::Unqualified(member.clone()),
        }),
        ArgValue::Int(v) => Some(PrefixArg::Int(*v)),
        _ => None,
    }
}

fn strings(args: &BoundArgs, name: &str) -> Option<Vec<Option<String>>> {
    match value(args, name)? {
        ArgValue::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    ArgValue::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}

/// A number array; any non-numeric element spoils the whole array.
fn numbers(args: &BoundArgs, name: &str) -> Option<Vec<f64>> {
    match value(args, name)? {
        ArgValue::Array(items) => items
            .iter()
            .map(|item| match item {
                ArgValue::Float(v) => Some(*v),
                ArgValue::Int(v) => Some(*v as f64),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn types(args: &BoundArgs, name: &str) -> Option<Vec<Option<NamedType>>> {
    match value(args, name)? {
        ArgValue::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    ArgValue::Type(t) => Some(t.clone()),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
