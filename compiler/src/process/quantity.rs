// quantity.rs — Scalar, vector, vector group and group member processing
//
// Preconditions: none beyond raw bundles.
// Postconditions: `unit`/`group`/`original` are set and non-empty; vector
//   dimensions are at least 2; a disabled difference carries no difference
//   type; a default unit instance is either complete or absent. Unwritten
//   fields of specialized forms stay unset.
// Failure modes: invalid definitions are dropped with a diagnostic; malformed
//   optional fields are dropped with a warning.
// Side effects: none.

use serde::Serialize;

use super::{at, Processer, TypeContext};
use crate::diag::{codes, Diagnostic};
use crate::raw::{
    HasLocations, Inheritance, QuantityLocations, RawScalar, RawSpecializedScalar, RawSpecializedVector,
    RawVector, RawVectorGroup, RawVectorGroupMember, VectorGroupMemberLocations,
};
use crate::types::{infer_dimension, Location, NamedType};
use crate::validity::Outcome;

// ── Processed forms ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultUnitInstance {
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PowerQuantities {
    pub reciprocal: Option<NamedType>,
    pub square: Option<NamedType>,
    pub cube: Option<NamedType>,
    pub square_root: Option<NamedType>,
    pub cube_root: Option<NamedType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedScalar {
    pub unit: NamedType,
    pub vector: Option<NamedType>,
    pub use_unit_bias: bool,
    pub implement_sum: bool,
    pub implement_difference: bool,
    pub difference: Option<NamedType>,
    pub default_unit_instance: Option<DefaultUnitInstance>,
    pub powers: PowerQuantities,
    pub locations: QuantityLocations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedVector {
    pub unit: NamedType,
    pub dimension: u32,
    pub scalar: Option<NamedType>,
    pub implement_sum: bool,
    pub implement_difference: bool,
    pub difference: Option<NamedType>,
    pub default_unit_instance: Option<DefaultUnitInstance>,
    pub locations: QuantityLocations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedVectorGroup {
    pub unit: NamedType,
    pub scalar: Option<NamedType>,
    pub implement_sum: bool,
    pub implement_difference: bool,
    pub difference: Option<NamedType>,
    pub default_unit_instance: Option<DefaultUnitInstance>,
    pub locations: QuantityLocations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedVectorGroupMember {
    /// As written; population resolves resized vectors to their group.
    pub group: NamedType,
    pub dimension: u32,
    pub locations: VectorGroupMemberLocations,
}

/// A specialized scalar. `None` fields are inherited from the original.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedSpecializedScalar {
    pub original: NamedType,
    pub inheritance: Inheritance,
    pub vector: Option<NamedType>,
    pub implement_sum: Option<bool>,
    pub implement_difference: Option<bool>,
    pub difference: Option<NamedType>,
    pub default_unit_instance: Option<DefaultUnitInstance>,
    pub powers: PowerQuantities,
    pub locations: QuantityLocations,
}

/// A specialized vector or vector group. There is no dimension: a
/// specialized vector has the dimension of its root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedSpecializedVector {
    pub original: NamedType,
    pub inheritance: Inheritance,
    pub scalar: Option<NamedType>,
    pub implement_sum: Option<bool>,
    pub implement_difference: Option<bool>,
    pub difference: Option<NamedType>,
    pub default_unit_instance: Option<DefaultUnitInstance>,
    pub locations: QuantityLocations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarDefinition {
    Base(ProcessedScalar),
    Specialized(ProcessedSpecializedScalar),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VectorDefinition {
    Base(ProcessedVector),
    Specialized(ProcessedSpecializedVector),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VectorGroupDefinition {
    Base(ProcessedVectorGroup),
    Specialized(ProcessedSpecializedVector),
}

macro_rules! definition_accessors {
    ($($ty:ty),*) => {
        $(impl $ty {
            pub fn locations(&self) -> &QuantityLocations {
                match self {
                    Self::Base(d) => &d.locations,
                    Self::Specialized(d) => &d.locations,
                }
            }

            /// The quantity this one specializes; `None` for roots.
            pub fn original(&self) -> Option<&NamedType> {
                match self {
                    Self::Base(_) => None,
                    Self::Specialized(d) => Some(&d.original),
                }
            }

            pub fn inheritance(&self) -> Option<Inheritance> {
                match self {
                    Self::Base(_) => None,
                    Self::Specialized(d) => Some(d.inheritance),
                }
            }

            pub fn implement_sum(&self) -> Option<bool> {
                match self {
                    Self::Base(d) => Some(d.implement_sum),
                    Self::Specialized(d) => d.implement_sum,
                }
            }

            pub fn implement_difference(&self) -> Option<bool> {
                match self {
                    Self::Base(d) => Some(d.implement_difference),
                    Self::Specialized(d) => d.implement_difference,
                }
            }

            /// The difference as written.
            pub fn difference(&self) -> Option<&NamedType> {
                match self {
                    Self::Base(d) => d.difference.as_ref(),
                    Self::Specialized(d) => d.difference.as_ref(),
                }
            }

            pub fn default_unit_instance(&self) -> Option<&DefaultUnitInstance> {
                match self {
                    Self::Base(d) => d.default_unit_instance.as_ref(),
                    Self::Specialized(d) => d.default_unit_instance.as_ref(),
                }
            }
        }

        impl HasLocations for $ty {
            fn attribute_location(&self) -> Location {
                self.locations().attribute
            }
        })*
    };
}

definition_accessors!(ScalarDefinition, VectorDefinition, VectorGroupDefinition);

impl ScalarDefinition {
    pub fn vector(&self) -> Option<&NamedType> {
        match self {
            Self::Base(d) => d.vector.as_ref(),
            Self::Specialized(d) => d.vector.as_ref(),
        }
    }

    pub fn powers(&self) -> &PowerQuantities {
        match self {
            Self::Base(d) => &d.powers,
            Self::Specialized(d) => &d.powers,
        }
    }
}

impl VectorDefinition {
    pub fn scalar(&self) -> Option<&NamedType> {
        match self {
            Self::Base(d) => d.scalar.as_ref(),
            Self::Specialized(d) => d.scalar.as_ref(),
        }
    }
}

impl VectorGroupDefinition {
    pub fn scalar(&self) -> Option<&NamedType> {
        match self {
            Self::Base(d) => d.scalar.as_ref(),
            Self::Specialized(d) => d.scalar.as_ref(),
        }
    }
}

macro_rules! attribute_located {
    ($($ty:ty),*) => {
        $(impl HasLocations for $ty {
            fn attribute_location(&self) -> Location {
                self.locations.attribute
            }
        })*
    };
}

attribute_located!(
    ProcessedScalar,
    ProcessedVector,
    ProcessedVectorGroup,
    ProcessedVectorGroupMember,
    ProcessedSpecializedScalar,
    ProcessedSpecializedVector
);

// ── Diagnostics ──────────────────────────────────────────────────────────

pub trait QuantityProcessingDiagnostics {
    fn null_type(&self, ctx: &TypeContext, location: Location, field: &str) -> Option<Diagnostic>;
    fn difference_disabled(&self, ctx: &TypeContext, location: Location) -> Option<Diagnostic>;
    fn default_unit_instance_incomplete(&self, ctx: &TypeContext, location: Location) -> Option<Diagnostic>;
    fn invalid_default_unit_instance(&self, ctx: &TypeContext, location: Location) -> Option<Diagnostic>;
    fn missing_dimension(&self, ctx: &TypeContext, location: Location) -> Option<Diagnostic>;
    fn invalid_dimension(&self, ctx: &TypeContext, location: Location, dimension: i64) -> Option<Diagnostic>;
    fn name_and_dimension_conflict(&self, ctx: &TypeContext, location: Location, inferred: u32, explicit: i64) -> Option<Diagnostic>;
}

pub struct DefaultQuantityProcessingDiagnostics;

impl QuantityProcessingDiagnostics for DefaultQuantityProcessingDiagnostics {
    fn null_type(&self, ctx: &TypeContext, location: Location, field: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0111,
            location,
            format!("'{}' of '{}' must not be null", field, ctx.ty),
        ))
    }

    fn difference_disabled(&self, ctx: &TypeContext, location: Location) -> Option<Diagnostic> {
        Some(
            Diagnostic::warning(
                codes::W0301,
                location,
                format!("'{}' disables differences, so `Difference` is ignored", ctx.ty),
            )
            .with_hint("remove `Difference` or set `ImplementDifference = true`"),
        )
    }

    fn default_unit_instance_incomplete(&self, ctx: &TypeContext, location: Location) -> Option<Diagnostic> {
        Some(Diagnostic::warning(
            codes::W0302,
            location,
            format!(
                "'{}' sets only one of `DefaultUnitInstanceName` and `DefaultUnitInstanceSymbol`; both are ignored",
                ctx.ty
            ),
        ))
    }

    fn invalid_default_unit_instance(&self, ctx: &TypeContext, location: Location) -> Option<Diagnostic> {
        Some(Diagnostic::warning(
            codes::W0303,
            location,
            format!("default unit instance of '{}' needs a non-empty name and symbol", ctx.ty),
        ))
    }

    fn missing_dimension(&self, ctx: &TypeContext, location: Location) -> Option<Diagnostic> {
        Some(
            Diagnostic::error(
                codes::E0401,
                location,
                format!("the dimension of '{}' cannot be inferred", ctx.ty),
            )
            .with_hint("end the type name with its dimension or set `Dimension`"),
        )
    }

    fn invalid_dimension(&self, ctx: &TypeContext, location: Location, dimension: i64) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0400,
            location,
            format!("'{}' has dimension {}; vectors need at least 2", ctx.ty, dimension),
        ))
    }

    fn name_and_dimension_conflict(&self, ctx: &TypeContext, location: Location, inferred: u32, explicit: i64) -> Option<Diagnostic> {
        Some(Diagnostic::warning(
            codes::W0402,
            location,
            format!(
                "the name of '{}' suggests dimension {}, but `Dimension` is {}",
                ctx.ty, inferred, explicit
            ),
        ))
    }
}

// ── Shared checks ────────────────────────────────────────────────────────

/// A required type argument: must be written, non-null and non-empty.
fn required_type(
    strategy: &dyn QuantityProcessingDiagnostics,
    ctx: &TypeContext,
    value: &Option<NamedType>,
    location: Option<Location>,
    field: &str,
) -> Outcome<NamedType> {
    let Some(location) = location else {
        return Outcome::empty();
    };
    match value {
        None => Outcome::empty_with(strategy.null_type(ctx, location, field)),
        Some(ty) if ty.is_empty() => Outcome::empty(),
        Some(ty) => Outcome::result(ty.clone()),
    }
}

/// An optional type argument; null and the empty sentinel read as unset.
fn optional_type(value: &Option<NamedType>) -> Option<NamedType> {
    value.clone().filter(|t| !t.is_empty())
}

fn difference(
    strategy: &dyn QuantityProcessingDiagnostics,
    ctx: &TypeContext,
    implement_difference: bool,
    value: &Option<NamedType>,
    locations: &QuantityLocations,
) -> Outcome<Option<NamedType>> {
    match locations.difference {
        Some(location) if !implement_difference => {
            Outcome::result_with(None, strategy.difference_disabled(ctx, location).into_iter().collect())
        }
        _ => Outcome::result(optional_type(value)),
    }
}

fn default_unit_instance(
    strategy: &dyn QuantityProcessingDiagnostics,
    ctx: &TypeContext,
    name: &Option<String>,
    symbol: &Option<String>,
    locations: &QuantityLocations,
) -> Outcome<Option<DefaultUnitInstance>> {
    let name_location = locations.default_unit_instance_name;
    let symbol_location = locations.default_unit_instance_symbol;
    match (name_location, symbol_location) {
        (None, None) => Outcome::result(None),
        (Some(location), None) | (None, Some(location)) => Outcome::result_with(
            None,
            strategy
                .default_unit_instance_incomplete(ctx, location)
                .into_iter()
                .collect(),
        ),
        (Some(location), Some(_)) => match (name.as_deref(), symbol.as_deref()) {
            (Some(name), Some(symbol)) if !name.is_empty() && !symbol.is_empty() => {
                Outcome::result(Some(DefaultUnitInstance {
                    name: name.to_string(),
                    symbol: symbol.to_string(),
                }))
            }
            _ => Outcome::result_with(
                None,
                strategy
                    .invalid_default_unit_instance(ctx, location)
                    .into_iter()
                    .collect(),
            ),
        },
    }
}

/// Explicit dimension wins; a differing name suffix is only a warning.
fn dimension(
    strategy: &dyn QuantityProcessingDiagnostics,
    ctx: &TypeContext,
    explicit: Option<i64>,
    explicit_location: Option<Location>,
    attribute: Location,
) -> Outcome<u32> {
    let inferred = infer_dimension(&ctx.ty.name);
    let location = at(explicit_location, attribute);
    let mut diagnostics = Vec::new();
    let value = match (explicit, inferred) {
        (Some(explicit), Some(inferred)) => {
            if i64::from(inferred) != explicit {
                diagnostics.extend(strategy.name_and_dimension_conflict(ctx, location, inferred, explicit));
            }
            explicit
        }
        (Some(explicit), None) => explicit,
        (None, Some(inferred)) => i64::from(inferred),
        (None, None) => return Outcome::empty_with(strategy.missing_dimension(ctx, location)),
    };
    match u32::try_from(value) {
        Ok(dimension) if dimension >= 2 => Outcome::result_with(dimension, diagnostics),
        _ => {
            diagnostics.extend(strategy.invalid_dimension(ctx, location, value));
            Outcome::empty_with_all(diagnostics)
        }
    }
}

// ── Processers ───────────────────────────────────────────────────────────

macro_rules! quantity_processer {
    ($name:ident) => {
        pub struct $name<'a> {
            diagnostics: &'a dyn QuantityProcessingDiagnostics,
        }

        impl<'a> $name<'a> {
            pub fn new(diagnostics: &'a dyn QuantityProcessingDiagnostics) -> Self {
                Self { diagnostics }
            }
        }
    };
}

quantity_processer!(ScalarProcesser);
quantity_processer!(VectorProcesser);
quantity_processer!(VectorGroupProcesser);
quantity_processer!(VectorGroupMemberProcesser);
quantity_processer!(SpecializedScalarProcesser);
quantity_processer!(SpecializedVectorProcesser);

impl Processer<TypeContext, RawScalar, ProcessedScalar> for ScalarProcesser<'_> {
    fn process(&self, ctx: &TypeContext, raw: &RawScalar) -> Outcome<ProcessedScalar> {
        let l = &raw.locations;
        required_type(self.diagnostics, ctx, &raw.unit, l.unit, "Unit").and_then(|unit| {
            let mut diagnostics = Vec::new();
            let difference = difference(self.diagnostics, ctx, raw.implement_difference, &raw.difference, l)
                .drain_into(&mut diagnostics)
                .flatten();
            let default_unit_instance = default_unit_instance(
                self.diagnostics,
                ctx,
                &raw.default_unit_instance_name,
                &raw.default_unit_instance_symbol,
                l,
            )
            .drain_into(&mut diagnostics)
            .flatten();
            Outcome::result_with(
                ProcessedScalar {
                    unit,
                    vector: optional_type(&raw.vector),
                    use_unit_bias: raw.use_unit_bias,
                    implement_sum: raw.implement_sum,
                    implement_difference: raw.implement_difference,
                    difference,
                    default_unit_instance,
                    powers: PowerQuantities {
                        reciprocal: optional_type(&raw.reciprocal),
                        square: optional_type(&raw.square),
                        cube: optional_type(&raw.cube),
                        square_root: optional_type(&raw.square_root),
                        cube_root: optional_type(&raw.cube_root),
                    },
                    locations: raw.locations,
                },
                diagnostics,
            )
        })
    }
}

impl Processer<TypeContext, RawVector, ProcessedVector> for VectorProcesser<'_> {
    fn process(&self, ctx: &TypeContext, raw: &RawVector) -> Outcome<ProcessedVector> {
        let l = &raw.locations;
        required_type(self.diagnostics, ctx, &raw.unit, l.unit, "Unit").and_then(|unit| {
            dimension(self.diagnostics, ctx, raw.dimension, l.dimension, l.attribute).and_then(|dimension| {
                let mut diagnostics = Vec::new();
                let difference = difference(self.diagnostics, ctx, raw.implement_difference, &raw.difference, l)
                    .drain_into(&mut diagnostics)
                    .flatten();
                let default_unit_instance = default_unit_instance(
                    self.diagnostics,
                    ctx,
                    &raw.default_unit_instance_name,
                    &raw.default_unit_instance_symbol,
                    l,
                )
                .drain_into(&mut diagnostics)
                .flatten();
                Outcome::result_with(
                    ProcessedVector {
                        unit,
                        dimension,
                        scalar: optional_type(&raw.scalar),
                        implement_sum: raw.implement_sum,
                        implement_difference: raw.implement_difference,
                        difference,
                        default_unit_instance,
                        locations: raw.locations,
                    },
                    diagnostics,
                )
            })
        })
    }
}

impl Processer<TypeContext, RawVectorGroup, ProcessedVectorGroup> for VectorGroupProcesser<'_> {
    fn process(&self, ctx: &TypeContext, raw: &RawVectorGroup) -> Outcome<ProcessedVectorGroup> {
        let l = &raw.locations;
        required_type(self.diagnostics, ctx, &raw.unit, l.unit, "Unit").and_then(|unit| {
            let mut diagnostics = Vec::new();
            let difference = difference(self.diagnostics, ctx, raw.implement_difference, &raw.difference, l)
                .drain_into(&mut diagnostics)
                .flatten();
            let default_unit_instance = default_unit_instance(
                self.diagnostics,
                ctx,
                &raw.default_unit_instance_name,
                &raw.default_unit_instance_symbol,
                l,
            )
            .drain_into(&mut diagnostics)
            .flatten();
            Outcome::result_with(
                ProcessedVectorGroup {
                    unit,
                    scalar: optional_type(&raw.scalar),
                    implement_sum: raw.implement_sum,
                    implement_difference: raw.implement_difference,
                    difference,
                    default_unit_instance,
                    locations: raw.locations,
                },
                diagnostics,
            )
        })
    }
}

impl Processer<TypeContext, RawVectorGroupMember, ProcessedVectorGroupMember> for VectorGroupMemberProcesser<'_> {
    fn process(&self, ctx: &TypeContext, raw: &RawVectorGroupMember) -> Outcome<ProcessedVectorGroupMember> {
        let l = &raw.locations;
        required_type(self.diagnostics, ctx, &raw.group, l.group, "VectorGroup").and_then(|group| {
            dimension(self.diagnostics, ctx, raw.dimension, l.dimension, l.attribute).map(|dimension| {
                ProcessedVectorGroupMember {
                    group,
                    dimension,
                    locations: raw.locations,
                }
            })
        })
    }
}

impl Processer<TypeContext, RawSpecializedScalar, ProcessedSpecializedScalar> for SpecializedScalarProcesser<'_> {
    fn process(&self, ctx: &TypeContext, raw: &RawSpecializedScalar) -> Outcome<ProcessedSpecializedScalar> {
        let l = &raw.locations;
        required_type(self.diagnostics, ctx, &raw.original, l.original_quantity, "OriginalQuantity").and_then(
            |original| {
                let mut diagnostics = Vec::new();
                // Unset reads as enabled here; an inherited `false` clears the
                // difference during resolution.
                let implement_difference = raw.implement_difference.unwrap_or(true);
                let difference = difference(self.diagnostics, ctx, implement_difference, &raw.difference, l)
                    .drain_into(&mut diagnostics)
                    .flatten();
                let default_unit_instance = default_unit_instance(
                    self.diagnostics,
                    ctx,
                    &raw.default_unit_instance_name,
                    &raw.default_unit_instance_symbol,
                    l,
                )
                .drain_into(&mut diagnostics)
                .flatten();
                Outcome::result_with(
                    ProcessedSpecializedScalar {
                        original,
                        inheritance: raw.inheritance,
                        vector: optional_type(&raw.vector),
                        implement_sum: raw.implement_sum,
                        implement_difference: raw.implement_difference,
                        difference,
                        default_unit_instance,
                        powers: PowerQuantities {
                            reciprocal: optional_type(&raw.reciprocal),
                            square: optional_type(&raw.square),
                            cube: optional_type(&raw.cube),
                            square_root: optional_type(&raw.square_root),
                            cube_root: optional_type(&raw.cube_root),
                        },
                        locations: raw.locations,
                    },
                    diagnostics,
                )
            },
        )
    }
}

impl Processer<TypeContext, RawSpecializedVector, ProcessedSpecializedVector> for SpecializedVectorProcesser<'_> {
    fn process(&self, ctx: &TypeContext, raw: &RawSpecializedVector) -> Outcome<ProcessedSpecializedVector> {
        let l = &raw.locations;
        required_type(self.diagnostics, ctx, &raw.original, l.original_quantity, "OriginalQuantity").and_then(
            |original| {
                let mut diagnostics = Vec::new();
                let implement_difference = raw.implement_difference.unwrap_or(true);
                let difference = difference(self.diagnostics, ctx, implement_difference, &raw.difference, l)
                    .drain_into(&mut diagnostics)
                    .flatten();
                let default_unit_instance = default_unit_instance(
                    self.diagnostics,
                    ctx,
                    &raw.default_unit_instance_name,
                    &raw.default_unit_instance_symbol,
                    l,
                )
                .drain_into(&mut diagnostics)
                .flatten();
                Outcome::result_with(
                    ProcessedSpecializedVector {
                        original,
                        inheritance: raw.inheritance,
                        scalar: optional_type(&raw.scalar),
                        implement_sum: raw.implement_sum,
                        implement_difference: raw.implement_difference,
                        difference,
                        default_unit_instance,
                        locations: raw.locations,
                    },
                    diagnostics,
                )
            },
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
