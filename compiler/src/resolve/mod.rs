// resolve — Cross-referencing and relational validation
//
// Replaces every named-type reference with a `Handle` into a population and
// checks the invariants spanning several definitions: mutual exclusion of
// kinds, unit-instance chains, derivation signatures, vector dimensions,
// the dimensional rules of vector operations, and what specialized
// quantities inherit from the quantities they specialize.
//
// Preconditions: `Populations` from `population::build`.
// Postconditions: every handle points at a clean (non-duplicated) entry.
//   Output order follows population key order.
// Failure modes: a failed required reference drops the definition; a failed
//   optional reference only clears the field. Both are diagnostics.
// Side effects: none.

pub mod inherit;
pub mod operation;
pub mod scalar;
pub mod unit;
pub mod vector;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::diag::{codes, Diagnostic};
use crate::population::{DefinitionKind, Population, Populations};
use crate::process::quantity::DefaultUnitInstance;
use crate::process::unit_list::ProcessedUnitList;
use crate::process::{ScalarType, VectorGroupMemberType, VectorGroupType, VectorType};
use crate::types::{Location, NamedType};
use crate::validity::{Outcome, Validity};

use operation::{DefaultVectorOperationResolutionDiagnostics, VectorOperationResolutionDiagnostics};
use scalar::{ResolvedScalar, ScalarResolver};
use unit::{DefaultUnitResolutionDiagnostics, ResolvedUnit, UnitResolutionDiagnostics, UnitResolver};
use vector::{
    ResolvedVector, ResolvedVectorGroup, ResolvedVectorGroupMember, VectorGroupMemberResolver,
    VectorGroupResolver, VectorResolver,
};

// ── Handles ──────────────────────────────────────────────────────────────

/// A resolved reference: the referenced type plus its population entry.
/// Serializes as the type name.
pub struct Handle<T> {
    ty: NamedType,
    target: Arc<T>,
}

impl<T> Handle<T> {
    pub fn new(ty: NamedType, target: Arc<T>) -> Self {
        Self { ty, target }
    }

    pub fn ty(&self) -> &NamedType {
        &self.ty
    }

    pub fn get(&self) -> &T {
        &self.target
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            ty: self.ty.clone(),
            target: Arc::clone(&self.target),
        }
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.ty)
    }
}

impl<T> Serialize for Handle<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ty.serialize(serializer)
    }
}

/// A reference to any quantity kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QuantityRef {
    Scalar(Handle<ScalarType>),
    Vector(Handle<VectorType>),
    Group(Handle<VectorGroupType>),
    Member(Handle<VectorGroupMemberType>),
}

impl QuantityRef {
    pub fn ty(&self) -> &NamedType {
        match self {
            Self::Scalar(h) => h.ty(),
            Self::Vector(h) => h.ty(),
            Self::Group(h) => h.ty(),
            Self::Member(h) => h.ty(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    pub fn is_vector(&self) -> bool {
        !self.is_scalar()
    }

    /// Dimensions the quantity comes in; empty for scalars.
    pub fn dimensions(&self, populations: &Populations) -> BTreeSet<u32> {
        match self {
            Self::Scalar(_) => BTreeSet::new(),
            Self::Vector(h) => populations.vector_dimension(h.ty()).into_iter().collect(),
            Self::Member(h) => BTreeSet::from([h.get().definition.dimension]),
            Self::Group(h) => populations
                .group_members(h.ty())
                .map(|m| m.keys().copied().collect())
                .unwrap_or_default(),
        }
    }

    /// Look `ty` up as a scalar or any vector kind. `None` when it is
    /// none of them, is duplicated, or is claimed by a higher kind.
    pub fn lookup(populations: &Populations, ty: &NamedType) -> Option<QuantityRef> {
        match populations.kind_of(ty)? {
            DefinitionKind::Unit => None,
            DefinitionKind::Scalar => clean(populations, DefinitionKind::Scalar, &populations.scalars, ty)
                .map(QuantityRef::Scalar),
            DefinitionKind::Vector => clean(populations, DefinitionKind::Vector, &populations.vectors, ty)
                .map(QuantityRef::Vector),
            DefinitionKind::VectorGroup => clean(populations, DefinitionKind::VectorGroup, &populations.groups, ty)
                .map(QuantityRef::Group),
            DefinitionKind::VectorGroupMember => {
                clean(populations, DefinitionKind::VectorGroupMember, &populations.members, ty)
                    .map(QuantityRef::Member)
            }
        }
    }
}

/// The highest kind ranked above `kind` that `ty` is also declared as.
pub(crate) fn outranked(populations: &Populations, kind: DefinitionKind, ty: &NamedType) -> Option<DefinitionKind> {
    DefinitionKind::ALL
        .into_iter()
        .take_while(|&higher| higher != kind)
        .find(|&higher| populations.declares_as(higher, ty))
}

pub(crate) fn clean<T>(
    populations: &Populations,
    kind: DefinitionKind,
    population: &Population<T>,
    ty: &NamedType,
) -> Option<Handle<T>> {
    let target = population.get(ty)?;
    if outranked(populations, kind, ty).is_some() {
        return None;
    }
    Some(Handle::new(ty.clone(), Arc::clone(target)))
}

// ── Resolver seam ────────────────────────────────────────────────────────

pub trait Resolver<Ctx, In, Out> {
    fn resolve(&self, ctx: &Ctx, definition: &In) -> Outcome<Out>;
}

/// Instances of one unit that survived unit resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitInstanceNames {
    /// Declaration order.
    pub names: Vec<String>,
    /// Name → plural form.
    pub plurals: BTreeMap<String, String>,
}

impl UnitInstanceNames {
    pub fn of(unit: &ResolvedUnit) -> Self {
        Self {
            names: unit.instances.iter().map(|i| i.name.clone()).collect(),
            plurals: unit
                .instances
                .iter()
                .map(|i| (i.name.clone(), i.plural.clone()))
                .collect(),
        }
    }
}

/// Declaring type plus read-only access to everything resolved so far.
pub struct ResolutionContext<'a> {
    pub ty: NamedType,
    pub populations: &'a Populations,
    pub unit_instances: &'a BTreeMap<NamedType, UnitInstanceNames>,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(
        ty: NamedType,
        populations: &'a Populations,
        unit_instances: &'a BTreeMap<NamedType, UnitInstanceNames>,
    ) -> Self {
        Self {
            ty,
            populations,
            unit_instances,
        }
    }

    pub fn has_instance(&self, unit: &NamedType, name: &str) -> bool {
        self.unit_instances
            .get(unit)
            .is_some_and(|instances| instances.plurals.contains_key(name))
    }

    /// Every resolved instance name of `unit`, in declaration order.
    pub fn instance_names(&self, unit: &NamedType) -> Vec<String> {
        self.unit_instances
            .get(unit)
            .map(|instances| instances.names.clone())
            .unwrap_or_default()
    }

    pub fn plural(&self, unit: &NamedType, name: &str) -> Option<&str> {
        self.unit_instances
            .get(unit)
            .and_then(|instances| instances.plurals.get(name))
            .map(String::as_str)
    }
}

// ── Shared diagnostics ───────────────────────────────────────────────────

pub trait ResolutionDiagnostics {
    fn type_already(&self, ctx: &ResolutionContext, location: Location, kind: DefinitionKind) -> Option<Diagnostic>;
    fn type_not_unit(&self, ctx: &ResolutionContext, location: Location, ty: &NamedType) -> Option<Diagnostic>;
    fn type_not_scalar(&self, ctx: &ResolutionContext, location: Location, ty: &NamedType) -> Option<Diagnostic>;
    fn type_not_vector_group(&self, ctx: &ResolutionContext, location: Location, ty: &NamedType) -> Option<Diagnostic>;
    fn unrecognized_unit_instance(&self, ctx: &ResolutionContext, location: Location, unit: &NamedType, name: &str) -> Option<Diagnostic>;
    fn unit_lacks_bias_term(&self, ctx: &ResolutionContext, location: Location, unit: &NamedType) -> Option<Diagnostic>;
    fn dimension_mismatch(&self, ctx: &ResolutionContext, location: Location, ty: &NamedType, expected: u32, found: u32) -> Option<Diagnostic>;
    fn group_lacks_member(&self, ctx: &ResolutionContext, location: Location, group: &NamedType, dimension: u32) -> Option<Diagnostic>;
    fn type_not_vector(&self, ctx: &ResolutionContext, location: Location, ty: &NamedType) -> Option<Diagnostic>;
    fn duplicate_dimension(&self, ctx: &ResolutionContext, location: Location, group: &NamedType, dimension: u32, existing: &NamedType) -> Option<Diagnostic>;
    fn original_not_quantity(&self, ctx: &ResolutionContext, location: Location, original: &NamedType, kind: DefinitionKind) -> Option<Diagnostic>;
    fn root_not_resolved(&self, ctx: &ResolutionContext, location: Location) -> Option<Diagnostic>;
    fn name_suggests_dimension(&self, ctx: &ResolutionContext, location: Location, inferred: u32, dimension: u32) -> Option<Diagnostic>;
    fn constant_shares_name_with_unit(&self, ctx: &ResolutionContext, location: Location, name: &str) -> Option<Diagnostic>;
    fn constant_already_inherited(&self, ctx: &ResolutionContext, location: Location, name: &str) -> Option<Diagnostic>;
    fn constant_dimension(&self, ctx: &ResolutionContext, location: Location, name: &str, expected: u32, found: usize) -> Option<Diagnostic>;
}

pub struct DefaultResolutionDiagnostics;

impl ResolutionDiagnostics for DefaultResolutionDiagnostics {
    fn type_already(&self, ctx: &ResolutionContext, location: Location, kind: DefinitionKind) -> Option<Diagnostic> {
        let code = match kind {
            DefinitionKind::Unit => codes::E0501,
            DefinitionKind::Scalar => codes::E0502,
            DefinitionKind::Vector => codes::E0503,
            DefinitionKind::VectorGroup | DefinitionKind::VectorGroupMember => codes::E0504,
        };
        Some(Diagnostic::error(
            code,
            location,
            format!("'{}' is already defined as a {}", ctx.ty, kind.describe()),
        ))
    }

    fn type_not_unit(&self, _ctx: &ResolutionContext, location: Location, ty: &NamedType) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0510,
            location,
            format!("'{}' is not a unit", ty),
        ))
    }

    fn type_not_scalar(&self, _ctx: &ResolutionContext, location: Location, ty: &NamedType) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0511,
            location,
            format!("'{}' is not a scalar quantity", ty),
        ))
    }

    fn type_not_vector_group(&self, _ctx: &ResolutionContext, location: Location, ty: &NamedType) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0512,
            location,
            format!("'{}' is not a vector group", ty),
        ))
    }

    fn unrecognized_unit_instance(&self, _ctx: &ResolutionContext, location: Location, unit: &NamedType, name: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0201,
            location,
            format!("unit '{}' has no instance named '{}'", unit, name),
        ))
    }

    fn unit_lacks_bias_term(&self, _ctx: &ResolutionContext, location: Location, unit: &NamedType) -> Option<Diagnostic> {
        Some(
            Diagnostic::error(
                codes::E0203,
                location,
                format!("unit '{}' does not include a bias term", unit),
            )
            .with_hint("set `BiasTerm = true` on the unit"),
        )
    }

    fn dimension_mismatch(&self, _ctx: &ResolutionContext, location: Location, ty: &NamedType, expected: u32, found: u32) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0420,
            location,
            format!("'{}' has dimension {}, expected {}", ty, found, expected),
        ))
    }

    fn group_lacks_member(&self, _ctx: &ResolutionContext, location: Location, group: &NamedType, dimension: u32) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0421,
            location,
            format!("vector group '{}' has no member of dimension {}", group, dimension),
        ))
    }

    fn type_not_vector(&self, _ctx: &ResolutionContext, location: Location, ty: &NamedType) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0422,
            location,
            format!("'{}' is not a vector quantity", ty),
        ))
    }

    fn duplicate_dimension(&self, ctx: &ResolutionContext, location: Location, group: &NamedType, dimension: u32, existing: &NamedType) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0423,
            location,
            format!(
                "'{}' and '{}' are both members of '{}' with dimension {}",
                existing, ctx.ty, group, dimension
            ),
        ))
    }

    fn original_not_quantity(&self, ctx: &ResolutionContext, location: Location, original: &NamedType, kind: DefinitionKind) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0610,
            location,
            format!(
                "'{}' specializes '{}', which is not a {}",
                ctx.ty,
                original,
                kind.describe()
            ),
        ))
    }

    fn root_not_resolved(&self, ctx: &ResolutionContext, location: Location) -> Option<Diagnostic> {
        Some(
            Diagnostic::error(
                codes::E0611,
                location,
                format!("'{}' does not specialize a resolvable root quantity", ctx.ty),
            )
            .with_hint("every chain of `OriginalQuantity` must end at a non-specialized quantity"),
        )
    }

    fn name_suggests_dimension(&self, ctx: &ResolutionContext, location: Location, inferred: u32, dimension: u32) -> Option<Diagnostic> {
        Some(Diagnostic::warning(
            codes::W0402,
            location,
            format!(
                "the name of '{}' suggests dimension {}, but it specializes a vector of dimension {}",
                ctx.ty, inferred, dimension
            ),
        ))
    }

    fn constant_shares_name_with_unit(&self, ctx: &ResolutionContext, location: Location, name: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0613,
            location,
            format!("'{}' on '{}' collides with a unit instance property", name, ctx.ty),
        ))
    }

    fn constant_already_inherited(&self, ctx: &ResolutionContext, location: Location, name: &str) -> Option<Diagnostic> {
        Some(
            Diagnostic::error(
                codes::E0614,
                location,
                format!("'{}' already inherits a constant or multiples named '{}'", ctx.ty, name),
            )
            .with_hint("set `InheritConstants = false` to redeclare inherited constants"),
        )
    }

    fn constant_dimension(&self, ctx: &ResolutionContext, location: Location, name: &str, expected: u32, found: usize) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0609,
            location,
            format!(
                "constant '{}' has {} components, but '{}' has dimension {}",
                name, found, ctx.ty, expected
            ),
        ))
    }
}

#[derive(Clone, Copy)]
pub struct ResolutionStrategies<'a> {
    pub common: &'a dyn ResolutionDiagnostics,
    pub unit: &'a dyn UnitResolutionDiagnostics,
    pub operation: &'a dyn VectorOperationResolutionDiagnostics,
}

impl Default for ResolutionStrategies<'static> {
    fn default() -> Self {
        Self {
            common: &DefaultResolutionDiagnostics,
            unit: &DefaultUnitResolutionDiagnostics,
            operation: &DefaultVectorOperationResolutionDiagnostics,
        }
    }
}

// ── Shared checks ────────────────────────────────────────────────────────

/// Look `ty` up in the `kind` population. Duplicated entries and entries
/// claimed by a higher kind fail silently; both were reported at their own
/// declarations.
pub(crate) fn lookup<T>(
    populations: &Populations,
    kind: DefinitionKind,
    population: &Population<T>,
    ty: &NamedType,
    missing: impl FnOnce() -> Option<Diagnostic>,
) -> Outcome<Handle<T>> {
    if population.declares(ty) {
        Outcome::from_parts(clean(populations, kind, population, ty), Vec::new())
    } else {
        Outcome::empty_with(missing())
    }
}

/// Optional reference: a failure clears the field and keeps its diagnostic.
pub(crate) fn optional<T>(
    populations: &Populations,
    kind: DefinitionKind,
    population: &Population<T>,
    ty: Option<&NamedType>,
    diagnostics: &mut Vec<Diagnostic>,
    missing: impl FnOnce(&NamedType) -> Option<Diagnostic>,
) -> Option<Handle<T>> {
    let ty = ty?;
    lookup(populations, kind, population, ty, || missing(ty)).drain_into(diagnostics)
}

/// The declaring type must not be declared as any kind ranked above `kind`.
pub(crate) fn exclusive(
    strategy: &dyn ResolutionDiagnostics,
    ctx: &ResolutionContext,
    kind: DefinitionKind,
    location: Location,
) -> Validity {
    outranked(ctx.populations, kind, &ctx.ty).map_or_else(Validity::valid, |higher| {
        Validity::invalid(strategy.type_already(ctx, location, higher))
    })
}

/// Keep listed names the unit defines; report the rest.
pub(crate) fn unit_list(
    strategy: &dyn ResolutionDiagnostics,
    ctx: &ResolutionContext,
    unit: &NamedType,
    list: &ProcessedUnitList,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<String> {
    let location = list.locations.items.unwrap_or(list.locations.attribute);
    list.items
        .iter()
        .filter(|name| {
            let known = ctx.has_instance(unit, name);
            if !known {
                diagnostics.extend(strategy.unrecognized_unit_instance(ctx, location, unit, name));
            }
            known
        })
        .cloned()
        .collect()
}

/// Keep a default unit instance only if the unit defines it.
pub(crate) fn default_unit_instance(
    strategy: &dyn ResolutionDiagnostics,
    ctx: &ResolutionContext,
    unit: &NamedType,
    default: Option<&DefaultUnitInstance>,
    location: Location,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<DefaultUnitInstance> {
    let default = default?;
    if ctx.has_instance(unit, &default.name) {
        Some(default.clone())
    } else {
        diagnostics.extend(strategy.unrecognized_unit_instance(ctx, location, unit, &default.name));
        None
    }
}

// ── Resolved unit system ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedUnitSystem {
    pub units: Vec<ResolvedUnit>,
    pub scalars: Vec<ResolvedScalar>,
    pub vectors: Vec<ResolvedVector>,
    pub groups: Vec<ResolvedVectorGroup>,
    pub members: Vec<ResolvedVectorGroupMember>,
}

impl ResolvedUnitSystem {
    pub fn definition_count(&self) -> usize {
        self.units.len() + self.scalars.len() + self.vectors.len() + self.groups.len() + self.members.len()
    }
}

fn resolve_each<T, Out, R>(
    resolver: &R,
    population: &Population<T>,
    populations: &Populations,
    unit_instances: &BTreeMap<NamedType, UnitInstanceNames>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Out>
where
    R: for<'c> Resolver<ResolutionContext<'c>, Arc<T>, Out>,
{
    population
        .types
        .iter()
        .filter_map(|(ty, definition)| {
            let ctx = ResolutionContext::new(ty.clone(), populations, unit_instances);
            resolver.resolve(&ctx, definition).drain_into(diagnostics)
        })
        .collect()
}

pub fn resolve(populations: &Populations, strategies: &ResolutionStrategies) -> Outcome<ResolvedUnitSystem> {
    let mut diagnostics = Vec::new();
    let empty = BTreeMap::new();

    let units: Vec<ResolvedUnit> = resolve_each(
        &UnitResolver::new(strategies.common, strategies.unit),
        &populations.units,
        populations,
        &empty,
        &mut diagnostics,
    );
    let unit_instances: BTreeMap<NamedType, UnitInstanceNames> = units
        .iter()
        .map(|u| (u.ty.clone(), UnitInstanceNames::of(u)))
        .collect();

    let scalars = resolve_each(
        &ScalarResolver::new(strategies.common),
        &populations.scalars,
        populations,
        &unit_instances,
        &mut diagnostics,
    );
    let vectors = resolve_each(
        &VectorResolver::new(strategies.common, strategies.operation),
        &populations.vectors,
        populations,
        &unit_instances,
        &mut diagnostics,
    );
    let groups = resolve_each(
        &VectorGroupResolver::new(strategies.common, strategies.operation),
        &populations.groups,
        populations,
        &unit_instances,
        &mut diagnostics,
    );
    let members = resolve_each(
        &VectorGroupMemberResolver::new(strategies.common, strategies.operation),
        &populations.members,
        populations,
        &unit_instances,
        &mut diagnostics,
    );

    Outcome::result_with(
        ResolvedUnitSystem {
            units,
            scalars,
            vectors,
            groups,
            members,
        },
        diagnostics,
    )
}

// ── Tests ────────────────────────────────────────────────────────────────
