// vector.rs — Vector, vector group and group member resolution
//
// Specialized vectors and groups take their unit (and vectors their
// dimension) from the root of their chain. Members take what they do not
// declare from their group's chain.
//
// Preconditions: populations carry normalized member groups.
// Postconditions: a resolved member's group is a resolvable group and the
//   member is that group's only member of its dimension. Differences and
//   conversions agree with the declaring dimension.
// Failure modes: mutual exclusion, a missing unit, an original that does
//   not reach a root, or (for members) a bad group or a taken dimension
//   drop the definition.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use super::inherit::{self, nearest, Level, ResolvedConstant, ResolvedConversion};
use super::operation::{resolve_operations, ResolvedVectorOperation, VectorOperationResolutionDiagnostics};
use super::{
    clean, exclusive, lookup, optional, Handle, QuantityRef, ResolutionContext, ResolutionDiagnostics, Resolver,
};
use crate::diag::Diagnostic;
use crate::population::{DefinitionKind, Populations};
use crate::process::at;
use crate::process::quantity::{DefaultUnitInstance, VectorDefinition, VectorGroupDefinition};
use crate::process::{ScalarType, UnitType, VectorGroupMemberType, VectorGroupType, VectorType};
use crate::raw::{Inheritance, QuantityLocations, VectorGroupMemberLocations};
use crate::types::{infer_dimension, Location, NamedType};
use crate::validity::Outcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedVector {
    pub ty: NamedType,
    pub original: Option<Handle<VectorType>>,
    pub inheritance: Option<Inheritance>,
    pub unit: Handle<UnitType>,
    pub dimension: u32,
    pub scalar: Option<Handle<ScalarType>>,
    pub implement_sum: bool,
    pub implement_difference: bool,
    /// A vector or member of the same dimension, or a group holding one.
    pub difference: Option<QuantityRef>,
    pub default_unit_instance: Option<DefaultUnitInstance>,
    pub units: Vec<String>,
    pub constants: Vec<ResolvedConstant>,
    pub conversions: Vec<ResolvedConversion>,
    pub operations: Vec<ResolvedVectorOperation>,
    pub locations: QuantityLocations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedVectorGroup {
    pub ty: NamedType,
    pub original: Option<Handle<VectorGroupType>>,
    pub inheritance: Option<Inheritance>,
    pub unit: Handle<UnitType>,
    pub scalar: Option<Handle<ScalarType>>,
    pub implement_sum: bool,
    pub implement_difference: bool,
    pub difference: Option<Handle<VectorGroupType>>,
    pub default_unit_instance: Option<DefaultUnitInstance>,
    /// Dimension → the member registered for it.
    pub members: BTreeMap<u32, Handle<VectorGroupMemberType>>,
    pub units: Vec<String>,
    pub conversions: Vec<ResolvedConversion>,
    pub operations: Vec<ResolvedVectorOperation>,
    pub locations: QuantityLocations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedVectorGroupMember {
    pub ty: NamedType,
    /// The group after following resized chains.
    pub group: Handle<VectorGroupType>,
    pub dimension: u32,
    pub unit: Handle<UnitType>,
    pub scalar: Option<Handle<ScalarType>>,
    pub implement_sum: bool,
    pub implement_difference: bool,
    pub difference: Option<Handle<VectorGroupMemberType>>,
    pub units: Vec<String>,
    pub constants: Vec<ResolvedConstant>,
    /// Own conversions, then the group's mapped onto members of this
    /// dimension.
    pub conversions: Vec<ResolvedConversion>,
    pub operations: Vec<ResolvedVectorOperation>,
    pub locations: VectorGroupMemberLocations,
}

// ── Shared pieces ────────────────────────────────────────────────────────

/// The root's unit. Only roots report a missing one.
fn root_unit(
    strategy: &dyn ResolutionDiagnostics,
    ctx: &ResolutionContext,
    ty: &NamedType,
    location: Location,
    is_root: bool,
) -> Outcome<Handle<UnitType>> {
    lookup(ctx.populations, DefinitionKind::Unit, &ctx.populations.units, ty, || {
        if is_root {
            strategy.type_not_unit(ctx, location, ty)
        } else {
            None
        }
    })
}

fn nearest_scalar<T>(
    strategy: &dyn ResolutionDiagnostics,
    ctx: &ResolutionContext,
    chain: &[Level<T>],
    pick: impl Fn(&T) -> (Option<&NamedType>, &QuantityLocations),
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Handle<ScalarType>> {
    let populations = ctx.populations;
    nearest(chain, diagnostics, |level, sink| {
        let (scalar, l) = pick(level);
        scalar.map(|ty| {
            optional(
                populations,
                DefinitionKind::Scalar,
                &populations.scalars,
                Some(ty),
                sink,
                |ty| strategy.type_not_scalar(ctx, at(l.scalar, l.attribute), ty),
            )
        })
    })
    .flatten()
}

fn group_reference(
    strategy: &dyn ResolutionDiagnostics,
    ctx: &ResolutionContext,
    ty: &NamedType,
    location: Location,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Handle<VectorGroupType>> {
    let populations = ctx.populations;
    optional(
        populations,
        DefinitionKind::VectorGroup,
        &populations.groups,
        Some(ty),
        diagnostics,
        |ty| strategy.type_not_vector_group(ctx, location, ty),
    )
}

/// `ty` as a vector quantity of `dimension`: a vector or member of that
/// dimension, or a group holding a member of it.
pub fn vector_of_dimension(
    strategy: &dyn ResolutionDiagnostics,
    ctx: &ResolutionContext,
    ty: &NamedType,
    dimension: u32,
    location: Location,
) -> Outcome<QuantityRef> {
    let populations = ctx.populations;
    match populations.kind_of(ty) {
        Some(DefinitionKind::Vector) => {
            let Some(vector) = clean(populations, DefinitionKind::Vector, &populations.vectors, ty) else {
                return Outcome::empty();
            };
            // Specialized vectors without a root were reported on their own.
            let Some(found) = populations.vector_dimension(ty) else {
                return Outcome::empty();
            };
            if found == dimension {
                Outcome::result(QuantityRef::Vector(vector))
            } else {
                Outcome::empty_with(strategy.dimension_mismatch(ctx, location, ty, dimension, found))
            }
        }
        Some(DefinitionKind::VectorGroup) => {
            let Some(group) = clean(populations, DefinitionKind::VectorGroup, &populations.groups, ty) else {
                return Outcome::empty();
            };
            let holds = populations
                .group_members(ty)
                .is_some_and(|members| members.contains_key(&dimension));
            if holds {
                Outcome::result(QuantityRef::Group(group))
            } else {
                Outcome::empty_with(strategy.group_lacks_member(ctx, location, ty, dimension))
            }
        }
        Some(DefinitionKind::VectorGroupMember) => {
            let Some(member) = clean(populations, DefinitionKind::VectorGroupMember, &populations.members, ty) else {
                return Outcome::empty();
            };
            let found = member.get().definition.dimension;
            if found == dimension {
                Outcome::result(QuantityRef::Member(member))
            } else {
                Outcome::empty_with(strategy.dimension_mismatch(ctx, location, ty, dimension, found))
            }
        }
        _ => Outcome::empty_with(strategy.type_not_vector(ctx, location, ty)),
    }
}

/// The member of `group` with `dimension`.
fn member_of(populations: &Populations, group: &NamedType, dimension: u32) -> Option<Handle<VectorGroupMemberType>> {
    let member = populations.group_members(group)?.get(&dimension)?;
    clean(populations, DefinitionKind::VectorGroupMember, &populations.members, member)
}

// ── Individual vectors ───────────────────────────────────────────────────

pub struct VectorResolver<'a> {
    diagnostics: &'a dyn ResolutionDiagnostics,
    operations: &'a dyn VectorOperationResolutionDiagnostics,
}

impl<'a> VectorResolver<'a> {
    pub fn new(
        diagnostics: &'a dyn ResolutionDiagnostics,
        operations: &'a dyn VectorOperationResolutionDiagnostics,
    ) -> Self {
        Self { diagnostics, operations }
    }
}

impl Resolver<ResolutionContext<'_>, Arc<VectorType>, ResolvedVector> for VectorResolver<'_> {
    fn resolve(&self, ctx: &ResolutionContext, vector: &Arc<VectorType>) -> Outcome<ResolvedVector> {
        let definition = &vector.definition;
        let locations = *definition.locations();
        let attribute = locations.attribute;
        let populations = ctx.populations;
        let chain = populations.vector_chain(&ctx.ty);
        let root = chain.last().copied();

        exclusive(self.diagnostics, ctx, DefinitionKind::Vector, attribute)
            .merge(|| {
                let rooted = matches!(root, Some((_, r)) if matches!(r.definition, VectorDefinition::Base(_)));
                inherit::original(
                    self.diagnostics,
                    ctx,
                    DefinitionKind::Vector,
                    &populations.vectors,
                    definition.original(),
                    &locations,
                    rooted,
                )
            })
            .and_then(|original| {
                let Some((root_ty, root)) = root else {
                    return Outcome::empty();
                };
                let VectorDefinition::Base(base) = &root.definition else {
                    return Outcome::empty();
                };
                let is_root = original.is_none();
                let dimension = base.dimension;

                let mut diagnostics = Vec::new();
                let Some(unit) = root_unit(self.diagnostics, ctx, &base.unit, at(locations.unit, attribute), is_root)
                    .drain_into(&mut diagnostics)
                else {
                    return Outcome::empty_with_all(diagnostics);
                };
                if !is_root {
                    if let Some(inferred) = infer_dimension(&ctx.ty.name).filter(|&inferred| inferred != dimension) {
                        diagnostics.extend(self.diagnostics.name_suggests_dimension(ctx, attribute, inferred, dimension));
                    }
                }

                let scalar = nearest_scalar(
                    self.diagnostics,
                    ctx,
                    &chain,
                    |v| (v.definition.scalar(), v.definition.locations()),
                    &mut diagnostics,
                );
                let implement_sum = inherit::flag(&chain, |v| v.definition.implement_sum());
                let implement_difference = inherit::flag(&chain, |v| v.definition.implement_difference());
                let difference = if implement_difference {
                    nearest(&chain, &mut diagnostics, |level, sink| {
                        let l = level.definition.locations();
                        level.definition.difference().map(|ty| {
                            vector_of_dimension(self.diagnostics, ctx, ty, dimension, at(l.difference, l.attribute))
                                .drain_into(sink)
                        })
                    })
                    .unwrap_or_else(|| Some(QuantityRef::Vector(Handle::new(root_ty.clone(), Arc::clone(root)))))
                } else {
                    None
                };

                let default_unit_instance = inherit::default_instance(
                    self.diagnostics,
                    ctx,
                    unit.ty(),
                    &chain,
                    |v| (v.definition.default_unit_instance(), v.definition.locations()),
                    &mut diagnostics,
                );
                let units = inherit::unit_set(
                    self.diagnostics,
                    ctx,
                    unit.ty(),
                    &chain,
                    |v| (v.inclusions.as_ref(), v.exclusions.as_ref()),
                    |i| i.units,
                    &mut diagnostics,
                );
                let reserved = inherit::reserved_names(ctx, unit.ty(), &units, &[]);
                let constants = inherit::constants(
                    self.diagnostics,
                    ctx,
                    unit.ty(),
                    &chain,
                    &reserved,
                    Some(dimension),
                    &mut diagnostics,
                );
                let conversions = inherit::conversions(&chain, &mut diagnostics, |ty, location, sink| {
                    vector_of_dimension(self.diagnostics, ctx, ty, dimension, location).drain_into(sink)
                });
                let operations = resolve_operations(
                    self.operations,
                    ctx,
                    &BTreeSet::from([dimension]),
                    &vector.operations,
                    &mut diagnostics,
                );

                Outcome::result_with(
                    ResolvedVector {
                        ty: ctx.ty.clone(),
                        original,
                        inheritance: definition.inheritance(),
                        unit,
                        dimension,
                        scalar,
                        implement_sum,
                        implement_difference,
                        difference,
                        default_unit_instance,
                        units,
                        constants,
                        conversions,
                        operations,
                        locations,
                    },
                    diagnostics,
                )
            })
    }
}

// ── Vector groups ────────────────────────────────────────────────────────

pub struct VectorGroupResolver<'a> {
    diagnostics: &'a dyn ResolutionDiagnostics,
    operations: &'a dyn VectorOperationResolutionDiagnostics,
}

impl<'a> VectorGroupResolver<'a> {
    pub fn new(
        diagnostics: &'a dyn ResolutionDiagnostics,
        operations: &'a dyn VectorOperationResolutionDiagnostics,
    ) -> Self {
        Self { diagnostics, operations }
    }
}

impl Resolver<ResolutionContext<'_>, Arc<VectorGroupType>, ResolvedVectorGroup> for VectorGroupResolver<'_> {
    fn resolve(&self, ctx: &ResolutionContext, group: &Arc<VectorGroupType>) -> Outcome<ResolvedVectorGroup> {
        let definition = &group.definition;
        let locations = *definition.locations();
        let attribute = locations.attribute;
        let populations = ctx.populations;
        let chain = populations.group_chain(&ctx.ty);
        let root = chain.last().copied();

        exclusive(self.diagnostics, ctx, DefinitionKind::VectorGroup, attribute)
            .merge(|| {
                let rooted = matches!(root, Some((_, r)) if matches!(r.definition, VectorGroupDefinition::Base(_)));
                inherit::original(
                    self.diagnostics,
                    ctx,
                    DefinitionKind::VectorGroup,
                    &populations.groups,
                    definition.original(),
                    &locations,
                    rooted,
                )
            })
            .and_then(|original| {
                let Some((root_ty, root)) = root else {
                    return Outcome::empty();
                };
                let VectorGroupDefinition::Base(base) = &root.definition else {
                    return Outcome::empty();
                };
                let is_root = original.is_none();

                let mut diagnostics = Vec::new();
                let Some(unit) = root_unit(self.diagnostics, ctx, &base.unit, at(locations.unit, attribute), is_root)
                    .drain_into(&mut diagnostics)
                else {
                    return Outcome::empty_with_all(diagnostics);
                };
                let scalar = nearest_scalar(
                    self.diagnostics,
                    ctx,
                    &chain,
                    |g| (g.definition.scalar(), g.definition.locations()),
                    &mut diagnostics,
                );

                let implement_sum = inherit::flag(&chain, |g| g.definition.implement_sum());
                let implement_difference = inherit::flag(&chain, |g| g.definition.implement_difference());
                let difference = if implement_difference {
                    nearest(&chain, &mut diagnostics, |level, sink| {
                        let l = level.definition.locations();
                        level
                            .definition
                            .difference()
                            .map(|ty| group_reference(self.diagnostics, ctx, ty, at(l.difference, l.attribute), sink))
                    })
                    .unwrap_or_else(|| Some(Handle::new(root_ty.clone(), Arc::clone(root))))
                } else {
                    None
                };

                let members: BTreeMap<u32, Handle<VectorGroupMemberType>> = populations
                    .group_members(&ctx.ty)
                    .into_iter()
                    .flatten()
                    .filter_map(|(&dimension, member)| {
                        clean(populations, DefinitionKind::VectorGroupMember, &populations.members, member)
                            .map(|handle| (dimension, handle))
                    })
                    .collect();

                let default_unit_instance = inherit::default_instance(
                    self.diagnostics,
                    ctx,
                    unit.ty(),
                    &chain,
                    |g| (g.definition.default_unit_instance(), g.definition.locations()),
                    &mut diagnostics,
                );
                let units = inherit::unit_set(
                    self.diagnostics,
                    ctx,
                    unit.ty(),
                    &chain,
                    |g| (g.inclusions.as_ref(), g.exclusions.as_ref()),
                    |i| i.units,
                    &mut diagnostics,
                );
                let conversions = inherit::conversions(&chain, &mut diagnostics, |ty, location, sink| {
                    group_reference(self.diagnostics, ctx, ty, location, sink).map(QuantityRef::Group)
                });
                let dimensions: BTreeSet<u32> = members.keys().copied().collect();
                let operations =
                    resolve_operations(self.operations, ctx, &dimensions, &group.operations, &mut diagnostics);

                Outcome::result_with(
                    ResolvedVectorGroup {
                        ty: ctx.ty.clone(),
                        original,
                        inheritance: definition.inheritance(),
                        unit,
                        scalar,
                        implement_sum,
                        implement_difference,
                        difference,
                        default_unit_instance,
                        members,
                        units,
                        conversions,
                        operations,
                        locations,
                    },
                    diagnostics,
                )
            })
    }
}

// ── Vector group members ─────────────────────────────────────────────────

/// What a member takes from its group's chain, looked up without
/// diagnostics; the group reports its own failures.
struct GroupView<'p> {
    chain: Vec<Level<'p, VectorGroupType>>,
    unit: Handle<UnitType>,
    scalar: Option<Handle<ScalarType>>,
    implement_sum: bool,
    implement_difference: bool,
    /// The group whose member of the same dimension is the difference.
    difference: &'p NamedType,
}

impl<'p> GroupView<'p> {
    fn of(populations: &'p Populations, group: &NamedType) -> Option<Self> {
        let chain = populations.group_chain(group);
        let (root_ty, root) = chain.last().copied()?;
        let VectorGroupDefinition::Base(base) = &root.definition else {
            return None;
        };
        let unit = clean(populations, DefinitionKind::Unit, &populations.units, &base.unit)?;

        let mut silent = Vec::new();
        let scalar = nearest(&chain, &mut silent, |level, _| {
            level
                .definition
                .scalar()
                .map(|ty| clean(populations, DefinitionKind::Scalar, &populations.scalars, ty))
        })
        .flatten();
        let difference = chain
            .iter()
            .find_map(|&(_, level)| level.definition.difference())
            .unwrap_or(root_ty);

        Some(Self {
            unit,
            scalar,
            implement_sum: inherit::flag(&chain, |g| g.definition.implement_sum()),
            implement_difference: inherit::flag(&chain, |g| g.definition.implement_difference()),
            difference,
            chain,
        })
    }
}

pub struct VectorGroupMemberResolver<'a> {
    diagnostics: &'a dyn ResolutionDiagnostics,
    operations: &'a dyn VectorOperationResolutionDiagnostics,
}

impl<'a> VectorGroupMemberResolver<'a> {
    pub fn new(
        diagnostics: &'a dyn ResolutionDiagnostics,
        operations: &'a dyn VectorOperationResolutionDiagnostics,
    ) -> Self {
        Self { diagnostics, operations }
    }

    /// Own conversions, then the group's, each moved to the target group's
    /// member of `dimension`.
    fn conversions(
        &self,
        ctx: &ResolutionContext,
        member: &VectorGroupMemberType,
        view: &GroupView,
        dimension: u32,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<ResolvedConversion> {
        let populations = ctx.populations;
        let mut target = |ty: &NamedType, location: Location, sink: &mut Vec<Diagnostic>| {
            vector_of_dimension(self.diagnostics, ctx, ty, dimension, location).drain_into(sink)
        };
        let mut resolved = inherit::own_conversions(&ctx.ty, &member.conversions, &mut target, diagnostics);

        let mut silent = Vec::new();
        let from_group = inherit::conversions(&view.chain, &mut silent, |ty, _, _| {
            clean(populations, DefinitionKind::VectorGroup, &populations.groups, ty).map(QuantityRef::Group)
        })
        .into_iter()
        .filter_map(|conversion| {
            let member = member_of(populations, conversion.quantity.ty(), dimension)?;
            Some(ResolvedConversion {
                quantity: QuantityRef::Member(member),
                ..conversion
            })
        })
        .collect();
        inherit::extend_unlisted(&mut resolved, &ctx.ty, from_group);
        resolved
    }
}

impl Resolver<ResolutionContext<'_>, Arc<VectorGroupMemberType>, ResolvedVectorGroupMember>
    for VectorGroupMemberResolver<'_>
{
    fn resolve(&self, ctx: &ResolutionContext, member: &Arc<VectorGroupMemberType>) -> Outcome<ResolvedVectorGroupMember> {
        let definition = &member.definition;
        let locations = definition.locations;
        let attribute = locations.attribute;
        let populations = ctx.populations;
        let dimension = definition.dimension;

        exclusive(self.diagnostics, ctx, DefinitionKind::VectorGroupMember, attribute).merge(|| {
            let mut diagnostics = Vec::new();
            let group_ty = populations.group_of(&ctx.ty).unwrap_or(&definition.group);
            let Some(group) = lookup(populations, DefinitionKind::VectorGroup, &populations.groups, group_ty, || {
                self.diagnostics.type_not_vector_group(ctx, at(locations.group, attribute), group_ty)
            })
            .drain_into(&mut diagnostics) else {
                return Outcome::empty_with_all(diagnostics);
            };

            let registered = populations
                .group_members(group_ty)
                .and_then(|members| members.get(&dimension));
            if let Some(existing) = registered.filter(|existing| **existing != ctx.ty) {
                diagnostics.extend(self.diagnostics.duplicate_dimension(ctx, attribute, group_ty, dimension, existing));
                return Outcome::empty_with_all(diagnostics);
            }

            // Unit and scalar failures are reported on the group.
            let Some(view) = GroupView::of(populations, group_ty) else {
                return Outcome::empty_with_all(diagnostics);
            };
            let difference = if view.implement_difference {
                member_of(populations, view.difference, dimension)
            } else {
                None
            };

            let mut silent = Vec::new();
            let group_units = inherit::unit_set(
                self.diagnostics,
                ctx,
                view.unit.ty(),
                &view.chain,
                |g| (g.inclusions.as_ref(), g.exclusions.as_ref()),
                |i| i.units,
                &mut silent,
            );
            let units = inherit::apply_lists(
                self.diagnostics,
                ctx,
                view.unit.ty(),
                group_units,
                member.inclusions.as_ref(),
                member.exclusions.as_ref(),
                &mut diagnostics,
            );
            let reserved = inherit::reserved_names(ctx, view.unit.ty(), &units, &[]);
            let constants = inherit::constants(
                self.diagnostics,
                ctx,
                view.unit.ty(),
                &[(&ctx.ty, member)],
                &reserved,
                Some(dimension),
                &mut diagnostics,
            );
            let conversions = self.conversions(ctx, member, &view, dimension, &mut diagnostics);
            let operations = resolve_operations(
                self.operations,
                ctx,
                &BTreeSet::from([dimension]),
                &member.operations,
                &mut diagnostics,
            );

            Outcome::result_with(
                ResolvedVectorGroupMember {
                    ty: ctx.ty.clone(),
                    group,
                    dimension,
                    unit: view.unit,
                    scalar: view.scalar,
                    implement_sum: view.implement_sum,
                    implement_difference: view.implement_difference,
                    difference,
                    units,
                    constants,
                    conversions,
                    operations,
                    locations,
                },
                diagnostics,
            )
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, resolve_source};
    use super::super::ResolvedUnitSystem;
    use super::*;

    const BASE: &str = r#"
        [SharpMeasuresUnit(typeof(Length))] [FixedUnitInstance("Metre")] partial class UnitOfLength { }
        [SharpMeasuresScalar(typeof(UnitOfLength))] partial class Length { }
        [SharpMeasuresVectorGroup(typeof(UnitOfLength), Scalar = typeof(Length))] partial class Position { }
        [SharpMeasuresVectorGroupMember(typeof(Position))] partial class Position2 { }
        [SharpMeasuresVectorGroupMember(typeof(Position))] partial class Position3 { }
    "#;

    fn with(extra: &str) -> (ResolvedUnitSystem, Vec<Diagnostic>) {
        resolve_source(&format!("{}\n{}", BASE, extra))
    }

    fn vector<'s>(system: &'s ResolvedUnitSystem, name: &str) -> &'s ResolvedVector {
        system.vectors.iter().find(|v| v.ty.to_string() == name).unwrap()
    }

    #[test]
    fn members_inherit_from_their_group() {
        let (system, diags) = with("");
        assert!(diags.is_empty(), "{:?}", diags);
        let group = &system.groups[0];
        assert_eq!(group.members.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
        let member = &system.members[0];
        assert_eq!(member.group.ty().to_string(), "Position");
        assert_eq!(member.unit.ty().to_string(), "UnitOfLength");
        assert_eq!(member.scalar.as_ref().map(|s| s.ty().to_string()), Some("Length".into()));
        assert_eq!(member.difference.as_ref().map(|d| d.ty()), Some(&member.ty));
    }

    #[test]
    fn member_group_must_be_a_group() {
        let (system, diags) = with("[SharpMeasuresVectorGroupMember(typeof(Length))] partial class Length2 { }");
        assert_eq!(codes(&diags), vec!["E0512"]);
        assert_eq!(system.members.len(), 2);
    }

    #[test]
    fn later_member_of_a_taken_dimension_is_rejected() {
        let (system, diags) = with(
            "[SharpMeasuresVectorGroupMember(typeof(Position), Dimension = 3)] partial class Place { }",
        );
        assert_eq!(codes(&diags), vec!["E0423"]);
        assert!(system.members.iter().all(|m| m.ty.to_string() != "Place"));
    }

    #[test]
    fn vector_difference_rules() {
        let (system, diags) = with(
            r#"
            [SharpMeasuresVector(typeof(UnitOfLength))] partial class Size3 { }
            [SharpMeasuresVector(typeof(UnitOfLength), Difference = typeof(Position))] partial class A3 { }
            [SharpMeasuresVector(typeof(UnitOfLength), Difference = typeof(Position))] partial class B4 { }
            [SharpMeasuresVector(typeof(UnitOfLength), Difference = typeof(Size3))] partial class C2 { }
            [SharpMeasuresVector(typeof(UnitOfLength), Difference = typeof(Length))] partial class D3 { }
            [SharpMeasuresVector(typeof(UnitOfLength), Difference = typeof(Position3))] partial class E3 { }
            "#,
        );
        assert_eq!(codes(&diags), vec!["E0421", "E0420", "E0422"]);
        assert!(matches!(vector(&system, "Size3").difference, Some(QuantityRef::Vector(_))));
        assert!(matches!(vector(&system, "A3").difference, Some(QuantityRef::Group(_))));
        assert!(vector(&system, "B4").difference.is_none());
        assert!(matches!(vector(&system, "E3").difference, Some(QuantityRef::Member(_))));
    }

    #[test]
    fn vector_outranks_group() {
        let (system, diags) =
            with("[SharpMeasuresVector(typeof(UnitOfLength), Dimension = 3)] partial class Position { }");
        assert_eq!(codes(&diags), vec!["E0503"]);
        assert_eq!(system.vectors.len(), 1);
        assert!(system.groups.is_empty());
        // Members of a group claimed by a vector drop without a second report.
        assert!(system.members.is_empty());
    }

    #[test]
    fn specialized_vectors_take_the_root_dimension() {
        let (system, diags) = with(
            r#"
            [SharpMeasuresVector(typeof(UnitOfLength))]
            [VectorConstant("Ones", "Metre", 1, 1, 1)]
            [VectorConstant("Flat", "Metre", 1, 1)]
            partial class Size3 { }
            [SpecializedSharpMeasuresVector(typeof(Size3))] partial class Extent2 { }
            [SpecializedSharpMeasuresVector(typeof(Length))] partial class Odd3 { }
            "#,
        );
        let mut found = codes(&diags);
        found.sort_unstable();
        assert_eq!(found, vec!["E0609", "E0610", "W0402"]);
        assert!(system.vectors.iter().all(|v| v.ty.name != "Odd3"));

        let extent = vector(&system, "Extent2");
        assert_eq!(extent.dimension, 3);
        assert_eq!(extent.original.as_ref().map(|o| o.ty().name.as_str()), Some("Size3"));
        assert_eq!(extent.unit.ty().name, "UnitOfLength");
        assert_eq!(extent.difference.as_ref().map(|d| d.ty().name.as_str()), Some("Size3"));
        let constants: Vec<_> = extent.constants.iter().map(|c| (c.name.as_str(), c.owner.name.as_str())).collect();
        assert_eq!(constants, vec![("Ones", "Size3")]);
    }

    #[test]
    fn vector_conversions_agree_in_dimension() {
        let (system, diags) = with(
            r#"
            [SharpMeasuresVector(typeof(UnitOfLength))] partial class Size2 { }
            [SharpMeasuresVector(typeof(UnitOfLength))]
            [ConvertibleQuantity(typeof(Position), typeof(Size2), typeof(Length))]
            partial class Shift3 { }
            "#,
        );
        assert_eq!(codes(&diags), vec!["E0420", "E0422"]);
        let targets: Vec<_> = vector(&system, "Shift3")
            .conversions
            .iter()
            .map(|c| c.quantity.ty().name.as_str())
            .collect();
        assert_eq!(targets, vec!["Position"]);
    }

    #[test]
    fn members_of_specialized_groups_follow_the_group_chain() {
        let (system, diags) = resolve_source(
            r#"
            [SharpMeasuresUnit(typeof(Length))]
            [FixedUnitInstance("Metre")]
            [PrefixedUnitInstance("Kilometre", "Metre", MetricPrefixName.Kilo)]
            partial class UnitOfLength { }
            [SharpMeasuresScalar(typeof(UnitOfLength))] partial class Length { }
            [SharpMeasuresVectorGroup(typeof(UnitOfLength), Scalar = typeof(Length), ImplementSum = false)]
            [ExcludeUnits("Kilometre")]
            [ConvertibleQuantity(typeof(Offset))]
            partial class Position { }
            [SharpMeasuresVectorGroupMember(typeof(Position))] partial class Position3 { }
            [SpecializedSharpMeasuresVectorGroup(typeof(Position))] partial class Offset { }
            [SharpMeasuresVectorGroupMember(typeof(Offset))]
            [VectorConstant("Up", "Metre", 0, 0, 1)]
            [VectorConstant("Level", "Metre", 1, 0)]
            partial class Offset3 { }
            "#,
        );
        assert_eq!(codes(&diags), vec!["E0609"]);

        let offset = system.groups.iter().find(|g| g.ty.name == "Offset").unwrap();
        assert_eq!(offset.original.as_ref().map(|o| o.ty().name.as_str()), Some("Position"));
        assert_eq!(offset.units, vec!["Metre".to_string()]);
        assert!(offset.conversions.is_empty(), "inherited conversion to itself is dropped");

        let member = |name: &str| system.members.iter().find(|m| m.ty.name == name).unwrap();
        let offset3 = member("Offset3");
        assert_eq!(offset3.group.ty().name, "Offset");
        assert_eq!(offset3.scalar.as_ref().map(|s| s.ty().name.as_str()), Some("Length"));
        assert!(!offset3.implement_sum);
        assert_eq!(offset3.difference.as_ref().map(|d| d.ty().name.as_str()), Some("Position3"));
        assert_eq!(offset3.units, vec!["Metre".to_string()]);
        assert_eq!(offset3.constants.len(), 1);

        let position3 = member("Position3");
        let mapped: Vec<_> = position3
            .conversions
            .iter()
            .map(|c| (c.owner.name.as_str(), c.quantity.ty().name.as_str()))
            .collect();
        assert_eq!(mapped, vec![("Position", "Offset3")]);
    }
}
