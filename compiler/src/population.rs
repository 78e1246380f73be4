// population.rs — Population builder
//
// Folds processed bundles into one population per kind, keyed by declaring
// type. Keys defined more than once move to `duplicates` and are reported
// once. Also indexes vector group members by group and dimension, following
// resized-vector chains to the group they ultimately belong to, and walks
// specialization chains from a quantity to the root it specializes.
//
// Preconditions: bundles in candidate order.
// Postconditions: no key is in both `types` and `duplicates`;
//   `members_by_group` keeps the first member per (group, dimension).
// Failure modes: none. Duplicates are diagnostics.
// Side effects: none.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::diag::{codes, Diagnostic};
use crate::process::quantity::VectorDefinition;
use crate::process::{
    ProcessedPopulation, ScalarType, UnitType, VectorGroupMemberType, VectorGroupType, VectorType,
};
use crate::raw::HasLocations;
use crate::types::{Location, NamedType};
use crate::validity::Outcome;

/// One definition kind, keyed by declaring type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Population<T> {
    pub types: BTreeMap<NamedType, Arc<T>>,
    /// Keys declared more than once, with every declaration site.
    pub duplicates: BTreeMap<NamedType, Vec<Location>>,
}

impl<T> Default for Population<T> {
    fn default() -> Self {
        Self {
            types: BTreeMap::new(),
            duplicates: BTreeMap::new(),
        }
    }
}

impl<T> Population<T> {
    pub fn get(&self, ty: &NamedType) -> Option<&Arc<T>> {
        self.types.get(ty)
    }

    /// Declared as this kind, cleanly or not.
    pub fn declares(&self, ty: &NamedType) -> bool {
        self.types.contains_key(ty) || self.duplicates.contains_key(ty)
    }

    pub fn is_duplicate(&self, ty: &NamedType) -> bool {
        self.duplicates.contains_key(ty)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// `ty` followed by the originals it specializes, nearest first. Stops
    /// at an original that is not a clean entry of this population, and
    /// before revisiting an entry.
    pub fn chain<'p>(
        &'p self,
        ty: &NamedType,
        original: impl Fn(&'p T) -> Option<&'p NamedType>,
    ) -> Vec<(&'p NamedType, &'p Arc<T>)> {
        let mut chain: Vec<(&'p NamedType, &'p Arc<T>)> = Vec::new();
        let mut next = self.types.get_key_value(ty);
        while let Some((key, entry)) = next {
            if chain.iter().any(|(seen, _)| *seen == key) {
                break;
            }
            chain.push((key, entry));
            next = original(entry.as_ref()).and_then(|o| self.types.get_key_value(o));
        }
        chain
    }
}

impl<T: HasLocations> Population<T> {
    fn fold(definitions: Vec<(NamedType, T)>) -> Self {
        let mut population = Self::default();
        for (ty, definition) in definitions {
            if let Some(locations) = population.duplicates.get_mut(&ty) {
                locations.push(definition.attribute_location());
            } else if let Some(first) = population.types.remove(&ty) {
                population.duplicates.insert(
                    ty,
                    vec![first.attribute_location(), definition.attribute_location()],
                );
            } else {
                population.types.insert(ty, Arc::new(definition));
            }
        }
        population
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DefinitionKind {
    Unit,
    Scalar,
    Vector,
    VectorGroup,
    VectorGroupMember,
}

impl DefinitionKind {
    /// Precedence order for mutual exclusion.
    pub const ALL: [DefinitionKind; 5] = [
        DefinitionKind::Unit,
        DefinitionKind::Scalar,
        DefinitionKind::Vector,
        DefinitionKind::VectorGroup,
        DefinitionKind::VectorGroupMember,
    ];

    pub fn describe(self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Scalar => "scalar",
            Self::Vector => "vector",
            Self::VectorGroup => "vector group",
            Self::VectorGroupMember => "vector group member",
        }
    }
}

pub trait PopulationDiagnostics {
    fn type_already_defined(&self, ty: &NamedType, kind: DefinitionKind, locations: &[Location]) -> Option<Diagnostic>;
}

pub struct DefaultPopulationDiagnostics;

impl PopulationDiagnostics for DefaultPopulationDiagnostics {
    fn type_already_defined(&self, ty: &NamedType, kind: DefinitionKind, locations: &[Location]) -> Option<Diagnostic> {
        let (first, rest) = locations.split_first()?;
        let at = rest.first().copied().unwrap_or(*first);
        let mut diagnostic = Diagnostic::error(
            codes::E0500,
            at,
            format!("'{}' is defined as a {} more than once", ty, kind.describe()),
        )
        .with_related(*first, "first defined here");
        for other in rest.iter().skip(1) {
            diagnostic = diagnostic.with_related(*other, "also defined here");
        }
        Some(diagnostic)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Populations {
    pub units: Population<UnitType>,
    pub scalars: Population<ScalarType>,
    pub vectors: Population<VectorType>,
    pub groups: Population<VectorGroupType>,
    pub members: Population<VectorGroupMemberType>,
    /// Member → the group it belongs to after following resized chains.
    pub member_groups: BTreeMap<NamedType, NamedType>,
    /// Group → dimension → first member registered with that dimension.
    pub members_by_group: BTreeMap<NamedType, BTreeMap<u32, NamedType>>,
}

impl Populations {
    /// The first kind `ty` is declared as, by precedence
    /// unit > scalar > vector > group > member.
    pub fn kind_of(&self, ty: &NamedType) -> Option<DefinitionKind> {
        DefinitionKind::ALL
            .into_iter()
            .find(|&kind| self.declares_as(kind, ty))
    }

    pub fn declares_as(&self, kind: DefinitionKind, ty: &NamedType) -> bool {
        match kind {
            DefinitionKind::Unit => self.units.declares(ty),
            DefinitionKind::Scalar => self.scalars.declares(ty),
            DefinitionKind::Vector => self.vectors.declares(ty),
            DefinitionKind::VectorGroup => self.groups.declares(ty),
            DefinitionKind::VectorGroupMember => self.members.declares(ty),
        }
    }

    pub fn group_of(&self, member: &NamedType) -> Option<&NamedType> {
        self.member_groups.get(member)
    }

    pub fn group_members(&self, group: &NamedType) -> Option<&BTreeMap<u32, NamedType>> {
        self.members_by_group.get(group)
    }

    pub fn scalar_chain(&self, ty: &NamedType) -> Vec<(&NamedType, &Arc<ScalarType>)> {
        self.scalars.chain(ty, |s| s.definition.original())
    }

    pub fn vector_chain(&self, ty: &NamedType) -> Vec<(&NamedType, &Arc<VectorType>)> {
        self.vectors.chain(ty, |v| v.definition.original())
    }

    pub fn group_chain(&self, ty: &NamedType) -> Vec<(&NamedType, &Arc<VectorGroupType>)> {
        self.groups.chain(ty, |g| g.definition.original())
    }

    /// The dimension of a vector, taken from its root for specialized ones.
    /// `None` when no root is reachable.
    pub fn vector_dimension(&self, ty: &NamedType) -> Option<u32> {
        match &self.vector_chain(ty).last()?.1.definition {
            VectorDefinition::Base(vector) => Some(vector.dimension),
            VectorDefinition::Specialized(_) => None,
        }
    }
}

pub fn build(processed: &ProcessedPopulation, strategy: &dyn PopulationDiagnostics) -> Outcome<Populations> {
    let mut units = Vec::new();
    let mut scalars = Vec::new();
    let mut vectors = Vec::new();
    let mut groups = Vec::new();
    let mut members = Vec::new();
    let mut member_order = Vec::new();

    for bundle in &processed.types {
        units.extend(bundle.units.iter().map(|d| (bundle.ty.clone(), d.clone())));
        scalars.extend(bundle.scalars.iter().map(|d| (bundle.ty.clone(), d.clone())));
        vectors.extend(bundle.vectors.iter().map(|d| (bundle.ty.clone(), d.clone())));
        groups.extend(bundle.groups.iter().map(|d| (bundle.ty.clone(), d.clone())));
        for member in &bundle.members {
            members.push((bundle.ty.clone(), member.clone()));
            member_order.push(bundle.ty.clone());
        }
    }

    let mut populations = Populations {
        units: Population::fold(units),
        scalars: Population::fold(scalars),
        vectors: Population::fold(vectors),
        groups: Population::fold(groups),
        members: Population::fold(members),
        member_groups: BTreeMap::new(),
        members_by_group: BTreeMap::new(),
    };

    let mut diagnostics = Vec::new();
    report(strategy, &populations.units, DefinitionKind::Unit, &mut diagnostics);
    report(strategy, &populations.scalars, DefinitionKind::Scalar, &mut diagnostics);
    report(strategy, &populations.vectors, DefinitionKind::Vector, &mut diagnostics);
    report(strategy, &populations.groups, DefinitionKind::VectorGroup, &mut diagnostics);
    report(strategy, &populations.members, DefinitionKind::VectorGroupMember, &mut diagnostics);
    diagnostics.sort_by_key(|d| d.location);

    populations.member_groups = normalize_groups(&populations.members);
    member_order.dedup();
    for member in member_order {
        let Some(definition) = populations.members.get(&member) else {
            continue;
        };
        let Some(group) = populations.member_groups.get(&member) else {
            continue;
        };
        populations
            .members_by_group
            .entry(group.clone())
            .or_default()
            .entry(definition.definition.dimension)
            .or_insert(member);
    }

    Outcome::result_with(populations, diagnostics)
}

fn report<T>(
    strategy: &dyn PopulationDiagnostics,
    population: &Population<T>,
    kind: DefinitionKind,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (ty, locations) in &population.duplicates {
        diagnostics.extend(strategy.type_already_defined(ty, kind, locations));
    }
}

/// Follow `member → written group` while the written group is itself a
/// member. Chains longer than the member count are cycles and stop there.
fn normalize_groups(members: &Population<VectorGroupMemberType>) -> BTreeMap<NamedType, NamedType> {
    let limit = members.types.len();
    members
        .types
        .iter()
        .map(|(member, definition)| {
            let mut group = &definition.definition.group;
            let mut steps = 0;
            while let Some(next) = members.types.get(group) {
                if steps == limit {
                    break;
                }
                group = &next.definition.group;
                steps += 1;
            }
            (member.clone(), group.clone())
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::SourceMap;
    use crate::process::{self, ProcessingStrategies};
    use crate::{raw, scan};

    fn populate(source: &str) -> (Populations, Vec<Diagnostic>) {
        let mut map = SourceMap::new();
        map.add("test.cs", source);
        let scanned = scan::scan(&map);
        assert!(scanned.diagnostics.is_empty(), "{:?}", scanned.diagnostics);
        let raw = raw::build(&scanned.candidates);
        let (processed, mut diags) =
            process::process(&raw, &ProcessingStrategies::default()).into_parts();
        let processed = processed.unwrap_or_default();
        let (populations, more) = build(&processed, &DefaultPopulationDiagnostics).into_parts();
        diags.extend(more);
        (populations.unwrap_or_default(), diags)
    }

    fn ty(name: &str) -> NamedType {
        NamedType::new("", name, 0)
    }

    #[test]
    fn kinds_are_separated() {
        let (p, diags) = populate(
            r#"
            [SharpMeasuresUnit(typeof(Length))] partial class UnitOfLength { }
            [SharpMeasuresScalar(typeof(UnitOfLength))] partial class Length { }
            [SharpMeasuresVectorGroup(typeof(UnitOfLength))] partial class Position { }
            [SharpMeasuresVectorGroupMember(typeof(Position))] partial class Position3 { }
            [SharpMeasuresVector(typeof(UnitOfLength))] partial class Size2 { }
            "#,
        );
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(p.units.len(), 1);
        assert_eq!(p.scalars.len(), 1);
        assert_eq!(p.groups.len(), 1);
        assert_eq!(p.members.len(), 1);
        assert_eq!(p.vectors.len(), 1);
        assert_eq!(p.kind_of(&ty("Position3")), Some(DefinitionKind::VectorGroupMember));
        assert_eq!(p.group_members(&ty("Position")).and_then(|m| m.get(&3)), Some(&ty("Position3")));
    }

    #[test]
    fn partial_duplicates_reported_once() {
        let (p, diags) = populate(
            r#"
            [SharpMeasuresScalar(typeof(U))] partial class Length { }
            [SharpMeasuresScalar(typeof(U))] partial class Length { }
            [SharpMeasuresScalar(typeof(U))] partial class Length { }
            "#,
        );
        let e0500: Vec<_> = diags.iter().filter(|d| d.code == Some(codes::E0500)).collect();
        assert_eq!(e0500.len(), 1);
        assert_eq!(e0500[0].related.len(), 2);
        assert!(p.scalars.get(&ty("Length")).is_none());
        assert_eq!(p.scalars.duplicates[&ty("Length")].len(), 3);
        assert_eq!(p.kind_of(&ty("Length")), Some(DefinitionKind::Scalar));
    }

    #[test]
    fn resized_chains_reach_the_group() {
        let (p, diags) = populate(
            r#"
            [SharpMeasuresVectorGroup(typeof(UnitOfLength))] partial class Position { }
            [SharpMeasuresVectorGroupMember(typeof(Position))] partial class Position2 { }
            [ResizedSharpMeasuresVector(typeof(Position2))] partial class Position3 { }
            [ResizedSharpMeasuresVector(typeof(Position3))] partial class Position4 { }
            "#,
        );
        assert!(diags.is_empty());
        for member in ["Position2", "Position3", "Position4"] {
            assert_eq!(p.group_of(&ty(member)), Some(&ty("Position")));
        }
        assert_eq!(p.group_members(&ty("Position")).map(BTreeMap::len), Some(3));
    }

    #[test]
    fn first_member_per_dimension_wins() {
        let (p, _) = populate(
            r#"
            [SharpMeasuresVectorGroup(typeof(U))] partial class Position { }
            [SharpMeasuresVectorGroupMember(typeof(Position))] partial class Position3 { }
            [SharpMeasuresVectorGroupMember(typeof(Position), Dimension = 3)] partial class Place3 { }
            "#,
        );
        assert_eq!(
            p.group_members(&ty("Position")).and_then(|m| m.get(&3)),
            Some(&ty("Position3"))
        );
    }

    #[test]
    fn member_cycles_terminate() {
        let (p, _) = populate(
            r#"
            [SharpMeasuresVectorGroupMember(typeof(B2))] partial class A2 { }
            [SharpMeasuresVectorGroupMember(typeof(A2))] partial class B2 { }
            "#,
        );
        assert_eq!(p.member_groups.len(), 2);
    }

    #[test]
    fn specialization_chains_end_at_the_root() {
        let (p, diags) = populate(
            r#"
            [SharpMeasuresVector(typeof(UnitOfLength))] partial class Position3 { }
            [SpecializedSharpMeasuresVector(typeof(Position3))] partial class Displacement3 { }
            [SpecializedSharpMeasuresVector(typeof(Displacement3))] partial class Shift { }
            [SpecializedSharpMeasuresVector(typeof(Loop))] partial class Loop { }
            [SpecializedSharpMeasuresVector(typeof(Nowhere))] partial class Lost3 { }
            "#,
        );
        assert!(diags.is_empty(), "{:?}", diags);
        let names: Vec<_> = p.vector_chain(&ty("Shift")).iter().map(|(t, _)| t.name.clone()).collect();
        assert_eq!(names, vec!["Shift", "Displacement3", "Position3"]);
        assert_eq!(p.vector_dimension(&ty("Shift")), Some(3));
        assert_eq!(p.vector_chain(&ty("Loop")).len(), 1);
        assert_eq!(p.vector_dimension(&ty("Loop")), None);
        assert_eq!(p.vector_dimension(&ty("Lost3")), None);
    }
}
