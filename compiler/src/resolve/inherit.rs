// inherit.rs — What specialized quantities take over from their originals
//
// A chain lists a quantity and the originals it specializes, nearest first,
// ending at its root. Single-valued fields take the nearest written value;
// collections (included units, bases, constants, conversions) fold from the
// root down, each level starting from its parent's result when it inherits
// that collection.
//
// Preconditions: chains from `Populations::*_chain`; unit instance names
//   from resolved units.
// Postconditions: only the declaring level (the first of the chain) reports
//   diagnostics. Originals were reported at their own declarations.
// Failure modes: none. Invalid entries are dropped with a diagnostic.
// Side effects: none.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use super::{
    default_unit_instance, lookup, unit_list, Handle, QuantityRef, ResolutionContext, ResolutionDiagnostics,
};
use crate::diag::Diagnostic;
use crate::population::{DefinitionKind, Population};
use crate::process::constant::{ConstantValue, ProcessedConstant};
use crate::process::conversion::{CastOperatorBehaviour, ConversionDirection, ProcessedConversion};
use crate::process::quantity::DefaultUnitInstance;
use crate::process::unit_list::ProcessedUnitList;
use crate::process::{at, ScalarType, VectorGroupMemberType, VectorGroupType, VectorType};
use crate::raw::{Inheritance, QuantityLocations};
use crate::types::{Location, NamedType};
use crate::validity::Outcome;

/// One level of a specialization chain.
pub type Level<'p, T> = (&'p NamedType, &'p Arc<T>);

// ── Resolved forms ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConstant {
    /// The quantity that declared the constant.
    pub owner: NamedType,
    pub name: String,
    pub unit_instance_name: String,
    pub value: ConstantValue,
    pub multiples: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConversion {
    /// The quantity that declared the conversion.
    pub owner: NamedType,
    pub quantity: QuantityRef,
    pub direction: ConversionDirection,
    pub cast_operator_behaviour: CastOperatorBehaviour,
}

// ── Chain levels ─────────────────────────────────────────────────────────

/// The inheritable collections of one definition bundle.
pub trait Inheriting {
    /// `None` for roots.
    fn inheritance(&self) -> Option<Inheritance>;
    fn inclusions(&self) -> Option<&ProcessedUnitList>;
    fn exclusions(&self) -> Option<&ProcessedUnitList>;
    fn constants(&self) -> &[ProcessedConstant];
    fn conversions(&self) -> &[ProcessedConversion];
}

impl Inheriting for ScalarType {
    fn inheritance(&self) -> Option<Inheritance> {
        self.definition.inheritance()
    }
    fn inclusions(&self) -> Option<&ProcessedUnitList> {
        self.inclusions.as_ref()
    }
    fn exclusions(&self) -> Option<&ProcessedUnitList> {
        self.exclusions.as_ref()
    }
    fn constants(&self) -> &[ProcessedConstant] {
        &self.constants
    }
    fn conversions(&self) -> &[ProcessedConversion] {
        &self.conversions
    }
}

impl Inheriting for VectorType {
    fn inheritance(&self) -> Option<Inheritance> {
        self.definition.inheritance()
    }
    fn inclusions(&self) -> Option<&ProcessedUnitList> {
        self.inclusions.as_ref()
    }
    fn exclusions(&self) -> Option<&ProcessedUnitList> {
        self.exclusions.as_ref()
    }
    fn constants(&self) -> &[ProcessedConstant] {
        &self.constants
    }
    fn conversions(&self) -> &[ProcessedConversion] {
        &self.conversions
    }
}

impl Inheriting for VectorGroupType {
    fn inheritance(&self) -> Option<Inheritance> {
        self.definition.inheritance()
    }
    fn inclusions(&self) -> Option<&ProcessedUnitList> {
        self.inclusions.as_ref()
    }
    fn exclusions(&self) -> Option<&ProcessedUnitList> {
        self.exclusions.as_ref()
    }
    fn constants(&self) -> &[ProcessedConstant] {
        &[]
    }
    fn conversions(&self) -> &[ProcessedConversion] {
        &self.conversions
    }
}

impl Inheriting for VectorGroupMemberType {
    fn inheritance(&self) -> Option<Inheritance> {
        None
    }
    fn inclusions(&self) -> Option<&ProcessedUnitList> {
        self.inclusions.as_ref()
    }
    fn exclusions(&self) -> Option<&ProcessedUnitList> {
        self.exclusions.as_ref()
    }
    fn constants(&self) -> &[ProcessedConstant] {
        &self.constants
    }
    fn conversions(&self) -> &[ProcessedConversion] {
        &self.conversions
    }
}

fn inherits<T: Inheriting>(level: &T, flag: impl Fn(Inheritance) -> bool) -> bool {
    level.inheritance().is_some_and(flag)
}

// ── Walking chains ───────────────────────────────────────────────────────

/// The written original of a specialized quantity. It must be declared as
/// `kind`, and its chain must end at a root (`rooted`). `None` for roots.
#[allow(clippy::too_many_arguments)]
pub fn original<T>(
    strategy: &dyn ResolutionDiagnostics,
    ctx: &ResolutionContext,
    kind: DefinitionKind,
    population: &Population<T>,
    original: Option<&NamedType>,
    locations: &QuantityLocations,
    rooted: bool,
) -> Outcome<Option<Handle<T>>> {
    let Some(original) = original else {
        return Outcome::result(None);
    };
    let location = at(locations.original_quantity, locations.attribute);
    lookup(ctx.populations, kind, population, original, || {
        strategy.original_not_quantity(ctx, location, original, kind)
    })
    .and_then(|handle| {
        if rooted {
            Outcome::result(Some(handle))
        } else {
            Outcome::empty_with(strategy.root_not_resolved(ctx, location))
        }
    })
}

/// The first value along `chain`, nearest first. Returning `Some(None)`
/// for a written value that failed to resolve stops the walk there.
pub fn nearest<T, V>(
    chain: &[Level<T>],
    diagnostics: &mut Vec<Diagnostic>,
    mut value: impl FnMut(&T, &mut Vec<Diagnostic>) -> Option<V>,
) -> Option<V> {
    for (index, (_, level)) in chain.iter().enumerate() {
        let mut scratch = Vec::new();
        let sink = if index == 0 { &mut *diagnostics } else { &mut scratch };
        if let Some(found) = value(level, sink) {
            return Some(found);
        }
    }
    None
}

/// The nearest written flag; unwritten everywhere means `true`.
pub fn flag<T>(chain: &[Level<T>], value: impl Fn(&T) -> Option<bool>) -> bool {
    chain.iter().find_map(|(_, level)| value(level)).unwrap_or(true)
}

/// The nearest written default unit instance, if `unit` defines it.
pub fn default_instance<T>(
    strategy: &dyn ResolutionDiagnostics,
    ctx: &ResolutionContext,
    unit: &NamedType,
    chain: &[Level<T>],
    pick: impl Fn(&T) -> (Option<&DefaultUnitInstance>, &QuantityLocations),
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<DefaultUnitInstance> {
    nearest(chain, diagnostics, |level, sink| {
        let (default, l) = pick(level);
        let location = at(l.default_unit_instance_name, l.attribute);
        default.map(|default| default_unit_instance(strategy, ctx, unit, Some(default), location, sink))
    })
    .flatten()
}

/// Fold `chain` from the root down; each step sees its parent's result.
pub fn fold_down<T, A>(
    chain: &[Level<T>],
    diagnostics: &mut Vec<Diagnostic>,
    mut step: impl FnMut(Option<A>, &NamedType, &T, &mut Vec<Diagnostic>) -> A,
) -> Option<A> {
    let mut acc = None;
    for (index, (ty, level)) in chain.iter().enumerate().rev() {
        let mut scratch = Vec::new();
        let sink = if index == 0 { &mut *diagnostics } else { &mut scratch };
        acc = Some(step(acc, ty, level, sink));
    }
    acc
}

// ── Unit sets ────────────────────────────────────────────────────────────

/// Narrow `start` by one level's lists, keeping `start`'s order.
pub fn apply_lists(
    strategy: &dyn ResolutionDiagnostics,
    ctx: &ResolutionContext,
    unit: &NamedType,
    mut start: Vec<String>,
    inclusions: Option<&ProcessedUnitList>,
    exclusions: Option<&ProcessedUnitList>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<String> {
    if let Some(list) = inclusions {
        let included = unit_list(strategy, ctx, unit, list, diagnostics);
        start.retain(|name| included.contains(name));
    }
    if let Some(list) = exclusions {
        let excluded = unit_list(strategy, ctx, unit, list, diagnostics);
        start.retain(|name| !excluded.contains(name));
    }
    start
}

/// The unit instances a chain's declaring quantity includes. `lists` picks
/// the lists of a level and `flag` the inheritance flag that passes the
/// parent's set down.
pub fn unit_set<T: Inheriting>(
    strategy: &dyn ResolutionDiagnostics,
    ctx: &ResolutionContext,
    unit: &NamedType,
    chain: &[Level<T>],
    lists: impl Fn(&T) -> (Option<&ProcessedUnitList>, Option<&ProcessedUnitList>),
    flag: impl Fn(Inheritance) -> bool + Copy,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<String> {
    fold_down(chain, diagnostics, |parent, _, level, sink| {
        let start = match parent {
            Some(parent) if inherits(level, flag) => parent,
            _ => ctx.instance_names(unit),
        };
        let (inclusions, exclusions) = lists(level);
        apply_lists(strategy, ctx, unit, start, inclusions, exclusions, sink)
    })
    .unwrap_or_default()
}

// ── Constants ────────────────────────────────────────────────────────────

/// Names a constant or its multiples may not take: the plural of every
/// included unit instance, plus `One{name}` for every base.
pub fn reserved_names(ctx: &ResolutionContext, unit: &NamedType, units: &[String], bases: &[String]) -> BTreeSet<String> {
    units
        .iter()
        .filter_map(|name| ctx.plural(unit, name).map(str::to_string))
        .chain(bases.iter().map(|name| format!("One{}", name)))
        .collect()
}

fn claims<'c>(constant: &'c ResolvedConstant) -> impl Iterator<Item = &'c str> {
    std::iter::once(constant.name.as_str()).chain(constant.multiples.as_deref())
}

/// Own constants first, then inherited ones.
pub fn constants<T: Inheriting>(
    strategy: &dyn ResolutionDiagnostics,
    ctx: &ResolutionContext,
    unit: &NamedType,
    chain: &[Level<T>],
    reserved: &BTreeSet<String>,
    dimension: Option<u32>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ResolvedConstant> {
    fold_down(chain, diagnostics, |parent, ty, level, sink| {
        let inherited = match parent {
            Some(parent) if inherits(level, |i| i.constants) => parent,
            _ => Vec::new(),
        };
        let mut resolved: Vec<ResolvedConstant> = level
            .constants()
            .iter()
            .filter(|constant| own_constant(strategy, ctx, unit, constant, &inherited, reserved, dimension, sink))
            .map(|constant| ResolvedConstant {
                owner: ty.clone(),
                name: constant.name.clone(),
                unit_instance_name: constant.unit_instance_name.clone(),
                value: constant.value.clone(),
                multiples: constant.multiples.clone(),
            })
            .collect();
        resolved.extend(inherited);
        resolved
    })
    .unwrap_or_default()
}

#[allow(clippy::too_many_arguments)]
fn own_constant(
    strategy: &dyn ResolutionDiagnostics,
    ctx: &ResolutionContext,
    unit: &NamedType,
    constant: &ProcessedConstant,
    inherited: &[ResolvedConstant],
    reserved: &BTreeSet<String>,
    dimension: Option<u32>,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let l = &constant.locations;
    if !ctx.has_instance(unit, &constant.unit_instance_name) {
        let location = at(l.unit_instance_name, l.attribute);
        diagnostics.extend(strategy.unrecognized_unit_instance(ctx, location, unit, &constant.unit_instance_name));
        return false;
    }

    let own = [Some(constant.name.as_str()), constant.multiples.as_deref()];
    for (claim, location) in own.into_iter().zip([l.name, l.multiples]) {
        let Some(claim) = claim else { continue };
        let location = at(location, l.attribute);
        if reserved.contains(claim) {
            diagnostics.extend(strategy.constant_shares_name_with_unit(ctx, location, claim));
            return false;
        }
        if inherited.iter().flat_map(claims).any(|taken| taken == claim) {
            diagnostics.extend(strategy.constant_already_inherited(ctx, location, claim));
            return false;
        }
    }

    if let (ConstantValue::Vector(components), Some(dimension)) = (&constant.value, dimension) {
        if components.len() != dimension as usize {
            let location = at(l.value, l.attribute);
            diagnostics.extend(strategy.constant_dimension(ctx, location, &constant.name, dimension, components.len()));
            return false;
        }
    }
    true
}

// ── Conversions ──────────────────────────────────────────────────────────

/// Own conversions first, then inherited ones. `target` resolves one listed
/// quantity. Inherited conversions to a level itself, or to a quantity the
/// level already lists, are dropped.
pub fn conversions<T: Inheriting>(
    chain: &[Level<T>],
    diagnostics: &mut Vec<Diagnostic>,
    mut target: impl FnMut(&NamedType, Location, &mut Vec<Diagnostic>) -> Option<QuantityRef>,
) -> Vec<ResolvedConversion> {
    fold_down(chain, diagnostics, |parent, ty, level, sink| {
        let mut resolved = own_conversions(ty, level.conversions(), &mut target, sink);
        if let Some(parent) = parent.filter(|_| inherits(level, |i| i.conversions)) {
            extend_unlisted(&mut resolved, ty, parent);
        }
        resolved
    })
    .unwrap_or_default()
}

pub fn own_conversions(
    owner: &NamedType,
    declared: &[ProcessedConversion],
    target: &mut impl FnMut(&NamedType, Location, &mut Vec<Diagnostic>) -> Option<QuantityRef>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ResolvedConversion> {
    declared
        .iter()
        .flat_map(|conversion| {
            let location = at(conversion.locations.quantities, conversion.locations.attribute);
            conversion
                .quantities
                .iter()
                .map(move |quantity| (conversion, quantity, location))
        })
        .filter_map(|(conversion, quantity, location)| {
            target(quantity, location, diagnostics).map(|quantity| ResolvedConversion {
                owner: owner.clone(),
                quantity,
                direction: conversion.direction,
                cast_operator_behaviour: conversion.cast_operator_behaviour,
            })
        })
        .collect()
}

/// Append `more`, skipping conversions to `ty` and to quantities already
/// listed.
pub fn extend_unlisted(resolved: &mut Vec<ResolvedConversion>, ty: &NamedType, more: Vec<ResolvedConversion>) {
    for conversion in more {
        let target = conversion.quantity.ty();
        if target != ty && resolved.iter().all(|c| c.quantity.ty() != target) {
            resolved.push(conversion);
        }
    }
}
