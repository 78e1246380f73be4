// unit.rs — Unit resolution
//
// Resolves a unit's quantity, the signatures of its derivations, and its
// instances. Modified instances (alias, prefixed, scaled, biased) resolve
// once their original has; the remainder after the fixpoint either names an
// unknown instance, depends on a dropped one, or sits on a cycle.
//
// Preconditions: `ctx.ty` is a clean unit key.
// Postconditions: every instance's original is also in `instances`; every
//   derived instance names instances of its signature units.
// Failure modes: an unresolvable quantity drops the unit; bad instances and
//   derivations are dropped individually.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use super::{lookup, Handle, ResolutionContext, ResolutionDiagnostics, Resolver};
use crate::diag::{codes, Diagnostic};
use crate::population::DefinitionKind;
use crate::process::at;
use crate::process::derivable::ProcessedDerivableUnit;
use crate::process::unit_instance::{
    HasName, HasOriginal, HasPlural, ProcessedUnitInstance, UnitInstanceDefinition,
};
use crate::process::{ScalarType, UnitType};
use crate::raw::{DerivableUnitLocations, UnitInstanceLocations, UnitInstanceKind};
use crate::types::NamedType;
use crate::validity::Outcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedDerivation {
    pub derivation_id: Option<String>,
    pub expression: String,
    pub signature: Vec<Handle<UnitType>>,
    pub permutations: bool,
    pub locations: DerivableUnitLocations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedUnitInstance {
    pub name: String,
    pub plural: String,
    /// For derived instances the id names the derivation actually used.
    pub definition: UnitInstanceDefinition,
    pub locations: UnitInstanceLocations,
}

impl ResolvedUnitInstance {
    fn from_processed(instance: &ProcessedUnitInstance) -> Self {
        Self {
            name: instance.name.clone(),
            plural: instance.plural.clone(),
            definition: instance.definition.clone(),
            locations: instance.locations,
        }
    }

    pub fn kind(&self) -> UnitInstanceKind {
        match self.definition {
            UnitInstanceDefinition::Fixed => UnitInstanceKind::Fixed,
            UnitInstanceDefinition::Alias { .. } => UnitInstanceKind::Alias,
            UnitInstanceDefinition::Derived { .. } => UnitInstanceKind::Derived,
            UnitInstanceDefinition::Prefixed { .. } => UnitInstanceKind::Prefixed,
            UnitInstanceDefinition::Scaled { .. } => UnitInstanceKind::Scaled,
            UnitInstanceDefinition::Biased { .. } => UnitInstanceKind::Biased,
        }
    }
}

impl HasName for ResolvedUnitInstance {
    fn name(&self) -> &str {
        &self.name
    }
}

impl HasPlural for ResolvedUnitInstance {
    fn plural(&self) -> &str {
        &self.plural
    }
}

impl HasOriginal for ResolvedUnitInstance {
    fn original(&self) -> Option<&str> {
        match &self.definition {
            UnitInstanceDefinition::Alias { original }
            | UnitInstanceDefinition::Prefixed { original, .. }
            | UnitInstanceDefinition::Scaled { original, .. }
            | UnitInstanceDefinition::Biased { original, .. } => Some(original),
            UnitInstanceDefinition::Fixed | UnitInstanceDefinition::Derived { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedUnit {
    pub ty: NamedType,
    pub quantity: Handle<ScalarType>,
    pub bias_term: bool,
    /// Declaration order.
    pub instances: Vec<ResolvedUnitInstance>,
    pub derivations: Vec<ResolvedDerivation>,
}

impl ResolvedUnit {
    pub fn instance(&self, name: &str) -> Option<&ResolvedUnitInstance> {
        self.instances.iter().find(|i| i.name == name)
    }
}

// ── Diagnostics ──────────────────────────────────────────────────────────

pub trait UnitResolutionDiagnostics {
    fn unrecognized_original(&self, ctx: &ResolutionContext, instance: &ProcessedUnitInstance, original: &str) -> Option<Diagnostic>;
    fn cyclic_dependency(&self, ctx: &ResolutionContext, instance: &ProcessedUnitInstance) -> Option<Diagnostic>;
    fn unrecognized_derivation(&self, ctx: &ResolutionContext, instance: &ProcessedUnitInstance, id: Option<&str>) -> Option<Diagnostic>;
    fn ambiguous_derivation(&self, ctx: &ResolutionContext, instance: &ProcessedUnitInstance, candidates: usize) -> Option<Diagnostic>;
    fn unit_list_size(&self, ctx: &ResolutionContext, instance: &ProcessedUnitInstance, expected: usize, found: usize) -> Option<Diagnostic>;
}

pub struct DefaultUnitResolutionDiagnostics;

impl UnitResolutionDiagnostics for DefaultUnitResolutionDiagnostics {
    fn unrecognized_original(&self, ctx: &ResolutionContext, instance: &ProcessedUnitInstance, original: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0201,
            at(instance.locations.original, instance.locations.attribute),
            format!("unit '{}' has no instance named '{}'", ctx.ty, original),
        ))
    }

    fn cyclic_dependency(&self, ctx: &ResolutionContext, instance: &ProcessedUnitInstance) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0202,
            at(instance.locations.original, instance.locations.attribute),
            format!(
                "unit instance '{}' of '{}' depends on itself through its originals",
                instance.name, ctx.ty
            ),
        ))
    }

    fn unrecognized_derivation(&self, ctx: &ResolutionContext, instance: &ProcessedUnitInstance, id: Option<&str>) -> Option<Diagnostic> {
        let message = match id {
            Some(id) => format!("unit '{}' has no derivation with id '{}'", ctx.ty, id),
            None => format!("unit '{}' declares no derivation for '{}'", ctx.ty, instance.name),
        };
        Some(Diagnostic::error(
            codes::E0204,
            at(instance.locations.derivation_id, instance.locations.attribute),
            message,
        ))
    }

    fn ambiguous_derivation(&self, ctx: &ResolutionContext, instance: &ProcessedUnitInstance, candidates: usize) -> Option<Diagnostic> {
        Some(
            Diagnostic::error(
                codes::E0205,
                instance.locations.attribute,
                format!(
                    "'{}' does not name a derivation and '{}' declares {}",
                    instance.name, ctx.ty, candidates
                ),
            )
            .with_hint("set `DerivationID` to choose one"),
        )
    }

    fn unit_list_size(&self, _ctx: &ResolutionContext, instance: &ProcessedUnitInstance, expected: usize, found: usize) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0206,
            at(instance.locations.units, instance.locations.attribute),
            format!(
                "'{}' lists {} unit instances, the derivation expects {}",
                instance.name, found, expected
            ),
        ))
    }
}

// ── Resolver ─────────────────────────────────────────────────────────────

pub struct UnitResolver<'a> {
    common: &'a dyn ResolutionDiagnostics,
    diagnostics: &'a dyn UnitResolutionDiagnostics,
}

impl<'a> UnitResolver<'a> {
    pub fn new(common: &'a dyn ResolutionDiagnostics, diagnostics: &'a dyn UnitResolutionDiagnostics) -> Self {
        Self { common, diagnostics }
    }

    fn derivation(&self, ctx: &ResolutionContext, derivation: &ProcessedDerivableUnit) -> Outcome<ResolvedDerivation> {
        let location = at(derivation.locations.signature, derivation.locations.attribute);
        let mut diagnostics = Vec::new();
        let signature: Vec<_> = derivation
            .signature
            .iter()
            .map(|unit| {
                lookup(ctx.populations, DefinitionKind::Unit, &ctx.populations.units, unit, || {
                    self.common.type_not_unit(ctx, location, unit)
                })
                .drain_into(&mut diagnostics)
            })
            .collect();
        let Some(signature) = signature.into_iter().collect::<Option<Vec<_>>>() else {
            return Outcome::empty_with_all(diagnostics);
        };
        Outcome::result_with(
            ResolvedDerivation {
                derivation_id: derivation.derivation_id.clone(),
                expression: derivation.expression.clone(),
                signature,
                permutations: derivation.permutations,
                locations: derivation.locations,
            },
            diagnostics,
        )
    }

    fn derived(
        &self,
        ctx: &ResolutionContext,
        unit: &UnitType,
        derivations: &[ResolvedDerivation],
        instance: &ProcessedUnitInstance,
        id: Option<&str>,
        units: &[String],
    ) -> Outcome<ResolvedUnitInstance> {
        let chosen = match id {
            Some(id) => {
                if !unit.derivations.iter().any(|d| d.derivation_id.as_deref() == Some(id)) {
                    return Outcome::empty_with(self.diagnostics.unrecognized_derivation(ctx, instance, Some(id)));
                }
                derivations.iter().find(|d| d.derivation_id.as_deref() == Some(id))
            }
            None => match unit.derivations.len() {
                0 => return Outcome::empty_with(self.diagnostics.unrecognized_derivation(ctx, instance, None)),
                1 => derivations.first(),
                n => return Outcome::empty_with(self.diagnostics.ambiguous_derivation(ctx, instance, n)),
            },
        };
        // The derivation exists but failed resolution; already reported.
        let Some(derivation) = chosen else {
            return Outcome::empty();
        };

        if derivation.signature.len() != units.len() {
            return Outcome::empty_with(self.diagnostics.unit_list_size(
                ctx,
                instance,
                derivation.signature.len(),
                units.len(),
            ));
        }

        let location = at(instance.locations.units, instance.locations.attribute);
        let unknown: Vec<Diagnostic> = derivation
            .signature
            .iter()
            .zip(units)
            .filter(|(unit, name)| !unit.get().instances.iter().any(|i| &i.name == *name))
            .filter_map(|(unit, name)| self.common.unrecognized_unit_instance(ctx, location, unit.ty(), name))
            .collect();
        if !unknown.is_empty() {
            return Outcome::empty_with_all(unknown);
        }

        let mut resolved = ResolvedUnitInstance::from_processed(instance);
        resolved.definition = UnitInstanceDefinition::Derived {
            derivation_id: derivation.derivation_id.clone(),
            units: units.to_vec(),
        };
        Outcome::result(resolved)
    }
}

impl Resolver<ResolutionContext<'_>, Arc<UnitType>, ResolvedUnit> for UnitResolver<'_> {
    fn resolve(&self, ctx: &ResolutionContext, unit: &Arc<UnitType>) -> Outcome<ResolvedUnit> {
        let definition = &unit.definition;
        let quantity_location = at(definition.locations.quantity, definition.locations.attribute);
        let mut diagnostics = Vec::new();

        let Some(quantity) = lookup(
            ctx.populations,
            DefinitionKind::Scalar,
            &ctx.populations.scalars,
            &definition.quantity,
            || self.common.type_not_scalar(ctx, quantity_location, &definition.quantity),
        )
        .drain_into(&mut diagnostics) else {
            return Outcome::empty_with_all(diagnostics);
        };

        let derivations: Vec<ResolvedDerivation> = unit
            .derivations
            .iter()
            .filter_map(|d| self.derivation(ctx, d).drain_into(&mut diagnostics))
            .collect();

        let declared: BTreeSet<&str> = unit.instances.iter().map(|i| i.name.as_str()).collect();
        let mut resolved: BTreeMap<&str, ResolvedUnitInstance> = BTreeMap::new();
        let mut pending: Vec<&ProcessedUnitInstance> = Vec::new();

        for instance in &unit.instances {
            match &instance.definition {
                UnitInstanceDefinition::Fixed => {
                    resolved.insert(&instance.name, ResolvedUnitInstance::from_processed(instance));
                }
                UnitInstanceDefinition::Derived { derivation_id, units } => {
                    if let Some(r) = self
                        .derived(ctx, unit, &derivations, instance, derivation_id.as_deref(), units)
                        .drain_into(&mut diagnostics)
                    {
                        resolved.insert(&instance.name, r);
                    }
                }
                UnitInstanceDefinition::Biased { .. } if !definition.bias_term => {
                    let location = at(instance.locations.bias, instance.locations.attribute);
                    diagnostics.extend(self.common.unit_lacks_bias_term(ctx, location, &ctx.ty));
                }
                _ => pending.push(instance),
            }
        }

        // Resolve modified instances once their original has.
        loop {
            let (ready, waiting): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|i| i.original().is_some_and(|o| resolved.contains_key(o)));
            pending = waiting;
            if ready.is_empty() {
                break;
            }
            for instance in ready {
                resolved.insert(&instance.name, ResolvedUnitInstance::from_processed(instance));
            }
        }

        let waiting: BTreeMap<&str, &str> = pending
            .iter()
            .filter_map(|i| Some((i.name.as_str(), i.original()?)))
            .collect();
        for instance in &pending {
            let Some(original) = instance.original() else {
                continue;
            };
            if !declared.contains(original) {
                diagnostics.extend(self.diagnostics.unrecognized_original(ctx, instance, original));
            } else if on_cycle(&waiting, &instance.name) {
                diagnostics.extend(self.diagnostics.cyclic_dependency(ctx, instance));
            }
        }

        let instances = unit
            .instances
            .iter()
            .filter_map(|i| resolved.remove(i.name.as_str()))
            .collect();

        Outcome::result_with(
            ResolvedUnit {
                ty: ctx.ty.clone(),
                quantity,
                bias_term: definition.bias_term,
                instances,
                derivations,
            },
            diagnostics,
        )
    }
}

/// Whether following originals from `start` through unresolved instances
/// returns to `start`. Chains that leave `waiting` end at a dropped instance.
fn on_cycle(waiting: &BTreeMap<&str, &str>, start: &str) -> bool {
    let mut current = start;
    for _ in 0..waiting.len() {
        match waiting.get(current) {
            Some(&next) if next == start => return true,
            Some(&next) => current = next,
            None => return false,
        }
    }
    false
}

// ── Tests ────────────────────────────────────────────────────────────────
