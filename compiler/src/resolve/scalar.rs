// scalar.rs — Scalar quantity resolution
//
// Preconditions: unit instance names come from resolved units.
// Postconditions: a specialized scalar carries its root's unit.
// Failure modes: mutual exclusion, a missing unit, or an original that does
//   not reach a base scalar drop the definition.
// Side effects: none.

use std::sync::Arc;

use serde::Serialize;

use super::inherit::{self, nearest, Level, ResolvedConstant, ResolvedConversion};
use super::{exclusive, lookup, optional, Handle, QuantityRef, ResolutionContext, ResolutionDiagnostics, Resolver};
use crate::diag::Diagnostic;
use crate::population::DefinitionKind;
use crate::process::at;
use crate::process::quantity::{DefaultUnitInstance, PowerQuantities, ScalarDefinition};
use crate::process::{ScalarType, UnitType, VectorGroupType};
use crate::raw::{Inheritance, QuantityLocations};
use crate::types::{Location, NamedType};
use crate::validity::Outcome;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedPowers {
    pub reciprocal: Option<Handle<ScalarType>>,
    pub square: Option<Handle<ScalarType>>,
    pub cube: Option<Handle<ScalarType>>,
    pub square_root: Option<Handle<ScalarType>>,
    pub cube_root: Option<Handle<ScalarType>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedScalar {
    pub ty: NamedType,
    /// The scalar this one specializes.
    pub original: Option<Handle<ScalarType>>,
    pub inheritance: Option<Inheritance>,
    pub unit: Handle<UnitType>,
    pub vector: Option<Handle<VectorGroupType>>,
    pub use_unit_bias: bool,
    pub implement_sum: bool,
    pub implement_difference: bool,
    /// The nearest written difference, else the root. `None` when
    /// differences are not implemented or the written one failed.
    pub difference: Option<Handle<ScalarType>>,
    pub default_unit_instance: Option<DefaultUnitInstance>,
    pub powers: ResolvedPowers,
    /// Included unit instances, in declaration order.
    pub units: Vec<String>,
    /// Unit instances with a `One{name}` base property.
    pub bases: Vec<String>,
    pub constants: Vec<ResolvedConstant>,
    pub conversions: Vec<ResolvedConversion>,
    pub locations: QuantityLocations,
}

fn power_of<'s>(
    scalar: &'s ScalarType,
    ty: impl Fn(&PowerQuantities) -> &Option<NamedType>,
    location: impl Fn(&QuantityLocations) -> Option<Location>,
) -> (Option<&'s NamedType>, Option<Location>) {
    let definition = &scalar.definition;
    (ty(definition.powers()).as_ref(), location(definition.locations()))
}

pub struct ScalarResolver<'a> {
    diagnostics: &'a dyn ResolutionDiagnostics,
}

impl<'a> ScalarResolver<'a> {
    pub fn new(diagnostics: &'a dyn ResolutionDiagnostics) -> Self {
        Self { diagnostics }
    }

    fn scalar(
        &self,
        ctx: &ResolutionContext,
        ty: &NamedType,
        location: Option<Location>,
        attribute: Location,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<Handle<ScalarType>> {
        optional(
            ctx.populations,
            DefinitionKind::Scalar,
            &ctx.populations.scalars,
            Some(ty),
            diagnostics,
            |ty| self.diagnostics.type_not_scalar(ctx, at(location, attribute), ty),
        )
    }

    /// The nearest written power of the chain, looked up as a scalar.
    fn power(
        &self,
        ctx: &ResolutionContext,
        chain: &[Level<ScalarType>],
        pick: impl Fn(&ScalarType) -> (Option<&NamedType>, Option<Location>),
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<Handle<ScalarType>> {
        nearest(chain, diagnostics, |level, sink| {
            let (ty, location) = pick(level);
            let attribute = level.definition.locations().attribute;
            ty.map(|ty| self.scalar(ctx, ty, location, attribute, sink))
        })
        .flatten()
    }
}

impl Resolver<ResolutionContext<'_>, Arc<ScalarType>, ResolvedScalar> for ScalarResolver<'_> {
    fn resolve(&self, ctx: &ResolutionContext, scalar: &Arc<ScalarType>) -> Outcome<ResolvedScalar> {
        let definition = &scalar.definition;
        let locations = *definition.locations();
        let attribute = locations.attribute;
        let populations = ctx.populations;
        let chain = populations.scalar_chain(&ctx.ty);

        exclusive(self.diagnostics, ctx, DefinitionKind::Scalar, attribute)
            .merge(|| {
                let rooted = matches!(chain.last(), Some((_, root)) if matches!(root.definition, ScalarDefinition::Base(_)));
                inherit::original(
                    self.diagnostics,
                    ctx,
                    DefinitionKind::Scalar,
                    &populations.scalars,
                    definition.original(),
                    &locations,
                    rooted,
                )
            })
            .and_then(|original| {
                let Some((root_ty, root)) = chain.last().copied() else {
                    return Outcome::empty();
                };
                let ScalarDefinition::Base(base) = &root.definition else {
                    return Outcome::empty();
                };
                let is_root = original.is_none();

                // Unit failures of a specialized scalar are reported on its root.
                let mut diagnostics = Vec::new();
                let Some(unit) = lookup(populations, DefinitionKind::Unit, &populations.units, &base.unit, || {
                    if is_root {
                        self.diagnostics.type_not_unit(ctx, at(locations.unit, attribute), &base.unit)
                    } else {
                        None
                    }
                })
                .drain_into(&mut diagnostics) else {
                    return Outcome::empty_with_all(diagnostics);
                };

                let use_unit_bias = base.use_unit_bias && unit.get().definition.bias_term;
                if is_root && base.use_unit_bias && !use_unit_bias {
                    diagnostics.extend(self.diagnostics.unit_lacks_bias_term(
                        ctx,
                        at(locations.use_unit_bias, attribute),
                        unit.ty(),
                    ));
                }

                let vector = nearest(&chain, &mut diagnostics, |level, sink| {
                    let l = level.definition.locations();
                    level.definition.vector().map(|ty| {
                        optional(
                            populations,
                            DefinitionKind::VectorGroup,
                            &populations.groups,
                            Some(ty),
                            sink,
                            |ty| self.diagnostics.type_not_vector_group(ctx, at(l.vector, l.attribute), ty),
                        )
                    })
                })
                .flatten();

                let implement_sum = inherit::flag(&chain, |s| s.definition.implement_sum());
                let implement_difference = inherit::flag(&chain, |s| s.definition.implement_difference());
                let difference = if implement_difference {
                    nearest(&chain, &mut diagnostics, |level, sink| {
                        let l = level.definition.locations();
                        level
                            .definition
                            .difference()
                            .map(|ty| self.scalar(ctx, ty, l.difference, l.attribute, sink))
                    })
                    .unwrap_or_else(|| Some(Handle::new(root_ty.clone(), Arc::clone(root))))
                } else {
                    None
                };

                let powers = ResolvedPowers {
                    reciprocal: self.power(ctx, &chain, |s| power_of(s, |p| &p.reciprocal, |l| l.reciprocal), &mut diagnostics),
                    square: self.power(ctx, &chain, |s| power_of(s, |p| &p.square, |l| l.square), &mut diagnostics),
                    cube: self.power(ctx, &chain, |s| power_of(s, |p| &p.cube, |l| l.cube), &mut diagnostics),
                    square_root: self.power(ctx, &chain, |s| power_of(s, |p| &p.square_root, |l| l.square_root), &mut diagnostics),
                    cube_root: self.power(ctx, &chain, |s| power_of(s, |p| &p.cube_root, |l| l.cube_root), &mut diagnostics),
                };

                let default_unit_instance = inherit::default_instance(
                    self.diagnostics,
                    ctx,
                    unit.ty(),
                    &chain,
                    |s| (s.definition.default_unit_instance(), s.definition.locations()),
                    &mut diagnostics,
                );

                let units = inherit::unit_set(
                    self.diagnostics,
                    ctx,
                    unit.ty(),
                    &chain,
                    |s| (s.inclusions.as_ref(), s.exclusions.as_ref()),
                    |i| i.units,
                    &mut diagnostics,
                );
                let bases = inherit::unit_set(
                    self.diagnostics,
                    ctx,
                    unit.ty(),
                    &chain,
                    |s| (s.base_inclusions.as_ref(), s.base_exclusions.as_ref()),
                    |i| i.bases,
                    &mut diagnostics,
                );
                let reserved = inherit::reserved_names(ctx, unit.ty(), &units, &bases);
                let constants = inherit::constants(self.diagnostics, ctx, unit.ty(), &chain, &reserved, None, &mut diagnostics);
                let conversions = inherit::conversions(&chain, &mut diagnostics, |ty, location, sink| {
                    self.scalar(ctx, ty, Some(location), location, sink).map(QuantityRef::Scalar)
                });

                Outcome::result_with(
                    ResolvedScalar {
                        ty: ctx.ty.clone(),
                        original,
                        inheritance: definition.inheritance(),
                        unit,
                        vector,
                        use_unit_bias,
                        implement_sum,
                        implement_difference,
                        difference,
                        default_unit_instance,
                        powers,
                        units,
                        bases,
                        constants,
                        conversions,
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
    use super::super::tests::{codes, resolve_source, LENGTH};
    use super::super::ResolvedUnitSystem;
    use super::ResolvedScalar;

    fn length_with(properties: &str, extra: &str) -> String {
        format!(
            r#"
            [SharpMeasuresUnit(typeof(Length))]
            [FixedUnitInstance("Metre")]
            [PrefixedUnitInstance("Kilometre", "Metre", MetricPrefixName.Kilo)]
            partial class UnitOfLength {{ }}
            [SharpMeasuresScalar(typeof(UnitOfLength){})]
            {}
            partial class Length {{ }}
            "#,
            properties, extra
        )
    }

    #[test]
    fn difference_defaults_to_self() {
        let (system, diags) = resolve_source(LENGTH);
        assert!(diags.is_empty(), "{:?}", diags);
        let length = &system.scalars[0];
        assert_eq!(length.difference.as_ref().map(|d| d.ty().to_string()), Some("Length".into()));
        assert!(length.powers.square.is_none());
    }

    #[test]
    fn disabled_difference_is_none() {
        let (system, _) = resolve_source(&length_with(", ImplementDifference = false", ""));
        assert!(system.scalars[0].difference.is_none());
    }

    #[test]
    fn optional_references_clear_on_failure() {
        let (system, diags) = resolve_source(&length_with(
            ", Vector = typeof(Length), Square = typeof(UnitOfLength), Difference = typeof(Nothing)",
            "",
        ));
        assert_eq!(codes(&diags), vec!["E0512", "E0511", "E0511"]);
        let length = &system.scalars[0];
        assert!(length.vector.is_none());
        assert!(length.powers.square.is_none());
        assert!(length.difference.is_none());
    }

    #[test]
    fn unit_must_be_unit() {
        let (system, diags) = resolve_source("[SharpMeasuresScalar(typeof(Length))] partial class Length { }");
        assert_eq!(codes(&diags), vec!["E0510"]);
        assert!(system.scalars.is_empty());
    }

    #[test]
    fn unit_bias_needs_bias_term() {
        let (system, diags) = resolve_source(&length_with(", UseUnitBias = true", ""));
        assert_eq!(codes(&diags), vec!["E0203"]);
        assert!(!system.scalars[0].use_unit_bias);
    }

    #[test]
    fn default_unit_and_lists_name_resolved_instances() {
        let (system, diags) = resolve_source(&length_with(
            r#", DefaultUnitInstanceName = "Foot", DefaultUnitInstanceSymbol = "ft""#,
            r#"[IncludeUnits("Metre", "Inch", "Kilometre")]"#,
        ));
        assert_eq!(codes(&diags), vec!["E0201", "E0201"]);
        let length = &system.scalars[0];
        assert!(length.default_unit_instance.is_none());
        assert_eq!(length.units, vec!["Metre".to_string(), "Kilometre".to_string()]);
        assert_eq!(length.bases, length.units);
    }

    const SPECIALIZED: &str = r#"
        [SharpMeasuresUnit(typeof(Length))]
        [FixedUnitInstance("Metre")]
        [PrefixedUnitInstance("Kilometre", "Metre", MetricPrefixName.Kilo)]
        partial class UnitOfLength { }
        [SharpMeasuresScalar(typeof(UnitOfLength), ImplementSum = false)]
        [ExcludeUnits("Kilometre")]
        [ScalarConstant("Planck", "Metre", 1.616255E-35)]
        [ConvertibleQuantity(typeof(Distance))]
        partial class Length { }
        [SpecializedSharpMeasuresScalar(typeof(Length), InheritConversions = false)]
        partial class Distance { }
        [SpecializedSharpMeasuresScalar(typeof(Distance), InheritUnits = false, DefaultUnitInstanceName = "Kilometre", DefaultUnitInstanceSymbol = "km")]
        partial class Height { }
    "#;

    fn scalar<'s>(system: &'s ResolvedUnitSystem, name: &str) -> &'s ResolvedScalar {
        system
            .scalars
            .iter()
            .find(|s| s.ty.name == name)
            .unwrap_or_else(|| panic!("no scalar {}", name))
    }

    #[test]
    fn specialized_scalars_follow_their_root() {
        let (system, diags) = resolve_source(SPECIALIZED);
        assert!(diags.is_empty(), "{:?}", diags);

        let distance = scalar(&system, "Distance");
        assert_eq!(distance.original.as_ref().map(|o| o.ty().name.as_str()), Some("Length"));
        assert_eq!(distance.unit.ty().name, "UnitOfLength");
        assert!(!distance.implement_sum);
        assert_eq!(distance.difference.as_ref().map(|d| d.ty().name.as_str()), Some("Length"));
        assert_eq!(distance.units, vec!["Metre".to_string()]);
        assert_eq!(distance.constants.len(), 1);
        assert_eq!(distance.constants[0].owner.name, "Length");
        assert!(distance.conversions.is_empty());

        let height = scalar(&system, "Height");
        assert_eq!(height.units, vec!["Metre".to_string(), "Kilometre".to_string()]);
        assert_eq!(height.default_unit_instance.as_ref().map(|d| d.symbol.as_str()), Some("km"));
        assert!(height.conversions.is_empty(), "Distance drops what Length declares");

        let length = scalar(&system, "Length");
        assert!(length.original.is_none());
        let targets: Vec<_> = length.conversions.iter().map(|c| c.quantity.ty().name.as_str()).collect();
        assert_eq!(targets, vec!["Distance"]);
    }

    #[test]
    fn originals_must_reach_a_base_scalar() {
        let (system, diags) = resolve_source(&format!(
            "{}{}",
            LENGTH,
            r#"
            [SpecializedSharpMeasuresScalar(typeof(UnitOfLength))]
            partial class Odd { }
            [SpecializedSharpMeasuresScalar(typeof(Ping))]
            partial class Pong { }
            [SpecializedSharpMeasuresScalar(typeof(Pong))]
            partial class Ping { }
            "#
        ));
        let mut found = codes(&diags);
        found.sort_unstable();
        assert_eq!(found, vec!["E0610", "E0611", "E0611"]);
        let names: Vec<_> = system.scalars.iter().map(|s| s.ty.name.as_str()).collect();
        assert_eq!(names, vec!["Length"]);
    }

    #[test]
    fn constants_avoid_unit_names_and_inherited_constants() {
        let (system, diags) = resolve_source(
            r#"
            [SharpMeasuresUnit(typeof(Length))]
            [FixedUnitInstance("Metre")]
            partial class UnitOfLength { }
            [SharpMeasuresScalar(typeof(UnitOfLength))]
            [ScalarConstant("Planck", "Metre", 1.616255E-35)]
            [ScalarConstant("Metres", "Metre", 2, GenerateMultiplesProperty = false)]
            [ScalarConstant("Huge", "Metre", 1000000000, Multiples = "OneMetre")]
            [ScalarConstant("Bogus", "Furlong", 1)]
            partial class Length { }
            [SpecializedSharpMeasuresScalar(typeof(Length))]
            [ScalarConstant("Planck", "Metre", 3)]
            [ScalarConstant("Mile", "Metre", 1609.344)]
            partial class Distance { }
            "#,
        );
        let mut found = codes(&diags);
        found.sort_unstable();
        assert_eq!(found, vec!["E0201", "E0613", "E0613", "E0614"]);

        let owners: Vec<_> = scalar(&system, "Distance")
            .constants
            .iter()
            .map(|c| (c.name.as_str(), c.owner.name.as_str()))
            .collect();
        assert_eq!(owners, vec![("Mile", "Distance"), ("Planck", "Length")]);
    }

    #[test]
    fn bases_narrow_independently_of_units() {
        let (system, diags) = resolve_source(&length_with(
            "",
            r#"[IncludeUnits("Metre")] [ExcludeBases("Metre")]"#,
        ));
        assert!(diags.is_empty(), "{:?}", diags);
        let length = &system.scalars[0];
        assert_eq!(length.units, vec!["Metre".to_string()]);
        assert_eq!(length.bases, vec!["Kilometre".to_string()]);
    }

    #[test]
    fn conversions_must_target_scalars() {
        let (system, diags) = resolve_source(&length_with("", "[ConvertibleQuantity(typeof(UnitOfLength))]"));
        assert_eq!(codes(&diags), vec!["E0511"]);
        assert!(system.scalars[0].conversions.is_empty());
    }
}
