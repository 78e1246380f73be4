// unit_instance.rs — Fixed, alias, derived, prefixed, scaled and biased unit instances
//
// Preconditions: the declaring type carries a unit.
// Postconditions: names and plurals are identifiers, unique per unit; the
//   default plural (`name + "s"`) and `[*]` substitution are applied.
// Failure modes: an invalid instance is dropped with a diagnostic.
// Side effects: none.

use std::collections::BTreeSet;

use serde::Serialize;

use super::{at, Processer};
use crate::diag::{codes, Diagnostic};
use crate::raw::{
    HasLocations, PrefixArg, RawUnitInstance, RawUnitInstanceKind, UnitInstanceKind,
    UnitInstanceLocations,
};
use crate::types::{Location, NamedType};
use crate::validity::{Outcome, Validity};

// ── Capabilities ─────────────────────────────────────────────────────────

pub trait HasName {
    fn name(&self) -> &str;
}

pub trait HasPlural {
    fn plural(&self) -> &str;
}

/// Instances defined in terms of another instance of the same unit.
pub trait HasOriginal {
    fn original(&self) -> Option<&str>;
}

// ── Prefixes ─────────────────────────────────────────────────────────────

const METRIC_PREFIXES: [(&str, i32); 25] = [
    ("Quetta", 30),
    ("Ronna", 27),
    ("Yotta", 24),
    ("Zetta", 21),
    ("Exa", 18),
    ("Peta", 15),
    ("Tera", 12),
    ("Giga", 9),
    ("Mega", 6),
    ("Kilo", 3),
    ("Hecto", 2),
    ("Deca", 1),
    ("Identity", 0),
    ("Deci", -1),
    ("Centi", -2),
    ("Milli", -3),
    ("Micro", -6),
    ("Nano", -9),
    ("Pico", -12),
    ("Femto", -15),
    ("Atto", -18),
    ("Zepto", -21),
    ("Yocto", -24),
    ("Ronto", -27),
    ("Quecto", -30),
];

/// Exponents of 1024.
const BINARY_PREFIXES: [(&str, i32); 9] = [
    ("Identity", 0),
    ("Kibi", 1),
    ("Mebi", 2),
    ("Gibi", 3),
    ("Tebi", 4),
    ("Pebi", 5),
    ("Exbi", 6),
    ("Zebi", 7),
    ("Yobi", 8),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Prefix {
    Metric { name: &'static str, exponent: i32 },
    Binary { name: &'static str, exponent: i32 },
}

impl Prefix {
    fn metric(name: &str) -> Option<Prefix> {
        METRIC_PREFIXES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(name, exponent)| Prefix::Metric { name, exponent })
    }

    fn binary(name: &str) -> Option<Prefix> {
        BINARY_PREFIXES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(name, exponent)| Prefix::Binary { name, exponent })
    }

    /// Raw integers index the metric table in declaration order.
    pub fn from_arg(arg: &PrefixArg) -> Option<Prefix> {
        match arg {
            PrefixArg::Metric(name) => Self::metric(name),
            PrefixArg::Binary(name) => Self::binary(name),
            PrefixArg::Unqualified(name) => Self::metric(name).or_else(|| Self::binary(name)),
            PrefixArg::Int(v) => usize::try_from(*v)
                .ok()
                .and_then(|i| METRIC_PREFIXES.get(i))
                .map(|&(name, exponent)| Prefix::Metric { name, exponent }),
        }
    }
}

// ── Processed form ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UnitInstanceDefinition {
    Fixed,
    Alias { original: String },
    Derived { derivation_id: Option<String>, units: Vec<String> },
    Prefixed { original: String, prefix: Prefix },
    Scaled { original: String, scale: f64 },
    Biased { original: String, bias: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedUnitInstance {
    pub name: String,
    pub plural: String,
    pub definition: UnitInstanceDefinition,
    pub locations: UnitInstanceLocations,
}

impl ProcessedUnitInstance {
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

impl HasName for ProcessedUnitInstance {
    fn name(&self) -> &str {
        &self.name
    }
}

impl HasPlural for ProcessedUnitInstance {
    fn plural(&self) -> &str {
        &self.plural
    }
}

impl HasOriginal for ProcessedUnitInstance {
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

impl HasLocations for ProcessedUnitInstance {
    fn attribute_location(&self) -> Location {
        self.locations.attribute
    }
}

// ── Context ──────────────────────────────────────────────────────────────

/// Names and plurals claimed so far on one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInstanceContext {
    pub ty: NamedType,
    pub names: BTreeSet<String>,
    pub plurals: BTreeSet<String>,
}

impl UnitInstanceContext {
    pub fn new(ty: NamedType) -> Self {
        Self {
            ty,
            names: BTreeSet::new(),
            plurals: BTreeSet::new(),
        }
    }
}

// ── Diagnostics ──────────────────────────────────────────────────────────

pub trait UnitInstanceProcessingDiagnostics {
    fn invalid_name(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance) -> Option<Diagnostic>;
    fn invalid_plural(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance, plural: Option<&str>) -> Option<Diagnostic>;
    fn duplicate_name(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance, name: &str) -> Option<Diagnostic>;
    fn duplicate_plural(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance, plural: &str) -> Option<Diagnostic>;
    fn invalid_original(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance) -> Option<Diagnostic>;
    fn modifies_itself(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance, name: &str) -> Option<Diagnostic>;
    fn unrecognized_prefix(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance) -> Option<Diagnostic>;
    fn invalid_scale(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance) -> Option<Diagnostic>;
    fn invalid_bias(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance) -> Option<Diagnostic>;
    fn invalid_unit_list(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance) -> Option<Diagnostic>;
}

pub struct DefaultUnitInstanceProcessingDiagnostics;

impl UnitInstanceProcessingDiagnostics for DefaultUnitInstanceProcessingDiagnostics {
    fn invalid_name(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0101,
            at(raw.locations.name, raw.locations.attribute),
            format!(
                "unit instance name on '{}' must be a non-empty identifier, found {}",
                ctx.ty,
                quoted(raw.name.as_deref())
            ),
        ))
    }

    fn invalid_plural(&self, _ctx: &UnitInstanceContext, raw: &RawUnitInstance, plural: Option<&str>) -> Option<Diagnostic> {
        Some(
            Diagnostic::error(
                codes::E0102,
                at(raw.locations.plural, raw.locations.attribute),
                format!(
                    "plural form of '{}' must be a non-empty identifier, found {}",
                    raw.name.as_deref().unwrap_or_default(),
                    quoted(plural)
                ),
            )
            .with_hint("`[*]` in a plural form is replaced by the singular name"),
        )
    }

    fn duplicate_name(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance, name: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0103,
            at(raw.locations.name, raw.locations.attribute),
            format!("unit '{}' already defines an instance named '{}'", ctx.ty, name),
        ))
    }

    fn duplicate_plural(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance, plural: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0104,
            at(raw.locations.plural, raw.locations.attribute),
            format!("unit '{}' already uses the plural form '{}'", ctx.ty, plural),
        ))
    }

    fn invalid_original(&self, _ctx: &UnitInstanceContext, raw: &RawUnitInstance) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0105,
            at(raw.locations.original, raw.locations.attribute),
            format!(
                "{:?} unit instance '{}' must name a non-empty original instance",
                raw.kind(),
                raw.name.as_deref().unwrap_or_default()
            ),
        ))
    }

    fn modifies_itself(&self, _ctx: &UnitInstanceContext, raw: &RawUnitInstance, name: &str) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0106,
            at(raw.locations.original, raw.locations.attribute),
            format!("unit instance '{}' is defined in terms of itself", name),
        ))
    }

    fn unrecognized_prefix(&self, _ctx: &UnitInstanceContext, raw: &RawUnitInstance) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0110,
            at(raw.locations.prefix, raw.locations.attribute),
            "unrecognized prefix; expected a MetricPrefixName or BinaryPrefixName member",
        ))
    }

    fn invalid_scale(&self, _ctx: &UnitInstanceContext, raw: &RawUnitInstance) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0107,
            at(raw.locations.scale, raw.locations.attribute),
            "scale must be finite and non-zero",
        ))
    }

    fn invalid_bias(&self, _ctx: &UnitInstanceContext, raw: &RawUnitInstance) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0108,
            at(raw.locations.bias, raw.locations.attribute),
            "bias must be finite",
        ))
    }

    fn invalid_unit_list(&self, _ctx: &UnitInstanceContext, raw: &RawUnitInstance) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0109,
            at(raw.locations.units, raw.locations.attribute),
            format!(
                "derived unit instance '{}' needs a non-empty list of unit instance names",
                raw.name.as_deref().unwrap_or_default()
            ),
        ))
    }
}

fn quoted(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("'{}'", v),
        None => "null".to_string(),
    }
}

pub(crate) fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Interpret a written plural form against its singular name.
pub fn interpret_plural(name: &str, written: Option<&str>) -> String {
    match written {
        None => format!("{}s", name),
        Some(form) => form.replace("[*]", name),
    }
}

// ── Processer ────────────────────────────────────────────────────────────

pub struct UnitInstanceProcesser<'a> {
    diagnostics: &'a dyn UnitInstanceProcessingDiagnostics,
}

impl<'a> UnitInstanceProcesser<'a> {
    pub fn new(diagnostics: &'a dyn UnitInstanceProcessingDiagnostics) -> Self {
        Self { diagnostics }
    }

    fn plural(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance, name: &str) -> Outcome<String> {
        if !raw.locations.explicitly_set_plural() {
            return Outcome::result(interpret_plural(name, None));
        }
        match raw.plural.as_deref() {
            Some(form) if !form.is_empty() => {
                let plural = interpret_plural(name, Some(form));
                if is_identifier(&plural) {
                    Outcome::result(plural)
                } else {
                    Outcome::empty_with(self.diagnostics.invalid_plural(ctx, raw, Some(&plural)))
                }
            }
            other => Outcome::empty_with(self.diagnostics.invalid_plural(ctx, raw, other)),
        }
    }

    fn original(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance, name: &str, original: Option<&str>) -> Outcome<String> {
        match original {
            Some(original) if !original.is_empty() => {
                if original == name {
                    Outcome::empty_with(self.diagnostics.modifies_itself(ctx, raw, name))
                } else {
                    Outcome::result(original.to_string())
                }
            }
            _ => Outcome::empty_with(self.diagnostics.invalid_original(ctx, raw)),
        }
    }

    fn definition(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance, name: &str) -> Outcome<UnitInstanceDefinition> {
        match &raw.definition {
            RawUnitInstanceKind::Fixed => Outcome::result(UnitInstanceDefinition::Fixed),
            RawUnitInstanceKind::Alias { original } => self
                .original(ctx, raw, name, original.as_deref())
                .map(|original| UnitInstanceDefinition::Alias { original }),
            RawUnitInstanceKind::Derived { derivation_id, units } => {
                let units = units.as_ref().filter(|u| {
                    !u.is_empty() && u.iter().all(|n| n.as_deref().is_some_and(|n| !n.is_empty()))
                });
                match units {
                    Some(units) => Outcome::result(UnitInstanceDefinition::Derived {
                        derivation_id: derivation_id.clone().filter(|id| !id.is_empty()),
                        units: units.iter().flatten().cloned().collect(),
                    }),
                    None => Outcome::empty_with(self.diagnostics.invalid_unit_list(ctx, raw)),
                }
            }
            RawUnitInstanceKind::Prefixed { original, prefix } => self
                .original(ctx, raw, name, original.as_deref())
                .and_then(|original| match prefix.as_ref().and_then(Prefix::from_arg) {
                    Some(prefix) => Outcome::result(UnitInstanceDefinition::Prefixed { original, prefix }),
                    None => Outcome::empty_with(self.diagnostics.unrecognized_prefix(ctx, raw)),
                }),
            RawUnitInstanceKind::Scaled { original, scale } => self
                .original(ctx, raw, name, original.as_deref())
                .and_then(|original| match scale {
                    Some(scale) if scale.is_finite() && *scale != 0.0 => {
                        Outcome::result(UnitInstanceDefinition::Scaled { original, scale: *scale })
                    }
                    _ => Outcome::empty_with(self.diagnostics.invalid_scale(ctx, raw)),
                }),
            RawUnitInstanceKind::Biased { original, bias } => self
                .original(ctx, raw, name, original.as_deref())
                .and_then(|original| match bias {
                    Some(bias) if bias.is_finite() => {
                        Outcome::result(UnitInstanceDefinition::Biased { original, bias: *bias })
                    }
                    _ => Outcome::empty_with(self.diagnostics.invalid_bias(ctx, raw)),
                }),
        }
    }
}

impl Processer<UnitInstanceContext, RawUnitInstance, ProcessedUnitInstance> for UnitInstanceProcesser<'_> {
    fn process(&self, ctx: &UnitInstanceContext, raw: &RawUnitInstance) -> Outcome<ProcessedUnitInstance> {
        let name = raw.name.as_deref().unwrap_or_default();
        Validity::conditional_without_diagnostics(raw.locations.explicitly_set_name())
            .validate(|| {
                Validity::conditional(is_identifier(name), || self.diagnostics.invalid_name(ctx, raw))
            })
            .merge(|| self.plural(ctx, raw, name))
            .and_then(|plural| {
                self.definition(ctx, raw, name).and_then(|definition| {
                    Validity::conditional(!ctx.names.contains(name), || {
                        self.diagnostics.duplicate_name(ctx, raw, name)
                    })
                    .validate(|| {
                        Validity::conditional(!ctx.plurals.contains(&plural), || {
                            self.diagnostics.duplicate_plural(ctx, raw, &plural)
                        })
                    })
                    .transform(|| ProcessedUnitInstance {
                        name: name.to_string(),
                        plural,
                        definition,
                        locations: raw.locations,
                    })
                })
            })
    }

    fn on_success(&self, ctx: &mut UnitInstanceContext, product: &ProcessedUnitInstance) {
        ctx.names.insert(product.name.clone());
        ctx.plurals.insert(product.plural.clone());
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, only_type, process_source};
    use super::*;

    fn instances(attributes: &str) -> (Vec<ProcessedUnitInstance>, Vec<&'static str>) {
        let source = format!(
            "[SharpMeasuresUnit(typeof(Length))] {} partial class UnitOfLength {{ }}",
            attributes
        );
        let (processed, diags) = process_source(&source);
        let instances = only_type(&processed).units[0].instances.clone();
        (instances, codes(&diags))
    }

    #[test]
    fn plural_defaults_and_substitution() {
        let (list, diags) = instances(
            r#"[FixedUnitInstance("Metre")] [UnitInstanceAlias("Foot", "Feet", "Metre")] [UnitInstanceAlias("Inch", "[*]es", "Foot")]"#,
        );
        assert!(diags.is_empty(), "{:?}", diags);
        let plurals: Vec<_> = list.iter().map(|i| i.plural()).collect();
        assert_eq!(plurals, vec!["Metres", "Feet", "Inches"]);
        assert_eq!(list[2].original(), Some("Foot"));
    }

    #[test]
    fn invalid_names_and_plurals() {
        let (list, diags) = instances(
            r#"
            [FixedUnitInstance("")]
            [UnitInstanceAlias("Two Words", "Metre")]
            [UnitInstanceAlias("Metre", null, "Foot")]
            [ScaledUnitInstance("Yard", "", "Foot", 0.9144)]
            "#,
        );
        assert!(list.is_empty());
        assert_eq!(diags, vec!["E0101", "E0101", "E0102", "E0102"]);
    }

    #[test]
    fn duplicate_plural_is_reported_after_name() {
        let (list, diags) = instances(
            r#"[FixedUnitInstance("Metre", "Metres")] [UnitInstanceAlias("Meter", "Metres", "Metre")]"#,
        );
        assert_eq!(list.len(), 1);
        assert_eq!(diags, vec!["E0104"]);
    }

    #[test]
    fn modified_instances() {
        let (list, diags) = instances(
            r#"
            [FixedUnitInstance("Metre")]
            [PrefixedUnitInstance("Kilometre", "Metre", MetricPrefixName.Kilo)]
            [PrefixedUnitInstance("Bad", "Metre", MetricPrefixName.Nope)]
            [ScaledUnitInstance("Mile", "Metre", 1609.344)]
            [ScaledUnitInstance("Zero", "Metre", 0)]
            [BiasedUnitInstance("Shifted", "Metre", -1.5)]
            [UnitInstanceAlias("Self", "Self")]
            [UnitInstanceAlias("Orphan", "")]
            "#,
        );
        let names: Vec<_> = list.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["Metre", "Kilometre", "Mile", "Shifted"]);
        assert_eq!(diags, vec!["E0110", "E0107", "E0106", "E0105"]);
        assert_eq!(
            list[1].definition,
            UnitInstanceDefinition::Prefixed {
                original: "Metre".into(),
                prefix: Prefix::Metric { name: "Kilo", exponent: 3 },
            }
        );
    }

    #[test]
    fn derived_unit_lists() {
        let (list, diags) = instances(
            r#"
            [DerivedUnitInstance("MetrePerSecond", new[] { "Metre", "Second" })]
            [DerivedUnitInstance("Empty", new string[] { })]
            [DerivedUnitInstance("Holey", new[] { "Metre", null })]
            "#,
        );
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].kind(), UnitInstanceKind::Derived);
        assert_eq!(diags, vec!["E0109", "E0109"]);
    }

    #[test]
    fn prefix_lookup() {
        assert_eq!(
            Prefix::from_arg(&PrefixArg::Unqualified("Mebi".into())),
            Some(Prefix::Binary { name: "Mebi", exponent: 2 })
        );
        assert_eq!(
            Prefix::from_arg(&PrefixArg::Int(9)),
            Some(Prefix::Metric { name: "Kilo", exponent: 3 })
        );
        assert_eq!(Prefix::from_arg(&PrefixArg::Int(-1)), None);
        assert_eq!(Prefix::from_arg(&PrefixArg::Binary("Kilo".into())), None);
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("Metre"));
        assert!(is_identifier("_m2"));
        assert!(!is_identifier("2m"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
    }
}
