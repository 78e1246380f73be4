// unit_list.rs — `[IncludeUnits]` / `[ExcludeUnits]` and base list processing

use std::collections::BTreeSet;

use serde::Serialize;

use super::{at, Processer, TypeContext};
use crate::diag::{codes, Diagnostic};
use crate::raw::{HasLocations, RawUnitList, UnitListKind, UnitListLocations};
use crate::types::{Location, NamedType};
use crate::validity::Outcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedUnitList {
    pub kind: UnitListKind,
    /// Unit instance names, first listing order, without repeats.
    pub items: Vec<String>,
    pub locations: UnitListLocations,
}

impl HasLocations for ProcessedUnitList {
    fn attribute_location(&self) -> Location {
        self.locations.attribute
    }
}

pub trait UnitListProcessingDiagnostics {
    fn empty_list(&self, ctx: &TypeContext, raw: &RawUnitList) -> Option<Diagnostic>;
    fn invalid_entry(&self, ctx: &TypeContext, raw: &RawUnitList, entry: Option<&str>) -> Option<Diagnostic>;
    fn duplicate_entry(&self, ctx: &TypeContext, raw: &RawUnitList, entry: &str) -> Option<Diagnostic>;
    fn contradictory(&self, ty: &NamedType, inclusions: &ProcessedUnitList, exclusions: &ProcessedUnitList) -> Option<Diagnostic>;
}

pub struct DefaultUnitListProcessingDiagnostics;

fn attribute_name(kind: UnitListKind) -> &'static str {
    match kind {
        UnitListKind::Include => "IncludeUnits",
        UnitListKind::Exclude => "ExcludeUnits",
        UnitListKind::IncludeBases => "IncludeBases",
        UnitListKind::ExcludeBases => "ExcludeBases",
    }
}

impl UnitListProcessingDiagnostics for DefaultUnitListProcessingDiagnostics {
    fn empty_list(&self, ctx: &TypeContext, raw: &RawUnitList) -> Option<Diagnostic> {
        Some(Diagnostic::warning(
            codes::W0304,
            raw.locations.attribute,
            format!("'{}' on '{}' lists no unit instances and has no effect", attribute_name(raw.kind), ctx.ty),
        ))
    }

    fn invalid_entry(&self, _ctx: &TypeContext, raw: &RawUnitList, entry: Option<&str>) -> Option<Diagnostic> {
        Some(Diagnostic::error(
            codes::E0101,
            at(raw.locations.items, raw.locations.attribute),
            format!(
                "'{}' entries must be non-empty unit instance names, found {}",
                attribute_name(raw.kind),
                entry.map_or_else(|| "null".to_string(), |e| format!("'{}'", e))
            ),
        ))
    }

    fn duplicate_entry(&self, _ctx: &TypeContext, raw: &RawUnitList, entry: &str) -> Option<Diagnostic> {
        Some(Diagnostic::warning(
            codes::W0305,
            at(raw.locations.items, raw.locations.attribute),
            format!("'{}' is listed more than once", entry),
        ))
    }

    fn contradictory(&self, ty: &NamedType, inclusions: &ProcessedUnitList, exclusions: &ProcessedUnitList) -> Option<Diagnostic> {
        Some(
            Diagnostic::warning(
                codes::W0306,
                exclusions.locations.attribute,
                format!(
                    "'{}' both uses '{}' and '{}'; the exclusions are ignored",
                    ty,
                    attribute_name(inclusions.kind),
                    attribute_name(exclusions.kind)
                ),
            )
            .with_related(inclusions.locations.attribute, "inclusions declared here"),
        )
    }
}

pub struct UnitListProcesser<'a> {
    diagnostics: &'a dyn UnitListProcessingDiagnostics,
}

impl<'a> UnitListProcesser<'a> {
    pub fn new(diagnostics: &'a dyn UnitListProcessingDiagnostics) -> Self {
        Self { diagnostics }
    }
}

impl Processer<TypeContext, RawUnitList, ProcessedUnitList> for UnitListProcesser<'_> {
    fn process(&self, ctx: &TypeContext, raw: &RawUnitList) -> Outcome<ProcessedUnitList> {
        let entries = raw.items.as_deref().unwrap_or_default();
        if entries.is_empty() {
            return Outcome::empty_with(self.diagnostics.empty_list(ctx, raw));
        }

        let mut diagnostics = Vec::new();
        let mut listed = BTreeSet::new();
        let mut items = Vec::new();
        for entry in entries {
            match entry.as_deref() {
                Some(name) if !name.is_empty() => {
                    if listed.insert(name) {
                        items.push(name.to_string());
                    } else {
                        diagnostics.extend(self.diagnostics.duplicate_entry(ctx, raw, name));
                    }
                }
                other => diagnostics.extend(self.diagnostics.invalid_entry(ctx, raw, other)),
            }
        }
        Outcome::result_with(
            ProcessedUnitList {
                kind: raw.kind,
                items,
                locations: raw.locations,
            },
            diagnostics,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, errors, only_type, process_source, warnings};
    use crate::raw::UnitListKind;

    #[test]
    fn entries_are_deduplicated() {
        let (processed, diags) = process_source(
            r#"[SharpMeasuresScalar(typeof(U))] [IncludeUnits("Metre", "Foot", "Metre", "", null)] partial class Length { }"#,
        );
        assert_eq!(codes(&diags), vec!["W0305", "E0101", "E0101"]);
        assert_eq!(warnings(&diags).len(), 1);
        assert_eq!(errors(&diags).len(), 2);
        let list = only_type(&processed).scalars[0].inclusions.clone();
        assert_eq!(list.map(|l| l.items), Some(vec!["Metre".to_string(), "Foot".to_string()]));
    }

    #[test]
    fn empty_list_is_dropped() {
        let (processed, diags) = process_source(
            "[SharpMeasuresScalar(typeof(U))] [ExcludeUnits] partial class Length { }",
        );
        assert_eq!(codes(&diags), vec!["W0304"]);
        assert!(only_type(&processed).scalars[0].exclusions.is_none());
    }

    #[test]
    fn base_lists_are_separate_from_unit_lists() {
        let (processed, diags) = process_source(
            r#"
            [SharpMeasuresScalar(typeof(U))]
            [IncludeUnits("Metre")]
            [IncludeBases("Metre", "Metre")]
            [ExcludeUnitBases("Foot")]
            partial class Length { }
            "#,
        );
        assert_eq!(codes(&diags), vec!["W0305", "W0306"]);
        let scalar = &only_type(&processed).scalars[0];
        assert_eq!(scalar.inclusions.as_ref().map(|l| l.items.len()), Some(1));
        assert_eq!(scalar.base_inclusions.as_ref().map(|l| l.kind), Some(UnitListKind::IncludeBases));
        assert!(scalar.base_exclusions.is_none());
    }
}
