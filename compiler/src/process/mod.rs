// process — Single-definition validation
//
// One processer per definition kind. Each validates a raw definition in
// isolation and produces its processed form. Reservation sets (instance
// names, derivation IDs, operation names, constant names, listed
// conversions) live in per-type contexts that are only touched through
// `Processer::on_success`, inside an ordered fold.
//
// Preconditions: `RawType` bundles from `raw::build`.
// Postconditions: every processed definition satisfies its single-definition
//   invariants; the first of two conflicting claims wins.
// Failure modes: none at the Rust level. Invalid definitions are dropped
//   and reported as diagnostics.
// Side effects: none.

pub mod constant;
pub mod conversion;
pub mod derivable;
pub mod operation;
pub mod quantity;
pub mod unit;
pub mod unit_instance;
pub mod unit_list;

use serde::Serialize;

use crate::diag::Diagnostic;
use crate::raw::{HasLocations, RawConstant, RawPopulation, RawType, RawUnitList};
use crate::types::{Location, NamedType};
use crate::validity::Outcome;

use constant::{
    ConstantContext, ConstantProcesser, ConstantProcessingDiagnostics, DefaultConstantProcessingDiagnostics,
    ProcessedConstant,
};
use conversion::{
    ConversionContext, ConversionProcesser, ConversionProcessingDiagnostics,
    DefaultConversionProcessingDiagnostics, ProcessedConversion,
};
use derivable::{
    DefaultDerivableUnitProcessingDiagnostics, DerivableUnitContext, DerivableUnitProcesser,
    DerivableUnitProcessingDiagnostics, ProcessedDerivableUnit,
};
use operation::{
    DefaultVectorOperationProcessingDiagnostics, ProcessedVectorOperation,
    VectorOperationContext, VectorOperationProcesser, VectorOperationProcessingDiagnostics,
};
use quantity::{
    DefaultQuantityProcessingDiagnostics, ProcessedVectorGroupMember, QuantityProcessingDiagnostics,
    ScalarDefinition, ScalarProcesser, SpecializedScalarProcesser, SpecializedVectorProcesser,
    VectorDefinition, VectorGroupDefinition, VectorGroupMemberProcesser, VectorGroupProcesser,
    VectorProcesser,
};
use unit::{DefaultUnitProcessingDiagnostics, ProcessedUnit, UnitProcesser, UnitProcessingDiagnostics};
use unit_instance::{
    DefaultUnitInstanceProcessingDiagnostics, ProcessedUnitInstance, UnitInstanceContext,
    UnitInstanceProcesser, UnitInstanceProcessingDiagnostics,
};
use unit_list::{
    DefaultUnitListProcessingDiagnostics, ProcessedUnitList, UnitListProcesser,
    UnitListProcessingDiagnostics,
};

// ── Processer seam ───────────────────────────────────────────────────────

pub trait Processer<Ctx, Raw, Product> {
    fn process(&self, ctx: &Ctx, raw: &Raw) -> Outcome<Product>;

    /// Register the claims of a successful product.
    fn on_success(&self, _ctx: &mut Ctx, _product: &Product) {}
}

/// Folds a list of raw definitions through a processer, in order.
pub struct ProcessingFilter<'a, P> {
    processer: &'a P,
}

impl<'a, P> ProcessingFilter<'a, P> {
    pub fn new(processer: &'a P) -> Self {
        Self { processer }
    }

    pub fn filter<Ctx, Raw, Product>(&self, ctx: &mut Ctx, raws: &[Raw]) -> Outcome<Vec<Product>>
    where
        P: Processer<Ctx, Raw, Product>,
    {
        let mut products = Vec::new();
        let mut diagnostics = Vec::new();
        for raw in raws {
            if let Some(product) = self.processer.process(ctx, raw).drain_into(&mut diagnostics) {
                self.processer.on_success(ctx, &product);
                products.push(product);
            }
        }
        Outcome::result_with(products, diagnostics)
    }
}

/// Declaring-type context for processers without reservations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeContext {
    pub ty: NamedType,
}

impl TypeContext {
    pub fn new(ty: NamedType) -> Self {
        Self { ty }
    }
}

/// Location of a field if it was written, else of its attribute.
pub(crate) fn at(field: Option<Location>, attribute: Location) -> Location {
    field.unwrap_or(attribute)
}

// ── Diagnostics strategies ───────────────────────────────────────────────

/// The diagnostic strategy of every processer.
#[derive(Clone, Copy)]
pub struct ProcessingStrategies<'a> {
    pub unit: &'a dyn UnitProcessingDiagnostics,
    pub unit_instance: &'a dyn UnitInstanceProcessingDiagnostics,
    pub derivable: &'a dyn DerivableUnitProcessingDiagnostics,
    pub quantity: &'a dyn QuantityProcessingDiagnostics,
    pub operation: &'a dyn VectorOperationProcessingDiagnostics,
    pub unit_list: &'a dyn UnitListProcessingDiagnostics,
    pub constant: &'a dyn ConstantProcessingDiagnostics,
    pub conversion: &'a dyn ConversionProcessingDiagnostics,
}

impl Default for ProcessingStrategies<'static> {
    fn default() -> Self {
        Self {
            unit: &DefaultUnitProcessingDiagnostics,
            unit_instance: &DefaultUnitInstanceProcessingDiagnostics,
            derivable: &DefaultDerivableUnitProcessingDiagnostics,
            quantity: &DefaultQuantityProcessingDiagnostics,
            operation: &DefaultVectorOperationProcessingDiagnostics,
            unit_list: &DefaultUnitListProcessingDiagnostics,
            constant: &DefaultConstantProcessingDiagnostics,
            conversion: &DefaultConversionProcessingDiagnostics,
        }
    }
}

// ── Processed bundles ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitType {
    pub definition: ProcessedUnit,
    pub instances: Vec<ProcessedUnitInstance>,
    pub derivations: Vec<ProcessedDerivableUnit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarType {
    pub definition: ScalarDefinition,
    pub inclusions: Option<ProcessedUnitList>,
    pub exclusions: Option<ProcessedUnitList>,
    pub base_inclusions: Option<ProcessedUnitList>,
    pub base_exclusions: Option<ProcessedUnitList>,
    pub constants: Vec<ProcessedConstant>,
    pub conversions: Vec<ProcessedConversion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorType {
    pub definition: VectorDefinition,
    pub inclusions: Option<ProcessedUnitList>,
    pub exclusions: Option<ProcessedUnitList>,
    pub constants: Vec<ProcessedConstant>,
    pub conversions: Vec<ProcessedConversion>,
    pub operations: Vec<ProcessedVectorOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorGroupType {
    pub definition: VectorGroupDefinition,
    pub inclusions: Option<ProcessedUnitList>,
    pub exclusions: Option<ProcessedUnitList>,
    pub conversions: Vec<ProcessedConversion>,
    pub operations: Vec<ProcessedVectorOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorGroupMemberType {
    pub definition: ProcessedVectorGroupMember,
    pub inclusions: Option<ProcessedUnitList>,
    pub exclusions: Option<ProcessedUnitList>,
    pub constants: Vec<ProcessedConstant>,
    pub conversions: Vec<ProcessedConversion>,
    pub operations: Vec<ProcessedVectorOperation>,
}

macro_rules! bundle_located {
    ($($ty:ty),*) => {
        $(impl HasLocations for $ty {
            fn attribute_location(&self) -> Location {
                self.definition.attribute_location()
            }
        })*
    };
}

bundle_located!(UnitType, ScalarType, VectorType, VectorGroupType, VectorGroupMemberType);

/// Every processed definition attached to one declared type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedType {
    pub ty: NamedType,
    pub location: Location,
    pub units: Vec<UnitType>,
    pub scalars: Vec<ScalarType>,
    pub vectors: Vec<VectorType>,
    pub groups: Vec<VectorGroupType>,
    pub members: Vec<VectorGroupMemberType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessedPopulation {
    pub types: Vec<ProcessedType>,
}

// ── Driver ───────────────────────────────────────────────────────────────

/// Process every bundle, in order.
pub fn process(raw: &RawPopulation, strategies: &ProcessingStrategies) -> Outcome<ProcessedPopulation> {
    let mut diagnostics = Vec::new();
    let types = raw
        .types
        .iter()
        .filter_map(|bundle| process_type(bundle, strategies).drain_into(&mut diagnostics))
        .collect();
    Outcome::result_with(ProcessedPopulation { types }, diagnostics)
}

/// Process one bundle. Depends on nothing outside `raw`.
pub fn process_type(raw: &RawType, strategies: &ProcessingStrategies) -> Outcome<ProcessedType> {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let ctx = TypeContext::new(raw.ty.clone());

    let units: Vec<ProcessedUnit> = ProcessingFilter::new(&UnitProcesser::new(strategies.unit))
        .filter(&mut ctx.clone(), &raw.units)
        .drain_into(&mut diagnostics)
        .unwrap_or_default();
    // Base definitions come before specialized ones of the same kind.
    let mut scalars: Vec<ScalarDefinition> =
        ProcessingFilter::new(&ScalarProcesser::new(strategies.quantity))
            .filter(&mut ctx.clone(), &raw.scalars)
            .drain_into(&mut diagnostics)
            .unwrap_or_default()
            .into_iter()
            .map(ScalarDefinition::Base)
            .collect();
    scalars.extend(
        ProcessingFilter::new(&SpecializedScalarProcesser::new(strategies.quantity))
            .filter(&mut ctx.clone(), &raw.specialized_scalars)
            .drain_into(&mut diagnostics)
            .unwrap_or_default()
            .into_iter()
            .map(ScalarDefinition::Specialized),
    );
    let specialized = SpecializedVectorProcesser::new(strategies.quantity);
    let mut vectors: Vec<VectorDefinition> =
        ProcessingFilter::new(&VectorProcesser::new(strategies.quantity))
            .filter(&mut ctx.clone(), &raw.vectors)
            .drain_into(&mut diagnostics)
            .unwrap_or_default()
            .into_iter()
            .map(VectorDefinition::Base)
            .collect();
    vectors.extend(
        ProcessingFilter::new(&specialized)
            .filter(&mut ctx.clone(), &raw.specialized_vectors)
            .drain_into(&mut diagnostics)
            .unwrap_or_default()
            .into_iter()
            .map(VectorDefinition::Specialized),
    );
    let mut groups: Vec<VectorGroupDefinition> =
        ProcessingFilter::new(&VectorGroupProcesser::new(strategies.quantity))
            .filter(&mut ctx.clone(), &raw.groups)
            .drain_into(&mut diagnostics)
            .unwrap_or_default()
            .into_iter()
            .map(VectorGroupDefinition::Base)
            .collect();
    groups.extend(
        ProcessingFilter::new(&specialized)
            .filter(&mut ctx.clone(), &raw.specialized_groups)
            .drain_into(&mut diagnostics)
            .unwrap_or_default()
            .into_iter()
            .map(VectorGroupDefinition::Specialized),
    );
    let members: Vec<ProcessedVectorGroupMember> =
        ProcessingFilter::new(&VectorGroupMemberProcesser::new(strategies.quantity))
            .filter(&mut ctx.clone(), &raw.members)
            .drain_into(&mut diagnostics)
            .unwrap_or_default();

    // Secondaries are processed once and shared by every primary.
    let (instances, derivations) = if units.is_empty() {
        (Vec::new(), Vec::new())
    } else {
        let bias_term = units.first().is_some_and(|u| u.bias_term);
        let mut instance_ctx = UnitInstanceContext::new(raw.ty.clone());
        let instances = ProcessingFilter::new(&UnitInstanceProcesser::new(strategies.unit_instance))
            .filter(&mut instance_ctx, &raw.instances)
            .drain_into(&mut diagnostics)
            .unwrap_or_default();
        let mut derivable_ctx =
            DerivableUnitContext::new(raw.ty.clone(), bias_term, raw.derivations.len() > 1);
        let derivations = ProcessingFilter::new(&DerivableUnitProcesser::new(strategies.derivable))
            .filter(&mut derivable_ctx, &raw.derivations)
            .drain_into(&mut diagnostics)
            .unwrap_or_default();
        (instances, derivations)
    };

    let quantity_declared =
        !(scalars.is_empty() && vectors.is_empty() && groups.is_empty() && members.is_empty());
    let (inclusions, exclusions) = if quantity_declared {
        unit_lists(raw, &raw.inclusions, &raw.exclusions, strategies.unit_list, &mut diagnostics)
    } else {
        (None, None)
    };
    let (base_inclusions, base_exclusions) = if scalars.is_empty() {
        (None, None)
    } else {
        unit_lists(raw, &raw.base_inclusions, &raw.base_exclusions, strategies.unit_list, &mut diagnostics)
    };

    // Scalar and vector constants share one namespace per type.
    let constant_processer = ConstantProcesser::new(strategies.constant);
    let mut constant_ctx = ConstantContext::new(raw.ty.clone());
    let mut constants_of = |scalar: bool, present: bool, diagnostics: &mut Vec<Diagnostic>| -> Vec<ProcessedConstant> {
        if !present {
            return Vec::new();
        }
        let raws: Vec<RawConstant> = raw.constants.iter().filter(|c| c.is_scalar() == scalar).cloned().collect();
        ProcessingFilter::new(&constant_processer)
            .filter(&mut constant_ctx, &raws)
            .drain_into(diagnostics)
            .unwrap_or_default()
    };
    let scalar_constants = constants_of(true, !scalars.is_empty(), &mut diagnostics);
    let vector_constants = constants_of(false, !(vectors.is_empty() && members.is_empty()), &mut diagnostics);

    let conversions: Vec<ProcessedConversion> = if quantity_declared {
        let mut conversion_ctx = ConversionContext::new(raw.ty.clone());
        ProcessingFilter::new(&ConversionProcesser::new(strategies.conversion))
            .filter(&mut conversion_ctx, &raw.conversions)
            .drain_into(&mut diagnostics)
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let vector_like = !(vectors.is_empty() && groups.is_empty() && members.is_empty());
    let operations: Vec<ProcessedVectorOperation> = if vector_like {
        let mut op_ctx = VectorOperationContext::new(raw.ty.clone());
        ProcessingFilter::new(&VectorOperationProcesser::new(strategies.operation))
            .filter(&mut op_ctx, &raw.operations)
            .drain_into(&mut diagnostics)
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let processed = ProcessedType {
        ty: raw.ty.clone(),
        location: raw.location,
        units: units
            .into_iter()
            .map(|definition| UnitType {
                definition,
                instances: instances.clone(),
                derivations: derivations.clone(),
            })
            .collect(),
        scalars: scalars
            .into_iter()
            .map(|definition| ScalarType {
                definition,
                inclusions: inclusions.clone(),
                exclusions: exclusions.clone(),
                base_inclusions: base_inclusions.clone(),
                base_exclusions: base_exclusions.clone(),
                constants: scalar_constants.clone(),
                conversions: conversions.clone(),
            })
            .collect(),
        vectors: vectors
            .into_iter()
            .map(|definition| VectorType {
                definition,
                inclusions: inclusions.clone(),
                exclusions: exclusions.clone(),
                constants: vector_constants.clone(),
                conversions: conversions.clone(),
                operations: operations.clone(),
            })
            .collect(),
        groups: groups
            .into_iter()
            .map(|definition| VectorGroupType {
                definition,
                inclusions: inclusions.clone(),
                exclusions: exclusions.clone(),
                conversions: conversions.clone(),
                operations: operations.clone(),
            })
            .collect(),
        members: members
            .into_iter()
            .map(|definition| VectorGroupMemberType {
                definition,
                inclusions: inclusions.clone(),
                exclusions: exclusions.clone(),
                constants: vector_constants.clone(),
                conversions: conversions.clone(),
                operations: operations.clone(),
            })
            .collect(),
    };
    Outcome::result_with(processed, diagnostics)
}

/// The first valid inclusion and exclusion list; inclusions win over
/// exclusions.
fn unit_lists(
    raw: &RawType,
    include: &[RawUnitList],
    exclude: &[RawUnitList],
    strategy: &dyn UnitListProcessingDiagnostics,
    diagnostics: &mut Vec<Diagnostic>,
) -> (Option<ProcessedUnitList>, Option<ProcessedUnitList>) {
    let processer = UnitListProcesser::new(strategy);
    let filter = ProcessingFilter::new(&processer);
    let mut ctx = TypeContext::new(raw.ty.clone());
    let inclusions = filter
        .filter(&mut ctx, include)
        .drain_into(diagnostics)
        .and_then(|lists| lists.into_iter().next());
    let exclusions = filter
        .filter(&mut ctx, exclude)
        .drain_into(diagnostics)
        .and_then(|lists| lists.into_iter().next());

    match (inclusions, exclusions) {
        (Some(inclusions), Some(exclusions)) => {
            diagnostics.extend(strategy.contradictory(&raw.ty, &inclusions, &exclusions));
            (Some(inclusions), None)
        }
        other => other,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::diag::{DiagLevel, SourceMap};
    use crate::raw;
    use crate::scan::scan;

    /// Scan, build and process one source file; scan diagnostics must be empty.
    pub(crate) fn process_source(source: &str) -> (ProcessedPopulation, Vec<Diagnostic>) {
        let mut map = SourceMap::new();
        map.add("test.cs", source);
        let scanned = scan(&map);
        assert!(
            scanned.diagnostics.is_empty(),
            "scan diagnostics: {:?}",
            scanned.diagnostics
        );
        let raw = raw::build(&scanned.candidates);
        let (processed, diagnostics) = process(&raw, &ProcessingStrategies::default()).into_parts();
        (processed.unwrap_or_default(), diagnostics)
    }

    pub(crate) fn codes(diags: &[Diagnostic]) -> Vec<&'static str> {
        diags.iter().filter_map(|d| d.code.map(|c| c.0)).collect()
    }

    pub(crate) fn errors(diags: &[Diagnostic]) -> Vec<&Diagnostic> {
        diags.iter().filter(|d| d.level == DiagLevel::Error).collect()
    }

    pub(crate) fn warnings(diags: &[Diagnostic]) -> Vec<&Diagnostic> {
        diags.iter().filter(|d| d.level == DiagLevel::Warning).collect()
    }

    pub(crate) fn only_type(processed: &ProcessedPopulation) -> &ProcessedType {
        assert_eq!(processed.types.len(), 1, "expected a single type bundle");
        &processed.types[0]
    }

    #[test]
    fn secondaries_follow_their_primary() {
        let (processed, diags) = process_source(
            r#"
            [SharpMeasuresUnit(typeof(Length))]
            [FixedUnitInstance("Metre")]
            [DerivableUnit("{0}", typeof(UnitOfLength))]
            partial class UnitOfLength { }
            "#,
        );
        assert!(diags.is_empty(), "{:?}", diags);
        let ty = only_type(&processed);
        assert_eq!(ty.units.len(), 1);
        assert_eq!(ty.units[0].instances.len(), 1);
        assert_eq!(ty.units[0].derivations.len(), 1);
    }

    #[test]
    fn secondaries_without_primary_are_ignored() {
        let (processed, diags) = process_source(
            r#"[FixedUnitInstance("")] [VectorOperation(typeof(A), typeof(B))] partial class Loose { }"#,
        );
        assert!(diags.is_empty());
        let ty = only_type(&processed);
        assert!(ty.units.is_empty() && ty.vectors.is_empty());
    }

    #[test]
    fn contradictory_lists_drop_exclusions() {
        let (processed, diags) = process_source(
            r#"
            [SharpMeasuresScalar(typeof(UnitOfLength))]
            [IncludeUnits("Metre")]
            [ExcludeUnits("Foot")]
            partial class Length { }
            "#,
        );
        assert_eq!(codes(&diags), vec!["W0306"]);
        assert_eq!(warnings(&diags).len(), 1);
        let scalar = &only_type(&processed).scalars[0];
        assert!(scalar.inclusions.is_some());
        assert!(scalar.exclusions.is_none());
    }

    #[test]
    fn constants_follow_their_quantity_kind() {
        let (processed, diags) = process_source(
            r#"
            [SharpMeasuresScalar(typeof(UnitOfLength))]
            [ScalarConstant("Planck", "Metre", 1.6E-35)]
            [VectorConstant("Up", "Metre", 0, 1)]
            [IncludeBases("Metre")]
            partial class Length { }
            [SharpMeasuresUnit(typeof(Length))]
            [ScalarConstant("Loose", "Metre", 1)]
            [ConvertibleQuantity(typeof(Length))]
            [IncludeBases("Metre")]
            partial class UnitOfLength { }
            "#,
        );
        assert!(diags.is_empty(), "{:?}", diags);
        let length = &processed.types[0].scalars[0];
        assert_eq!(length.constants.len(), 1);
        assert!(length.base_inclusions.is_some());
        let unit = &processed.types[1];
        assert_eq!(unit.units.len(), 1);
        assert!(unit.scalars.is_empty());
    }

    #[test]
    fn first_claim_wins_in_order() {
        let (processed, diags) = process_source(
            r#"
            [SharpMeasuresUnit(typeof(Length))]
            [FixedUnitInstance("Metre")]
            [UnitInstanceAlias("Metre", "Meters", "Foot")]
            partial class UnitOfLength { }
            "#,
        );
        assert_eq!(codes(&diags), vec!["E0103"]);
        assert_eq!(errors(&diags).len(), 1);
        let unit = &only_type(&processed).units[0];
        assert_eq!(unit.instances.len(), 1);
        assert_eq!(unit.instances[0].plural, "Metres");
    }
}
