// Integration tests for end-to-end pipeline behavior.
//
// Library-level scenarios run scan → raw → process → populate → resolve
// through `run_pipeline`; CLI scenarios drive the `measc` binary and check
// exit codes and emit targets.

use std::path::{Path, PathBuf};
use std::process::Command;

use measc::diag::SourceMap;
use measc::pass::PassId;
use measc::pipeline::{run_pipeline, CompilationState, PipelineOptions, Session};
use measc::resolve::{QuantityRef, ResolvedUnitSystem};

fn measc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_measc"))
}

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn demo(name: &str) -> String {
    project_root().join("demos").join(name).to_str().unwrap().to_string()
}

fn state_of(files: &[&str]) -> CompilationState {
    let mut sources = SourceMap::new();
    for (i, text) in files.iter().enumerate() {
        sources.add(format!("input{}.cs", i), *text);
    }
    CompilationState::new(sources)
}

fn compile(files: &[&str]) -> CompilationState {
    let mut state = state_of(files);
    let _ = run_pipeline(&mut state, PassId::Resolve, &PipelineOptions::default(), false, |_, _| {});
    state
}

fn codes(state: &CompilationState) -> Vec<&'static str> {
    state.diagnostics.iter().filter_map(|d| d.code.map(|c| c.0)).collect()
}

fn resolved(state: &CompilationState) -> &ResolvedUnitSystem {
    state.artifacts.resolved.as_ref().expect("resolve pass ran")
}

const BASE: &str = r#"
    [SharpMeasuresUnit(typeof(Length))] [FixedUnitInstance("Metre")] partial class UnitOfLength { }
    [SharpMeasuresScalar(typeof(UnitOfLength))] partial class Length { }
    [SharpMeasuresScalar(typeof(UnitOfLength))] partial class Area { }
    [SharpMeasuresVector(typeof(UnitOfLength))] partial class Size3 { }
    [SharpMeasuresVector(typeof(UnitOfLength))] partial class Normal3 { }
    [SharpMeasuresVectorGroup(typeof(UnitOfLength))] partial class Position { }
    [SharpMeasuresVectorGroupMember(typeof(Position))] partial class Position3 { }
"#;

// ── Dimensions ─────────────────────────────────────────────────────────────

#[test]
fn dimension_is_inferred_from_name() {
    let state = compile(&[BASE]);
    assert!(state.diagnostics.is_empty(), "{:?}", state.diagnostics);
    let size = resolved(&state).vectors.iter().find(|v| v.ty.name == "Size3").unwrap();
    assert_eq!(size.dimension, 3);
}

#[test]
fn explicit_dimension_wins_with_one_warning() {
    let state = compile(&[
        BASE,
        "[SharpMeasuresVector(typeof(UnitOfLength), Dimension = 2)] partial class Velocity3 { }",
    ]);
    assert_eq!(codes(&state), vec!["W0402"]);
    assert!(!state.has_error);
    let velocity = resolved(&state).vectors.iter().find(|v| v.ty.name == "Velocity3").unwrap();
    assert_eq!(velocity.dimension, 2);
}

#[test]
fn position1_is_an_invalid_dimension() {
    let state = compile(&[
        BASE,
        "[SharpMeasuresVector(typeof(UnitOfLength))] public partial class Position1 { }",
    ]);
    assert_eq!(codes(&state), vec!["E0400"]);
    assert!(resolved(&state).vectors.iter().all(|v| v.ty.name != "Position1"));
}

#[test]
fn resized_member_of_taken_dimension_is_rejected_once() {
    let state = compile(&[
        BASE,
        "[ResizedSharpMeasuresVector(typeof(Position3))] public partial class Length3 { }",
    ]);
    assert_eq!(codes(&state), vec!["E0423"]);
    let system = resolved(&state);
    assert!(system.members.iter().all(|m| m.ty.name != "Length3"));
    assert_eq!(system.groups[0].members.len(), 1);
}

// ── Operations ─────────────────────────────────────────────────────────────

#[test]
fn duplicate_operation_names_are_rejected_independently() {
    let state = compile(&[
        BASE,
        r#"[SharpMeasuresVector(typeof(UnitOfLength))]
           [VectorOperation(typeof(Length), typeof(Size3))]
           [VectorOperation(typeof(Area), typeof(Size3))]
           [VectorOperation(typeof(Area), typeof(Normal3))]
           [VectorOperation(typeof(Normal3), typeof(Size3), OperatorType = VectorOperatorType.Cross)]
           [VectorOperation(typeof(Normal3), typeof(Size3), OperatorType = VectorOperatorType.Cross, Name = "Other")]
           partial class Arrow3 { }"#,
    ]);
    assert_eq!(codes(&state), vec!["E0411", "E0412"]);
    let arrow = resolved(&state).vectors.iter().find(|v| v.ty.name == "Arrow3").unwrap();
    let names: Vec<_> = arrow.operations.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["Dot", "Dot", "Cross"]);
}

#[test]
fn cross_defaults_and_mirroring() {
    let state = compile(&[
        BASE,
        r#"[SharpMeasuresVector(typeof(UnitOfLength))]
           [VectorOperation(typeof(Normal3), typeof(Size3), OperatorType = VectorOperatorType.Cross, Position = VectorOperationPosition.Left)]
           [VectorOperation(typeof(Normal3), typeof(Arrow3), OperatorType = VectorOperatorType.Cross)]
           partial class Arrow3 { }"#,
    ]);
    assert!(state.diagnostics.is_empty(), "{:?}", state.diagnostics);
    let arrow = resolved(&state).vectors.iter().find(|v| v.ty.name == "Arrow3").unwrap();
    assert_eq!(arrow.operations[0].name, "Cross");
    assert_eq!(arrow.operations[0].mirrored_name.as_deref(), Some("CrossInto"));
    // Other == self never mirrors.
    assert_eq!(arrow.operations[1].name, "Cross");
    assert_eq!(arrow.operations[1].mirrored_name, None);
}

// ── Differences and exclusion ──────────────────────────────────────────────

#[test]
fn unset_difference_is_self() {
    let state = compile(&[BASE]);
    let system = resolved(&state);
    for vector in &system.vectors {
        match &vector.difference {
            Some(QuantityRef::Vector(handle)) => assert_eq!(handle.ty(), &vector.ty),
            other => panic!("{} has difference {:?}", vector.ty, other),
        }
    }
    for scalar in &system.scalars {
        assert_eq!(scalar.difference.as_ref().map(|d| d.ty()), Some(&scalar.ty));
    }
}

#[test]
fn a_type_belongs_to_one_population() {
    let state = compile(&[
        BASE,
        r#"[SharpMeasuresScalar(typeof(UnitOfLength))] partial class Speed3 { }
           [SharpMeasuresVector(typeof(UnitOfLength))] partial class Speed3 { }
           [SharpMeasuresVectorGroup(typeof(UnitOfLength))] partial class Size3 { }"#,
    ]);
    assert_eq!(codes(&state), vec!["E0502", "E0503"]);
    let system = resolved(&state);
    assert!(system.scalars.iter().any(|s| s.ty.name == "Speed3"));
    assert!(system.vectors.iter().all(|v| v.ty.name != "Speed3"));
    assert!(system.groups.iter().all(|g| g.ty.name != "Size3"));
}

// ── Idempotence and sessions ───────────────────────────────────────────────

#[test]
fn reruns_are_byte_identical() {
    let files = [BASE, "[SharpMeasuresVector(typeof(UnitOfLength))] partial class Position1 { }"];
    let first = compile(&files);
    let second = compile(&files);
    assert_eq!(
        serde_json::to_string(resolved(&first)).unwrap(),
        serde_json::to_string(resolved(&second)).unwrap()
    );
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(first.provenance, second.provenance);
}

#[test]
fn session_reprocesses_only_edited_types() {
    let scalars = "[SharpMeasuresScalar(typeof(UnitOfLength))] partial class Time { }";
    let edited = "[SharpMeasuresScalar(typeof(UnitOfLength), ImplementSum = false)] partial class Time { }";
    let options = PipelineOptions::default();
    let mut session = Session::new();

    let mut first = state_of(&[BASE, scalars]);
    session.run(&mut first, PassId::Resolve, &options, false, |_, _| {}).unwrap();
    let total = session.last_stats().unwrap().processed;

    let mut second = state_of(&[BASE, edited]);
    session.run(&mut second, PassId::Resolve, &options, false, |_, _| {}).unwrap();
    let stats = session.last_stats().unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.reused, total - 1);

    let fresh = compile(&[BASE, edited]);
    assert_eq!(second.artifacts.resolved, fresh.artifacts.resolved);
    assert_eq!(second.diagnostics, fresh.diagnostics);
}

#[test]
fn demos_resolve_cleanly() {
    let paths = [demo("length.cs"), demo("kinematics.cs"), demo("temperature.cs")];
    let sources = measc::pipeline::load_sources(&paths).unwrap();
    let mut state = CompilationState::new(sources);
    run_pipeline(&mut state, PassId::Resolve, &PipelineOptions::default(), false, |_, _| {})
        .unwrap_or_else(|e| panic!("{}: {:?}", e, state.diagnostics));
    let system = resolved(&state);
    assert_eq!(system.units.len(), 4);
    let speed = system.units.iter().find(|u| u.ty.name == "UnitOfSpeed").unwrap();
    assert_eq!(speed.instances.len(), 2);
}

// ── CLI ────────────────────────────────────────────────────────────────────

fn write_temp(name: &str, text: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("measc-{}-{}", std::process::id(), name));
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn cli_succeeds_on_demos() {
    let output = Command::new(measc_binary())
        .arg(demo("length.cs"))
        .arg(demo("kinematics.cs"))
        .output()
        .expect("failed to run measc");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json["scalars"].as_array().is_some_and(|s| !s.is_empty()));
}

#[test]
fn cli_exit_codes() {
    let bad = write_temp("bad.cs", "[SharpMeasuresScalar(typeof(Nothing))] partial class Time { }");
    let output = Command::new(measc_binary()).arg(&bad).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error[E0510]"));

    let allowed = Command::new(measc_binary())
        .args(["--allow", "E0510"])
        .arg(&bad)
        .output()
        .unwrap();
    assert_eq!(allowed.status.code(), Some(0));

    let missing = Command::new(measc_binary())
        .arg("/nonexistent/measc/missing.cs")
        .output()
        .unwrap();
    assert_eq!(missing.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&missing.stderr).starts_with("measc: error:"));
}

#[test]
fn cli_deny_warnings() {
    let warned = write_temp(
        "warned.cs",
        r#"[SharpMeasuresUnit(typeof(Length))] [FixedUnitInstance("Metre")] partial class UnitOfLength { }
           [SharpMeasuresScalar(typeof(UnitOfLength), DefaultUnitInstanceSymbol = "m")] partial class Length { }"#,
    );
    let plain = Command::new(measc_binary()).arg(&warned).output().unwrap();
    assert_eq!(plain.status.code(), Some(0));
    let denied = Command::new(measc_binary())
        .arg("--deny-warnings")
        .arg(&warned)
        .output()
        .unwrap();
    assert_eq!(denied.status.code(), Some(1));
}

#[test]
fn cli_emit_diagnostics_goes_to_stdout() {
    let bad = write_temp("diag.cs", "[SharpMeasuresScalar(typeof(Nothing))] partial class Time { }");
    let output = Command::new(measc_binary())
        .args(["--emit", "diagnostics"])
        .arg(&bad)
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("error[E0510]: 'Nothing' is not a unit"), "{}", stdout);
}
