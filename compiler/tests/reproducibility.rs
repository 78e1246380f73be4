// Reproducibility tests for deterministic builds.
//
// These tests verify that the compiler produces byte-identical outputs
// for identical inputs, across every emit target.

use std::path::{Path, PathBuf};
use std::process::Command;

fn measc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_measc"))
}

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn demos() -> Vec<String> {
    ["length.cs", "kinematics.cs", "temperature.cs"]
        .iter()
        .map(|name| {
            project_root()
                .join("demos")
                .join(name)
                .to_str()
                .unwrap()
                .to_string()
        })
        .collect()
}

fn run_measc(args: &[&str]) -> String {
    let output = Command::new(measc_binary())
        .args(args)
        .output()
        .expect("failed to run measc");
    assert!(
        output.status.success(),
        "measc failed with args {:?}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("non-UTF8 output")
}

fn emit_twice(stage: &str) {
    let files = demos();
    let mut args = vec!["--emit", stage];
    args.extend(files.iter().map(String::as_str));

    let first = run_measc(&args);
    let second = run_measc(&args);
    assert!(!first.is_empty(), "--emit {} produced no output", stage);
    assert_eq!(first, second, "--emit {} output should be byte-identical across runs", stage);
}

#[test]
fn resolved_output_is_identical() {
    emit_twice("resolved");
}

#[test]
fn intermediate_outputs_are_identical() {
    for stage in ["raw", "processed", "populations"] {
        emit_twice(stage);
    }
}

#[test]
fn build_info_is_identical() {
    emit_twice("build-info");
}

/// `source_hash` depends on input order but the schema fingerprint does not.
#[test]
fn build_info_tracks_input_order() {
    let files = demos();
    let forward = run_measc(&["--emit", "build-info", &files[0], &files[1]]);
    let reverse = run_measc(&["--emit", "build-info", &files[1], &files[0]]);

    let forward: serde_json::Value = serde_json::from_str(&forward).unwrap();
    let reverse: serde_json::Value = serde_json::from_str(&reverse).unwrap();
    assert_ne!(forward["source_hash"], reverse["source_hash"]);
    assert_eq!(forward["schema_fingerprint"], reverse["schema_fingerprint"]);
    assert_eq!(forward["schema_fingerprint"].as_str().map(str::len), Some(64));
}

/// Writing through `-o` yields the same bytes as stdout.
#[test]
fn output_file_matches_stdout() {
    let files = demos();
    let path = std::env::temp_dir().join(format!("measc-repro-{}.json", std::process::id()));
    let path_str = path.to_str().unwrap();

    let mut args = vec!["-o", path_str];
    args.extend(files.iter().map(String::as_str));
    let stdout = run_measc(&args);
    assert!(stdout.is_empty());

    let written = std::fs::read_to_string(&path).unwrap();
    let direct = run_measc(&files.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(written, direct);
}
