// pipeline.rs — Compilation state and pass orchestration
//
// Holds every pass artifact and runs the minimal set of passes for a given
// terminal PassId. A `Session` keeps the per-type process cache alive across
// runs.
//
// Preconditions: `state.sources` holds every input file in input order.
// Postconditions: artifacts for every required pass are populated; the
//   passes keep running after an error so later stages still report.
// Failure modes: any pass emitting error-level diagnostics (or warnings
//   under `deny_warnings`) makes the run return the first failing pass.
// Side effects: calls on_pass_complete after each pass for immediate display;
//   verbose timings go to stderr.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use sha2::{Digest, Sha256};

use crate::cache::{CacheStats, ProcessCache};
use crate::diag::{DiagLevel, Diagnostic, SourceMap};
use crate::pass::{descriptor, required_passes, PassId};
use crate::population::{self, DefaultPopulationDiagnostics, Populations};
use crate::process::{self, ProcessedPopulation, ProcessingStrategies};
use crate::raw::{self, RawPopulation};
use crate::resolve::{self, ResolutionStrategies, ResolvedUnitSystem};
use crate::scan::{self, schema, Candidate};

// ── Source loading ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SourceError {
    Read { path: PathBuf, source: io::Error },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Read { path, source } => write!(f, "{}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Read { source, .. } => Some(source),
        }
    }
}

/// Read every path, in order, into a fresh source map.
pub fn load_sources(paths: &[impl AsRef<Path>]) -> Result<SourceMap, SourceError> {
    let mut sources = SourceMap::new();
    for path in paths {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        sources.add(path, text);
    }
    Ok(sources)
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible builds and cache-key use.
///
/// `source_hash`: SHA-256 over the SHA-256 of each source, in input order.
/// `schema_fingerprint`: SHA-256 of `schema::describe()`.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub schema_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    pub fn schema_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.schema_fingerprint)
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"source_hash\": \"{}\",\n  \"schema_fingerprint\": \"{}\",\n  \"compiler_version\": \"{}\"\n}}\n",
            self.source_hash_hex(),
            self.schema_fingerprint_hex(),
            self.compiler_version,
        )
    }
}

pub(crate) fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(bytes);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

pub fn compute_provenance(sources: &SourceMap) -> Provenance {
    let mut hasher = Sha256::new();
    for (_, text) in sources.files() {
        hasher.update(sha256(text.as_bytes()));
    }
    let mut source_hash = [0u8; 32];
    source_hash.copy_from_slice(&hasher.finalize());

    Provenance {
        source_hash,
        schema_fingerprint: sha256(schema::describe().as_bytes()),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Options ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Warnings fail the run.
    pub deny_warnings: bool,
    /// Diagnostic codes dropped before they are reported.
    pub allowed_codes: BTreeSet<String>,
}

impl PipelineOptions {
    fn admit(&self, diags: Vec<Diagnostic>) -> Vec<Diagnostic> {
        if self.allowed_codes.is_empty() {
            return diags;
        }
        diags
            .into_iter()
            .filter(|d| !d.code.is_some_and(|code| self.allowed_codes.contains(code.0)))
            .collect()
    }

    fn fails(&self, diags: &[Diagnostic]) -> bool {
        diags
            .iter()
            .any(|d| d.level == DiagLevel::Error || (self.deny_warnings && d.level == DiagLevel::Warning))
    }
}

// ── Compilation state ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Artifacts {
    pub candidates: Option<Vec<Candidate>>,
    pub raw: Option<RawPopulation>,
    pub processed: Option<ProcessedPopulation>,
    pub populations: Option<Populations>,
    pub resolved: Option<ResolvedUnitSystem>,
}

/// Holds the sources, all pass artifacts and accumulated diagnostics.
#[derive(Debug)]
pub struct CompilationState {
    pub sources: SourceMap,
    pub artifacts: Artifacts,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub provenance: Provenance,
}

impl CompilationState {
    pub fn new(sources: SourceMap) -> Self {
        let provenance = compute_provenance(&sources);
        Self {
            sources,
            artifacts: Artifacts::default(),
            diagnostics: Vec::new(),
            has_error: false,
            provenance,
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineError {
    /// The first pass that produced a failing diagnostic.
    pub failing_pass: PassId,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pass reported errors", descriptor(self.failing_pass).name)
    }
}

impl std::error::Error for PipelineError {}

// ── Per-pass bookkeeping ───────────────────────────────────────────────────

struct Runner<'a, F> {
    options: &'a PipelineOptions,
    verbose: bool,
    on_pass_complete: F,
    failing_pass: Option<PassId>,
}

impl<F: FnMut(PassId, &[Diagnostic])> Runner<'_, F> {
    /// Callback, accumulate, verbose, error check.
    fn finish(&mut self, state: &mut CompilationState, pass_id: PassId, diags: Vec<Diagnostic>, started: Instant) {
        let elapsed = started.elapsed();
        let diags = self.options.admit(diags);
        (self.on_pass_complete)(pass_id, &diags);
        let failed = self.options.fails(&diags);
        state.diagnostics.extend(diags);
        if self.verbose {
            eprintln!(
                "measc: {} complete, {:.1}ms",
                descriptor(pass_id).name,
                elapsed.as_secs_f64() * 1000.0
            );
        }
        if failed {
            state.has_error = true;
            self.failing_pass.get_or_insert(pass_id);
        }
    }
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → filter allowed codes → on_pass_complete →
/// verbose → error check.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &PipelineOptions,
    verbose: bool,
    on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    run(state, terminal, options, verbose, on_pass_complete, None).0
}

fn run(
    state: &mut CompilationState,
    terminal: PassId,
    options: &PipelineOptions,
    verbose: bool,
    on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
    mut cache: Option<&mut ProcessCache>,
) -> (Result<(), PipelineError>, Option<CacheStats>) {
    let mut runner = Runner {
        options,
        verbose,
        on_pass_complete,
        failing_pass: None,
    };
    let mut stats = None;
    let strategies = ProcessingStrategies::default();

    for pass_id in required_passes(terminal) {
        let started = Instant::now();
        let diags = match pass_id {
            PassId::Scan => {
                let scanned = scan::scan(&state.sources);
                state.artifacts.candidates = Some(scanned.candidates);
                scanned.diagnostics
            }
            PassId::BuildRaw => {
                let candidates = state.artifacts.candidates.as_deref().unwrap_or_default();
                state.artifacts.raw = Some(raw::build(candidates));
                Vec::new()
            }
            PassId::Process => {
                let empty = RawPopulation::default();
                let raw = state.artifacts.raw.as_ref().unwrap_or(&empty);
                let outcome = match cache.as_deref_mut() {
                    Some(cache) => {
                        let (outcome, hits) = cache.process(raw, &strategies);
                        stats = Some(hits);
                        outcome
                    }
                    None => process::process(raw, &strategies),
                };
                let (processed, diags) = outcome.into_parts();
                state.artifacts.processed = processed;
                diags
            }
            PassId::Populate => {
                let empty = ProcessedPopulation::default();
                let processed = state.artifacts.processed.as_ref().unwrap_or(&empty);
                let (populations, diags) =
                    population::build(processed, &DefaultPopulationDiagnostics).into_parts();
                state.artifacts.populations = populations;
                diags
            }
            PassId::Resolve => {
                let empty = Populations::default();
                let populations = state.artifacts.populations.as_ref().unwrap_or(&empty);
                let (resolved, diags) =
                    resolve::resolve(populations, &ResolutionStrategies::default()).into_parts();
                state.artifacts.resolved = resolved;
                diags
            }
        };
        runner.finish(state, pass_id, diags, started);
    }

    let result = match runner.failing_pass {
        Some(failing_pass) => Err(PipelineError { failing_pass }),
        None => Ok(()),
    };
    (result, stats)
}

// ── Session ────────────────────────────────────────────────────────────────

/// Repeated compilations that reuse processed type bundles across runs.
#[derive(Debug, Default)]
pub struct Session {
    cache: ProcessCache,
    last_stats: Option<CacheStats>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache hits and misses of the most recent run that reached processing.
    pub fn last_stats(&self) -> Option<CacheStats> {
        self.last_stats
    }

    pub fn run(
        &mut self,
        state: &mut CompilationState,
        terminal: PassId,
        options: &PipelineOptions,
        verbose: bool,
        on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
    ) -> Result<(), PipelineError> {
        let (result, stats) = run(state, terminal, options, verbose, on_pass_complete, Some(&mut self.cache));
        if let Some(stats) = stats {
            if verbose {
                eprintln!(
                    "measc: process cache: {} reused, {} processed",
                    stats.reused, stats.processed
                );
            }
            self.last_stats = Some(stats);
        }
        result
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn state_of(files: &[&str]) -> CompilationState {
        let mut sources = SourceMap::new();
        for (i, text) in files.iter().enumerate() {
            sources.add(format!("f{}.cs", i), *text);
        }
        CompilationState::new(sources)
    }

    const LENGTH: &str = r#"
        [SharpMeasuresUnit(typeof(Length))] [FixedUnitInstance("Metre")] partial class UnitOfLength { }
        [SharpMeasuresScalar(typeof(UnitOfLength))] partial class Length { }
    "#;

    #[test]
    fn terminal_pass_limits_artifacts() {
        let mut state = state_of(&[LENGTH]);
        let mut seen = Vec::new();
        run_pipeline(&mut state, PassId::Process, &PipelineOptions::default(), false, |p, _| seen.push(p))
            .unwrap();
        assert_eq!(seen, vec![PassId::Scan, PassId::BuildRaw, PassId::Process]);
        assert!(state.artifacts.processed.is_some());
        assert!(state.artifacts.populations.is_none());
        assert!(state.artifacts.resolved.is_none());
    }

    #[test]
    fn errors_report_the_first_failing_pass() {
        let mut state = state_of(&[
            LENGTH,
            "[SharpMeasuresScalar(typeof(Nothing))] partial class Time { }",
        ]);
        let err = run_pipeline(&mut state, PassId::Resolve, &PipelineOptions::default(), false, |_, _| {})
            .unwrap_err();
        assert_eq!(err.failing_pass, PassId::Resolve);
        assert!(state.has_error);
        // Length still resolves
        assert_eq!(state.artifacts.resolved.unwrap().scalars.len(), 1);
    }

    #[test]
    fn allowed_codes_are_dropped() {
        let source = "[SharpMeasuresScalar(typeof(Nothing))] partial class Time { }";
        let options = PipelineOptions {
            allowed_codes: ["E0510".to_string()].into_iter().collect(),
            ..PipelineOptions::default()
        };
        let mut state = state_of(&[source]);
        assert!(run_pipeline(&mut state, PassId::Resolve, &options, false, |_, _| {}).is_ok());
        assert!(state.diagnostics.is_empty());
    }

    #[test]
    fn deny_warnings_fails_on_warnings() {
        let source = r#"[SharpMeasuresUnit(typeof(Length))] [FixedUnitInstance("Metre")] partial class UnitOfLength { }
            [SharpMeasuresScalar(typeof(UnitOfLength), DefaultUnitInstanceSymbol = "m")] partial class Length { }"#;
        let mut state = state_of(&[source]);
        assert!(run_pipeline(&mut state, PassId::Resolve, &PipelineOptions::default(), false, |_, _| {}).is_ok());
        assert!(!state.diagnostics.is_empty());

        let options = PipelineOptions {
            deny_warnings: true,
            ..PipelineOptions::default()
        };
        let mut state = state_of(&[source]);
        let err = run_pipeline(&mut state, PassId::Resolve, &options, false, |_, _| {}).unwrap_err();
        assert_eq!(err.failing_pass, PassId::Process);
    }

    #[test]
    fn provenance_tracks_sources_in_order() {
        let a = state_of(&["class A { }", "class B { }"]).provenance;
        let b = state_of(&["class A { }", "class B { }"]).provenance;
        let swapped = state_of(&["class B { }", "class A { }"]).provenance;
        assert_eq!(a, b);
        assert_ne!(a.source_hash, swapped.source_hash);
        assert_eq!(a.schema_fingerprint, swapped.schema_fingerprint);
        assert!(a.to_json().contains(&a.source_hash_hex()));
    }

    #[test]
    fn session_reuses_unchanged_types() {
        let mut session = Session::new();
        let options = PipelineOptions::default();

        let mut first = state_of(&[LENGTH]);
        session.run(&mut first, PassId::Resolve, &options, false, |_, _| {}).unwrap();
        assert_eq!(session.last_stats(), Some(CacheStats { reused: 0, processed: 2 }));

        let mut second = state_of(&[LENGTH]);
        session.run(&mut second, PassId::Resolve, &options, false, |_, _| {}).unwrap();
        assert_eq!(session.last_stats(), Some(CacheStats { reused: 2, processed: 0 }));
        assert_eq!(first.artifacts.resolved, second.artifacts.resolved);
    }

    #[test]
    fn missing_file_is_a_source_error() {
        let err = load_sources(&["/nonexistent/measc/input.cs"]).unwrap_err();
        assert!(err.to_string().contains("input.cs"));
    }
}
