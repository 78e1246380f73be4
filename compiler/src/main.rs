use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;

use measc::diag::DiagLevel;
use measc::pass::PassId;
use measc::pipeline::{load_sources, run_pipeline, CompilationState, PipelineOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    Resolved,
    Processed,
    Raw,
    Populations,
    Diagnostics,
    BuildInfo,
}

impl EmitStage {
    fn terminal(self) -> PassId {
        match self {
            EmitStage::Raw => PassId::BuildRaw,
            EmitStage::Processed => PassId::Process,
            EmitStage::Populations => PassId::Populate,
            EmitStage::Resolved | EmitStage::Diagnostics => PassId::Resolve,
            EmitStage::BuildInfo => PassId::Scan,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "measc",
    version,
    about = "Measures compiler — validates SharpMeasures unit-system declarations into a resolved model"
)]
struct Cli {
    /// Input .cs declaration files, in order
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Resolved)]
    emit: EmitStage,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Treat warnings as errors
    #[arg(long)]
    deny_warnings: bool,

    /// Suppress a diagnostic code (repeatable)
    #[arg(long = "allow", value_name = "CODE")]
    allow: Vec<String>,

    /// Print pipeline passes and timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        for source in &cli.sources {
            eprintln!("measc: source = {}", source.display());
        }
        if let Some(output) = &cli.output {
            eprintln!("measc: output = {}", output.display());
        }
        eprintln!("measc: emit   = {:?}", cli.emit);
    }

    // ── Read sources ──
    let sources = match load_sources(cli.sources.as_slice()) {
        Ok(sources) => sources,
        Err(e) => {
            eprintln!("measc: error: {}", e);
            std::process::exit(2);
        }
    };

    let options = PipelineOptions {
        deny_warnings: cli.deny_warnings,
        allowed_codes: cli.allow.iter().cloned().collect::<BTreeSet<_>>(),
    };

    // ── Run passes ──
    let mut state = CompilationState::new(sources);
    let stream = cli.emit != EmitStage::Diagnostics;
    let rendered_sources = state.sources.clone();
    let result = run_pipeline(
        &mut state,
        cli.emit.terminal(),
        &options,
        cli.verbose,
        |_, diags| {
            if stream {
                for diag in diags {
                    eprintln!("{}", diag.render(&rendered_sources));
                }
            }
        },
    );

    if cli.verbose {
        if let Some(populations) = &state.artifacts.populations {
            eprintln!(
                "measc: populations: {} units, {} scalars, {} vectors, {} groups, {} members",
                populations.units.len(),
                populations.scalars.len(),
                populations.vectors.len(),
                populations.groups.len(),
                populations.members.len(),
            );
        }
        if let Some(resolved) = &state.artifacts.resolved {
            eprintln!("measc: resolved {} definitions", resolved.definition_count());
        }
    }

    // ── Emit ──
    let text = match cli.emit {
        EmitStage::BuildInfo => Ok(state.provenance.to_json()),
        EmitStage::Diagnostics => Ok(state
            .diagnostics
            .iter()
            .map(|d| format!("{}\n", d.render(&state.sources)))
            .collect::<String>()),
        EmitStage::Raw => to_json(&state.artifacts.raw),
        EmitStage::Processed => to_json(&state.artifacts.processed),
        EmitStage::Populations => to_json(&state.artifacts.populations),
        EmitStage::Resolved => to_json(&state.artifacts.resolved),
    };
    let text = match text {
        Ok(text) => text,
        Err(e) => {
            eprintln!("measc: error: cannot serialize {:?}: {}", cli.emit, e);
            std::process::exit(2);
        }
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &text) {
                eprintln!("measc: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        }
        None => print!("{}", text),
    }

    if let Err(e) = result {
        if cli.verbose {
            eprintln!("measc: {}", e);
        }
        let errors = state.diagnostics.iter().filter(|d| d.level == DiagLevel::Error).count();
        let warnings = state.diagnostics.len() - errors;
        eprintln!("measc: {} error(s), {} warning(s)", errors, warnings);
        std::process::exit(1);
    }
}

fn to_json<T: serde::Serialize>(value: &Option<T>) -> Result<String, serde_json::Error> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}
