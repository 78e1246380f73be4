// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the pipeline's five passes (reading sources is outside the
// runner), their dependency edges, and the artifacts they produce. Used by
// the pipeline runner to compute the minimal pass subset for each --emit
// target.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each pipeline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Scan,
    BuildRaw,
    Process,
    Populate,
    Resolve,
}

/// Machine-readable artifact identifiers. Each maps to a concrete type
/// in the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Candidates,  // Vec<scan::Candidate>
    Raw,         // RawPopulation
    Processed,   // ProcessedPopulation
    Populations, // Populations
    Resolved,    // ResolvedUnitSystem
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a pipeline pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// What invalidates this pass's output.
    pub invalidation_key: &'static str,
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Scan => PassDescriptor {
            name: "scan",
            inputs: &[],
            outputs: &[ArtifactId::Candidates],
            invalidation_key: "sources + attribute schema",
            invariants: "arguments bound to schema slots, typeof references bound",
        },
        PassId::BuildRaw => PassDescriptor {
            name: "build_raw",
            inputs: &[PassId::Scan],
            outputs: &[ArtifactId::Raw],
            invalidation_key: "candidates",
            invariants: "one bundle per declared type, defaults applied",
        },
        PassId::Process => PassDescriptor {
            name: "process",
            inputs: &[PassId::BuildRaw],
            outputs: &[ArtifactId::Processed],
            invalidation_key: "raw bundle fingerprint (per type)",
            invariants: "definitions valid in isolation, reservations unique",
        },
        PassId::Populate => PassDescriptor {
            name: "populate",
            inputs: &[PassId::Process],
            outputs: &[ArtifactId::Populations],
            invalidation_key: "processed population",
            invariants: "duplicates separated, member groups normalized",
        },
        PassId::Resolve => PassDescriptor {
            name: "resolve",
            inputs: &[PassId::Populate],
            outputs: &[ArtifactId::Resolved],
            invalidation_key: "populations",
            invariants: "every reference is a handle into a clean population entry",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order.
pub const ALL_PASSES: [PassId; 5] = [
    PassId::Scan,
    PassId::BuildRaw,
    PassId::Process,
    PassId::Populate,
    PassId::Resolve,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_passes_resolve_includes_all() {
        assert_eq!(required_passes(PassId::Resolve), ALL_PASSES.to_vec());
    }

    #[test]
    fn required_passes_process_stops_early() {
        let passes = required_passes(PassId::Process);
        assert_eq!(passes, vec![PassId::Scan, PassId::BuildRaw, PassId::Process]);
        assert!(!passes.contains(&PassId::Populate));
    }

    #[test]
    fn required_passes_scan_is_minimal() {
        assert_eq!(required_passes(PassId::Scan), vec![PassId::Scan]);
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(
                !desc.outputs.is_empty(),
                "pass {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            for dep in descriptor(*pass).inputs {
                let order = required_passes(*pass);
                let dep_pos = order.iter().position(|p| p == dep);
                let self_pos = order.iter().position(|p| p == pass);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }
}
