// cache.rs — Incremental per-type processing cache
//
// Keys each raw type bundle by the SHA-256 of its compact JSON and keeps the
// processed bundle (or its absence) together with the diagnostics produced.
//
// Preconditions: the strategies passed to `process` are the same for the
//   lifetime of a cache; cached diagnostics are not re-derived.
// Postconditions: `process` yields exactly what `process::process` yields
//   for the same input, in the same order.
// Failure modes: a bundle that cannot be fingerprinted is processed and not
//   stored.
// Side effects: entries not touched by the latest call are evicted.

use std::collections::HashMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::diag::Diagnostic;
use crate::process::{process_type, ProcessedPopulation, ProcessedType, ProcessingStrategies};
use crate::raw::RawPopulation;
use crate::validity::Outcome;

/// SHA-256 of a value's canonical compact JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn of<T: Serialize>(value: &T) -> Option<Fingerprint> {
        let canonical = serde_json::to_string(value).ok()?;
        Some(Self::of_bytes(canonical.as_bytes()))
    }

    pub fn of_bytes(bytes: &[u8]) -> Fingerprint {
        let digest = Sha256::digest(bytes);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&digest);
        Fingerprint(hash)
    }

    /// 64-character lowercase hex.
    pub fn hex(&self) -> String {
        crate::pipeline::bytes_to_hex(&self.0)
    }
}

/// Hits and misses of one `ProcessCache::process` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub reused: usize,
    pub processed: usize,
}

type Entry = (Option<ProcessedType>, Vec<Diagnostic>);

#[derive(Debug, Default)]
pub struct ProcessCache {
    entries: HashMap<Fingerprint, Entry>,
}

impl ProcessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Process every bundle of `raw`, reusing entries whose fingerprint is
    /// unchanged since the previous call.
    pub fn process(
        &mut self,
        raw: &RawPopulation,
        strategies: &ProcessingStrategies,
    ) -> (Outcome<ProcessedPopulation>, CacheStats) {
        let mut stats = CacheStats::default();
        let mut fresh: HashMap<Fingerprint, Entry> = HashMap::with_capacity(raw.types.len());
        let mut types = Vec::new();
        let mut diagnostics = Vec::new();

        for bundle in &raw.types {
            let key = Fingerprint::of(bundle);
            let cached = key.and_then(|key| {
                fresh
                    .get(&key)
                    .cloned()
                    .or_else(|| self.entries.remove(&key))
            });
            let (product, produced) = match cached {
                Some(entry) => {
                    stats.reused += 1;
                    entry
                }
                None => {
                    stats.processed += 1;
                    process_type(bundle, strategies).into_parts()
                }
            };
            types.extend(product.iter().cloned());
            diagnostics.extend(produced.iter().cloned());
            if let Some(key) = key {
                fresh.insert(key, (product, produced));
            }
        }

        self.entries = fresh;
        (
            Outcome::result_with(ProcessedPopulation { types }, diagnostics),
            stats,
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::SourceMap;
    use crate::process::process;
    use crate::{raw, scan};

    fn raw_of(files: &[&str]) -> RawPopulation {
        let mut sources = SourceMap::new();
        for (i, text) in files.iter().enumerate() {
            sources.add(format!("f{}.cs", i), *text);
        }
        raw::build(&scan::scan(&sources).candidates)
    }

    const UNIT: &str = r#"[SharpMeasuresUnit(typeof(Length))] [FixedUnitInstance("Metre")] partial class UnitOfLength { }"#;
    const SCALAR: &str = "[SharpMeasuresScalar(typeof(UnitOfLength))] partial class Length { }";

    #[test]
    fn fingerprint_is_stable() {
        let a = Fingerprint::of(&vec![1, 2, 3]).unwrap();
        let b = Fingerprint::of(&vec![1, 2, 3]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hex().len(), 64);
        assert_ne!(a, Fingerprint::of(&vec![1, 2]).unwrap());
    }

    #[test]
    fn second_run_reuses_everything() {
        let raw = raw_of(&[UNIT, SCALAR]);
        let strategies = ProcessingStrategies::default();
        let mut cache = ProcessCache::new();

        let (first, stats) = cache.process(&raw, &strategies);
        assert_eq!(stats, CacheStats { reused: 0, processed: 2 });
        let (second, stats) = cache.process(&raw, &strategies);
        assert_eq!(stats, CacheStats { reused: 2, processed: 0 });
        assert_eq!(first.value(), second.value());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn edited_file_is_reprocessed() {
        let strategies = ProcessingStrategies::default();
        let mut cache = ProcessCache::new();
        cache.process(&raw_of(&[UNIT, SCALAR]), &strategies);

        let edited = raw_of(&[
            UNIT,
            "[SharpMeasuresScalar(typeof(UnitOfLength), ImplementSum = false)] partial class Length { }",
        ]);
        let (cached, stats) = cache.process(&edited, &strategies);
        assert_eq!(stats, CacheStats { reused: 1, processed: 1 });
        assert_eq!(cached.into_parts(), process(&edited, &strategies).into_parts());
        // the stale Length entry is gone
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn cached_diagnostics_are_replayed() {
        let raw = raw_of(&["[SharpMeasuresScalar(typeof(UnitOfLength), DefaultUnitInstanceSymbol = \"m\")] partial class Length { }"]);
        let strategies = ProcessingStrategies::default();
        let mut cache = ProcessCache::new();
        let (first, _) = cache.process(&raw, &strategies);
        let (second, stats) = cache.process(&raw, &strategies);
        assert_eq!(stats.reused, 1);
        assert!(!first.diagnostics().is_empty());
        assert_eq!(first.diagnostics(), second.diagnostics());
    }
}
