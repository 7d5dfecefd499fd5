//! Persistent pattern storage.
//!
//! A [`PatternStore`] holds at most one [`Pattern`] per id. It is loaded from
//! a JSON snapshot at start, mutated only through `add`, `add_many`, and
//! `redefine`, and written back as a full snapshot.
//!
//! # Snapshot format
//!
//! ```text
//! {
//!   "patterns": [ { "id", "pattern", "frequency", "first_seen", "last_seen",
//!                   "compression_gain", "domains", "examples", "version" }, ... ],
//!   "stats":    { "total_patterns", "total_uses", "total_tokens_saved",
//!                 "avg_compression_gain", "most_used" }
//! }
//! ```
//!
//! Saves write a temporary file next to the target and rename it into place,
//! so a crash never leaves a truncated snapshot. The store assumes a single
//! writer: concurrent `save` calls from separate processes are undefined and
//! must be serialized by the caller (last writer wins). Any number of readers
//! may share an in-memory store, since compression never mutates it.

use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Result, TpsError};
use crate::pattern::Pattern;
use crate::reference::RefToken;

/// The most frequent pattern in a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MostUsed {
    /// Pattern id.
    pub id: String,
    /// Canonical text.
    pub pattern: String,
    /// Observed occurrences.
    pub frequency: u64,
}

/// Aggregate view of a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of stored patterns.
    pub total_patterns: usize,
    /// Sum of all frequencies.
    pub total_uses: u64,
    /// Sum of `frequency * compression_gain` over all patterns.
    pub total_tokens_saved: u64,
    /// Mean compression gain, 0 for an empty store.
    pub avg_compression_gain: f64,
    /// Highest-frequency pattern, if any.
    pub most_used: Option<MostUsed>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    patterns: &'a [Pattern],
    stats: StoreStats,
}

/// Stats are derived, so loading only reads the pattern records.
#[derive(Deserialize)]
struct Snapshot {
    patterns: Vec<Pattern>,
}

/// Keyed collection of patterns with optional file backing.
#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    path: Option<PathBuf>,
    patterns: Vec<Pattern>,
    index: HashMap<String, usize>,
}

impl PatternStore {
    /// Create an empty memory-only store. `save` on such a store does nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`, loading it if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self {
            path: Some(path.into()),
            ..Self::default()
        };
        store.load()?;
        Ok(store)
    }

    /// The backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace the in-memory contents with the snapshot on disk.
    ///
    /// A missing file leaves the store empty. Any other read failure, or a
    /// snapshot that does not parse, is an error.
    pub fn load(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        self.patterns.clear();
        self.index.clear();

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No pattern store at {}, starting empty", path.display());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot =
            serde_json::from_str(&text).map_err(|source| TpsError::Format {
                path: path.clone(),
                source,
            })?;

        for pattern in snapshot.patterns {
            if self.index.contains_key(&pattern.id) {
                warn!("Duplicate pattern id {} in {}, keeping first", pattern.id, path.display());
                continue;
            }
            self.index.insert(pattern.id.clone(), self.patterns.len());
            self.patterns.push(pattern);
        }

        info!("Loaded {} patterns from {}", self.patterns.len(), path.display());
        Ok(())
    }

    /// Write every pattern and the derived stats to the backing file.
    pub fn save(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            debug!("Memory-only pattern store, skipping save");
            return Ok(());
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let snapshot = SnapshotRef {
            patterns: &self.patterns,
            stats: self.stats(),
        };

        let mut temp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &snapshot).map_err(TpsError::Serialize)?;
            writer.flush()?;
        }
        temp.persist(path).map_err(|e| TpsError::IoError(e.error))?;

        info!("Saved {} patterns to {}", self.patterns.len(), path.display());
        Ok(())
    }

    /// Insert a pattern, or merge it into the stored pattern with the same id.
    ///
    /// Merging adds the incoming frequency and refreshes `last_seen`; nothing
    /// else about the stored pattern changes. Returns `true` when the id was
    /// new.
    pub fn add(&mut self, pattern: Pattern) -> bool {
        match self.index.get(&pattern.id) {
            Some(&slot) => {
                let existing = &mut self.patterns[slot];
                if existing.pattern != pattern.pattern {
                    warn!(
                        "Pattern id {} already holds {:?}, merging {:?} into it",
                        existing.id, existing.pattern, pattern.pattern
                    );
                }
                existing.frequency = existing.frequency.saturating_add(pattern.frequency);
                existing.last_seen = Utc::now();
                false
            }
            None => {
                self.index.insert(pattern.id.clone(), self.patterns.len());
                self.patterns.push(pattern);
                true
            }
        }
    }

    /// Add every pattern, then save once. Returns the number of new ids.
    pub fn add_many<I>(&mut self, patterns: I) -> Result<usize>
    where
        I: IntoIterator<Item = Pattern>,
    {
        let mut added = 0;
        for pattern in patterns {
            if self.add(pattern) {
                added += 1;
            }
        }
        self.save()?;
        Ok(added)
    }

    /// Up to `n` patterns by descending value score, optionally limited to
    /// one domain. Equal scores keep insertion order.
    pub fn top(&self, n: usize, domain: Option<&str>) -> Vec<&Pattern> {
        let mut selected: Vec<&Pattern> = self
            .patterns
            .iter()
            .filter(|p| domain.map_or(true, |d| p.in_domain(d)))
            .collect();
        selected.sort_by(|a, b| b.value_score().cmp(&a.value_score()));
        selected.truncate(n);
        selected
    }

    /// Look up a pattern by id.
    pub fn get(&self, id: &str) -> Result<&Pattern> {
        self.index
            .get(id)
            .map(|&slot| &self.patterns[slot])
            .ok_or_else(|| TpsError::NotFound(id.to_string()))
    }

    /// Look up the pattern a REF token points at, checking its version.
    pub fn resolve(&self, reference: &RefToken) -> Result<&Pattern> {
        let pattern = self.get(&reference.id)?;
        if pattern.version != reference.version {
            return Err(TpsError::StaleReference {
                id: reference.id.clone(),
                expected: pattern.version,
                found: reference.version,
            });
        }
        Ok(pattern)
    }

    /// Change the canonical text of a stored pattern and bump its version.
    ///
    /// The id is kept, so REF tokens emitted earlier become stale.
    pub fn redefine(&mut self, id: &str, canonical: impl Into<String>) -> Result<&Pattern> {
        let slot = *self
            .index
            .get(id)
            .ok_or_else(|| TpsError::NotFound(id.to_string()))?;
        let pattern = &mut self.patterns[slot];
        pattern.redefine(canonical.into());
        info!("Redefined pattern {} as v{}", pattern.id, pattern.version);
        Ok(pattern)
    }

    /// Aggregate statistics; all zero for an empty store.
    pub fn stats(&self) -> StoreStats {
        if self.patterns.is_empty() {
            return StoreStats::default();
        }

        let total_uses = self
            .patterns
            .iter()
            .map(|p| p.frequency)
            .fold(0u64, u64::saturating_add);
        let total_tokens_saved = self
            .patterns
            .iter()
            .map(Pattern::value_score)
            .fold(0u64, u64::saturating_add);
        let total_gain: usize = self.patterns.iter().map(|p| p.compression_gain).sum();

        // first pattern wins ties
        let most_used = self
            .patterns
            .iter()
            .fold(None::<&Pattern>, |best, p| match best {
                Some(b) if b.frequency >= p.frequency => Some(b),
                _ => Some(p),
            })
            .map(|p| MostUsed {
                id: p.id.clone(),
                pattern: p.pattern.clone(),
                frequency: p.frequency,
            });

        StoreStats {
            total_patterns: self.patterns.len(),
            total_uses,
            total_tokens_saved,
            avg_compression_gain: total_gain as f64 / self.patterns.len() as f64,
            most_used,
        }
    }

    /// Number of stored patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the store holds no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Iterate patterns in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pattern(text: &str, frequency: u64) -> Pattern {
        Pattern::new(text, frequency)
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path().join("patterns.json")).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.stats(), StoreStats::default());
    }

    #[test]
    fn test_add_inserts_then_merges() {
        let mut store = PatternStore::new();
        assert!(store.add(pattern("[A] [B]", 3)));
        let before = store.get(&pattern("[A] [B]", 0).id).unwrap().last_seen;

        assert!(!store.add(pattern("[A] [B]", 2)));
        assert_eq!(store.len(), 1);

        let merged = store.get(&pattern("[A] [B]", 0).id).unwrap();
        assert_eq!(merged.frequency, 5);
        assert!(merged.last_seen >= before);
        assert_eq!(merged.version, 1);
    }

    #[test]
    fn test_repeated_adds_scale_frequency() {
        let mut store = PatternStore::new();
        let p = pattern("[A] [B] [C]", 4);
        for _ in 0..5 {
            store.add(p.clone());
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&p.id).unwrap().frequency, 20);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = PatternStore::new();
        assert!(matches!(store.get("NOPE"), Err(TpsError::NotFound(id)) if id == "NOPE"));
    }

    #[test]
    fn test_top_orders_by_value_with_stable_ties() {
        let mut store = PatternStore::new();
        store.add(pattern("[A] [B]", 4)); // 4
        store.add(pattern("[C] [D] [E]", 3)); // 6
        store.add(pattern("[F] [G] [H]", 2)); // 4
        store.add(pattern("[I] [J]", 1)); // 1

        let top: Vec<&str> = store.top(3, None).iter().map(|p| p.pattern.as_str()).collect();
        assert_eq!(top, vec!["[C] [D] [E]", "[A] [B]", "[F] [G] [H]"]);
    }

    #[test]
    fn test_top_filters_by_domain() {
        let mut store = PatternStore::new();
        store.add(pattern("[A] [B]", 10).with_domains(["code"]));
        store.add(pattern("[C] [D]", 2).with_domains(["data", "code"]));
        store.add(pattern("[E] [F]", 5).with_domains(["data"]));

        let data: Vec<&str> = store
            .top(10, Some("data"))
            .iter()
            .map(|p| p.pattern.as_str())
            .collect();
        assert_eq!(data, vec!["[E] [F]", "[C] [D]"]);
        assert!(store.top(10, Some("legal")).is_empty());
        assert!(store.top(0, None).is_empty());
    }

    #[test]
    fn test_stats() {
        let mut store = PatternStore::new();
        store.add(pattern("[A] [B]", 4));
        store.add(pattern("[C] [D] [E]", 6));

        let stats = store.stats();
        assert_eq!(stats.total_patterns, 2);
        assert_eq!(stats.total_uses, 10);
        assert_eq!(stats.total_tokens_saved, 4 + 12);
        assert!((stats.avg_compression_gain - 1.5).abs() < f64::EPSILON);
        let most = stats.most_used.unwrap();
        assert_eq!(most.pattern, "[C] [D] [E]");
        assert_eq!(most.frequency, 6);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("patterns.json");

        let mut store = PatternStore::open(&path).unwrap();
        let added = store
            .add_many(vec![
                pattern("[A] [B]", 2).with_examples(["ab"]).with_domains(["code"]),
                pattern("[C] [D] [E]", 3),
            ])
            .unwrap();
        assert_eq!(added, 2);
        assert!(path.exists());

        let reloaded = PatternStore::open(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        let originals: Vec<&Pattern> = store.iter().collect();
        let loaded: Vec<&Pattern> = reloaded.iter().collect();
        assert_eq!(originals, loaded);
    }

    #[test]
    fn test_snapshot_contains_stats_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.json");

        let mut store = PatternStore::open(&path).unwrap();
        store.add_many(vec![pattern("[A] [B]", 7)]).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["stats"]["total_patterns"], 1);
        assert_eq!(raw["stats"]["total_uses"], 7);
        assert_eq!(raw["stats"]["most_used"]["frequency"], 7);
        assert_eq!(raw["patterns"][0]["pattern"], "[A] [B]");
    }

    #[test]
    fn test_add_many_merges_into_existing_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.json");

        PatternStore::open(&path)
            .unwrap()
            .add_many(vec![pattern("[A] [B]", 2)])
            .unwrap();

        let mut second = PatternStore::open(&path).unwrap();
        let added = second
            .add_many(vec![pattern("[A] [B]", 3), pattern("[X] [Y]", 2)])
            .unwrap();
        assert_eq!(added, 1);

        let reloaded = PatternStore::open(&path).unwrap();
        assert_eq!(reloaded.get(&pattern("[A] [B]", 0).id).unwrap().frequency, 5);
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn test_corrupt_snapshot_is_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        fs::write(&path, "{ \"patterns\": [ { \"id\": 1 } ] }").unwrap();

        let result = PatternStore::open(&path);
        assert!(matches!(result, Err(TpsError::Format { .. })));
    }

    #[test]
    fn test_bad_timestamp_is_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let mut record = serde_json::to_value(pattern("[A] [B]", 1)).unwrap();
        record["first_seen"] = serde_json::json!("yesterday");
        fs::write(&path, serde_json::json!({ "patterns": [record] }).to_string()).unwrap();

        assert!(matches!(PatternStore::open(&path), Err(TpsError::Format { .. })));
    }

    #[test]
    fn test_snapshot_without_stats_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let record = serde_json::to_value(pattern("[A] [B]", 1)).unwrap();
        fs::write(&path, serde_json::json!({ "patterns": [record] }).to_string()).unwrap();

        assert_eq!(PatternStore::open(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_directory_path_is_io_error() {
        let dir = tempdir().unwrap();
        let result = PatternStore::open(dir.path());
        assert!(matches!(result, Err(TpsError::IoError(_))));
    }

    #[test]
    fn test_memory_store_save_is_noop() {
        let mut store = PatternStore::new();
        assert_eq!(store.add_many(vec![pattern("[A] [B]", 1)]).unwrap(), 1);
        assert!(store.path().is_none());
    }

    #[test]
    fn test_redefine_bumps_version() {
        let mut store = PatternStore::new();
        let p = pattern("[A] [B]", 2);
        store.add(p.clone());

        let updated = store.redefine(&p.id, "[A] [B] [C]").unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.compression_gain, 2);
        assert_eq!(store.get(&p.id).unwrap().pattern, "[A] [B] [C]");

        assert!(matches!(store.redefine("MISSING", "[X] [Y]"), Err(TpsError::NotFound(_))));
    }

    #[test]
    fn test_resolve_checks_version() {
        let mut store = PatternStore::new();
        let p = pattern("[A] [B]", 2);
        store.add(p.clone());

        assert_eq!(store.resolve(&RefToken::new(p.id.clone(), 1)).unwrap().pattern, "[A] [B]");
        assert!(matches!(
            store.resolve(&RefToken::new(p.id.clone(), 2)),
            Err(TpsError::StaleReference { expected: 1, found: 2, .. })
        ));
        assert!(matches!(
            store.resolve(&RefToken::new("MISSING", 1)),
            Err(TpsError::NotFound(_))
        ));
    }

    #[test]
    fn test_add_does_not_change_version() {
        let mut store = PatternStore::new();
        let p = pattern("[A] [B]", 1);
        store.add(p.clone());
        store.redefine(&p.id, "[A] [B] [C]").unwrap();
        store.add(p.clone());
        assert_eq!(store.get(&p.id).unwrap().version, 2);
        assert_eq!(store.get(&p.id).unwrap().frequency, 2);
    }
}
