//! Negative feedback: signatures of compositions a user rejected.
//!
//! The log is a JSON array of entries, oldest first, capped at a fixed
//! count. Reads only need the signature set; the rest of each entry is kept
//! for offline inspection.
//!
//! Persistence is best effort. A missing or corrupt log loads as empty and a
//! failed write is logged; the in-memory set is updated either way.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use melodist_core::{composition_signature, Composition, CoreError, NormalizedRequest};
use serde::{Deserialize, Serialize};

/// One rejected composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntry {
    pub prompt: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub measures: u32,
    #[serde(default)]
    pub tempo: Option<u32>,
    #[serde(default)]
    pub grid_resolution: u32,
    #[serde(default)]
    pub chord_progression: Option<String>,
    #[serde(default)]
    pub reason: String,
    pub notes: Composition,
    pub signature: String,
    /// RFC 3339.
    pub timestamp: String,
}

impl FeedbackEntry {
    /// Builds an entry for `composition` produced from `request`.
    pub fn new(
        request: &NormalizedRequest,
        composition: &Composition,
        reason: impl Into<String>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            prompt: request.prompt.clone(),
            key: request.key.clone(),
            measures: request.measures,
            tempo: request.tempo,
            grid_resolution: request.grid_resolution,
            chord_progression: request.chord_progression.clone(),
            reason: reason.into(),
            notes: composition.clone(),
            signature: composition_signature(composition)?,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Default)]
struct FeedbackState {
    entries: Vec<FeedbackEntry>,
    signatures: HashSet<String>,
}

impl FeedbackState {
    fn rebuild_signatures(&mut self) {
        self.signatures = self.entries.iter().map(|e| e.signature.clone()).collect();
    }
}

#[derive(Debug)]
pub struct FeedbackStore {
    path: Option<PathBuf>,
    max_entries: usize,
    state: Mutex<FeedbackState>,
}

impl FeedbackStore {
    /// Loads the log at `path` (if any).
    pub fn open(path: Option<PathBuf>, max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        let mut entries = path.as_deref().map(load_log).unwrap_or_default();
        if entries.len() > max_entries {
            entries.drain(..entries.len() - max_entries);
        }
        let mut state = FeedbackState {
            entries,
            signatures: HashSet::new(),
        };
        state.rebuild_signatures();
        Self {
            path,
            max_entries,
            state: Mutex::new(state),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory(max_entries: usize) -> Self {
        Self::open(None, max_entries)
    }

    fn lock(&self) -> MutexGuard<'_, FeedbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.lock().signatures.contains(signature)
    }

    /// Whether `composition` was previously rejected.
    pub fn is_rejected(&self, composition: &Composition) -> bool {
        match composition_signature(composition) {
            Ok(signature) => self.contains(&signature),
            Err(e) => {
                log::debug!("could not sign composition: {}", e);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the log, oldest first.
    pub fn entries(&self) -> Vec<FeedbackEntry> {
        self.lock().entries.clone()
    }

    /// Appends an entry and persists the log. Returns whether the write
    /// succeeded; the entry is recorded in memory regardless.
    pub fn record(&self, entry: FeedbackEntry) -> bool {
        let mut state = self.lock();
        state.entries.push(entry);
        if state.entries.len() > self.max_entries {
            let excess = state.entries.len() - self.max_entries;
            state.entries.drain(..excess);
        }
        state.rebuild_signatures();

        let Some(path) = self.path.as_deref() else {
            return true;
        };
        match write_log(path, &state.entries) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("failed to write feedback log {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// Reads a feedback log, skipping unreadable entries.
pub fn load_log(path: &Path) -> Vec<FeedbackEntry> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            log::warn!("failed to read feedback log {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<serde_json::Value>>(&text) {
        Ok(values) => values
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        Err(e) => {
            log::warn!("feedback log {} is corrupt, starting empty: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Writes the log via a temp file in the same directory, then renames.
fn write_log(path: &Path, entries: &[FeedbackEntry]) -> Result<(), CoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    let json = serde_json::to_string_pretty(entries)?;
    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| CoreError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use melodist_core::{GenerationRequest, Note};
    use pretty_assertions::assert_eq;

    fn composition(pitch: &str) -> Composition {
        let mut c = Composition::new(120);
        c.melody.push(Note::new(pitch, 0.0, 1.0));
        c
    }

    fn entry(pitch: &str) -> FeedbackEntry {
        let request = GenerationRequest::new("dark trap").normalize();
        FeedbackEntry::new(&request, &composition(pitch), "too busy").unwrap()
    }

    #[test]
    fn test_record_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback").join("log.json");

        let store = FeedbackStore::open(Some(path.clone()), 10);
        assert!(store.is_empty());
        assert!(store.record(entry("C4")));
        assert!(store.is_rejected(&composition("C4")));
        assert!(!store.is_rejected(&composition("D4")));

        let reopened = FeedbackStore::open(Some(path), 10);
        assert_eq!(reopened.len(), 1);
        assert!(reopened.is_rejected(&composition("C4")));
        assert_eq!(reopened.entries()[0].reason, "too busy");
    }

    #[test]
    fn test_cap_drops_oldest() {
        let store = FeedbackStore::in_memory(2);
        store.record(entry("C4"));
        store.record(entry("D4"));
        store.record(entry("E4"));
        assert_eq!(store.len(), 2);
        assert!(!store.is_rejected(&composition("C4")));
        assert!(store.is_rejected(&composition("E4")));
    }

    #[test]
    fn test_corrupt_log_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "{ nope").unwrap();
        let store = FeedbackStore::open(Some(path), 10);
        assert!(store.is_empty());
    }

    #[test]
    fn test_write_failure_still_updates_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the log file should be makes the rename fail
        let path = dir.path().join("log.json");
        std::fs::create_dir(&path).unwrap();

        let store = FeedbackStore::open(Some(path), 10);
        assert!(!store.record(entry("C4")));
        assert!(store.is_rejected(&composition("C4")));
    }

    #[test]
    fn test_entry_wire_format() {
        let json = serde_json::to_value(entry("C4")).unwrap();
        assert_eq!(json["prompt"], "dark trap");
        assert_eq!(json["gridResolution"], 16);
        assert!(json["signature"].as_str().unwrap().len() == 64);
        assert!(json["notes"]["melody"].is_array());
    }
}
