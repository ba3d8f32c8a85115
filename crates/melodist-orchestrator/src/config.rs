//! Composer configuration.
//!
//! Every section is optional in the JSON file; missing fields take the
//! defaults below.
//!
//! ```json
//! {
//!   "cache": { "ttl_secs": 1800, "max_entries": 256 },
//!   "admission": { "max_concurrent": 2, "min_interval_ms": 2000 },
//!   "few_shot": { "max_examples": 3, "corpus_path": "data/corpus.json" },
//!   "validation": { "profile": "strict", "min_notes": 8, "backfill": true }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use melodist_core::validation::{ValidationProfile, DEFAULT_MAX_INTERVAL};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for a [`Composer`](crate::Composer).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub cache: CacheConfig,
    pub admission: AdmissionConfig,
    pub few_shot: FewShotConfig,
    pub chords: ChordConfig,
    pub validation: ValidationConfig,
    pub feedback: FeedbackConfig,
    pub generation: GenerationConfig,
}

impl ComposerConfig {
    /// Loads a configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        // Surface a bad profile name at load time rather than on first request
        config.validation.profile()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
    /// Oldest entry is evicted beyond this many.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            max_entries: 256,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Concurrent generator calls.
    pub max_concurrent: usize,
    /// Minimum spacing between permit grants.
    pub min_interval_ms: u64,
    /// Soft token budget per usage window.
    pub daily_token_budget: u64,
    /// Usage window length.
    pub window_secs: u64,
    /// Give up waiting for a permit after this long. `None` waits forever.
    pub acquire_timeout_ms: Option<u64>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            min_interval_ms: 2000,
            daily_token_budget: 1_000_000,
            window_secs: 24 * 60 * 60,
            acquire_timeout_ms: None,
        }
    }
}

impl AdmissionConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FewShotConfig {
    /// Examples passed to the generator. Zero disables few-shot guidance.
    pub max_examples: usize,
    /// Corpus file; no corpus means no examples.
    pub corpus_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordConfig {
    /// Progressions per request (sections A, B, C). Clamped to 1..=3.
    pub sections: usize,
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self { sections: 3 }
    }
}

/// Validation profile selection plus per-field overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// `preserve` (default) or `strict`.
    #[serde(rename = "profile")]
    pub profile_name: String,
    pub max_interval: u8,
    pub min_notes: Option<usize>,
    pub backfill: bool,
    pub humanize: bool,
    pub allow_chromatic: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            profile_name: "preserve".to_string(),
            max_interval: DEFAULT_MAX_INTERVAL,
            min_notes: None,
            backfill: false,
            humanize: false,
            allow_chromatic: false,
        }
    }
}

impl ValidationConfig {
    /// Resolves the named profile and applies overrides.
    pub fn profile(&self) -> Result<ValidationProfile, ConfigError> {
        let base = ValidationProfile::by_name(&self.profile_name)
            .ok_or_else(|| ConfigError::UnknownProfile(self.profile_name.clone()))?;
        Ok(ValidationProfile {
            max_interval: self.max_interval,
            min_notes: self.min_notes,
            backfill: self.backfill,
            humanize: self.humanize,
            allow_chromatic: self.allow_chromatic,
            ..base
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Feedback log file; `None` keeps feedback in memory only.
    pub log_path: Option<PathBuf>,
    /// Oldest entries are dropped beyond this many.
    pub max_entries: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            max_entries: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Total generator attempts per request before giving up.
    pub max_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use melodist_core::TimingMode;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ComposerConfig::default();
        assert_eq!(config.cache.ttl(), Duration::from_secs(1800));
        assert_eq!(config.admission.max_concurrent, 2);
        assert_eq!(config.admission.min_interval(), Duration::from_secs(2));
        assert_eq!(config.admission.acquire_timeout(), None);
        assert_eq!(config.few_shot.max_examples, 0);
        assert_eq!(config.chords.sections, 3);
        assert_eq!(config.feedback.max_entries, 500);
        assert_eq!(config.generation.max_attempts, 2);
        assert_eq!(
            config.validation.profile().unwrap(),
            ValidationProfile::preserve()
        );
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"admission": {{"max_concurrent": 4}}, "validation": {{"profile": "strict", "min_notes": 8, "backfill": true}}}}"#
        )
        .unwrap();

        let config = ComposerConfig::from_path(file.path()).unwrap();
        assert_eq!(config.admission.max_concurrent, 4);
        assert_eq!(config.admission.min_interval_ms, 2000);

        let profile = config.validation.profile().unwrap();
        assert_eq!(profile.mode, TimingMode::Strict);
        assert_eq!(profile.min_notes, Some(8));
        assert!(profile.backfill);
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"validation": {{"profile": "loose"}}}}"#).unwrap();
        let err = ComposerConfig::from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile(ref name) if name == "loose"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ComposerConfig::from_path(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
