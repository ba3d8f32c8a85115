//! Composer fixtures backed by temporary directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use melodist_orchestrator::{AdmissionConfig, Composer, ComposerConfig};
use tempfile::TempDir;

use crate::mock::CountingGenerator;

/// Default config with pacing disabled, so tests only wait where they mean to.
pub fn fast_config() -> ComposerConfig {
    ComposerConfig {
        admission: AdmissionConfig {
            min_interval_ms: 0,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A note array with one note per beat.
pub fn melody(pitches: &[&str]) -> serde_json::Value {
    pitches
        .iter()
        .enumerate()
        .map(|(beat, pitch)| {
            serde_json::json!({"note": pitch, "start": beat, "duration": 1, "velocity": 96})
        })
        .collect()
}

/// A composer over a [`CountingGenerator`] with its files in a temp dir.
pub struct ComposerFixture {
    pub root: TempDir,
    pub composer: Arc<Composer<CountingGenerator>>,
}

impl ComposerFixture {
    /// Builds a composer whose feedback log lives in a fresh temp dir.
    pub fn new(mut config: ComposerConfig, generator: CountingGenerator) -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        config.feedback.log_path = Some(root.path().join("feedback.json"));
        let composer = Composer::new(config, generator).expect("Failed to build composer");
        Self {
            root,
            composer: Arc::new(composer),
        }
    }

    /// Like [`ComposerFixture::new`], with a training corpus written first.
    pub fn with_corpus(
        mut config: ComposerConfig,
        generator: CountingGenerator,
        corpus: &serde_json::Value,
    ) -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        let corpus_path = write_json(root.path(), "corpus.json", corpus);
        config.few_shot.corpus_path = Some(corpus_path);
        config.feedback.log_path = Some(root.path().join("feedback.json"));
        let composer = Composer::new(config, generator).expect("Failed to build composer");
        Self {
            root,
            composer: Arc::new(composer),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn generator(&self) -> &CountingGenerator {
        self.composer.generator()
    }
}

fn write_json(dir: &Path, name: &str, value: &serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, value.to_string()).expect("Failed to write fixture file");
    path
}
