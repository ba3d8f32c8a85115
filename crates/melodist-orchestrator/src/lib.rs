//! Melodist Orchestrator
//!
//! The async service layer around [`melodist_core`]. A single [`Composer`]
//! owns the shared state for the life of the process:
//!
//! - [`cache`]: fingerprint-keyed TTL cache with single-flight coalescing
//! - [`admission`]: bounded FIFO concurrency, pacing floor, usage window
//! - [`fewshot`]: training corpus loading and example selection
//! - [`chords`]: per-section chord progression selection
//! - [`feedback`]: negative feedback set and its persisted log
//! - [`generator`]: the external generator seam and output parsing
//! - [`config`]: JSON configuration for all of the above
//!
//! # Example
//!
//! ```
//! use melodist_core::GenerationRequest;
//! use melodist_orchestrator::{Composer, ComposerConfig, ReplayGenerator};
//! use serde_json::json;
//!
//! let mut config = ComposerConfig::default();
//! config.admission.min_interval_ms = 0;
//! let generator = ReplayGenerator::new(vec![json!([
//!     {"note": "A3", "start": 0, "duration": 1},
//!     {"note": "C4", "start": 1, "duration": 1}
//! ])]);
//! let composer = Composer::new(config, generator).unwrap();
//!
//! let rt = tokio::runtime::Builder::new_current_thread()
//!     .enable_all()
//!     .build()
//!     .unwrap();
//! let composition = rt
//!     .block_on(composer.compose(&GenerationRequest::new("dark trap melody")))
//!     .unwrap();
//! assert_eq!(composition.melody.len(), 2);
//! ```

pub mod admission;
pub mod cache;
pub mod chords;
pub mod composer;
pub mod config;
pub mod error;
pub mod feedback;
pub mod fewshot;
pub mod generator;

pub use admission::{estimate_tokens, AdmissionController, AdmissionPermit, UsageReport};
pub use cache::CompositionCache;
pub use chords::{ChordProgressionSelector, ChordQuery};
pub use composer::Composer;
pub use config::{
    AdmissionConfig, CacheConfig, ChordConfig, ComposerConfig, FeedbackConfig, FewShotConfig,
    GenerationConfig, ValidationConfig,
};
pub use error::{CapacityReason, ComposeError, ConfigError, GenerationFailure, GeneratorError};
pub use feedback::{FeedbackEntry, FeedbackStore};
pub use fewshot::{CorpusStore, FewShotSelector, SelectionContext, TrainingExample};
pub use generator::{
    parse_output, GenerationContext, Generator, GeneratorInput, RawLayers, ReplayGenerator,
};
