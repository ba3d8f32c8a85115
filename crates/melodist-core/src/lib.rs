//! Melodist Core Library
//!
//! Types and pure algorithms shared by the Melodist composer service:
//! request normalization and fingerprinting, the note/composition model,
//! prompt analysis, music theory helpers, and the note validator.
//!
//! Nothing in this crate performs I/O or holds shared state; the
//! orchestration layer (`melodist-orchestrator`) builds on it.
//!
//! # Example
//!
//! ```
//! use melodist_core::{GenerationRequest, Key, Layer};
//! use melodist_core::validation::{validate, ValidationOptions};
//!
//! let request = GenerationRequest::new("dark trap melody, 140 bpm")
//!     .measures(2)
//!     .layer(Layer::Melody);
//! let normalized = request.normalize();
//! let fingerprint = request.fingerprint().unwrap();
//! assert_eq!(fingerprint.as_str().len(), 64);
//!
//! let raw = vec![serde_json::json!({"note": "A#3", "start": 0, "duration": 1})];
//! let key = Key::parse("A minor").unwrap();
//! let options = ValidationOptions::strict(normalized.beat_budget(), normalized.grid_step());
//! let notes = validate(&raw, &key, &options);
//! assert_eq!(notes[0].pitch, "A3");
//! ```
//!
//! # Modules
//!
//! - [`error`]: Error type for unreadable documents
//! - [`hash`]: Canonical JSON, fingerprints, signatures, seeded selection
//! - [`note`]: Notes, layers, and compositions
//! - [`prompt`]: Key, tempo, mood, and keyword extraction from prompts
//! - [`request`]: Generation requests and their normalized form
//! - [`theory`]: Pitch names, keys and scales, chord symbols
//! - [`validation`]: The note correction pipeline

pub mod error;
pub mod hash;
pub mod note;
pub mod prompt;
pub mod request;
pub mod theory;
pub mod validation;

// Re-export commonly used types at the crate root
pub use error::CoreError;
pub use hash::{
    canonical_value_hash, canonicalize_json, composition_signature, fingerprint, seeded_u32,
    Fingerprint,
};
pub use note::{
    beat_budget, Composition, Layer, Note, BEATS_PER_MEASURE, BEAT_EPSILON, DEFAULT_TEMPO,
    DEFAULT_VELOCITY, MIDI_MAX, MIDI_MIN,
};
pub use prompt::{analyze_prompt, Mood, PromptAnalysis};
pub use request::{
    CanonicalNote, GenerationRequest, NormalizedRequest, DEFAULT_GRID, DEFAULT_MEASURES,
    MAX_MEASURES,
};
pub use theory::{Key, Mode, Scale};
pub use validation::{
    validate, MelodyValidator, TimingMode, Validated, ValidationOptions, ValidationProfile,
    ValidationReport,
};
