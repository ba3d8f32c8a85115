//! CLI command implementations

pub mod chords;
pub mod compose;
pub mod examples;
pub mod feedback;
pub mod fingerprint;
pub mod validate;
