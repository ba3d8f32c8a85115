//! Melodist CLI library.
//!
//! Offline access to the composition pipeline: fingerprinting, note
//! validation, chord and example selection, replay composition and the
//! negative feedback log.

pub mod commands;
pub mod input;
