//! Note validation and correction.
//!
//! Raw generator output is a list of loosely-typed JSON note objects. The
//! validator turns it into notes that are guaranteed to satisfy
//!
//! - `0 <= start < beat_budget`
//! - `start + duration <= beat_budget`
//! - `duration > 0`
//! - `1 <= velocity <= 127`
//! - ascending order by start
//!
//! by running a fixed sequence of correction stages:
//!
//! 1. structural filter (drop unparseable notes)
//! 2. range clamp (drop late starts, trim long tails)
//! 3. timing (grid quantize in strict mode, 2-decimal rounding otherwise)
//! 4. scale snap (strict)
//! 5. interval clamp (strict, monophonic)
//! 6. dedupe by (start bucket, pitch)
//! 7. backfill (strict, opt-in)
//! 8. humanize (opt-in)
//! 9. final bounds check, velocity clamp, sort

mod profile;
mod stages;

#[cfg(test)]
mod tests;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::hash::seeded_u32;
use crate::note::Note;
use crate::theory::key::Key;

pub use profile::{
    TimingMode, ValidationOptions, ValidationProfile, BACKFILL_VELOCITY_JITTER,
    DEFAULT_MAX_INTERVAL, HUMANIZE_TIMING, HUMANIZE_VELOCITY,
};
pub use stages::quantize;

/// Per-stage counters from one validator run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub input_notes: usize,
    pub malformed: usize,
    pub out_of_range: usize,
    pub off_grid_dropped: usize,
    pub pitches_snapped: usize,
    pub intervals_clamped: usize,
    pub duplicates: usize,
    pub backfilled: usize,
    pub final_dropped: usize,
    pub output_notes: usize,
}

impl ValidationReport {
    /// Whether any stage rewrote or removed input.
    pub fn changed_anything(&self) -> bool {
        self.malformed
            + self.out_of_range
            + self.off_grid_dropped
            + self.pitches_snapped
            + self.intervals_clamped
            + self.duplicates
            + self.backfilled
            + self.final_dropped
            > 0
    }
}

/// Validated notes together with the run's report.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub notes: Vec<Note>,
    pub report: ValidationReport,
}

/// Validator bound to a key and a set of options.
#[derive(Debug, Clone)]
pub struct MelodyValidator {
    key: Key,
    options: ValidationOptions,
}

impl MelodyValidator {
    pub fn new(key: Key, options: ValidationOptions) -> Self {
        Self { key, options }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Validates raw notes with an RNG seeded from the input itself, so the
    /// same input always yields the same output.
    pub fn validate(&self, raw: &[serde_json::Value]) -> Validated {
        let content = serde_json::to_string(raw).unwrap_or_default();
        let seed = seeded_u32(&content, &self.key.to_string());
        let mut rng = Pcg32::seed_from_u64(u64::from(seed));
        self.validate_with_rng(raw, &mut rng)
    }

    /// Validates typed notes (e.g. a layer already parsed from a generator).
    pub fn validate_notes(&self, notes: &[Note]) -> Validated {
        let raw: Vec<serde_json::Value> = notes
            .iter()
            .filter_map(|n| serde_json::to_value(n).ok())
            .collect();
        self.validate(&raw)
    }

    /// Validates raw notes, drawing backfill and humanize jitter from `rng`.
    pub fn validate_with_rng<R: Rng>(&self, raw: &[serde_json::Value], rng: &mut R) -> Validated {
        let options = &self.options;
        let budget = options.beat_budget;
        let scale = self.key.scale(options.allow_chromatic);
        let mut report = ValidationReport {
            input_notes: raw.len(),
            ..Default::default()
        };

        let mut drafts = stages::structural_filter(raw);
        report.malformed = raw.len() - drafts.len();

        report.out_of_range = stages::range_clamp(&mut drafts, budget);
        report.off_grid_dropped = stages::normalize_timing(&mut drafts, options);

        if options.is_strict() {
            report.pitches_snapped = stages::scale_correct(&mut drafts, &self.key, scale);
            if options.monophonic {
                report.intervals_clamped =
                    stages::clamp_intervals(&mut drafts, &self.key, scale, options.max_interval);
            }
        }

        report.duplicates = stages::dedupe(&mut drafts, options);
        report.backfilled = stages::backfill(&mut drafts, options, rng);

        if options.humanize {
            stages::humanize(&mut drafts, rng);
        }

        let (notes, final_dropped) = stages::finalize(drafts, budget);
        report.final_dropped = final_dropped;
        report.output_notes = notes.len();

        if report.changed_anything() {
            log::debug!(
                "validated {} -> {} notes in {} ({} mode): {:?}",
                report.input_notes,
                report.output_notes,
                self.key,
                options.mode.as_str(),
                report
            );
        }

        Validated { notes, report }
    }
}

/// Validates raw notes against a key and options.
///
/// # Example
/// ```
/// use melodist_core::validation::{validate, ValidationOptions};
/// use melodist_core::Key;
///
/// let raw = vec![
///     serde_json::json!({"note": "C4", "start": 7.5, "duration": 2}),
///     serde_json::json!({"note": "D4", "start": 9, "duration": 1}),
/// ];
/// let notes = validate(&raw, &Key::default(), &ValidationOptions::new(8.0));
/// assert_eq!(notes.len(), 1);
/// assert_eq!(notes[0].duration, 0.5);
/// ```
pub fn validate(raw: &[serde_json::Value], key: &Key, options: &ValidationOptions) -> Vec<Note> {
    MelodyValidator::new(*key, options.clone()).validate(raw).notes
}
