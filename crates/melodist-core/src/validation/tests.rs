//! Validator pipeline tests.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

use super::*;
use crate::theory::key::Mode;

fn a_minor() -> Key {
    Key::new(9, Mode::Minor)
}

fn pitches(notes: &[Note]) -> Vec<&str> {
    notes.iter().map(|n| n.pitch.as_str()).collect()
}

#[test]
fn test_empty_input() {
    let out = validate(&[], &Key::default(), &ValidationOptions::new(16.0));
    assert!(out.is_empty());
}

#[test]
fn test_trailing_note_is_trimmed_and_late_note_dropped() {
    let raw = vec![
        json!({"note": "C4", "start": 7.5, "duration": 2}),
        json!({"note": "C4", "start": 9, "duration": 1}),
    ];
    let result = MelodyValidator::new(Key::default(), ValidationOptions::new(8.0)).validate(&raw);
    assert_eq!(result.notes, vec![Note::new("C4", 7.5, 0.5)]);
    assert_eq!(result.report.out_of_range, 1);
}

#[test]
fn test_duplicates_collapse() {
    let raw = vec![
        json!({"note": "C4", "start": 2.0, "duration": 1, "velocity": 90}),
        json!({"note": "C4", "start": 2.0, "duration": 0.5}),
    ];
    let result = MelodyValidator::new(Key::default(), ValidationOptions::new(8.0)).validate(&raw);
    assert_eq!(result.notes.len(), 1);
    assert_eq!(result.notes[0].velocity, 90);
    assert_eq!(result.report.duplicates, 1);
}

#[test]
fn test_strict_snaps_out_of_key_pitch() {
    let raw = vec![json!({"note": "A#3", "start": 0, "duration": 1})];
    let out = validate(&raw, &a_minor(), &ValidationOptions::strict(16.0, 0.25));
    assert_eq!(pitches(&out), vec!["A3"]);
}

#[test]
fn test_preserve_leaves_pitches_alone() {
    let raw = vec![
        json!({"note": "A#3", "start": 0.333, "duration": 1}),
        json!({"note": "C4", "start": 1, "duration": 1}),
        json!({"note": "C6", "start": 2, "duration": 1}),
    ];
    let out = validate(&raw, &a_minor(), &ValidationOptions::new(16.0));
    assert_eq!(pitches(&out), vec!["A#3", "C4", "C6"]);
    assert_eq!(out[0].start, 0.33);
}

#[test]
fn test_strict_quantizes_to_grid() {
    let raw = vec![
        json!({"note": "C4", "start": 0.26, "duration": 0.3}),
        json!({"note": "E4", "start": 1.13, "duration": 0.02}),
    ];
    let out = validate(&raw, &Key::default(), &ValidationOptions::strict(16.0, 0.25));
    assert_eq!(out[0].start, 0.25);
    assert_eq!(out[0].duration, 0.25);
    assert_eq!(out[1].start, 1.25);
    // Zero-length after quantization is raised to one step
    assert_eq!(out[1].duration, 0.25);
}

#[test]
fn test_interval_clamp_only_for_monophonic() {
    let raw = vec![
        json!({"note": "C4", "start": 0, "duration": 1}),
        json!({"note": "C6", "start": 1, "duration": 1}),
    ];
    let options = ValidationOptions::strict(16.0, 0.25);
    let melodic = validate(&raw, &Key::default(), &options);
    assert_eq!(pitches(&melodic), vec!["C4", "C5"]);

    let chordal = validate(&raw, &Key::default(), &options.clone().monophonic(false));
    assert_eq!(pitches(&chordal), vec!["C4", "C6"]);
}

#[test]
fn test_interval_clamp_uses_time_order() {
    // Listed out of order; C6 comes first in time
    let raw = vec![
        json!({"note": "C4", "start": 1, "duration": 1}),
        json!({"note": "C6", "start": 0, "duration": 1}),
    ];
    let out = validate(&raw, &Key::default(), &ValidationOptions::strict(16.0, 0.25));
    assert_eq!(pitches(&out), vec!["C6", "C5"]);
}

#[test]
fn test_loose_typing_is_accepted() {
    let raw = vec![
        json!({"pitch": "G4", "start": "0.5", "duration": "1", "velocity": "80", "slide": "true"}),
        json!({"note": "G4", "start": null, "duration": 1}),
        json!(42),
    ];
    let result = MelodyValidator::new(Key::default(), ValidationOptions::new(16.0)).validate(&raw);
    assert_eq!(result.notes.len(), 1);
    assert_eq!(result.notes[0].velocity, 80);
    assert!(result.notes[0].slide);
    assert_eq!(result.report.malformed, 2);
}

#[test]
fn test_velocity_clamped() {
    let raw = vec![
        json!({"note": "C4", "start": 0, "duration": 1, "velocity": 0}),
        json!({"note": "D4", "start": 1, "duration": 1, "velocity": 200}),
    ];
    let out = validate(&raw, &Key::default(), &ValidationOptions::new(16.0));
    assert_eq!(out[0].velocity, 1);
    assert_eq!(out[1].velocity, 127);
}

#[test]
fn test_huge_velocity_clamps_through_jitter() {
    let raw: Vec<_> = (0..4)
        .map(|i| json!({"note": "C4", "start": i, "duration": 1, "velocity": 1e300}))
        .chain(std::iter::once(
            json!({"note": "E4", "start": 4, "duration": 1, "velocity": -1e300}),
        ))
        .collect();
    let options = ValidationOptions::strict(16.0, 0.25)
        .humanize(true)
        .min_notes(10);
    let out = validate(&raw, &Key::default(), &options);
    assert_eq!(out.len(), 10);
    assert!(out.iter().filter(|n| n.pitch == "C4").all(|n| n.velocity == 127));
    assert!(out.iter().filter(|n| n.pitch == "E4").all(|n| n.velocity == 1));

    let preserved = validate(&raw, &Key::default(), &ValidationOptions::new(8.0).humanize(true));
    assert_eq!(preserved[0].velocity, 127);
}

#[test]
fn test_non_numeric_velocity_falls_back_to_default() {
    let raw = vec![
        json!({"note": "C4", "start": 0, "duration": 1, "velocity": "loud"}),
        json!({"note": "D4", "start": 1, "duration": 1, "velocity": true}),
        json!({"note": "E4", "start": 2, "duration": 1, "velocity": {}}),
    ];
    let result = MelodyValidator::new(Key::default(), ValidationOptions::new(16.0)).validate(&raw);
    assert_eq!(result.report.malformed, 0);
    assert_eq!(pitches(&result.notes), vec!["C4", "D4", "E4"]);
    assert!(result
        .notes
        .iter()
        .all(|n| n.velocity == crate::note::DEFAULT_VELOCITY));
}

#[test]
fn test_backfill_reaches_min_notes() {
    let raw = vec![
        json!({"note": "A3", "start": 0, "duration": 0.5}),
        json!({"note": "C4", "start": 0.5, "duration": 0.5}),
    ];
    let options = ValidationOptions::strict(16.0, 0.25).min_notes(6);
    let result = MelodyValidator::new(a_minor(), options).validate(&raw);
    assert_eq!(result.notes.len(), 6);
    assert_eq!(result.report.backfilled, 4);
    assert_eq!(
        pitches(&result.notes),
        vec!["A3", "C4", "A3", "C4", "A3", "C4"]
    );
    assert_eq!(result.notes[5].start, 2.5);
}

#[test]
fn test_humanize_stays_in_bounds() {
    let raw: Vec<_> = (0..16)
        .map(|i| json!({"note": "E4", "start": i as f64 * 0.5, "duration": 0.5}))
        .collect();
    let options = ValidationOptions::strict(8.0, 0.25).humanize(true);
    let out = validate(&raw, &Key::default(), &options);
    assert_eq!(out.len(), 16);
    for (i, note) in out.iter().enumerate() {
        let nominal = i as f64 * 0.5;
        assert!((note.start - nominal).abs() <= HUMANIZE_TIMING / 2.0 + 1e-6);
        assert!((94..=106).contains(&note.velocity));
        assert!(note.end() <= 8.0 + 1e-6);
    }
}

#[test]
fn test_validate_is_deterministic() {
    let raw: Vec<_> = (0..8)
        .map(|i| json!({"note": "F#4", "start": i, "duration": 1}))
        .collect();
    let validator = MelodyValidator::new(
        a_minor(),
        ValidationOptions::strict(16.0, 0.25).humanize(true).min_notes(12),
    );
    assert_eq!(validator.validate(&raw), validator.validate(&raw));
}

#[test]
fn test_profile_by_name() {
    assert_eq!(ValidationProfile::by_name("default"), Some(ValidationProfile::preserve()));
    assert_eq!(
        ValidationProfile::by_name("strict").map(|p| p.mode),
        Some(TimingMode::Strict)
    );
    assert!(ValidationProfile::by_name("loose").is_none());
}

fn arbitrary_note() -> impl Strategy<Value = serde_json::Value> {
    (
        prop::sample::select(vec!["C4", "D#3", "Bb5", "G2", "A0", "C8", "x9", "C#-1"]),
        -2.0f64..40.0,
        -0.5f64..6.0,
        -20i64..300,
    )
        .prop_map(|(pitch, start, duration, velocity)| {
            json!({"note": pitch, "start": start, "duration": duration, "velocity": velocity})
        })
}

proptest! {
    /// Quantizing twice is the same as quantizing once.
    #[test]
    fn quantize_is_idempotent(value in -100.0f64..100.0, denom in 1u32..64) {
        let step = 4.0 / f64::from(denom);
        let once = quantize(value, step);
        prop_assert_eq!(quantize(once, step), once);
    }

    /// Every output satisfies the bounds regardless of input.
    #[test]
    fn output_respects_invariants(
        raw in prop::collection::vec(arbitrary_note(), 0..40),
        measures in 1u32..9,
        strict in any::<bool>(),
        humanize in any::<bool>(),
    ) {
        let budget = f64::from(measures) * 4.0;
        let mut options = if strict {
            ValidationOptions::strict(budget, 0.25).min_notes(8)
        } else {
            ValidationOptions::new(budget)
        };
        options = options.humanize(humanize);
        let out = validate(&raw, &a_minor(), &options);

        for note in &out {
            prop_assert!(note.start >= 0.0 && note.start < budget);
            prop_assert!(note.duration > 0.0);
            prop_assert!(note.end() <= budget + 1e-9);
            prop_assert!((1..=127).contains(&note.velocity));
            let midi = note.midi().unwrap_or(0);
            prop_assert!((21..=108).contains(&midi));
        }
        for pair in out.windows(2) {
            prop_assert!(pair[0].start <= pair[1].start);
        }
    }

    /// Strict melodic output never leaps further than the limit.
    #[test]
    fn strict_melody_respects_max_interval(
        pitches in prop::collection::vec(
            prop::sample::select(vec!["C2", "D#3", "Bb5", "G7", "A0", "C8", "F4"]),
            0..30,
        ),
    ) {
        // One note per beat so dedupe never removes a clamped neighbor
        let raw: Vec<_> = pitches
            .iter()
            .enumerate()
            .map(|(i, p)| json!({"note": p, "start": i, "duration": 1}))
            .collect();
        let options = ValidationOptions::strict(32.0, 0.25);
        let out = validate(&raw, &a_minor(), &options);
        for pair in out.windows(2) {
            let a = pair[0].midi().unwrap_or(0);
            let b = pair[1].midi().unwrap_or(0);
            prop_assert!((a - b).abs() <= i32::from(DEFAULT_MAX_INTERVAL));
        }
    }
}
