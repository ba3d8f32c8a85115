//! Individual correction stages. Each one filters or repairs; none fail.

use std::collections::HashSet;

use rand::Rng;

use crate::note::{Note, MIDI_MAX, MIDI_MIN};
use crate::request::{as_bool, as_number, round_to};
use crate::theory::key::{Key, Scale};
use crate::theory::pitch::{midi_to_note_name, parse_note_name};

use super::profile::{
    ValidationOptions, BACKFILL_VELOCITY_JITTER, HUMANIZE_TIMING, HUMANIZE_VELOCITY,
};

/// Working representation of a note between stages.
///
/// Velocity stays wide so out-of-range values survive until the final clamp.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Draft {
    pub pitch: String,
    pub midi: i32,
    pub start: f64,
    pub duration: f64,
    pub velocity: i64,
    pub slide: bool,
}

impl Draft {
    fn end(&self) -> f64 {
        self.start + self.duration
    }

    fn set_midi(&mut self, midi: i32) {
        if midi != self.midi {
            self.midi = midi;
            self.pitch = midi_to_note_name(midi);
        }
    }
}

/// Raw velocities are bounded to this magnitude on parse so later jitter
/// cannot overflow before the final 1-127 clamp.
const VELOCITY_BOUND: f64 = 1024.0;

/// Snaps `value` to the nearest multiple of `step`.
///
/// The result is rounded to 6 decimals so that quantizing an already
/// quantized value returns it unchanged.
pub fn quantize(value: f64, step: f64) -> f64 {
    if !(step > 0.0) || !value.is_finite() {
        return value;
    }
    round_to((value / step).round() * step, 6)
}

/// Stage 1: parse loosely-typed note objects, dropping anything misshapen.
pub(crate) fn structural_filter(raw: &[serde_json::Value]) -> Vec<Draft> {
    raw.iter().filter_map(parse_draft).collect()
}

fn parse_draft(value: &serde_json::Value) -> Option<Draft> {
    let obj = value.as_object()?;
    let pitch = obj
        .get("note")
        .or_else(|| obj.get("pitch"))?
        .as_str()?
        .trim();
    let midi = parse_note_name(pitch)?;
    if !(MIDI_MIN..=MIDI_MAX).contains(&midi) {
        return None;
    }
    let start = as_number(obj.get("start")?)?;
    let duration = as_number(obj.get("duration")?)?;
    if start < 0.0 || duration <= 0.0 {
        return None;
    }
    let velocity = obj
        .get("velocity")
        .and_then(as_number)
        .map(|v| v.clamp(-VELOCITY_BOUND, VELOCITY_BOUND).round() as i64)
        .unwrap_or(i64::from(crate::note::DEFAULT_VELOCITY));
    let slide = obj.get("slide").map(as_bool).unwrap_or(false);

    Some(Draft {
        pitch: pitch.to_string(),
        midi,
        start,
        duration,
        velocity,
        slide,
    })
}

/// Trims notes against the budget: drop late starts, clip long tails.
fn clip_to_budget(drafts: &mut Vec<Draft>, budget: f64) -> usize {
    let before = drafts.len();
    drafts.retain_mut(|d| {
        if d.start >= budget {
            return false;
        }
        if d.end() > budget {
            d.duration = round_to(budget - d.start, 6);
        }
        d.duration > 0.0
    });
    before - drafts.len()
}

/// Stage 2: range clamp.
pub(crate) fn range_clamp(drafts: &mut Vec<Draft>, budget: f64) -> usize {
    clip_to_budget(drafts, budget)
}

/// Stage 3: timing normalization. Returns the number of notes dropped by the
/// strict-mode re-clip.
pub(crate) fn normalize_timing(drafts: &mut Vec<Draft>, options: &ValidationOptions) -> usize {
    if options.is_strict() {
        let step = options.grid_step;
        for d in drafts.iter_mut() {
            d.start = quantize(d.start, step);
            d.duration = quantize(d.duration, step).max(step);
        }
        let dropped = clip_to_budget(drafts, options.beat_budget);
        sort_by_start(drafts);
        dropped
    } else {
        for d in drafts.iter_mut() {
            d.start = round_to(d.start, 2);
            d.duration = round_to(d.duration, 2);
        }
        sort_by_start(drafts);
        0
    }
}

/// Stage 4: move every pitch onto the key's scale.
pub(crate) fn scale_correct(drafts: &mut [Draft], key: &Key, scale: Scale) -> usize {
    let mut changed = 0;
    for d in drafts.iter_mut() {
        let snapped = snap_in_range(key, d.midi, scale);
        if snapped != d.midi {
            changed += 1;
        }
        d.set_midi(snapped);
    }
    changed
}

/// Scale snap that stays within the accepted MIDI range.
fn snap_in_range(key: &Key, midi: i32, scale: Scale) -> i32 {
    let snapped = key.snap(midi, scale);
    if snapped > MIDI_MAX {
        snapped - 12
    } else if snapped < MIDI_MIN {
        snapped + 12
    } else {
        snapped
    }
}

/// Stage 5: pull leaps larger than `max_interval` back toward the previous
/// note, then re-snap the pulled pitch.
pub(crate) fn clamp_intervals(
    drafts: &mut [Draft],
    key: &Key,
    scale: Scale,
    max_interval: u8,
) -> usize {
    let max = i32::from(max_interval);
    let mut clamped = 0;
    for i in 1..drafts.len() {
        let prev = drafts[i - 1].midi;
        let leap = drafts[i].midi - prev;
        if leap.abs() > max {
            let pulled = prev + max * leap.signum();
            let corrected = snap_in_range(key, pulled, scale);
            drafts[i].set_midi(corrected);
            clamped += 1;
        }
    }
    clamped
}

/// Stage 6: keep the first note per (quantized start, pitch) bucket.
pub(crate) fn dedupe(drafts: &mut Vec<Draft>, options: &ValidationOptions) -> usize {
    let before = drafts.len();
    let mut seen: HashSet<(i64, i32)> = HashSet::with_capacity(drafts.len());
    drafts.retain(|d| {
        let bucket = if options.is_strict() {
            quantize(d.start, options.grid_step)
        } else {
            round_to(d.start, 2)
        };
        seen.insert(((bucket * 1000.0).round() as i64, d.midi))
    });
    before - drafts.len()
}

/// Stage 7: append cyclic copies after the last note until `min_notes` is
/// reached, the budget runs out, or the attempt ceiling is hit.
pub(crate) fn backfill<R: Rng>(
    drafts: &mut Vec<Draft>,
    options: &ValidationOptions,
    rng: &mut R,
) -> usize {
    let Some(target) = options.min_notes else {
        return 0;
    };
    if !options.is_strict() || !options.backfill || drafts.is_empty() || drafts.len() >= target {
        return 0;
    }

    let source = drafts.clone();
    let budget = options.beat_budget;
    let mut cursor = round_to(source.iter().map(Draft::end).fold(0.0, f64::max), 6);
    let ceiling = target * 4;
    let mut added = 0;

    for attempt in 0..ceiling {
        if drafts.len() >= target || cursor >= budget {
            break;
        }
        let template = &source[attempt % source.len()];
        let duration = round_to(template.duration.min(budget - cursor), 6);
        if duration <= 0.0 {
            break;
        }
        let jitter = rng.gen_range(-BACKFILL_VELOCITY_JITTER..=BACKFILL_VELOCITY_JITTER);
        drafts.push(Draft {
            start: cursor,
            duration,
            velocity: template.velocity.saturating_add(jitter),
            ..template.clone()
        });
        cursor = round_to(cursor + duration, 6);
        added += 1;
    }
    added
}

/// Stage 8: small random timing and velocity offsets.
pub(crate) fn humanize<R: Rng>(drafts: &mut [Draft], rng: &mut R) {
    let spread = HUMANIZE_TIMING / 2.0;
    for d in drafts.iter_mut() {
        d.start = round_to((d.start + rng.gen_range(-spread..=spread)).max(0.0), 6);
        d.velocity = d
            .velocity
            .saturating_add(rng.gen_range(-HUMANIZE_VELOCITY..=HUMANIZE_VELOCITY));
    }
}

/// Stage 9: assert bounds, clamp velocity to 1-127, stable-sort by start.
pub(crate) fn finalize(mut drafts: Vec<Draft>, budget: f64) -> (Vec<Note>, usize) {
    let before = drafts.len();
    drafts.retain(|d| d.start >= 0.0 && d.start < budget);
    clip_to_budget(&mut drafts, budget);
    let dropped = before - drafts.len();
    sort_by_start(&mut drafts);

    let notes = drafts
        .into_iter()
        .map(|d| Note {
            pitch: d.pitch,
            start: d.start,
            duration: d.duration,
            velocity: d.velocity.clamp(1, 127) as u8,
            slide: d.slide,
        })
        .collect();
    (notes, dropped)
}

fn sort_by_start(drafts: &mut [Draft]) {
    drafts.sort_by(|a, b| a.start.total_cmp(&b.start));
}
