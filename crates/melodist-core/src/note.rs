//! Note and composition value types.
//!
//! Timing is expressed in beats (quarter notes). A composition's beat budget
//! is `measures * BEATS_PER_MEASURE`; validated notes never extend past it.

use serde::{Deserialize, Serialize};

use crate::theory::pitch::parse_note_name;

/// Beats per measure (4/4 time).
pub const BEATS_PER_MEASURE: f64 = 4.0;

/// Tolerance, in beats, for notes overshooting the budget before trimming.
pub const BEAT_EPSILON: f64 = 0.01;

/// Lowest accepted MIDI pitch (A0).
pub const MIDI_MIN: i32 = 21;

/// Highest accepted MIDI pitch (C8).
pub const MIDI_MAX: i32 = 108;

/// Default velocity for notes that omit one.
pub const DEFAULT_VELOCITY: u8 = 100;

/// Default tempo in BPM when neither request nor prompt names one.
pub const DEFAULT_TEMPO: u32 = 120;

fn default_velocity() -> u8 {
    DEFAULT_VELOCITY
}

/// A single note event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Scientific pitch notation (e.g. "C4", "F#3").
    #[serde(rename = "note", alias = "pitch")]
    pub pitch: String,
    /// Start position in beats.
    pub start: f64,
    /// Length in beats.
    pub duration: f64,
    /// MIDI velocity (0-127).
    #[serde(default = "default_velocity")]
    pub velocity: u8,
    /// Glide into this note.
    #[serde(default)]
    pub slide: bool,
}

impl Note {
    /// Creates a note with default velocity and no slide.
    pub fn new(pitch: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            pitch: pitch.into(),
            start,
            duration,
            velocity: DEFAULT_VELOCITY,
            slide: false,
        }
    }

    /// Sets the velocity.
    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity;
        self
    }

    /// Beat position where the note stops sounding.
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// MIDI number of the pitch, if it parses.
    pub fn midi(&self) -> Option<i32> {
        parse_note_name(&self.pitch)
    }

    /// Whether the note ends within `beat_budget` (plus `tolerance`).
    pub fn fits_within(&self, beat_budget: f64, tolerance: f64) -> bool {
        self.end() <= beat_budget + tolerance
    }

    /// Basic shape predicate: parseable in-range pitch, non-negative start,
    /// positive duration.
    pub fn is_well_formed(&self) -> bool {
        let pitch_ok = self
            .midi()
            .is_some_and(|m| (MIDI_MIN..=MIDI_MAX).contains(&m));
        pitch_ok
            && self.start.is_finite()
            && self.start >= 0.0
            && self.duration.is_finite()
            && self.duration > 0.0
            && self.velocity <= 127
    }
}

/// One of the three named layers of a composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Melody,
    Chords,
    Bassline,
}

impl Layer {
    /// All layers in canonical order.
    pub const ALL: [Layer; 3] = [Layer::Melody, Layer::Chords, Layer::Bassline];

    /// Returns the layer name as used in JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Melody => "melody",
            Layer::Chords => "chords",
            Layer::Bassline => "bassline",
        }
    }

    /// Parses a layer name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "melody" => Some(Layer::Melody),
            "chords" | "chord" => Some(Layer::Chords),
            "bassline" | "bass" => Some(Layer::Bassline),
            _ => None,
        }
    }

    /// Whether the layer carries one voice at a time.
    pub fn is_monophonic(&self) -> bool {
        !matches!(self, Layer::Chords)
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated piece: three note layers plus a tempo.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Composition {
    #[serde(default)]
    pub melody: Vec<Note>,
    #[serde(default)]
    pub chords: Vec<Note>,
    #[serde(default)]
    pub bassline: Vec<Note>,
    /// Tempo in BPM.
    pub tempo: u32,
}

impl Composition {
    /// Creates an empty composition at the given tempo.
    pub fn new(tempo: u32) -> Self {
        Self {
            tempo,
            ..Default::default()
        }
    }

    /// Returns the notes of one layer.
    pub fn layer(&self, layer: Layer) -> &[Note] {
        match layer {
            Layer::Melody => &self.melody,
            Layer::Chords => &self.chords,
            Layer::Bassline => &self.bassline,
        }
    }

    /// Returns the notes of one layer mutably.
    pub fn layer_mut(&mut self, layer: Layer) -> &mut Vec<Note> {
        match layer {
            Layer::Melody => &mut self.melody,
            Layer::Chords => &mut self.chords,
            Layer::Bassline => &mut self.bassline,
        }
    }

    /// Iterates every note of every layer.
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.melody
            .iter()
            .chain(self.chords.iter())
            .chain(self.bassline.iter())
    }

    /// True when no layer has any note.
    pub fn is_empty(&self) -> bool {
        self.notes().next().is_none()
    }

    /// Latest end position over all layers (0 when empty).
    pub fn max_end(&self) -> f64 {
        self.notes().map(Note::end).fold(0.0, f64::max)
    }

    /// Whether every note ends within `beat_budget + BEAT_EPSILON`.
    pub fn fits_within(&self, beat_budget: f64) -> bool {
        self.notes().all(|n| n.fits_within(beat_budget, BEAT_EPSILON))
    }
}

/// Beat budget for a measure count.
pub fn beat_budget(measures: u32) -> f64 {
    f64::from(measures) * BEATS_PER_MEASURE
}
