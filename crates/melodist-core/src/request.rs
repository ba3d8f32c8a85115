//! Generation requests and their normalized form.
//!
//! Normalization removes insignificant variance so that semantically identical
//! requests produce byte-identical canonical JSON (and therefore identical
//! fingerprints):
//!
//! - prompt, key and chord progression: whitespace trimmed and collapsed, case kept
//! - example melody: timings rounded to 3 decimals, velocity/slide coerced
//! - layers: deduplicated and ordered melody, chords, bassline (all three when empty)
//! - tempo: clamped to 20-400 and rounded, or the `"unset"` sentinel

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hash::{fingerprint, Fingerprint};
use crate::note::{beat_budget, Layer, DEFAULT_VELOCITY};

/// Lowest accepted tempo hint.
pub const MIN_TEMPO: f64 = 20.0;

/// Highest accepted tempo hint.
pub const MAX_TEMPO: f64 = 400.0;

/// Sentinel stored in canonical form when no tempo is given.
pub const TEMPO_UNSET: &str = "unset";

/// Default number of measures.
pub const DEFAULT_MEASURES: u32 = 4;

/// Upper bound on measures.
pub const MAX_MEASURES: u32 = 64;

/// Default grid resolution (sixteenth notes).
pub const DEFAULT_GRID: u32 = 16;

fn default_measures() -> u32 {
    DEFAULT_MEASURES
}

/// A caller's generation request, as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Natural-language prompt.
    pub prompt: String,
    /// Explicit key ("A minor"); detected from the prompt when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Melody the generator should follow, in loosely-typed note objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_melody: Option<Vec<serde_json::Value>>,
    /// Explicit chord progression ("Am - F - C - G").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chord_progression: Option<String>,
    #[serde(default = "default_measures")]
    pub measures: u32,
    /// Requested layers; empty means all.
    #[serde(default)]
    pub layers: Vec<Layer>,
    /// Grid denominator (16 = sixteenth notes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_resolution: Option<u32>,
    /// Tempo hint in BPM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f64>,
}

impl GenerationRequest {
    /// Creates a request with defaults for everything but the prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            key: None,
            example_melody: None,
            chord_progression: None,
            measures: DEFAULT_MEASURES,
            layers: Vec::new(),
            grid_resolution: None,
            tempo: None,
        }
    }

    /// Parses a request from JSON.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn measures(mut self, measures: u32) -> Self {
        self.measures = measures;
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn tempo(mut self, bpm: f64) -> Self {
        self.tempo = Some(bpm);
        self
    }

    pub fn layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn grid(mut self, denominator: u32) -> Self {
        self.grid_resolution = Some(denominator);
        self
    }

    pub fn chord_progression(mut self, progression: impl Into<String>) -> Self {
        self.chord_progression = Some(progression.into());
        self
    }

    pub fn example_melody(mut self, notes: Vec<serde_json::Value>) -> Self {
        self.example_melody = Some(notes);
        self
    }

    /// Produces the canonical form of this request.
    pub fn normalize(&self) -> NormalizedRequest {
        let example_melody = self
            .example_melody
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(CanonicalNote::coerce)
            .collect();

        let mut layers = self.layers.clone();
        layers.sort();
        layers.dedup();
        if layers.is_empty() {
            layers = Layer::ALL.to_vec();
        }

        let grid_resolution = match self.grid_resolution {
            Some(g) if (1..=64).contains(&g) => g,
            _ => DEFAULT_GRID,
        };

        NormalizedRequest {
            prompt: collapse_whitespace(&self.prompt),
            key: non_empty(self.key.as_deref().map(collapse_whitespace)),
            example_melody,
            chord_progression: non_empty(self.chord_progression.as_deref().map(collapse_whitespace)),
            measures: self.measures.clamp(1, MAX_MEASURES),
            layers,
            grid_resolution,
            tempo: normalize_tempo(self.tempo),
        }
    }

    /// Normalizes and fingerprints in one step.
    pub fn fingerprint(&self) -> Result<Fingerprint, CoreError> {
        fingerprint(&self.normalize())
    }
}

/// Canonical form of a [`GenerationRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRequest {
    pub prompt: String,
    pub key: Option<String>,
    pub example_melody: Vec<CanonicalNote>,
    pub chord_progression: Option<String>,
    pub measures: u32,
    pub layers: Vec<Layer>,
    pub grid_resolution: u32,
    pub tempo: Option<u32>,
}

impl NormalizedRequest {
    /// Maximum beat position notes may occupy.
    pub fn beat_budget(&self) -> f64 {
        beat_budget(self.measures)
    }

    /// Grid step in beats (a sixteenth grid is 0.25 beats).
    pub fn grid_step(&self) -> f64 {
        4.0 / f64::from(self.grid_resolution)
    }

    /// Whether a layer was requested.
    pub fn wants(&self, layer: Layer) -> bool {
        self.layers.contains(&layer)
    }

    /// JSON structure hashed into the fingerprint.
    pub fn to_canonical_value(&self) -> serde_json::Value {
        let tempo = match self.tempo {
            Some(bpm) => serde_json::Value::from(bpm),
            None => serde_json::Value::from(TEMPO_UNSET),
        };
        serde_json::json!({
            "prompt": self.prompt,
            "key": self.key,
            "example_melody": self.example_melody,
            "chord_progression": self.chord_progression,
            "measures": self.measures,
            "layers": self.layers,
            "grid_resolution": self.grid_resolution,
            "tempo": tempo,
        })
    }
}

/// A note from an example melody with canonical primitive types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalNote {
    pub note: String,
    pub start: f64,
    pub duration: f64,
    pub velocity: u8,
    pub slide: bool,
}

impl CanonicalNote {
    /// Coerces a loosely-typed note object. Returns `None` when pitch, start or
    /// duration are missing or unreadable.
    pub fn coerce(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let note = obj
            .get("note")
            .or_else(|| obj.get("pitch"))?
            .as_str()?
            .trim()
            .to_string();
        if note.is_empty() {
            return None;
        }
        let start = round_to(as_number(obj.get("start")?)?, 3);
        let duration = round_to(as_number(obj.get("duration")?)?, 3);
        let velocity = obj
            .get("velocity")
            .and_then(as_number)
            .map(|v| v.round().clamp(0.0, 127.0) as u8)
            .unwrap_or(DEFAULT_VELOCITY);
        let slide = obj.get("slide").map(as_bool).unwrap_or(false);
        Some(Self {
            note,
            start,
            duration,
            velocity,
            slide,
        })
    }
}

/// Reads a JSON number, or a string holding one. Non-finite values are rejected.
pub fn as_number(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Truthiness for loosely-typed flags: booleans, non-zero numbers, "true"/"1"/"yes".
pub fn as_bool(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
        }
        _ => false,
    }
}

/// Rounds to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    // Avoid "-0" leaking into canonical JSON
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

fn normalize_tempo(tempo: Option<f64>) -> Option<u32> {
    let bpm = tempo.filter(|t| t.is_finite())?;
    Some(bpm.clamp(MIN_TEMPO, MAX_TEMPO).round() as u32)
}
