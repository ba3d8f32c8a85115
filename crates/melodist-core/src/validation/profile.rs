//! Validation modes, profiles, and per-call options.

use serde::{Deserialize, Serialize};

/// Default maximum melodic leap in semitones.
pub const DEFAULT_MAX_INTERVAL: u8 = 12;

/// Humanization timing spread in beats (start moves by at most half of this).
pub const HUMANIZE_TIMING: f64 = 0.02;

/// Humanization velocity spread (+/-).
pub const HUMANIZE_VELOCITY: i64 = 6;

/// Velocity jitter applied to backfilled copies (+/-).
pub const BACKFILL_VELOCITY_JITTER: i64 = 5;

/// How aggressively timing and pitch are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    /// Quantize to the grid, snap to the scale, clamp leaps.
    Strict,
    /// Round timings to two decimals and leave content alone.
    #[default]
    Preserve,
}

impl TimingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimingMode::Strict => "strict",
            TimingMode::Preserve => "preserve",
        }
    }
}

/// Named, reusable validation policy. Budget and grid come from the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationProfile {
    /// Profile name.
    pub name: String,
    pub mode: TimingMode,
    /// Largest allowed leap between consecutive monophonic notes.
    pub max_interval: u8,
    /// Use harmonic minor (raised seventh) when snapping minor keys.
    pub allow_chromatic: bool,
    /// Target note count for backfill.
    pub min_notes: Option<usize>,
    /// Fill short strict-mode results with cyclic copies.
    pub backfill: bool,
    /// Jitter timing and velocity after correction.
    pub humanize: bool,
}

impl Default for ValidationProfile {
    fn default() -> Self {
        Self::preserve()
    }
}

impl ValidationProfile {
    /// Minimal-touch profile.
    pub fn preserve() -> Self {
        Self {
            name: "preserve".to_string(),
            mode: TimingMode::Preserve,
            max_interval: DEFAULT_MAX_INTERVAL,
            allow_chromatic: false,
            min_notes: None,
            backfill: false,
            humanize: false,
        }
    }

    /// Grid, scale, and leap correction.
    pub fn strict() -> Self {
        Self {
            name: "strict".to_string(),
            mode: TimingMode::Strict,
            ..Self::preserve()
        }
    }

    /// Looks up a profile by name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "preserve" | "default" => Some(Self::preserve()),
            "strict" => Some(Self::strict()),
            _ => None,
        }
    }

    /// Binds the profile to a beat budget and grid step.
    pub fn options(&self, beat_budget: f64, grid_step: f64) -> ValidationOptions {
        ValidationOptions {
            mode: self.mode,
            beat_budget,
            grid_step,
            max_interval: self.max_interval,
            allow_chromatic: self.allow_chromatic,
            monophonic: true,
            min_notes: self.min_notes,
            backfill: self.backfill,
            humanize: self.humanize,
        }
    }
}

/// Everything one validator run needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOptions {
    pub mode: TimingMode,
    /// Maximum beat position; notes are trimmed to end at or before it.
    pub beat_budget: f64,
    /// Grid step in beats used by strict quantization.
    pub grid_step: f64,
    pub max_interval: u8,
    pub allow_chromatic: bool,
    /// Apply the leap clamp (off for chord layers).
    pub monophonic: bool,
    pub min_notes: Option<usize>,
    pub backfill: bool,
    pub humanize: bool,
}

impl ValidationOptions {
    /// Preserve-mode options for a budget, sixteenth grid.
    pub fn new(beat_budget: f64) -> Self {
        ValidationProfile::preserve().options(beat_budget, 0.25)
    }

    /// Strict-mode options for a budget and grid step.
    pub fn strict(beat_budget: f64, grid_step: f64) -> Self {
        ValidationProfile::strict().options(beat_budget, grid_step)
    }

    pub fn monophonic(mut self, monophonic: bool) -> Self {
        self.monophonic = monophonic;
        self
    }

    pub fn min_notes(mut self, min_notes: usize) -> Self {
        self.min_notes = Some(min_notes);
        self.backfill = true;
        self
    }

    pub fn humanize(mut self, humanize: bool) -> Self {
        self.humanize = humanize;
        self
    }

    pub fn max_interval(mut self, semitones: u8) -> Self {
        self.max_interval = semitones;
        self
    }

    pub fn allow_chromatic(mut self, allow: bool) -> Self {
        self.allow_chromatic = allow;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.mode == TimingMode::Strict
    }
}
