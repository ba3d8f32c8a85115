//! Keys, scales, and scale snapping.

use serde::{Deserialize, Serialize};

use super::pitch::{circular_distance, parse_pitch_class, pitch_class_name, signed_step};

/// Major or minor tonality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    Minor,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Major => "major",
            Mode::Minor => "minor",
        }
    }

    /// Parses a mode word ("major", "maj", "minor", "min", "m").
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "major" | "maj" | "ionian" => Some(Mode::Major),
            "minor" | "min" | "m" | "aeolian" => Some(Mode::Minor),
            _ => None,
        }
    }
}

/// Scale interval sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Major,
    NaturalMinor,
    HarmonicMinor,
}

impl Scale {
    /// Semitone offsets of the seven degrees from the tonic.
    pub fn intervals(&self) -> [u8; 7] {
        match self {
            Scale::Major => [0, 2, 4, 5, 7, 9, 11],
            Scale::NaturalMinor => [0, 2, 3, 5, 7, 8, 10],
            Scale::HarmonicMinor => [0, 2, 3, 5, 7, 8, 11],
        }
    }
}

/// A musical key: tonic pitch class plus mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    /// Tonic pitch class (0-11, C = 0).
    pub tonic: u8,
    pub mode: Mode,
}

impl Default for Key {
    fn default() -> Self {
        Self {
            tonic: 0,
            mode: Mode::Major,
        }
    }
}

impl Key {
    pub fn new(tonic: u8, mode: Mode) -> Self {
        Self {
            tonic: tonic % 12,
            mode,
        }
    }

    /// Parses "A minor", "Am", "F# major", "Bb", "c min", "Ebm".
    ///
    /// A bare tonic is read as major.
    ///
    /// # Examples
    /// ```
    /// use melodist_core::theory::{Key, Mode};
    ///
    /// assert_eq!(Key::parse("A minor"), Some(Key::new(9, Mode::Minor)));
    /// assert_eq!(Key::parse("F#m"), Some(Key::new(6, Mode::Minor)));
    /// assert_eq!(Key::parse("Bb"), Some(Key::new(10, Mode::Major)));
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let mut parts = s.split_whitespace();
        let head = parts.next()?;
        let tail: Vec<&str> = parts.collect();

        if !tail.is_empty() {
            let tonic = parse_pitch_class(head)?;
            let mode = Mode::parse(&tail.join(" "))?;
            return Some(Key::new(tonic, mode));
        }

        // Compact forms: "Am", "F#m", "Ebmin", "Cmaj", "Bb"
        if let Some(tonic) = parse_pitch_class(head) {
            return Some(Key::new(tonic, Mode::Major));
        }
        let split = head
            .char_indices()
            .skip(1)
            .find(|(_, c)| *c != '#' && *c != 'b' && *c != '♯' && *c != '♭')
            .map(|(i, _)| i)?;
        let tonic = parse_pitch_class(&head[..split])?;
        let mode = Mode::parse(&head[split..])?;
        Some(Key::new(tonic, mode))
    }

    /// Scale used for snapping. Minor keys use harmonic minor when chromatic
    /// color is allowed, natural minor otherwise.
    pub fn scale(&self, allow_chromatic: bool) -> Scale {
        match (self.mode, allow_chromatic) {
            (Mode::Major, _) => Scale::Major,
            (Mode::Minor, false) => Scale::NaturalMinor,
            (Mode::Minor, true) => Scale::HarmonicMinor,
        }
    }

    /// Pitch classes of the scale degrees, tonic first.
    pub fn scale_pitch_classes(&self, scale: Scale) -> [u8; 7] {
        scale.intervals().map(|i| (self.tonic + i) % 12)
    }

    /// Whether chord roots in this key read better with flats.
    pub fn prefers_flats(&self) -> bool {
        match self.mode {
            Mode::Major => matches!(self.tonic, 1 | 3 | 5 | 8 | 10),
            Mode::Minor => matches!(self.tonic, 0 | 2 | 3 | 5 | 7 | 10),
        }
    }

    /// Snaps a MIDI pitch to the nearest member of `scale`.
    ///
    /// Distance is circular in pitch-class space; ties go to the lower scale
    /// degree. The octave is kept by moving to the nearest MIDI number with
    /// the chosen pitch class.
    pub fn snap(&self, midi: i32, scale: Scale) -> i32 {
        let pc = midi.rem_euclid(12) as u8;
        let mut best = self.tonic;
        let mut best_distance = u8::MAX;
        for degree_pc in self.scale_pitch_classes(scale) {
            let d = circular_distance(pc, degree_pc);
            if d < best_distance {
                best = degree_pc;
                best_distance = d;
            }
        }
        midi + signed_step(pc, best)
    }

    /// Whether a MIDI pitch belongs to `scale`.
    pub fn contains(&self, midi: i32, scale: Scale) -> bool {
        let pc = midi.rem_euclid(12) as u8;
        self.scale_pitch_classes(scale).contains(&pc)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}",
            pitch_class_name(self.tonic, self.prefers_flats()),
            self.mode.as_str()
        )
    }
}
