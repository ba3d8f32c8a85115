//! Pitch name parsing and spelling.
//!
//! Octave numbering follows scientific pitch notation: C4 = MIDI 60, A0 = 21.

use std::sync::OnceLock;

use regex::Regex;

/// Accepted note name shape: letter, optional accidental, optional minus, octave.
const NOTE_NAME_PATTERN: &str = r"^[A-Ga-g](#|b)?-?[0-9]{1,2}$";

static NOTE_NAME_REGEX: OnceLock<Regex> = OnceLock::new();

fn note_name_regex() -> &'static Regex {
    NOTE_NAME_REGEX.get_or_init(|| Regex::new(NOTE_NAME_PATTERN).expect("invalid regex pattern"))
}

/// Sharp spellings for the twelve pitch classes.
const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Flat spellings for the twelve pitch classes.
const FLAT_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Semitone offset of a natural note letter.
fn letter_semitone(letter: char) -> Option<i32> {
    match letter.to_ascii_uppercase() {
        'C' => Some(0),
        'D' => Some(2),
        'E' => Some(4),
        'F' => Some(5),
        'G' => Some(7),
        'A' => Some(9),
        'B' => Some(11),
        _ => None,
    }
}

/// Whether a string has the shape of a note name.
pub fn is_note_name(name: &str) -> bool {
    note_name_regex().is_match(name.trim())
}

/// Parses a pitch class name ("C", "F#", "Bb", "f sharp" is not accepted).
///
/// Returns the semitone value 0-11.
pub fn parse_pitch_class(name: &str) -> Option<u8> {
    let trimmed = name.trim();
    let mut chars = trimmed.chars();
    let base = letter_semitone(chars.next()?)?;
    let accidental = match chars.next() {
        None => 0,
        Some('#') | Some('♯') => 1,
        Some('b') | Some('♭') => -1,
        Some(_) => return None,
    };
    if chars.next().is_some() {
        return None;
    }
    Some((base + accidental).rem_euclid(12) as u8)
}

/// Parses a note name ("C4", "A#3", "Bb5", "C-1") into a MIDI number.
///
/// The result is not range-checked; callers decide which range they accept.
///
/// # Examples
/// ```
/// use melodist_core::theory::pitch::parse_note_name;
///
/// assert_eq!(parse_note_name("C4"), Some(60));
/// assert_eq!(parse_note_name("A0"), Some(21));
/// assert_eq!(parse_note_name("Bb3"), Some(58));
/// assert_eq!(parse_note_name("X4"), None);
/// ```
pub fn parse_note_name(name: &str) -> Option<i32> {
    let name = name.trim();
    if !note_name_regex().is_match(name) {
        return None;
    }

    let bytes = name.as_bytes();
    let semitone = letter_semitone(bytes[0] as char)?;
    let mut idx = 1;
    let accidental = match bytes.get(idx) {
        Some(b'#') => {
            idx += 1;
            1
        }
        Some(b'b') => {
            idx += 1;
            -1
        }
        _ => 0,
    };
    let octave: i32 = name[idx..].parse().ok()?;

    Some((octave + 1) * 12 + semitone + accidental)
}

/// Spells a MIDI number with sharps ("A#3").
///
/// # Examples
/// ```
/// use melodist_core::theory::pitch::midi_to_note_name;
///
/// assert_eq!(midi_to_note_name(60), "C4");
/// assert_eq!(midi_to_note_name(58), "A#3");
/// ```
pub fn midi_to_note_name(midi: i32) -> String {
    let pc = midi.rem_euclid(12) as usize;
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", SHARP_NAMES[pc], octave)
}

/// Spells a pitch class, using flats when `flats` is set.
pub fn pitch_class_name(pc: u8, flats: bool) -> &'static str {
    let idx = usize::from(pc % 12);
    if flats {
        FLAT_NAMES[idx]
    } else {
        SHARP_NAMES[idx]
    }
}

/// Circular distance between two pitch classes (0-6).
pub fn circular_distance(a: u8, b: u8) -> u8 {
    let d = (i32::from(a) - i32::from(b)).rem_euclid(12);
    d.min(12 - d) as u8
}

/// Signed shortest step from pitch class `from` to `to`, in -5..=6.
pub fn signed_step(from: u8, to: u8) -> i32 {
    let d = (i32::from(to) - i32::from(from)).rem_euclid(12);
    if d > 6 {
        d - 12
    } else {
        d
    }
}
