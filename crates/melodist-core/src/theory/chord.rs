//! Chord symbols, Roman numeral realization, and progression strings.

use super::key::{Key, Mode, Scale};
use super::pitch::pitch_class_name;

/// Triad quality implied by a numeral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quality {
    Major,
    Minor,
    Diminished,
}

/// Roman numeral cores, longest first so "VII" wins over "V" and "I".
const NUMERALS: [(&str, usize); 7] = [
    ("vii", 6),
    ("iii", 2),
    ("vi", 5),
    ("iv", 3),
    ("ii", 1),
    ("v", 4),
    ("i", 0),
];

/// Realizes a Roman numeral ("i", "bVII", "iv7", "ii°", "Vsus4") as a chord
/// symbol in `key`.
///
/// Degrees come from the key's natural scale (major or natural minor). Case
/// sets the triad quality; `°`/`dim` marks diminished.
///
/// # Examples
/// ```
/// use melodist_core::theory::{realize_numeral, Key};
///
/// let a_minor = Key::parse("A minor").unwrap();
/// assert_eq!(realize_numeral("i", &a_minor).as_deref(), Some("Am"));
/// assert_eq!(realize_numeral("VI", &a_minor).as_deref(), Some("F"));
/// assert_eq!(realize_numeral("V7", &a_minor).as_deref(), Some("E7"));
/// ```
pub fn realize_numeral(numeral: &str, key: &Key) -> Option<String> {
    let numeral = numeral.trim();
    let (shift, body) = match numeral.strip_prefix('b') {
        Some(rest) if !rest.is_empty() => (-1i32, rest),
        _ => match numeral.strip_prefix('#') {
            Some(rest) => (1, rest),
            None => (0, numeral),
        },
    };

    let lower = body.to_ascii_lowercase();
    let (core, degree) = NUMERALS
        .iter()
        .find(|(core, _)| lower.starts_with(core))
        .copied()?;
    let written = &body[..core.len()];
    let suffix = &body[core.len()..];

    let is_upper = written.chars().all(|c| c.is_ascii_uppercase());
    let (quality, extension) = match suffix {
        s if s.starts_with('°') || s.starts_with("dim") => {
            let ext = s.trim_start_matches('°').trim_start_matches("dim");
            (Quality::Diminished, ext)
        }
        s if is_upper => (Quality::Major, s),
        s => (Quality::Minor, s),
    };

    let scale = match key.mode {
        Mode::Major => Scale::Major,
        Mode::Minor => Scale::NaturalMinor,
    };
    let interval = i32::from(scale.intervals()[degree]);
    let root = (i32::from(key.tonic) + interval + shift).rem_euclid(12) as u8;

    let mut symbol = pitch_class_name(root, key.prefers_flats()).to_string();
    match quality {
        Quality::Major => {}
        Quality::Minor => symbol.push('m'),
        Quality::Diminished => symbol.push_str("dim"),
    }
    symbol.push_str(extension);
    Some(symbol)
}

/// Realizes a numeral progression ("i-VI-III-VII") as chord symbols joined
/// by " - ". Unknown numerals are skipped.
pub fn realize_progression(numerals: &str, key: &Key) -> String {
    split_progression(numerals)
        .into_iter()
        .filter_map(|n| realize_numeral(n, key))
        .collect::<Vec<_>>()
        .join(" - ")
}

/// Splits a progression string into chord tokens on whitespace, `-`, `|`, `,`.
///
/// A `-` directly after a chord letter is a separator, so write flats as `b`.
pub fn split_progression(progression: &str) -> Vec<&str> {
    progression
        .split(|c: char| c.is_whitespace() || matches!(c, '-' | '|' | ',' | '–'))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Number of chords in a progression.
pub fn chord_count(progression: &str) -> usize {
    split_progression(progression).len()
}

/// Number of distinct chord symbols in a progression.
pub fn distinct_chord_count(progression: &str) -> usize {
    let mut seen: Vec<&str> = Vec::new();
    for chord in split_progression(progression) {
        if !seen.contains(&chord) {
            seen.push(chord);
        }
    }
    seen.len()
}

/// Whether a chord symbol carries a dark-color marker: minor, diminished,
/// suspended, sharp, or seventh.
pub fn has_dark_marker(chord: &str) -> bool {
    let rest = chord.trim().get(1..).unwrap_or("");
    let (sharp_root, quality) = match rest.as_bytes().first() {
        Some(b'#') => (true, &rest[1..]),
        Some(b'b') => (false, &rest[1..]),
        _ => (false, rest),
    };
    let lower = quality.to_ascii_lowercase();
    sharp_root
        || lower.starts_with('m') && !lower.starts_with("maj")
        || lower.contains("dim")
        || lower.contains('°')
        || lower.contains("sus")
        || quality.contains('#')
        || quality.contains('7')
}
