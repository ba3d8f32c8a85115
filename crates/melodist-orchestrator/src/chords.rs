//! Chord progression selection.
//!
//! Selection is deterministic with bounded jitter: a content hash of the
//! prompt, section label and key picks a base index into the pool, and a
//! small random offset (0 to 2) moves it. The two parts are computed
//! separately so tests can pin the random source.

use melodist_core::seeded_u32;
use melodist_core::theory::{
    chord_count, distinct_chord_count, has_dark_marker, realize_progression, split_progression,
};
use melodist_core::{Key, Mode, Mood};
use rand::Rng;

use crate::config::ChordConfig;

/// Section labels, in order.
pub const SECTION_LABELS: [&str; 3] = ["A", "B", "C"];

/// Largest random offset added to the hashed base index.
pub const MAX_JITTER: usize = 2;

const DARK_MINOR: &[&str] = &[
    "i - VI - III - VII",
    "i - iv - VI - V",
    "i - VI - iv - V",
    "i - ii° - V - i",
    "i - iv - v - i",
    "i - VII - VI - V",
    "i - i - VI - V7",
];

const DEFAULT_MINOR: &[&str] = &[
    "i - VI - III - VII",
    "i - iv - VII - III",
    "i - VII - VI - VII",
    "i - III - VII - iv",
    "i - v - VI - VII",
    "i - iv - i - V",
];

const DEFAULT_MAJOR: &[&str] = &[
    "I - V - vi - IV",
    "I - IV - V - I",
    "vi - IV - I - V",
    "I - vi - IV - V",
    "I - iii - IV - V",
    "IV - V - iii - vi",
    "ii7 - V7 - Imaj7 - Imaj7",
];

const TRAP_WORDS: &[&str] = &["trap", "hip-hop", "hiphop", "hip hop", "rap", "drill", "808"];
const SPARSE_WORDS: &[&str] = &["minimal", "sparse", "ambient", "simple", "minimalist"];
const COMPLEX_WORDS: &[&str] = &["jazz", "jazzy", "complex", "neo-soul", "fusion", "bossa"];

/// Inputs for one selection.
#[derive(Debug, Clone, Copy)]
pub struct ChordQuery<'a> {
    pub prompt: &'a str,
    pub key: &'a Key,
    pub mood: Mood,
    /// Externally suggested progressions (chord symbols).
    pub suggestions: Option<&'a [String]>,
    pub instrument: Option<&'a str>,
}

impl<'a> ChordQuery<'a> {
    pub fn new(prompt: &'a str, key: &'a Key, mood: Mood) -> Self {
        Self {
            prompt,
            key,
            mood,
            suggestions: None,
            instrument: None,
        }
    }

    pub fn suggestions(mut self, suggestions: &'a [String]) -> Self {
        self.suggestions = Some(suggestions);
        self
    }

    pub fn instrument(mut self, instrument: Option<&'a str>) -> Self {
        self.instrument = instrument;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordProgressionSelector {
    sections: usize,
}

impl Default for ChordProgressionSelector {
    fn default() -> Self {
        Self::new(SECTION_LABELS.len())
    }
}

impl ChordProgressionSelector {
    /// `sections` is clamped to 1..=3.
    pub fn new(sections: usize) -> Self {
        Self {
            sections: sections.clamp(1, SECTION_LABELS.len()),
        }
    }

    pub fn from_config(config: &ChordConfig) -> Self {
        Self::new(config.sections)
    }

    /// Picks one progression per section.
    pub fn select<R: Rng>(&self, query: &ChordQuery<'_>, rng: &mut R) -> Vec<String> {
        let pool = candidate_pool(query);
        if pool.is_empty() {
            return Vec::new();
        }

        let mut remaining = pool.clone();
        let mut chosen = Vec::with_capacity(self.sections);
        for label in &SECTION_LABELS[..self.sections] {
            if remaining.is_empty() {
                remaining = pool.clone();
            }
            let base = base_index(query.prompt, label, query.key, remaining.len());
            let jitter = rng.gen_range(0..=MAX_JITTER.min(remaining.len() - 1));
            let index = (base + jitter) % remaining.len();
            chosen.push(remaining.remove(index));
        }
        log::debug!("chord progressions for {}: {:?}", query.key, chosen);
        chosen
    }
}

/// Deterministic half of the index: hash of `prompt + label` and the key.
pub fn base_index(prompt: &str, label: &str, key: &Key, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let seed = format!("{prompt}{label}");
    seeded_u32(&seed, &key.to_string()) as usize % len
}

/// Filtered external suggestions, or the built-in pool for the key.
pub fn candidate_pool(query: &ChordQuery<'_>) -> Vec<String> {
    let external: Vec<String> = query
        .suggestions
        .unwrap_or_default()
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if external.is_empty() {
        return builtin_pool(query.key, query.mood);
    }
    filter_suggestions(external, query)
}

/// Built-in numeral pool for a key and mood, realized as chord symbols.
pub fn builtin_pool(key: &Key, mood: Mood) -> Vec<String> {
    let numerals = match (key.mode, mood) {
        (Mode::Minor, Mood::Dark) => DARK_MINOR,
        (Mode::Minor, _) => DEFAULT_MINOR,
        (Mode::Major, _) => DEFAULT_MAJOR,
    };
    numerals
        .iter()
        .map(|n| realize_progression(n, key))
        .collect()
}

fn filter_suggestions(pool: Vec<String>, query: &ChordQuery<'_>) -> Vec<String> {
    let style = format!(
        "{} {}",
        query.prompt.to_lowercase(),
        query.instrument.unwrap_or_default().to_lowercase()
    );
    let mentions = |words: &[&str]| words.iter().any(|w| style.contains(w));

    let mut pool = pool;
    if mentions(TRAP_WORDS) {
        pool = narrow(pool, "trap", |p| chord_count(p) <= 3);
    }
    if mentions(SPARSE_WORDS) {
        pool = narrow(pool, "sparse", |p| distinct_chord_count(p) <= 3);
    }
    if mentions(COMPLEX_WORDS) {
        pool = narrow(pool, "complex", |p| chord_count(p) >= 5);
    }
    match query.mood {
        Mood::Dark => pool = narrow(pool, "dark", is_dark_progression),
        Mood::Bright => pool = narrow(pool, "bright", |p| !is_dark_progression(p)),
        Mood::Neutral => {}
    }
    pool
}

/// Keeps progressions matching `keep` unless that would leave none.
fn narrow(pool: Vec<String>, step: &str, keep: impl Fn(&str) -> bool) -> Vec<String> {
    let kept: Vec<String> = pool.iter().filter(|p| keep(p)).cloned().collect();
    if kept.is_empty() {
        log::debug!("{step} filter would empty the chord pool, skipping");
        pool
    } else {
        kept
    }
}

fn is_dark_progression(progression: &str) -> bool {
    split_progression(progression)
        .into_iter()
        .any(has_dark_marker)
}
