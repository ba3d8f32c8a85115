//! Prompt analysis: key, tempo, mood, instrument, and keywords.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::theory::key::{Key, Mode};
use crate::theory::pitch::parse_pitch_class;

/// Spelled-out key, e.g. "A minor", "f# maj", "Bb major".
const KEY_WORDS_PATTERN: &str = r"(?i)\b([a-g])(#|b|♯|♭)?\s+(major|minor|maj|min)\b";

/// Compact key, e.g. "Am", "F#m", "Ebmin". Case-sensitive so "am" is not a key.
const KEY_COMPACT_PATTERN: &str = r"(?:^|[\s,(])([A-G])(#|b)?(m|min|maj)(?:$|[\s,.)])";

const TEMPO_PATTERN: &str = r"(?i)\b([0-9]{2,3})\s*bpm\b";

static KEY_WORDS_REGEX: OnceLock<Regex> = OnceLock::new();
static KEY_COMPACT_REGEX: OnceLock<Regex> = OnceLock::new();
static TEMPO_REGEX: OnceLock<Regex> = OnceLock::new();

fn key_words_regex() -> &'static Regex {
    KEY_WORDS_REGEX.get_or_init(|| Regex::new(KEY_WORDS_PATTERN).expect("invalid regex pattern"))
}

fn key_compact_regex() -> &'static Regex {
    KEY_COMPACT_REGEX
        .get_or_init(|| Regex::new(KEY_COMPACT_PATTERN).expect("invalid regex pattern"))
}

fn tempo_regex() -> &'static Regex {
    TEMPO_REGEX.get_or_init(|| Regex::new(TEMPO_PATTERN).expect("invalid regex pattern"))
}

/// Instrument keywords, most specific first, mapped to a canonical name.
pub const INSTRUMENT_KEYWORDS: &[(&str, &str)] = &[
    ("808", "808"),
    ("rhodes", "keys"),
    ("electric piano", "keys"),
    ("piano", "piano"),
    ("keys", "keys"),
    ("acoustic guitar", "guitar"),
    ("guitar", "guitar"),
    ("bass", "bass"),
    ("violin", "strings"),
    ("cello", "strings"),
    ("strings", "strings"),
    ("flute", "flute"),
    ("sax", "sax"),
    ("trumpet", "brass"),
    ("brass", "brass"),
    ("bell", "bell"),
    ("pluck", "pluck"),
    ("pad", "pad"),
    ("lead", "lead"),
    ("arp", "synth"),
    ("synth", "synth"),
    ("organ", "organ"),
    ("marimba", "mallets"),
    ("vibraphone", "mallets"),
];

const DARK_WORDS: &[&str] = &[
    "dark", "sad", "moody", "eerie", "sinister", "melancholy", "melancholic", "gloomy", "haunting",
    "evil", "horror", "tense", "ominous", "drill", "grim",
];

const BRIGHT_WORDS: &[&str] = &[
    "bright", "happy", "uplifting", "cheerful", "joyful", "sunny", "euphoric", "upbeat", "hopeful",
    "playful", "triumphant", "summer",
];

const STOP_WORDS: &[&str] = &[
    "the", "and", "with", "for", "that", "this", "from", "into", "some", "make", "give", "want",
    "like", "melody", "song", "track", "beat", "bpm", "key", "major", "minor", "please", "very",
];

/// Emotional color of a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Dark,
    Bright,
    #[default]
    Neutral,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Dark => "dark",
            Mood::Bright => "bright",
            Mood::Neutral => "neutral",
        }
    }

    /// Mood implied by free text (prompt, style tag).
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = tokenize(&lower).collect();
        let dark = tokens.iter().filter(|t| DARK_WORDS.contains(t)).count();
        let bright = tokens.iter().filter(|t| BRIGHT_WORDS.contains(t)).count();
        match dark.cmp(&bright) {
            std::cmp::Ordering::Greater => Mood::Dark,
            std::cmp::Ordering::Less => Mood::Bright,
            std::cmp::Ordering::Equal => Mood::Neutral,
        }
    }
}

/// Everything the orchestration layer reads out of a prompt.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PromptAnalysis {
    pub key: Option<Key>,
    pub tempo: Option<u32>,
    pub mood: Mood,
    pub instrument: Option<&'static str>,
    pub keywords: Vec<String>,
}

/// Analyzes a prompt.
///
/// # Example
/// ```
/// use melodist_core::prompt::{analyze_prompt, Mood};
///
/// let analysis = analyze_prompt("dark trap melody in F# minor, 140 bpm");
/// assert_eq!(analysis.tempo, Some(140));
/// assert_eq!(analysis.mood, Mood::Dark);
/// assert_eq!(analysis.key.unwrap().to_string(), "F# minor");
/// assert!(analysis.keywords.contains(&"trap".to_string()));
/// ```
pub fn analyze_prompt(prompt: &str) -> PromptAnalysis {
    let lower = prompt.to_lowercase();
    PromptAnalysis {
        key: detect_key(prompt),
        tempo: detect_tempo(prompt),
        mood: Mood::detect(prompt),
        instrument: detect_instrument(&lower),
        keywords: extract_keywords(&lower),
    }
}

/// Finds a key mention in free text.
pub fn detect_key(text: &str) -> Option<Key> {
    if let Some(caps) = key_words_regex().captures(text) {
        let tonic = format!(
            "{}{}",
            &caps[1],
            caps.get(2).map(|m| normalize_accidental(m.as_str())).unwrap_or("")
        );
        let tonic = parse_pitch_class(&tonic)?;
        let mode = Mode::parse(&caps[3])?;
        return Some(Key::new(tonic, mode));
    }
    let caps = key_compact_regex().captures(text)?;
    let tonic = format!("{}{}", &caps[1], caps.get(2).map_or("", |m| m.as_str()));
    let tonic = parse_pitch_class(&tonic)?;
    let mode = Mode::parse(&caps[3])?;
    Some(Key::new(tonic, mode))
}

fn normalize_accidental(s: &str) -> &'static str {
    match s {
        "#" | "♯" => "#",
        _ => "b",
    }
}

/// Finds a "<n> bpm" mention.
pub fn detect_tempo(text: &str) -> Option<u32> {
    let caps = tempo_regex().captures(text)?;
    let bpm: u32 = caps[1].parse().ok()?;
    (20..=400).contains(&bpm).then_some(bpm)
}

/// First matching canonical instrument name in lower-cased text.
pub fn detect_instrument(lower: &str) -> Option<&'static str> {
    INSTRUMENT_KEYWORDS
        .iter()
        .find(|(keyword, _)| contains_word(lower, keyword))
        .map(|(_, name)| *name)
}

/// Distinct content words of length >= 3, in first-seen order.
pub fn extract_keywords(lower: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for token in tokenize(lower) {
        if token.len() < 3
            || token.chars().all(|c| c.is_ascii_digit())
            || STOP_WORDS.contains(&token)
        {
            continue;
        }
        if !keywords.iter().any(|k| k == token) {
            keywords.push(token.to_string());
        }
    }
    keywords
}

fn tokenize(lower: &str) -> impl Iterator<Item = &str> {
    lower
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(|t| t.trim_matches('-'))
        .filter(|t| !t.is_empty())
}

/// Whole-word (or whole-phrase) containment.
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric)
            && !after.is_some_and(|c| c.is_alphanumeric() && c != 's')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_key_forms() {
        assert_eq!(detect_key("something in A minor"), Some(Key::new(9, Mode::Minor)));
        assert_eq!(detect_key("lofi in eb major please"), Some(Key::new(3, Mode::Major)));
        assert_eq!(detect_key("trap beat, F#m, hard"), Some(Key::new(6, Mode::Minor)));
        assert_eq!(detect_key("Cm groove"), Some(Key::new(0, Mode::Minor)));
        assert_eq!(detect_key("i am a melody"), None);
        assert_eq!(detect_key("a melody for me"), None);
    }

    #[test]
    fn test_detect_tempo() {
        assert_eq!(detect_tempo("dark trap melody, 140 bpm"), Some(140));
        assert_eq!(detect_tempo("90BPM chill"), Some(90));
        assert_eq!(detect_tempo("fast"), None);
        assert_eq!(detect_tempo("999 bpm"), None);
    }

    #[test]
    fn test_mood() {
        assert_eq!(Mood::detect("dark eerie pad"), Mood::Dark);
        assert_eq!(Mood::detect("happy summer pop"), Mood::Bright);
        assert_eq!(Mood::detect("piano loop"), Mood::Neutral);
    }

    #[test]
    fn test_instrument() {
        assert_eq!(detect_instrument("soft rhodes chords"), Some("keys"));
        assert_eq!(detect_instrument("plucks and pads"), Some("pluck"));
        assert_eq!(detect_instrument("808 slide bass"), Some("808"));
        assert_eq!(detect_instrument("a bassoon line"), None);
        assert_eq!(detect_instrument("arpeggio"), None);
        assert_eq!(detect_instrument("synth arp"), Some("synth"));
    }

    #[test]
    fn test_keywords() {
        let kw = extract_keywords("dark trap melody, 140 bpm with 808s");
        assert_eq!(kw, vec!["dark", "trap", "808s"]);
    }
}
