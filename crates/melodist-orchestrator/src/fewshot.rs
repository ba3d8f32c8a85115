//! Few-shot example selection.
//!
//! Examples come from a JSON corpus file (an array of training examples).
//! Selection narrows the corpus by instrument and keywords, each step falling
//! back to the previous pool if it would leave nothing, then ranks what is
//! left.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use melodist_core::prompt::detect_instrument;
use melodist_core::{Key, Mood, PromptAnalysis};
use serde::{Deserialize, Serialize};

/// Points for a matching instrument.
pub const INSTRUMENT_SCORE: f64 = 5.0;
/// Points for the same tonic and mode.
pub const EXACT_KEY_SCORE: f64 = 4.0;
/// Points for the same tonic only.
pub const TONIC_SCORE: f64 = 3.0;
/// Points for the same mode only.
pub const MODE_SCORE: f64 = 1.0;
/// Points for a matching mood.
pub const MOOD_SCORE: f64 = 2.0;
/// Maximum tempo-proximity points.
pub const TEMPO_SCORE: f64 = 3.0;
/// Tempo difference at which proximity points reach zero.
pub const TEMPO_WINDOW: f64 = 60.0;
/// Points when both sides mention arpeggios.
pub const ARPEGGIO_SCORE: f64 = 1.5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExampleInput {
    pub prompt: String,
    pub key: Option<String>,
    pub tempo: Option<f64>,
    pub measures: Option<u32>,
    #[serde(rename = "chordProgression", alias = "chord_progression")]
    pub chord_progression: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExampleOutput {
    /// Melody notes, loosely typed as in generator output.
    pub melody: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExampleMetadata {
    pub source: Option<String>,
    pub instrument: Option<String>,
    pub tempo: Option<f64>,
    pub style: Option<String>,
    pub metrics: Option<serde_json::Value>,
}

/// One entry of the few-shot corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingExample {
    pub input: ExampleInput,
    pub output: ExampleOutput,
    pub metadata: ExampleMetadata,
}

impl TrainingExample {
    pub fn tempo(&self) -> Option<f64> {
        self.input.tempo.or(self.metadata.tempo)
    }

    pub fn key(&self) -> Option<Key> {
        self.input.key.as_deref().and_then(Key::parse)
    }

    /// Lower-cased prompt, metadata, and source, for keyword matching.
    fn searchable_text(&self) -> String {
        let mut text = self.input.prompt.to_lowercase();
        for field in [
            &self.metadata.instrument,
            &self.metadata.style,
            &self.metadata.source,
        ]
        .into_iter()
        .flatten()
        {
            text.push(' ');
            text.push_str(&field.to_lowercase());
        }
        text
    }

    fn matches_instrument(&self, instrument: &str) -> bool {
        let prompt = self.input.prompt.to_lowercase();
        if detect_instrument(&prompt) == Some(instrument) {
            return true;
        }
        let mentions = |field: &Option<String>| {
            field
                .as_deref()
                .is_some_and(|value| value.to_lowercase().contains(instrument))
        };
        mentions(&self.metadata.instrument) || mentions(&self.metadata.source)
    }

    fn mood(&self) -> Mood {
        let style = self.metadata.style.as_deref().unwrap_or_default();
        Mood::detect(&format!("{} {}", self.input.prompt, style))
    }
}

/// What the current request looks like, for ranking examples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionContext {
    pub prompt: String,
    pub instrument: Option<String>,
    pub key: Option<Key>,
    pub mood: Mood,
    pub tempo: Option<u32>,
    pub keywords: Vec<String>,
}

impl SelectionContext {
    pub fn from_analysis(prompt: &str, analysis: &PromptAnalysis) -> Self {
        Self {
            prompt: prompt.to_string(),
            instrument: analysis.instrument.map(str::to_string),
            key: analysis.key,
            mood: analysis.mood,
            tempo: analysis.tempo,
            keywords: analysis.keywords.clone(),
        }
    }

    /// Overrides the detected key (an explicit request key wins).
    pub fn with_key(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_tempo(mut self, tempo: u32) -> Self {
        self.tempo = Some(tempo);
        self
    }
}

/// Ranks corpus examples against a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FewShotSelector {
    max_examples: usize,
}

impl FewShotSelector {
    /// `max_examples == 0` disables selection.
    pub fn new(max_examples: usize) -> Self {
        Self { max_examples }
    }

    pub fn max_examples(&self) -> usize {
        self.max_examples
    }

    pub fn select(
        &self,
        corpus: &[TrainingExample],
        context: &SelectionContext,
    ) -> Vec<TrainingExample> {
        select_examples(corpus, context, self.max_examples)
    }
}

/// Filters, scores and returns up to `max_examples` examples.
pub fn select_examples(
    corpus: &[TrainingExample],
    context: &SelectionContext,
    max_examples: usize,
) -> Vec<TrainingExample> {
    if max_examples == 0 || corpus.is_empty() {
        return Vec::new();
    }

    let mut pool: Vec<&TrainingExample> = corpus.iter().collect();

    if let Some(instrument) = context.instrument.as_deref() {
        let matching: Vec<_> = pool
            .iter()
            .copied()
            .filter(|ex| ex.matches_instrument(instrument))
            .collect();
        if !matching.is_empty() {
            pool = matching;
        }
    }

    if !context.keywords.is_empty() {
        let matching: Vec<_> = pool
            .iter()
            .copied()
            .filter(|ex| {
                let text = ex.searchable_text();
                context.keywords.iter().any(|kw| text.contains(kw.as_str()))
            })
            .collect();
        if !matching.is_empty() {
            pool = matching;
        }
    }

    let raw_scores: Vec<f64> = pool.iter().map(|ex| score_example(ex, context)).collect();
    if !raw_scores.iter().any(|score| *score > 0.0) {
        log::debug!("no example scored above zero, keeping corpus order");
        return pool.into_iter().take(max_examples).cloned().collect();
    }

    let mut scored: Vec<(f64, f64, usize, &TrainingExample)> = pool
        .iter()
        .zip(raw_scores)
        .enumerate()
        .map(|(index, (ex, score))| (score, tempo_distance(ex, context), index, *ex))
        .collect();
    // score desc, then tempo distance asc, then corpus order
    scored.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then(a.1.total_cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });
    scored
        .into_iter()
        .take(max_examples)
        .map(|(_, _, _, ex)| ex.clone())
        .collect()
}

/// Raw score of one example.
pub fn score_example(example: &TrainingExample, context: &SelectionContext) -> f64 {
    let mut score = 0.0;

    if let Some(instrument) = context.instrument.as_deref() {
        if example.matches_instrument(instrument) {
            score += INSTRUMENT_SCORE;
        }
    }

    if let (Some(wanted), Some(have)) = (context.key, example.key()) {
        score += if wanted == have {
            EXACT_KEY_SCORE
        } else if wanted.tonic == have.tonic {
            TONIC_SCORE
        } else if wanted.mode == have.mode {
            MODE_SCORE
        } else {
            0.0
        };
    }

    if context.mood != Mood::Neutral && example.mood() == context.mood {
        score += MOOD_SCORE;
    }

    let distance = tempo_distance(example, context);
    if distance.is_finite() {
        score += TEMPO_SCORE * (1.0 - distance / TEMPO_WINDOW).max(0.0);
    }

    if mentions_arpeggio(&context.prompt.to_lowercase())
        && mentions_arpeggio(&example.searchable_text())
    {
        score += ARPEGGIO_SCORE;
    }

    score
}

fn tempo_distance(example: &TrainingExample, context: &SelectionContext) -> f64 {
    match (context.tempo, example.tempo()) {
        (Some(wanted), Some(have)) => (f64::from(wanted) - have).abs(),
        _ => f64::INFINITY,
    }
}

fn mentions_arpeggio(lower: &str) -> bool {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == "arp" || token == "arps" || token.starts_with("arpeggi"))
}

type LoadedCorpus = Option<(SystemTime, Arc<Vec<TrainingExample>>)>;

/// Corpus file reloaded whenever its modification time changes.
///
/// Read failures are soft: they log a warning and yield an empty corpus.
#[derive(Debug)]
pub struct CorpusStore {
    path: Option<PathBuf>,
    loaded: Arc<Mutex<LoadedCorpus>>,
}

impl CorpusStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            loaded: Arc::new(Mutex::new(None)),
        }
    }

    /// A store with no backing file; always empty.
    pub fn empty() -> Self {
        Self::new(None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current corpus, reloading if the file changed. Blocks on file I/O.
    pub fn examples(&self) -> Arc<Vec<TrainingExample>> {
        match self.path.as_deref() {
            Some(path) => refresh(path, &self.loaded),
            None => Arc::new(Vec::new()),
        }
    }

    /// [`examples`](Self::examples) with the file I/O moved to the
    /// blocking pool.
    pub async fn fetch(&self) -> Arc<Vec<TrainingExample>> {
        let Some(path) = self.path.clone() else {
            return Arc::new(Vec::new());
        };
        let loaded = Arc::clone(&self.loaded);
        tokio::task::spawn_blocking(move || refresh(&path, &loaded))
            .await
            .unwrap_or_else(|e| {
                log::warn!("few-shot corpus load failed: {}", e);
                Arc::new(Vec::new())
            })
    }
}

fn refresh(path: &Path, loaded: &Mutex<LoadedCorpus>) -> Arc<Vec<TrainingExample>> {
    let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(e) => {
            log::warn!("few-shot corpus {} unavailable: {}", path.display(), e);
            return Arc::new(Vec::new());
        }
    };

    let mut loaded = loaded.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some((stamp, examples)) = loaded.as_ref() {
        if *stamp == modified {
            return Arc::clone(examples);
        }
    }

    let examples = Arc::new(load_corpus(path));
    log::info!(
        "loaded {} few-shot examples from {}",
        examples.len(),
        path.display()
    );
    *loaded = Some((modified, Arc::clone(&examples)));
    examples
}

/// Reads a corpus file, skipping entries that do not parse.
pub fn load_corpus(path: &Path) -> Vec<TrainingExample> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("failed to read corpus {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    parse_corpus(&text).unwrap_or_else(|e| {
        log::warn!("failed to parse corpus {}: {}", path.display(), e);
        Vec::new()
    })
}

/// Parses a corpus document. Individual malformed entries are dropped.
pub fn parse_corpus(text: &str) -> Result<Vec<TrainingExample>, serde_json::Error> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(text)?;
    let total = entries.len();
    let examples: Vec<TrainingExample> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();
    if examples.len() < total {
        log::debug!("skipped {} malformed corpus entries", total - examples.len());
    }
    Ok(examples)
}
