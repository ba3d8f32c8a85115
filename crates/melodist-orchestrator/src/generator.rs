//! The external generator seam.
//!
//! The composer never builds model prompts itself; it hands a
//! [`GeneratorInput`] to a [`Generator`] and interprets whatever JSON comes
//! back. Anything that is not a note array or a layered object is a
//! malformed-output failure, never a panic.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use melodist_core::{CanonicalNote, Layer, Mood};
use serde::{Deserialize, Serialize};

use crate::error::{GenerationFailure, GeneratorError};
use crate::fewshot::TrainingExample;

/// Musical context assembled by the composer for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    /// Key name, e.g. "A minor".
    pub key: String,
    pub tempo: u32,
    pub measures: u32,
    pub layers: Vec<Layer>,
    pub grid_resolution: u32,
    pub mood: Mood,
    /// One progression per section.
    pub chord_progressions: Vec<String>,
    /// Few-shot guidance; empty when disabled.
    pub examples: Vec<TrainingExample>,
}

/// Everything a generator receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorInput {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_melody: Option<Vec<CanonicalNote>>,
    pub context: GenerationContext,
}

/// Produces raw composition JSON for a prompt.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        input: GeneratorInput,
    ) -> impl Future<Output = Result<serde_json::Value, GeneratorError>> + Send;
}

impl<G: Generator> Generator for Arc<G> {
    fn generate(
        &self,
        input: GeneratorInput,
    ) -> impl Future<Output = Result<serde_json::Value, GeneratorError>> + Send {
        (**self).generate(input)
    }
}

/// Raw, unvalidated notes per layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawLayers {
    pub melody: Option<Vec<serde_json::Value>>,
    pub chords: Option<Vec<serde_json::Value>>,
    pub bassline: Option<Vec<serde_json::Value>>,
    pub tempo: Option<f64>,
}

impl RawLayers {
    pub fn layer(&self, layer: Layer) -> Option<&[serde_json::Value]> {
        match layer {
            Layer::Melody => self.melody.as_deref(),
            Layer::Chords => self.chords.as_deref(),
            Layer::Bassline => self.bassline.as_deref(),
        }
    }

    fn slot(&mut self, layer: Layer) -> &mut Option<Vec<serde_json::Value>> {
        match layer {
            Layer::Melody => &mut self.melody,
            Layer::Chords => &mut self.chords,
            Layer::Bassline => &mut self.bassline,
        }
    }
}

/// Interprets generator output.
///
/// A bare array is a single layer and is assigned to the first requested
/// layer. An object carrying any of `melody`, `chords`, `bassline` (or
/// `bass`) arrays is a full composition.
pub fn parse_output(
    value: &serde_json::Value,
    requested: &[Layer],
) -> Result<RawLayers, GenerationFailure> {
    let mut raw = RawLayers::default();
    match value {
        serde_json::Value::Array(items) => {
            let layer = requested.first().copied().unwrap_or(Layer::Melody);
            *raw.slot(layer) = Some(items.clone());
            Ok(raw)
        }
        serde_json::Value::Object(map) => {
            let mut found = false;
            for (name, notes) in map {
                let Some(layer) = Layer::parse(name) else {
                    continue;
                };
                let items = notes.as_array().ok_or_else(|| {
                    GenerationFailure::MalformedOutput(format!(
                        "layer '{}' is {}, expected an array",
                        name,
                        kind_of(notes)
                    ))
                })?;
                *raw.slot(layer) = Some(items.clone());
                found = true;
            }
            if !found {
                return Err(GenerationFailure::MalformedOutput(
                    "object has no melody, chords or bassline".to_string(),
                ));
            }
            raw.tempo = map.get("tempo").and_then(melodist_core::request::as_number);
            Ok(raw)
        }
        other => Err(GenerationFailure::MalformedOutput(format!(
            "expected a note array or layered object, got {}",
            kind_of(other)
        ))),
    }
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Plays back canned outputs in order, repeating the last one.
///
/// Used by the CLI's offline `compose` command and by tests.
#[derive(Debug)]
pub struct ReplayGenerator {
    outputs: Vec<Result<serde_json::Value, GeneratorError>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ReplayGenerator {
    pub fn new(outputs: Vec<serde_json::Value>) -> Self {
        Self::with_results(outputs.into_iter().map(Ok).collect())
    }

    pub fn with_results(outputs: Vec<Result<serde_json::Value, GeneratorError>>) -> Self {
        Self {
            outputs,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Loads a replay file. A JSON array whose first element is itself an
    /// array or layered object is a sequence of outputs; anything else is a
    /// single output.
    pub fn from_path(path: &Path) -> Result<Self, melodist_core::CoreError> {
        let text = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        let outputs = match value {
            serde_json::Value::Array(items)
                if items
                    .first()
                    .is_some_and(|first| first.is_array() || is_layered(first)) =>
            {
                items
            }
            single => vec![single],
        };
        Ok(Self::new(outputs))
    }

    /// Simulated generator latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn is_layered(value: &serde_json::Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.keys().any(|k| Layer::parse(k).is_some()))
}

impl Generator for ReplayGenerator {
    async fn generate(&self, _input: GeneratorInput) -> Result<serde_json::Value, GeneratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.outputs.get(call).or_else(|| self.outputs.last()) {
            Some(output) => output.clone(),
            None => Err(GeneratorError::Failed("replay has no outputs".to_string())),
        }
    }
}
