//! The composer service object.
//!
//! Owns every piece of process-wide state (cache, admission controller,
//! corpus, feedback set) and runs the request flow:
//!
//! 1. normalize and fingerprint the request
//! 2. serve from cache, or join an in-flight generation, or lead a new one
//! 3. build context: key, tempo, chord progressions, few-shot examples
//! 4. per attempt: check the usage budget, wait for an admission permit,
//!    call the generator, release the permit
//! 5. validate each requested layer, retry if unusable
//! 6. publish to the cache

use melodist_core::{
    analyze_prompt, fingerprint, Composition, CoreError, GenerationRequest, Key, MelodyValidator,
    NormalizedRequest, PromptAnalysis, ValidationProfile, DEFAULT_TEMPO,
};

use crate::admission::{estimate_tokens, AdmissionController, UsageReport};
use crate::cache::CompositionCache;
use crate::chords::{ChordProgressionSelector, ChordQuery};
use crate::config::ComposerConfig;
use crate::error::{ComposeError, ConfigError, GenerationFailure};
use crate::feedback::{FeedbackEntry, FeedbackStore};
use crate::fewshot::{CorpusStore, FewShotSelector, SelectionContext, TrainingExample};
use crate::generator::{parse_output, GenerationContext, Generator, GeneratorInput, RawLayers};

/// Composer service. Construct once and share via `Arc`.
#[derive(Debug)]
pub struct Composer<G> {
    config: ComposerConfig,
    generator: G,
    profile: ValidationProfile,
    cache: CompositionCache,
    admission: AdmissionController,
    corpus: CorpusStore,
    few_shot: FewShotSelector,
    chords: ChordProgressionSelector,
    feedback: FeedbackStore,
}

impl<G: Generator> Composer<G> {
    pub fn new(config: ComposerConfig, generator: G) -> Result<Self, ConfigError> {
        let profile = config.validation.profile()?;
        Ok(Self {
            profile,
            cache: CompositionCache::from_config(&config.cache),
            admission: AdmissionController::from_config(&config.admission),
            corpus: CorpusStore::new(config.few_shot.corpus_path.clone()),
            few_shot: FewShotSelector::new(config.few_shot.max_examples),
            chords: ChordProgressionSelector::from_config(&config.chords),
            feedback: FeedbackStore::open(
                config.feedback.log_path.clone(),
                config.feedback.max_entries,
            ),
            generator,
            config,
        })
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn cache(&self) -> &CompositionCache {
        &self.cache
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn feedback(&self) -> &FeedbackStore {
        &self.feedback
    }

    /// Produces a validated composition for `request`.
    pub async fn compose(&self, request: &GenerationRequest) -> Result<Composition, ComposeError> {
        let normalized = request.normalize();
        let fingerprint = fingerprint(&normalized).map_err(|e| {
            GenerationFailure::MalformedOutput(format!("request cannot be canonicalized: {e}"))
        })?;
        log::info!(
            "compose {} ({} measures, {:?})",
            fingerprint.short(),
            normalized.measures,
            normalized.layers
        );

        self.cache
            .coalesce(&fingerprint, normalized.beat_budget(), || {
                self.generate(&normalized)
            })
            .await
    }

    /// Usage summary for the read surface.
    pub fn usage(&self) -> UsageReport {
        self.admission.usage_report()
    }

    /// Records negative feedback for a composition and drops it from the
    /// cache. Returns whether the feedback log was written.
    pub fn reject(
        &self,
        request: &GenerationRequest,
        composition: &Composition,
        reason: &str,
    ) -> Result<bool, CoreError> {
        let normalized = request.normalize();
        let entry = FeedbackEntry::new(&normalized, composition, reason)?;
        log::info!("rejected composition {}: {}", &entry.signature[..12], reason);
        let persisted = self.feedback.record(entry);
        self.cache.invalidate(&fingerprint(&normalized)?);
        Ok(persisted)
    }

    async fn generate(&self, request: &NormalizedRequest) -> Result<Composition, ComposeError> {
        let analysis = analyze_prompt(&request.prompt);
        let key = request
            .key
            .as_deref()
            .and_then(Key::parse)
            .or(analysis.key)
            .unwrap_or_default();
        let tempo_hint = request.tempo.or(analysis.tempo);
        let input = GeneratorInput {
            prompt: request.prompt.clone(),
            example_melody: (!request.example_melody.is_empty())
                .then(|| request.example_melody.clone()),
            context: self
                .build_context(request, &analysis, &key, tempo_hint)
                .await,
        };

        let input_json = serde_json::to_string(&input).unwrap_or_default();
        let input_tokens = estimate_tokens(&input_json);

        let max_attempts = self.config.generation.max_attempts.max(1);
        let mut failure = GenerationFailure::Unusable {
            attempts: max_attempts,
        };

        for attempt in 1..=max_attempts {
            // Each attempt is admitted separately so retries are paced too.
            self.admission.ensure_usage_budget(input_tokens)?;
            let permit = self.admission.acquire().await?;
            let output = self.generator.generate(input.clone()).await;
            self.admission.release(permit);
            let output = output.map_err(GenerationFailure::from)?;

            let output_json = output.to_string();
            self.admission
                .record_usage(input_tokens + estimate_tokens(&output_json));

            let raw = match parse_output(&output, &request.layers) {
                Ok(raw) => raw,
                Err(malformed) => {
                    log::warn!("attempt {attempt}/{max_attempts}: {malformed}");
                    failure = malformed;
                    continue;
                }
            };

            let tempo = tempo_hint
                .or_else(|| raw.tempo.map(|t| t.clamp(20.0, 400.0).round() as u32))
                .unwrap_or(DEFAULT_TEMPO);
            let composition = self.validate_layers(request, &key, tempo, &raw);

            if composition.is_empty() {
                log::warn!("attempt {attempt}/{max_attempts}: no usable notes");
                failure = GenerationFailure::Unusable {
                    attempts: max_attempts,
                };
                continue;
            }
            if self.feedback.is_rejected(&composition) {
                log::info!("attempt {attempt}/{max_attempts}: output was previously rejected");
                failure = GenerationFailure::Unusable {
                    attempts: max_attempts,
                };
                continue;
            }
            return Ok(composition);
        }

        Err(failure.into())
    }

    async fn build_context(
        &self,
        request: &NormalizedRequest,
        analysis: &PromptAnalysis,
        key: &Key,
        tempo_hint: Option<u32>,
    ) -> GenerationContext {
        let examples = self.examples_for(request, analysis, key, tempo_hint).await;
        let chord_progressions = match &request.chord_progression {
            Some(explicit) => vec![explicit.clone()],
            None => {
                let query = ChordQuery::new(&request.prompt, key, analysis.mood)
                    .instrument(analysis.instrument);
                self.chords.select(&query, &mut rand::thread_rng())
            }
        };

        GenerationContext {
            key: key.to_string(),
            tempo: tempo_hint.unwrap_or(DEFAULT_TEMPO),
            measures: request.measures,
            layers: request.layers.clone(),
            grid_resolution: request.grid_resolution,
            mood: analysis.mood,
            chord_progressions,
            examples,
        }
    }

    async fn examples_for(
        &self,
        request: &NormalizedRequest,
        analysis: &PromptAnalysis,
        key: &Key,
        tempo_hint: Option<u32>,
    ) -> Vec<TrainingExample> {
        if self.few_shot.max_examples() == 0 {
            return Vec::new();
        }
        let corpus = self.corpus.fetch().await;
        let mut context = SelectionContext::from_analysis(&request.prompt, analysis).with_key(*key);
        if let Some(tempo) = tempo_hint {
            context = context.with_tempo(tempo);
        }
        self.few_shot.select(&corpus, &context)
    }

    fn validate_layers(
        &self,
        request: &NormalizedRequest,
        key: &Key,
        tempo: u32,
        raw: &RawLayers,
    ) -> Composition {
        let mut composition = Composition::new(tempo);
        for &layer in &request.layers {
            let Some(notes) = raw.layer(layer) else {
                continue;
            };
            let options = self
                .profile
                .options(request.beat_budget(), request.grid_step())
                .monophonic(layer.is_monophonic());
            let validated = MelodyValidator::new(*key, options).validate(notes);
            log::debug!(
                "{} layer: {} raw -> {} notes",
                layer,
                validated.report.input_notes,
                validated.report.output_notes
            );
            *composition.layer_mut(layer) = validated.notes;
        }
        composition
    }
}
