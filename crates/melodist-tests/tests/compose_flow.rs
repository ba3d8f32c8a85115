//! End-to-end compose scenarios against a counting mock generator.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use melodist_core::{GenerationRequest, Layer};
use melodist_orchestrator::{
    ComposeError, ComposerConfig, FewShotConfig, GenerationConfig, GenerationFailure,
    GeneratorError,
};
use melodist_tests::{fast_config, melody, ComposerFixture, CountingGenerator};
use pretty_assertions::assert_eq;
use serde_json::json;

fn dark_trap() -> GenerationRequest {
    GenerationRequest::new("dark trap melody, 140 bpm").measures(8)
}

#[tokio::test(start_paused = true)]
async fn repeated_request_is_served_from_cache() {
    let fixture = ComposerFixture::new(
        fast_config(),
        CountingGenerator::constant(melody(&["A3", "C4", "E4", "G4"])),
    );

    let first = fixture.composer.compose(&dark_trap()).await.unwrap();
    let second = fixture.composer.compose(&dark_trap()).await.unwrap();

    assert_eq!(fixture.generator().calls(), 1);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert!(first.fits_within(32.0));
    assert_eq!(first.tempo, 140);
}

#[tokio::test(start_paused = true)]
async fn whitespace_variants_share_a_cache_entry() {
    let fixture = ComposerFixture::new(
        fast_config(),
        CountingGenerator::constant(melody(&["A3"])),
    );
    let spaced = GenerationRequest::new("  dark   trap melody,\t140 bpm ").measures(8);

    fixture.composer.compose(&dark_trap()).await.unwrap();
    fixture.composer.compose(&spaced).await.unwrap();
    assert_eq!(fixture.generator().calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_requests_coalesce() {
    let fixture = ComposerFixture::new(
        fast_config(),
        CountingGenerator::constant(melody(&["A3", "C4"])).with_delay(Duration::from_secs(3)),
    );
    let request = dark_trap();

    let results = join_all((0..8).map(|_| fixture.composer.compose(&request))).await;

    assert_eq!(fixture.generator().calls(), 1);
    let first = results[0].as_ref().unwrap();
    for result in &results {
        assert_eq!(result.as_ref().unwrap(), first);
    }
    assert_eq!(fixture.composer.cache().inflight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failure_reaches_every_waiter_and_is_not_cached() {
    let generator = CountingGenerator::new(|call, _| {
        if call == 0 {
            Err(GeneratorError::Failed("upstream 503".into()))
        } else {
            Ok(melody(&["C4"]))
        }
    })
    .with_delay(Duration::from_millis(500));
    let fixture = ComposerFixture::new(fast_config(), generator);
    let request = GenerationRequest::new("lofi keys");

    let results = join_all((0..4).map(|_| fixture.composer.compose(&request))).await;
    for result in results {
        assert_eq!(
            result.unwrap_err(),
            ComposeError::Generation(GenerationFailure::Generator("upstream 503".into()))
        );
    }
    assert!(fixture.composer.cache().is_empty());

    let retried = fixture.composer.compose(&request).await.unwrap();
    assert_eq!(retried.melody.len(), 1);
    assert_eq!(fixture.generator().calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn rejected_composition_is_not_served_again() {
    let generator = CountingGenerator::new(|call, _| match call {
        0 | 1 => Ok(melody(&["C4", "E4"])),
        _ => Ok(melody(&["D4", "F4"])),
    });
    let config = ComposerConfig {
        generation: GenerationConfig { max_attempts: 3 },
        ..fast_config()
    };
    let fixture = ComposerFixture::new(config, generator);
    let request = GenerationRequest::new("pop hook").layer(Layer::Melody);

    let rejected = fixture.composer.compose(&request).await.unwrap();
    assert!(fixture
        .composer
        .reject(&request, &rejected, "sounds like a scale")
        .unwrap());
    assert!(fixture.path().join("feedback.json").is_file());

    let replacement = fixture.composer.compose(&request).await.unwrap();
    assert_ne!(replacement, rejected);
    assert_eq!(replacement.melody[0].pitch, "D4");
    assert_eq!(fixture.generator().calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn generator_sees_context() {
    let corpus = json!([
        {
            "input": {"prompt": "dark trap piano", "key": "A minor", "tempo": 140},
            "output": {"melody": [{"note": "A3", "start": 0, "duration": 1}]},
            "metadata": {"instrument": "piano"}
        },
        {
            "input": {"prompt": "sunny ukulele", "key": "C major", "tempo": 100},
            "metadata": {"instrument": "ukulele"}
        }
    ]);
    let config = ComposerConfig {
        few_shot: FewShotConfig {
            max_examples: 1,
            ..Default::default()
        },
        ..fast_config()
    };
    let fixture = ComposerFixture::with_corpus(
        config,
        CountingGenerator::constant(melody(&["A3"])),
        &corpus,
    );
    let request = GenerationRequest::new("dark trap piano in A minor, 140 bpm")
        .layer(Layer::Melody)
        .layer(Layer::Bassline);

    fixture.composer.compose(&request).await.unwrap();

    let inputs = fixture.generator().inputs();
    let context = &inputs[0].context;
    assert_eq!(context.key, "A minor");
    assert_eq!(context.tempo, 140);
    assert_eq!(context.layers, vec![Layer::Melody, Layer::Bassline]);
    assert_eq!(context.chord_progressions.len(), 3);
    assert!(context
        .chord_progressions
        .iter()
        .all(|p| p.starts_with("Am")));
    assert_eq!(context.examples.len(), 1);
    assert_eq!(context.examples[0].input.prompt, "dark trap piano");
}

#[tokio::test(start_paused = true)]
async fn explicit_chord_progression_wins() {
    let fixture = ComposerFixture::new(
        fast_config(),
        CountingGenerator::constant(melody(&["C4"])),
    );
    let request = GenerationRequest::new("anything").chord_progression("C - F - G - C");

    fixture.composer.compose(&request).await.unwrap();
    let inputs = fixture.generator().inputs();
    assert_eq!(inputs[0].context.chord_progressions, vec!["C - F - G - C"]);
    assert!(inputs[0].context.examples.is_empty());
}

#[tokio::test(start_paused = true)]
async fn shared_composer_across_tasks() {
    let fixture = ComposerFixture::new(
        fast_config(),
        CountingGenerator::constant(melody(&["E4"])).with_delay(Duration::from_millis(100)),
    );
    let handles: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|prompt| {
            let composer = Arc::clone(&fixture.composer);
            tokio::spawn(async move { composer.compose(&GenerationRequest::new(prompt)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(fixture.generator().calls(), 3);
    assert_eq!(fixture.composer.cache().len(), 3);
}
