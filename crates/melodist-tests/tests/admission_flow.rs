//! Admission control observed through the composer: concurrency ceiling,
//! pacing between generator calls, queue timeout and the usage window.

use std::time::Duration;

use futures_util::future::join_all;
use melodist_core::GenerationRequest;
use melodist_orchestrator::{AdmissionConfig, CapacityReason, ComposeError, ComposerConfig};
use melodist_tests::{fast_config, melody, ComposerFixture, CountingGenerator};

fn distinct_requests(n: usize) -> Vec<GenerationRequest> {
    (0..n)
        .map(|i| GenerationRequest::new(format!("lofi sketch number {i}")))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn generator_calls_respect_the_ceiling() {
    let fixture = ComposerFixture::new(
        fast_config(),
        CountingGenerator::constant(melody(&["C4"])).with_delay(Duration::from_secs(1)),
    );
    let requests = distinct_requests(6);

    let results = join_all(requests.iter().map(|r| fixture.composer.compose(r))).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(fixture.generator().calls(), 6);
    assert_eq!(fixture.generator().peak_concurrency(), 2);
    assert_eq!(fixture.composer.admission().available(), 2);
}

#[tokio::test(start_paused = true)]
async fn generator_calls_are_paced() {
    let config = ComposerConfig {
        admission: AdmissionConfig {
            min_interval_ms: 2000,
            ..Default::default()
        },
        ..Default::default()
    };
    let fixture = ComposerFixture::new(config, CountingGenerator::constant(melody(&["C4"])));
    let requests = distinct_requests(3);

    join_all(requests.iter().map(|r| fixture.composer.compose(r))).await;

    let starts = fixture.generator().start_times();
    assert_eq!(starts.len(), 3);
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(2000));
    }
}

#[tokio::test(start_paused = true)]
async fn queue_timeout_is_retry_later() {
    let config = ComposerConfig {
        admission: AdmissionConfig {
            max_concurrent: 1,
            min_interval_ms: 0,
            acquire_timeout_ms: Some(100),
            ..Default::default()
        },
        ..Default::default()
    };
    let fixture = ComposerFixture::new(
        config,
        CountingGenerator::constant(melody(&["C4"])).with_delay(Duration::from_secs(1)),
    );
    let requests = distinct_requests(2);

    let results = join_all(requests.iter().map(|r| fixture.composer.compose(r))).await;

    assert!(results[0].is_ok());
    let err = results[1].as_ref().unwrap_err();
    assert!(err.is_retry_later());
    assert!(matches!(
        err,
        ComposeError::CapacityExhausted(CapacityReason::QueueTimeout { .. })
    ));
    assert_eq!(fixture.generator().calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_usage_window_recovers_after_reset() {
    let config = ComposerConfig {
        admission: AdmissionConfig {
            min_interval_ms: 0,
            daily_token_budget: 10_000,
            window_secs: 60,
            ..Default::default()
        },
        ..Default::default()
    };
    let fixture = ComposerFixture::new(config, CountingGenerator::constant(melody(&["C4"])));
    let request = GenerationRequest::new("ambient pad");

    fixture.composer.admission().record_usage(10_000);
    let err = fixture.composer.compose(&request).await.unwrap_err();
    assert_eq!(
        err,
        ComposeError::CapacityExhausted(CapacityReason::UsageBudget {
            used: 10_000,
            budget: 10_000,
        })
    );
    assert_eq!(fixture.generator().calls(), 0);

    tokio::time::advance(Duration::from_secs(61)).await;
    fixture.composer.compose(&request).await.unwrap();
    assert_eq!(fixture.generator().calls(), 1);
    assert!(fixture.composer.usage().total_estimated_tokens_used > 10_000);
}

#[tokio::test(start_paused = true)]
async fn retries_are_paced_like_new_calls() {
    let config = ComposerConfig {
        admission: AdmissionConfig {
            min_interval_ms: 2000,
            ..Default::default()
        },
        ..Default::default()
    };
    let generator = CountingGenerator::new(|call, _| {
        Ok(if call == 0 {
            serde_json::json!([])
        } else {
            melody(&["C4"])
        })
    });
    let fixture = ComposerFixture::new(config, generator);

    fixture
        .composer
        .compose(&GenerationRequest::new("lofi"))
        .await
        .unwrap();

    let starts = fixture.generator().start_times();
    assert_eq!(starts.len(), 2);
    assert!(starts[1] - starts[0] >= Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn retries_recheck_the_usage_budget() {
    let config = ComposerConfig {
        admission: AdmissionConfig {
            min_interval_ms: 0,
            daily_token_budget: 50_000,
            ..Default::default()
        },
        ..Default::default()
    };
    // ~100k estimated tokens of unparseable output on the first call
    let generator = CountingGenerator::new(|call, _| {
        Ok(if call == 0 {
            serde_json::Value::String("x".repeat(400_000))
        } else {
            melody(&["C4"])
        })
    });
    let fixture = ComposerFixture::new(config, generator);

    let err = fixture
        .composer
        .compose(&GenerationRequest::new("lofi"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ComposeError::CapacityExhausted(CapacityReason::UsageBudget { .. })
    ));
    assert_eq!(fixture.generator().calls(), 1);
    assert_eq!(fixture.composer.admission().available(), 2);
}
