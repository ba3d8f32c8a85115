//! A generator that counts and records its calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use melodist_orchestrator::{Generator, GeneratorError, GeneratorInput};
use tokio::time::Instant;

type Respond = dyn Fn(usize, &GeneratorInput) -> Result<serde_json::Value, GeneratorError>
    + Send
    + Sync;

/// Mock generator. The response closure receives the zero-based call index.
pub struct CountingGenerator {
    respond: Box<Respond>,
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    inputs: Mutex<Vec<GeneratorInput>>,
    started: Mutex<Vec<Instant>>,
}

impl CountingGenerator {
    pub fn new(
        respond: impl Fn(usize, &GeneratorInput) -> Result<serde_json::Value, GeneratorError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `output`.
    pub fn constant(output: serde_json::Value) -> Self {
        Self::new(move |_, _| Ok(output.clone()))
    }

    /// Simulated latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<GeneratorInput> {
        self.inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start time of every call, in call order.
    pub fn start_times(&self) -> Vec<Instant> {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Generator for CountingGenerator {
    async fn generate(&self, input: GeneratorInput) -> Result<serde_json::Value, GeneratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Instant::now());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = (self.respond)(call, &input);
        self.inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(input);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
