//! Error types for the composer service.
//!
//! Only two kinds of failure reach a caller: capacity exhaustion ("try
//! later") and generation failure. Malformed notes, a missing corpus, and
//! feedback write failures are absorbed and logged.

use std::path::PathBuf;

use thiserror::Error;

/// Failure returned by [`Composer::compose`](crate::Composer::compose).
///
/// `Clone` so that one failure can be handed to every coalesced waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    /// No capacity right now; retry later.
    #[error("capacity exhausted: {0}")]
    CapacityExhausted(CapacityReason),

    /// The generator failed or produced nothing usable.
    #[error("generation failed: {0}")]
    Generation(GenerationFailure),
}

impl ComposeError {
    /// Whether the caller should back off and retry.
    pub fn is_retry_later(&self) -> bool {
        matches!(self, ComposeError::CapacityExhausted(_))
    }
}

/// Why admission was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityReason {
    #[error("usage budget spent ({used}/{budget} tokens in the current window)")]
    UsageBudget { used: u64, budget: u64 },

    #[error("timed out after {waited_ms}ms waiting for a generation slot")]
    QueueTimeout { waited_ms: u64 },

    #[error("all generation slots are busy")]
    Saturated,
}

/// Why a generation did not produce a composition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationFailure {
    #[error("generator error: {0}")]
    Generator(String),

    #[error("malformed generator output: {0}")]
    MalformedOutput(String),

    #[error("no usable output after {attempts} attempt(s)")]
    Unusable { attempts: u32 },

    #[error("generation was abandoned before it settled")]
    Abandoned,
}

impl From<CapacityReason> for ComposeError {
    fn from(reason: CapacityReason) -> Self {
        ComposeError::CapacityExhausted(reason)
    }
}

impl From<GenerationFailure> for ComposeError {
    fn from(failure: GenerationFailure) -> Self {
        ComposeError::Generation(failure)
    }
}

/// Error raised by a [`Generator`](crate::Generator) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    /// The backing model or transport failed.
    #[error("{0}")]
    Failed(String),

    /// The backing model refused the request.
    #[error("request refused: {0}")]
    Refused(String),
}

impl From<GeneratorError> for GenerationFailure {
    fn from(err: GeneratorError) -> Self {
        GenerationFailure::Generator(err.to_string())
    }
}

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown validation profile '{0}'")]
    UnknownProfile(String),
}
