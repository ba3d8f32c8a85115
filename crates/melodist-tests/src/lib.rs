//! Melodist End-to-End Test Infrastructure
//!
//! Cross-crate scenarios for the composer pipeline:
//!
//! - **Compose flow**: caching, single-flight, retries, negative feedback
//! - **Admission**: concurrency ceiling, pacing floor, usage budget
//! - **Cache expiry**: TTL and stale entries after a measure change
//! - **Properties**: fingerprint and validator invariants under proptest
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p melodist-tests
//! ```

pub mod fixtures;
pub mod mock;

pub use fixtures::{fast_config, melody, ComposerFixture};
pub use mock::CountingGenerator;
