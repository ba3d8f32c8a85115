//! TTL-bound composition cache with single-flight coalescing.
//!
//! Entries are keyed by request fingerprint. A hit requires the entry to be
//! younger than the TTL *and* to fit the caller's beat budget; an entry that
//! fails the budget check was produced for a different measure count and is
//! evicted on sight.
//!
//! [`CompositionCache::coalesce`] guarantees at most one in-progress
//! generation per fingerprint. The first caller (the leader) runs the
//! factory; everyone arriving while it runs waits on a watch channel and
//! receives a clone of the leader's result. Failures are fanned out but never
//! cached.
//!
//! Lock order is `inflight` then `entries`. Neither lock is held across an
//! await point.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use melodist_core::{Composition, Fingerprint};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::error::{ComposeError, GenerationFailure};

type Settled = Option<Result<Composition, ComposeError>>;

#[derive(Debug, Clone)]
struct CacheEntry {
    composition: Composition,
    created_at: Instant,
}

/// Shared composition cache.
#[derive(Debug)]
pub struct CompositionCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    inflight: Mutex<HashMap<Fingerprint, watch::Receiver<Settled>>>,
}

enum Role {
    Leader(watch::Sender<Settled>),
    Follower(watch::Receiver<Settled>),
}

/// Removes the in-flight entry when the leader finishes or is dropped.
struct InflightGuard<'a> {
    cache: &'a CompositionCache,
    fingerprint: &'a Fingerprint,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.cache.lock_inflight().remove(self.fingerprint);
    }
}

impl CompositionCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<Fingerprint, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<Fingerprint, watch::Receiver<Settled>>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached composition if it is fresh and fits `beat_budget`.
    pub fn get(&self, fingerprint: &Fingerprint, beat_budget: f64) -> Option<Composition> {
        let mut entries = self.lock_entries();
        let entry = entries.get(fingerprint)?;

        if entry.created_at.elapsed() >= self.ttl {
            log::debug!("cache entry {} expired", fingerprint.short());
            entries.remove(fingerprint);
            return None;
        }
        if !entry.composition.fits_within(beat_budget) {
            log::debug!(
                "cache entry {} exceeds {} beats (ends at {}), evicting",
                fingerprint.short(),
                beat_budget,
                entry.composition.max_end()
            );
            entries.remove(fingerprint);
            return None;
        }

        log::debug!("cache hit {}", fingerprint.short());
        Some(entry.composition.clone())
    }

    /// Stores a composition, evicting the oldest entry when full.
    pub fn set(&self, fingerprint: Fingerprint, composition: Composition) {
        let mut entries = self.lock_entries();
        entries.insert(
            fingerprint,
            CacheEntry {
                composition,
                created_at: Instant::now(),
            },
        );

        if entries.len() > self.max_entries {
            let ttl = self.ttl;
            entries.retain(|_, e| e.created_at.elapsed() < ttl);
        }
        while entries.len() > self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    log::debug!("cache full, evicting {}", key.short());
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Drops an entry.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        self.lock_entries().remove(fingerprint).is_some()
    }

    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of generations currently in flight.
    pub fn inflight_count(&self) -> usize {
        self.lock_inflight().len()
    }

    /// Returns a cached composition, joins an in-flight generation for the
    /// same fingerprint, or runs `factory` and publishes its result.
    pub async fn coalesce<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        beat_budget: f64,
        factory: F,
    ) -> Result<Composition, ComposeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Composition, ComposeError>>,
    {
        let role = {
            let mut inflight = self.lock_inflight();
            if let Some(hit) = self.get(fingerprint, beat_budget) {
                return Ok(hit);
            }
            match inflight.get(fingerprint) {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(fingerprint.clone(), rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Follower(mut rx) => {
                log::debug!("joining in-flight generation {}", fingerprint.short());
                match rx.wait_for(Option::is_some).await {
                    Ok(settled) => (*settled)
                        .clone()
                        .unwrap_or(Err(GenerationFailure::Abandoned.into())),
                    Err(_) => Err(GenerationFailure::Abandoned.into()),
                }
            }
            Role::Leader(tx) => {
                let guard = InflightGuard {
                    cache: self,
                    fingerprint,
                };
                let result = factory().await;
                if let Ok(composition) = &result {
                    self.set(fingerprint.clone(), composition.clone());
                }
                drop(guard);
                tx.send_replace(Some(result.clone()));
                result
            }
        }
    }
}
