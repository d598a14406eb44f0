//! Per-session ranking state.
//!
//! The shuffle seed is drawn once, lazily, and stays fixed for the lifetime of
//! the session so reloads keep a stable order. The fetched-id sets record which
//! engagement counts have already been requested; they live here rather than
//! in the caches so a refetch and a new load see the same bookkeeping.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::engagement::Metric;
use crate::models::TargetKind;

/// Multiplier applied to the seed.
const SEED_PRIME: f64 = 7919.0;

/// Multiplier applied to the normalized key hash.
const KEY_PRIME: f64 = 104_729.0;

/// Buckets the key hash is reduced to before normalizing.
const HASH_BUCKETS: u64 = 10_000;

#[derive(Default)]
pub struct RankingSession {
    seed: OnceCell<f64>,
    fetched: Mutex<HashMap<(TargetKind, Metric), HashSet<String>>>,
}

impl RankingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session with a fixed seed, reduced into `[0, 1)`.
    pub fn with_seed(seed: f64) -> Self {
        let session = Self::default();
        let _ = session.seed.set(seed.rem_euclid(1.0));
        session
    }

    pub fn seed(&self) -> f64 {
        *self.seed.get_or_init(|| {
            let seed = new_session_seed();
            debug!("Drew ranking seed {:.6}", seed);
            seed
        })
    }

    /// Jitter for `key` under this session's seed.
    pub fn jitter(&self, key: &str) -> f64 {
        jitter(self.seed(), key)
    }

    /// Marks `ids` as fetched for `(kind, metric)` and returns the ones that
    /// were not already marked, in input order.
    pub fn claim(&self, kind: TargetKind, metric: Metric, ids: &[String]) -> Vec<String> {
        let mut fetched = self.fetched.lock();
        let set = fetched.entry((kind, metric)).or_default();
        ids.iter()
            .filter(|id| set.insert((*id).clone()))
            .cloned()
            .collect()
    }

    /// Unmarks ids whose fetch failed so a later request retries them.
    pub fn release(&self, kind: TargetKind, metric: Metric, ids: &[String]) {
        if let Some(set) = self.fetched.lock().get_mut(&(kind, metric)) {
            for id in ids {
                set.remove(id);
            }
        }
    }

    /// Clears the fetched set for `(kind, metric)`.
    pub fn forget(&self, kind: TargetKind, metric: Metric) {
        self.fetched.lock().remove(&(kind, metric));
    }

    pub fn is_fetched(&self, kind: TargetKind, metric: Metric, id: &str) -> bool {
        self.fetched
            .lock()
            .get(&(kind, metric))
            .is_some_and(|set| set.contains(id))
    }
}

/// Deterministic jitter in `[0, 1)` for `(seed, key)`.
pub fn jitter(seed: f64, key: &str) -> f64 {
    let hash_value = (xxh3_64(key.as_bytes()) % HASH_BUCKETS) as f64 / HASH_BUCKETS as f64;
    (seed * SEED_PRIME + hash_value * KEY_PRIME).rem_euclid(1.0)
}

fn new_session_seed() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x9e3779b97f4a7c15);
    // 53 high bits give a uniform f64 in [0, 1).
    (xxh3_64(&nanos.to_le_bytes()) >> 11) as f64 / (1u64 << 53) as f64
}
