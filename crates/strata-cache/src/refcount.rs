//! Generic reference-counted cache.
//!
//! ```text
//!   get(k) ──► fetching? ──yes──► wait on condvar ──┐
//!                │ no                               │
//!                ▼                                  │
//!            resident? ──yes──► refs += 1 ◄─────────┘
//!                │ no
//!                ▼
//!            full? ──yes──► CacheFull
//!                │ no
//!                ▼
//!      mark fetching, unlock, source.fetch(k), relock, install refs = 1
//!
//!   release(k) ──► refs -= 1 ──► refs == 0 ──► source.evict(k, item)
//! ```
//!
//! All bookkeeping sits behind one mutex. The fetch runs outside it so a
//! slow read of one key does not stall lookups of other keys. Eviction runs
//! inside it, so a concurrent `get` of the same key cannot read stale bytes
//! from disk before the write-back finishes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use crate::stats::CacheStats;
use crate::CacheError;

/// Loads and writes back the resources held by a [`RefCountCache`].
pub trait CacheSource: Send + Sync {
    /// The cached resource.
    type Item: Send + Sync;

    /// Error type of the source. Must be able to carry a [`CacheError`].
    type Error: From<CacheError>;

    /// Loads the resource for `key`. Called without the cache lock held.
    fn fetch(&self, key: u64) -> Result<Self::Item, Self::Error>;

    /// Writes back a resource whose last reference was released.
    fn evict(&self, key: u64, item: &Self::Item) -> Result<(), Self::Error>;
}

/// Bookkeeping protected by the cache mutex.
struct CacheState<T> {
    /// Resident resources.
    resident: HashMap<u64, Arc<T>>,
    /// Pin count of each resident resource.
    refs: HashMap<u64, usize>,
    /// Keys currently being fetched.
    fetching: HashSet<u64>,
}

impl<T> CacheState<T> {
    fn new() -> Self {
        Self {
            resident: HashMap::new(),
            refs: HashMap::new(),
            fetching: HashSet::new(),
        }
    }

    fn occupied(&self) -> usize {
        self.resident.len() + self.fetching.len()
    }
}

/// A reference-counted cache keyed by `u64`.
///
/// `capacity == 0` means unbounded.
pub struct RefCountCache<S: CacheSource> {
    source: S,
    capacity: usize,
    state: Mutex<CacheState<S::Item>>,
    /// Signalled whenever a fetch completes, successfully or not.
    fetched: Condvar,
    stats: CacheStats,
}

impl<S: CacheSource> RefCountCache<S> {
    /// Creates a cache over `source` holding at most `capacity` resources.
    pub fn new(source: S, capacity: usize) -> Self {
        Self {
            source,
            capacity,
            state: Mutex::new(CacheState::new()),
            fetched: Condvar::new(),
            stats: CacheStats::new(),
        }
    }

    /// Returns the underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the configured capacity (0 = unbounded).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of resident resources.
    pub fn resident_count(&self) -> usize {
        self.state.lock().resident.len()
    }

    /// Current pin count of `key`, 0 if not resident.
    pub fn ref_count(&self, key: u64) -> usize {
        self.state.lock().refs.get(&key).copied().unwrap_or(0)
    }

    /// Pins and returns the resource for `key`, fetching it on a miss.
    pub fn get(&self, key: u64) -> Result<Arc<S::Item>, S::Error> {
        let mut state = self.state.lock();
        loop {
            if state.fetching.contains(&key) {
                self.stats.record_wait();
                self.fetched.wait(&mut state);
                continue;
            }

            if let Some(item) = state.resident.get(&key).cloned() {
                *state.refs.entry(key).or_insert(0) += 1;
                self.stats.record_hit();
                return Ok(item);
            }

            if self.capacity > 0 && state.occupied() >= self.capacity {
                self.stats.record_refusal();
                warn!(key, capacity = self.capacity, "cache full, refusing fetch");
                return Err(CacheError::CacheFull {
                    capacity: self.capacity,
                }
                .into());
            }

            state.fetching.insert(key);
            break;
        }
        drop(state);

        self.stats.record_miss();
        trace!(key, "cache miss");
        let fetched = self.source.fetch(key);

        let mut state = self.state.lock();
        state.fetching.remove(&key);
        let result = fetched.map(|item| {
            let item = Arc::new(item);
            state.resident.insert(key, Arc::clone(&item));
            state.refs.insert(key, 1);
            item
        });
        drop(state);
        self.fetched.notify_all();

        result
    }

    /// Unpins `key`. The last release evicts the resource.
    ///
    /// Releasing a key that is not resident is a no-op.
    pub fn release(&self, key: u64) -> Result<(), S::Error> {
        let mut state = self.state.lock();
        let Some(refs) = state.refs.get_mut(&key) else {
            return Ok(());
        };
        *refs -= 1;
        if *refs > 0 {
            return Ok(());
        }

        state.refs.remove(&key);
        match state.resident.remove(&key) {
            Some(item) => {
                self.stats.record_eviction();
                self.source.evict(key, &item)
            }
            None => Ok(()),
        }
    }

    /// Evicts every resident resource regardless of pin count.
    ///
    /// Every resource is written back even if an earlier write-back failed;
    /// the first error is returned.
    pub fn close(&self) -> Result<(), S::Error> {
        let mut state = self.state.lock();
        let mut keys: Vec<u64> = state.resident.keys().copied().collect();
        keys.sort_unstable();

        let mut first_err = None;
        for key in keys {
            state.refs.remove(&key);
            if let Some(item) = state.resident.remove(&key) {
                self.stats.record_eviction();
                if let Err(err) = self.source.evict(key, &item) {
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<S: CacheSource> std::fmt::Debug for RefCountCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RefCountCache")
            .field("capacity", &self.capacity)
            .field("resident", &state.resident.len())
            .field("fetching", &state.fetching.len())
            .finish()
    }
}
