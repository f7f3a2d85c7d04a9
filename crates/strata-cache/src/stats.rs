//! Cache statistics for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for a reference-counted cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Lookups served from a resident entry.
    hits: AtomicU64,
    /// Lookups that had to fetch from the source.
    misses: AtomicU64,
    /// Lookups that waited for another caller's fetch.
    waits: AtomicU64,
    /// Entries written back and dropped.
    evictions: AtomicU64,
    /// Lookups refused because the cache was full.
    refusals: AtomicU64,
}

impl CacheStats {
    /// Creates new statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a cache hit.
    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache miss.
    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a wait on an in-flight fetch.
    #[inline]
    pub fn record_wait(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an eviction.
    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a refusal.
    #[inline]
    pub fn record_refusal(&self) {
        self.refusals.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns cache hits.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns cache misses.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns waits on in-flight fetches.
    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }

    /// Returns evictions.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Returns refusals.
    pub fn refusals(&self) -> u64 {
        self.refusals.load(Ordering::Relaxed)
    }

    /// Returns the hit ratio (0.0 to 1.0).
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits() + self.misses();
        if lookups == 0 {
            0.0
        } else {
            self.hits() as f64 / lookups as f64
        }
    }

    /// Resets all statistics.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.waits.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.refusals.store(0, Ordering::Relaxed);
    }
}

impl Clone for CacheStats {
    fn clone(&self) -> Self {
        Self {
            hits: AtomicU64::new(self.hits()),
            misses: AtomicU64::new(self.misses()),
            waits: AtomicU64::new(self.waits()),
            evictions: AtomicU64::new(self.evictions()),
            refusals: AtomicU64::new(self.refusals()),
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_ratio: {:.2}%, waits: {}, evictions: {}, refusals: {} }}",
            self.hits(),
            self.misses(),
            self.hit_ratio() * 100.0,
            self.waits(),
            self.evictions(),
            self.refusals()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_ratio(), 0.0);

        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert!((stats.hit_ratio() - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_reset() {
        let stats = CacheStats::new();
        stats.record_eviction();
        stats.record_refusal();
        stats.record_wait();

        let snapshot = stats.clone();
        stats.reset();
        assert_eq!(stats.evictions(), 0);
        assert_eq!(snapshot.evictions(), 1);
        assert_eq!(snapshot.refusals(), 1);
        assert_eq!(snapshot.waits(), 1);
    }
}
