/**
 * LRU + TTL cache for capability discovery queries.
 *
 * Entries carry an expiry timestamp in addition to LRU order, and a lazy
 * sweep evicts expired entries opportunistically on access rather than via
 * a background timer.
 */
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
    pub track_stats: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl: Duration::from_secs(300),
            track_stats: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

struct Entry {
    value: Vec<String>,
    expires_at: Instant,
}

pub struct CapabilityCache {
    config: CacheConfig,
    entries: LruCache<String, Entry>,
    stats: CacheStats,
}

impl CapabilityCache {
    pub fn new(config: CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_entries.max(1)).unwrap();
        Self {
            config,
            entries: LruCache::new(cap),
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<String>> {
        let expired = match self.entries.peek(key) {
            Some(entry) => entry.expires_at <= Instant::now(),
            None => {
                self.record_miss();
                return None;
            }
        };
        if expired {
            self.entries.pop(key);
            self.record_miss();
            if self.config.track_stats {
                self.stats.expirations += 1;
            }
            return None;
        }
        let value = self.entries.get(key).map(|e| e.value.clone());
        if value.is_some() {
            self.record_hit();
        }
        value
    }

    pub fn put(&mut self, key: String, value: Vec<String>) {
        let evicted = self.entries.len() == self.entries.cap().get() && !self.entries.contains(&key);
        self.entries.put(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.config.ttl,
            },
        );
        if evicted && self.config.track_stats {
            self.stats.evictions += 1;
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.pop(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get_stats(&self) -> CacheStats {
        self.stats.clone()
    }

    fn record_hit(&mut self) {
        if self.config.track_stats {
            self.stats.hits += 1;
        }
    }

    fn record_miss(&mut self) {
        if self.config.track_stats {
            self.stats.misses += 1;
        }
    }
}
