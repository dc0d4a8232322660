//! Bounded sender-reputation cache
//!
//! Best-effort LRU cache over sender domains, updated as a side effect of
//! pattern-stage lookups. Not a correctness dependency: eviction races and
//! lost updates are tolerated.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Reputation entry for a sender domain
#[derive(Debug, Clone, Copy)]
pub struct Reputation {
    /// Total lookups observed
    pub lookups: u64,

    /// Lookups that matched a threat rule
    pub suspicious_hits: u64,
}

impl Reputation {
    /// Fraction of lookups that were suspicious, in [0, 1]
    pub fn score(&self) -> f32 {
        if self.lookups == 0 {
            0.0
        } else {
            self.suspicious_hits as f32 / self.lookups as f32
        }
    }
}

struct CacheEntry {
    rep: Reputation,
    last_seen: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    clock: u64,
}

/// LRU-evicting reputation cache with a fixed capacity
///
/// Recency is a per-entry generation stamp: repeat observations are O(1);
/// only inserting a new domain at capacity scans for the stalest entry.
pub struct SenderReputationCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl SenderReputationCache {
    /// Create a cache holding at most `capacity` domains
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                clock: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Record a lookup for `domain` and return its updated reputation
    pub fn observe(&self, domain: &str, suspicious: bool) -> Reputation {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let now = inner.clock;

        if !inner.entries.contains_key(domain) && inner.entries.len() >= self.capacity {
            let stalest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(d, _)| d.clone());
            if let Some(evicted) = stalest {
                inner.entries.remove(&evicted);
            }
        }

        let entry = inner
            .entries
            .entry(domain.to_string())
            .or_insert(CacheEntry {
                rep: Reputation {
                    lookups: 0,
                    suspicious_hits: 0,
                },
                last_seen: now,
            });

        entry.last_seen = now;
        entry.rep.lookups += 1;
        if suspicious {
            entry.rep.suspicious_hits += 1;
        }
        entry.rep
    }

    /// Current reputation for `domain`, if cached
    pub fn get(&self, domain: &str) -> Option<Reputation> {
        self.inner.lock().entries.get(domain).map(|e| e.rep)
    }

    /// Number of cached domains
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_accumulates() {
        let cache = SenderReputationCache::new(16);

        cache.observe("bad.example", true);
        cache.observe("bad.example", true);
        let rep = cache.observe("bad.example", false);

        assert_eq!(rep.lookups, 3);
        assert_eq!(rep.suspicious_hits, 2);
        assert!((rep.score() - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let cache = SenderReputationCache::new(2);

        cache.observe("a.example", false);
        cache.observe("b.example", false);
        cache.observe("a.example", false); // a is now most recent
        cache.observe("c.example", false); // evicts b

        assert!(cache.get("a.example").is_some());
        assert!(cache.get("b.example").is_none());
        assert!(cache.get("c.example").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_eviction_picks_the_stalest_entry() {
        let cache = SenderReputationCache::new(3);

        cache.observe("a.example", false);
        cache.observe("b.example", false);
        cache.observe("c.example", false);
        cache.observe("b.example", false);
        cache.observe("a.example", false);
        cache.observe("d.example", false); // evicts c

        assert!(cache.get("c.example").is_none());
        assert!(cache.get("a.example").is_some());
        assert!(cache.get("b.example").is_some());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_unknown_domain() {
        let cache = SenderReputationCache::new(4);
        assert!(cache.get("never-seen.example").is_none());
    }
}
