//! Process-wide keyed cache with per-entry time to live.
//!
//! ```text
//! key ──→ CachedValue { value, expires_at, ttl }
//!
//! lookup(key, ttl, compute)
//!   fresh entry   → stored value (ttl updated for the next refresh)
//!   missing/stale → compute() outside the lock, store, return
//! ```
//!
//! Concurrent callers that find the same entry stale all compute; the last
//! one to store wins. Entries are never evicted, only refreshed.

use crate::value::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedValue {
    value: Value,
    expires_at: Instant,
    ttl: Duration,
}

impl CachedValue {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, CachedValue>>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every evaluator in the process
    pub fn global() -> Arc<TtlCache> {
        static CACHE: OnceLock<Arc<TtlCache>> = OnceLock::new();
        CACHE.get_or_init(|| Arc::new(TtlCache::new())).clone()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CachedValue>> {
        // Entries stay consistent even if a holder panicked
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stored value for `key`, recomputed through `compute` when missing or
    /// expired. `compute` is the only place the value is produced.
    pub fn lookup<E, F>(&self, key: &str, ttl: Duration, compute: F) -> Result<Value, E>
    where
        F: FnOnce() -> Result<Value, E>,
    {
        {
            let mut entries = self.entries();
            if let Some(entry) = entries.get_mut(key) {
                entry.ttl = ttl;
                if !entry.is_expired(Instant::now()) {
                    return Ok(entry.value.clone());
                }
            }
        }

        debug!(key = %key, ttl_secs = ttl.as_secs(), "Refreshing cached value");
        let value = compute()?;
        let now = Instant::now();
        // Durations past the clock's range never expire
        let expires_at = now.checked_add(ttl).unwrap_or(now + Duration::from_secs(u32::MAX as u64));
        self.entries().insert(
            key.to_string(),
            CachedValue {
                value: value.clone(),
                expires_at,
                ttl,
            },
        );
        Ok(value)
    }

    /// Configured time to live of an entry
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.entries().get(key).map(|e| e.ttl)
    }

    pub fn invalidate(&self, key: &str) {
        self.entries().remove(key);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::convert::Infallible;

    #[test]
    fn test_fresh_entry_is_not_recomputed() {
        let cache = TtlCache::new();
        let calls = Cell::new(0);
        let compute = || -> Result<Value, Infallible> {
            calls.set(calls.get() + 1);
            Ok(Value::Number(calls.get() as f64))
        };

        let first = cache.lookup("k", Duration::from_secs(60), compute).unwrap();
        let second = cache.lookup("k", Duration::from_secs(60), compute).unwrap();

        assert_eq!(first, Value::Number(1.0));
        assert_eq!(second, Value::Number(1.0));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_zero_ttl_always_refreshes() {
        let cache = TtlCache::new();
        let calls = Cell::new(0);
        let compute = || -> Result<Value, Infallible> {
            calls.set(calls.get() + 1);
            Ok(Value::Null)
        };

        cache.lookup("k", Duration::ZERO, compute).unwrap();
        cache.lookup("k", Duration::ZERO, compute).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_lookup_updates_ttl() {
        let cache = TtlCache::new();
        let ok = || -> Result<Value, Infallible> { Ok(Value::Null) };

        cache.lookup("k", Duration::from_secs(60), ok).unwrap();
        cache.lookup("k", Duration::from_secs(5), ok).unwrap();
        assert_eq!(cache.ttl("k"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_failed_compute_stores_nothing() {
        let cache = TtlCache::new();
        let result = cache.lookup("k", Duration::from_secs(60), || Err("boom"));

        assert_eq!(result, Err("boom"));
        assert!(cache.is_empty());
    }
}
