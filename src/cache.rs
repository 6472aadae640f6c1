use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Source of the current time; injected so that expiry can be tested
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`]
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Values that may be stored in a [`TtlCache`]. Empty values are never cached,
/// since an empty upstream result usually means that the upstream failed
pub trait CacheValue {
    fn is_empty(&self) -> bool;
}

impl<T> CacheValue for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl<K, V> CacheValue for BTreeMap<K, V> {
    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}

#[derive(Debug)]
struct CacheEntry<T> {
    value: Arc<T>,
    computed: Instant,
}

/// Single-entry memoization with a time-to-live.
///
/// The lock is held while the value is recomputed, so callers arriving while a
/// refresh is in flight wait for it and share its result instead of issuing a
/// second upstream query.
pub struct TtlCache<T> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entry: Mutex<Option<CacheEntry<T>>>,
}

impl<T: CacheValue> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entry: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value if it is fresh and non-empty, otherwise calls
    /// `producer` and stores its result
    pub fn get_with<F>(&self, producer: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        let mut entry = self.entry.lock();

        if let Some(cached) = entry.as_ref() {
            let age = self.clock.now().saturating_duration_since(cached.computed);
            if age < self.ttl && !cached.value.is_empty() {
                tracing::debug!(?age, "cache hit");
                return cached.value.clone();
            }
        }

        tracing::debug!("cache miss; refreshing");
        let value = Arc::new(producer());
        *entry = Some(CacheEntry {
            value: value.clone(),
            computed: self.clock.now(),
        });

        value
    }

    /// Age of the stored value, if any
    pub fn age(&self) -> Option<Duration> {
        self.entry
            .lock()
            .as_ref()
            .map(|cached| self.clock.now().saturating_duration_since(cached.computed))
    }

    /// Drops the stored value, forcing the next call to recompute
    pub fn invalidate(&self) {
        *self.entry.lock() = None;
    }
}
