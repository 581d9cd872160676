//! Concurrent, per-log-site state: the home of rate-limiter counters and any
//! other mutable value keyed by [`crate::log_site::LogSiteKey`].
//!
//! Backed by `dashmap` rather than a hand-rolled sharded lock: per-key
//! concurrent access under high contention is exactly the shape `DashMap`
//! is built for.

use std::sync::Arc;

use dashmap::DashMap;

use crate::log_site::SiteKeyHandle;
use crate::metadata::{GroupingKey, Metadata};

/// A value stored in a [`LogSiteMap`] must not itself lock: only atomics are
/// permitted, so the hot logging path never contends on a mutex. This is
/// documentation, not an enforced bound. The two rate limiter states this
/// crate ships (see `rate_limit.rs`) hold only atomics.
pub trait LockFreeState: Default + Send + Sync + 'static {}

impl<T: Default + Send + Sync + 'static> LockFreeState for T {}

pub struct LogSiteMap<V: LockFreeState> {
    inner: DashMap<SiteKeyHandle, Arc<V>>,
}

impl<V: LockFreeState> Default for LogSiteMap<V> {
    fn default() -> Self {
        Self { inner: DashMap::new() }
    }
}

impl<V: LockFreeState> LogSiteMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing value for `key`, or atomically inserts
    /// `V::default()`. On a successful insert, scans `metadata` for
    /// `LOG_SITE_GROUPING_KEY` entries backed by a
    /// [`crate::scope::LoggingScope`] and registers a removal hook on each:
    /// once that scope closes, this entry disappears.
    ///
    /// `LogSiteMap` only ever needs this from behind an `Arc` (the removal
    /// hook must own a handle that outlives the registering call), so
    /// callers hold one, matching how every rate limiter in `rate_limit.rs`
    /// stores its state.
    pub fn get(self: &Arc<Self>, key: SiteKeyHandle, metadata: &Metadata) -> Arc<V> {
        if let Some(existing) = self.inner.get(&key) {
            return existing.clone();
        }
        let value = self.inner.entry(key.clone()).or_insert_with(|| Arc::new(V::default())).clone();
        for grouping in metadata.find_all(&crate::metadata::LOG_SITE_GROUPING_KEY) {
            if let GroupingKey::Scope(scope) = grouping {
                let map = self.clone();
                let removal_key = key.clone();
                scope.on_close(move || {
                    map.inner.remove(&removal_key);
                });
            }
        }
        value
    }

    #[cfg(test)]
    pub fn contains(&self, key: &SiteKeyHandle) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
