//! Time-boxed detection cache with single-flight refresh
//!
//! Each key moves through an explicit state machine:
//!
//! - `Empty`: no slot. The first caller becomes the refresh leader.
//! - `Fresh`: ready and within TTL. Served directly.
//! - `Stale`: ready but past TTL. The next caller becomes the leader.
//! - `Refreshing`: a leader is computing. Callers serve the previous value
//!   when one exists, otherwise they await the same in-flight future.
//!
//! Only the leader stores the result, and only if its generation still owns
//! the slot. A leader dropped mid-refresh (caller timeout) reverts the slot.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::metrics::METRICS;

type InFlight<V> = Shared<BoxFuture<'static, V>>;

enum Slot<V> {
    Ready {
        value: V,
        stored_at: Instant,
    },
    Refreshing {
        previous: Option<(V, Instant)>,
        inflight: InFlight<V>,
        generation: u64,
    },
}

/// Observable state of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Empty,
    Fresh,
    Stale,
    Refreshing,
}

/// Outcome of a lookup, decided while holding the entry
enum Step<V> {
    Done(V),
    Wait(InFlight<V>),
    Lead(InFlight<V>, u64),
}

/// Single-flight cache keyed by `K`
pub struct DetectionCache<K, V> {
    slots: DashMap<K, Slot<V>>,
    ttl: Duration,
    max_entries: usize,
    next_generation: AtomicU64,
    refreshes: AtomicU64,
}

impl<K, V> DetectionCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            slots: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            next_generation: AtomicU64::new(1),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Return the cached value for `key`, running `refresh` at most once
    /// across all concurrent callers when the entry is empty or stale.
    pub async fn get_or_refresh<F, Fut>(&self, key: K, refresh: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        match self.lookup(key.clone(), refresh) {
            Step::Done(value) => value,
            Step::Wait(inflight) => inflight.await,
            Step::Lead(inflight, generation) => {
                let mut guard = RefreshGuard {
                    cache: self,
                    key: Some(key),
                    generation,
                };
                let value = inflight.await;
                guard.complete(value.clone());
                value
            }
        }
    }

    fn lookup<F, Fut>(&self, key: K, refresh: F) -> Step<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        match self.slots.entry(key) {
            Entry::Occupied(mut occupied) => {
                let previous = match occupied.get() {
                    Slot::Ready { value, stored_at } if stored_at.elapsed() < self.ttl => {
                        METRICS.record_cache_lookup("hit");
                        return Step::Done(value.clone());
                    }
                    Slot::Refreshing {
                        previous: Some((value, _)),
                        ..
                    } => {
                        METRICS.record_cache_lookup("stale");
                        return Step::Done(value.clone());
                    }
                    Slot::Refreshing { inflight, .. } => {
                        METRICS.record_cache_lookup("wait");
                        return Step::Wait(inflight.clone());
                    }
                    Slot::Ready { value, stored_at } => (value.clone(), *stored_at),
                };

                METRICS.record_cache_lookup("stale");
                let (inflight, generation) = self.start_refresh(refresh);
                occupied.insert(Slot::Refreshing {
                    previous: Some(previous),
                    inflight: inflight.clone(),
                    generation,
                });
                Step::Lead(inflight, generation)
            }
            Entry::Vacant(vacant) => {
                METRICS.record_cache_lookup("miss");
                let (inflight, generation) = self.start_refresh(refresh);
                vacant.insert(Slot::Refreshing {
                    previous: None,
                    inflight: inflight.clone(),
                    generation,
                });
                Step::Lead(inflight, generation)
            }
        }
    }

    fn start_refresh<F, Fut>(&self, refresh: F) -> (InFlight<V>, u64)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        METRICS.record_cache_refresh();
        (refresh().boxed().shared(), generation)
    }

    /// Store a leader's value if its generation still owns the slot
    fn store(&self, key: &K, generation: u64, value: V) {
        let stored = match self.slots.get_mut(key) {
            Some(mut slot) => {
                let owned = matches!(
                    &*slot,
                    Slot::Refreshing { generation: g, .. } if *g == generation
                );
                if owned {
                    *slot = Slot::Ready {
                        value,
                        stored_at: Instant::now(),
                    };
                }
                owned
            }
            None => false,
        };

        if stored {
            self.evict_overflow(key);
        } else {
            debug!("Discarding refresh result for superseded generation {}", generation);
        }
    }

    /// Undo a leader that never completed
    fn revert(&self, key: &K, generation: u64) {
        if let Entry::Occupied(mut occupied) = self.slots.entry(key.clone()) {
            let previous = match occupied.get() {
                Slot::Refreshing {
                    generation: g,
                    previous,
                    ..
                } if *g == generation => previous.clone(),
                _ => return,
            };
            match previous {
                Some((value, stored_at)) => {
                    occupied.insert(Slot::Ready { value, stored_at });
                }
                None => {
                    occupied.remove();
                }
            }
        }
    }

    /// Drop the oldest ready entries beyond capacity, never `keep`
    fn evict_overflow(&self, keep: &K) {
        while self.slots.len() > self.max_entries {
            let oldest = self
                .slots
                .iter()
                .filter(|entry| entry.key() != keep)
                .filter_map(|entry| match entry.value() {
                    Slot::Ready { stored_at, .. } => Some((entry.key().clone(), *stored_at)),
                    Slot::Refreshing { .. } => None,
                })
                .min_by_key(|(_, stored_at)| *stored_at)
                .map(|(key, _)| key);

            match oldest {
                Some(key) => {
                    self.slots.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn state(&self, key: &K) -> EntryState {
        match self.slots.get(key).as_deref() {
            None => EntryState::Empty,
            Some(Slot::Ready { stored_at, .. }) if stored_at.elapsed() < self.ttl => EntryState::Fresh,
            Some(Slot::Ready { .. }) => EntryState::Stale,
            Some(Slot::Refreshing { .. }) => EntryState::Refreshing,
        }
    }

    /// Remove one key; an in-flight leader for it will not store
    pub fn invalidate(&self, key: &K) {
        self.slots.remove(key);
    }

    /// Refreshes started since creation
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            refreshes: self.refresh_count(),
            ..Default::default()
        };
        for entry in self.slots.iter() {
            stats.total_entries += 1;
            match entry.value() {
                Slot::Ready { stored_at, .. } if stored_at.elapsed() < self.ttl => {
                    stats.fresh_entries += 1
                }
                Slot::Ready { .. } => stats.stale_entries += 1,
                Slot::Refreshing { .. } => stats.refreshing_entries += 1,
            }
        }
        stats
    }
}

/// Reverts the slot when a leader is dropped before completing
struct RefreshGuard<'a, K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: &'a DetectionCache<K, V>,
    key: Option<K>,
    generation: u64,
}

impl<'a, K, V> RefreshGuard<'a, K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn complete(&mut self, value: V) {
        if let Some(key) = self.key.take() {
            self.cache.store(&key, self.generation, value);
        }
    }
}

impl<'a, K, V> Drop for RefreshGuard<'a, K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            debug!("Refresh leader dropped, reverting slot");
            self.cache.revert(&key, self.generation);
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
    pub refreshing_entries: usize,
    pub refreshes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counted(
        counter: &Arc<AtomicUsize>,
        value: u32,
        delay_ms: u64,
    ) -> impl Future<Output = u32> + Send + 'static {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            value
        }
    }

    #[tokio::test]
    async fn test_cache_miss_then_hit() {
        let cache = DetectionCache::new(Duration::from_secs(60), 10);
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.state(&"a"), EntryState::Empty);
        let first = cache.get_or_refresh("a", || counted(&calls, 1, 0)).await;
        let second = cache.get_or_refresh("a", || counted(&calls, 2, 0)).await;

        assert_eq!(first, 1);
        assert_eq!(second, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(&"a"), EntryState::Fresh);
    }

    #[tokio::test]
    async fn test_concurrent_cold_callers_share_one_refresh() {
        let cache = Arc::new(DetectionCache::new(Duration::from_secs(60), 10));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache.get_or_refresh("project", || counted(&calls, 7, 50)).await
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_serves_previous_during_refresh() {
        let cache = Arc::new(DetectionCache::new(Duration::from_millis(50), 10));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_or_refresh("k", || counted(&calls, 1, 0)).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.state(&"k"), EntryState::Stale);

        let leader = {
            let cache = cache.clone();
            let calls = calls.clone();
            tokio::spawn(async move { cache.get_or_refresh("k", || counted(&calls, 2, 100)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.state(&"k"), EntryState::Refreshing);

        // Follower is served the previous value without refreshing
        let follower = cache.get_or_refresh("k", || counted(&calls, 3, 0)).await;
        assert_eq!(follower, 1);

        assert_eq!(leader.await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.state(&"k"), EntryState::Fresh);
    }

    #[tokio::test]
    async fn test_dropped_leader_reverts_slot() {
        let cache = DetectionCache::<&str, u32>::new(Duration::from_secs(60), 10);
        let calls = Arc::new(AtomicUsize::new(0));

        let timed_out = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get_or_refresh("k", || counted(&calls, 1, 1_000)),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(cache.state(&"k"), EntryState::Empty);

        let value = cache.get_or_refresh("k", || counted(&calls, 2, 0)).await;
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_eviction_keeps_capacity() {
        let cache = DetectionCache::new(Duration::from_secs(60), 2);
        for (key, value) in [("a", 1), ("b", 2), ("c", 3)] {
            cache.get_or_refresh(key, move || async move { value }).await;
        }

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.refreshes, 3);
        assert_eq!(cache.state(&"a"), EntryState::Empty);
        assert_eq!(cache.state(&"c"), EntryState::Fresh);
    }

    #[tokio::test]
    async fn test_invalidate_during_refresh_discards_result() {
        let cache = Arc::new(DetectionCache::new(Duration::from_secs(60), 10));
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let cache = cache.clone();
            let calls = calls.clone();
            tokio::spawn(async move { cache.get_or_refresh("k", || counted(&calls, 1, 50)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate(&"k");

        assert_eq!(leader.await.unwrap(), 1);
        assert_eq!(cache.state(&"k"), EntryState::Empty);
    }
}
