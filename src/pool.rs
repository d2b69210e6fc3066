//! Core resource pool: fingerprint-keyed caching with active/idle sets

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::PoolConfiguration;
use crate::errors::{BoxError, PoolError, PoolResult};
use crate::fingerprint::{Config, Fingerprint};
use crate::metrics::PoolStats;
use crate::reaper::Reaper;

/// One cached resource together with its bookkeeping.
///
/// An entry lives in the active map iff `ref_count > 0` and in the idle map
/// iff `ref_count == 0`, never in both.
struct ResourceEntry<T> {
    resource: Arc<T>,
    fingerprint: Fingerprint,
    config: Config,
    created_at: Instant,
    last_used_at: Instant,
    ref_count: usize,
}

impl<T> ResourceEntry<T> {
    fn new(resource: Arc<T>, fingerprint: Fingerprint, config: Config) -> Self {
        let now = Instant::now();
        Self {
            resource,
            fingerprint,
            config,
            created_at: now,
            last_used_at: now,
            ref_count: 1,
        }
    }

    fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }
}

struct PoolInner<T> {
    active: HashMap<Fingerprint, ResourceEntry<T>>,
    idle: HashMap<Fingerprint, ResourceEntry<T>>,
}

impl<T> PoolInner<T> {
    /// Bump an active entry or revive an idle one. Must be called with the
    /// pool lock held (enforced by `&mut self`).
    fn checkout(&mut self, fingerprint: &Fingerprint) -> Option<Arc<T>> {
        if let Some(entry) = self.active.get_mut(fingerprint) {
            entry.ref_count += 1;
            entry.touch();
            return Some(Arc::clone(&entry.resource));
        }
        if let Some(mut entry) = self.idle.remove(fingerprint) {
            entry.ref_count = 1;
            entry.touch();
            let resource = Arc::clone(&entry.resource);
            self.active.insert(fingerprint.clone(), entry);
            return Some(resource);
        }
        None
    }
}

/// Fingerprint-keyed cache for expensive-to-construct, shareable resources.
///
/// Many callers share one underlying resource per fingerprint via reference
/// counting; fully released entries park in an idle set until the reaper
/// expires them (TTL) or trims them (LRU size bound).
pub struct ResourcePool<T> {
    inner: Mutex<PoolInner<T>>,
    config: PoolConfiguration<T>,
}

impl<T> ResourcePool<T> {
    pub fn new(config: PoolConfiguration<T>) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                active: HashMap::new(),
                idle: HashMap::new(),
            }),
            config,
        }
    }

    /// Check out the resource for `config`, constructing it on a miss.
    ///
    /// An active entry is bumped, an idle entry is revived, and only on a
    /// full miss does `constructor` run. The constructor may block; it runs
    /// without the pool lock held so unrelated fingerprints are not starved.
    /// On constructor failure nothing is inserted.
    pub fn acquire<F>(self: &Arc<Self>, config: &Config, constructor: F) -> PoolResult<Handle<T>>
    where
        F: FnOnce(&Config) -> Result<T, BoxError>,
    {
        let fingerprint = Fingerprint::of(config);
        if let Some(resource) = self.inner.lock().checkout(&fingerprint) {
            return Ok(Handle::new(Arc::clone(self), fingerprint, resource));
        }

        let built = constructor(config).map_err(|source| PoolError::Construction {
            fingerprint: fingerprint.clone(),
            source,
        })?;
        let resource = self.install(&fingerprint, config, Arc::new(built));
        Ok(Handle::new(Arc::clone(self), fingerprint, resource))
    }

    fn install(&self, fingerprint: &Fingerprint, config: &Config, resource: Arc<T>) -> Arc<T> {
        let mut inner = self.inner.lock();
        // Another caller may have finished constructing the same fingerprint
        // while we were building. Adopt theirs; ours is dropped.
        if let Some(existing) = inner.checkout(fingerprint) {
            debug!(fingerprint = %fingerprint, "lost construction race, adopting existing entry");
            return existing;
        }
        inner.active.insert(
            fingerprint.clone(),
            ResourceEntry::new(Arc::clone(&resource), fingerprint.clone(), config.clone()),
        );
        resource
    }

    /// Return one reference for `fingerprint`. Unknown fingerprints and
    /// entries that are already idle are ignored, never an error.
    pub fn release(&self, fingerprint: &Fingerprint) {
        let mut inner = self.inner.lock();
        let drained = match inner.active.get_mut(fingerprint) {
            Some(entry) => {
                entry.ref_count -= 1;
                entry.ref_count == 0
            }
            None => false,
        };
        if drained {
            if let Some(mut entry) = inner.active.remove(fingerprint) {
                entry.touch();
                inner.idle.insert(fingerprint.clone(), entry);
            }
        }
    }

    /// Remove idle entries whose last use is older than `ttl`. Returns the
    /// number of entries destroyed.
    pub fn evict_expired(&self, ttl: Duration) -> usize {
        let removed: Vec<ResourceEntry<T>> = {
            let mut inner = self.inner.lock();
            let expired: Vec<Fingerprint> = inner
                .idle
                .iter()
                .filter(|(_, entry)| entry.last_used_at.elapsed() > ttl)
                .map(|(fingerprint, _)| fingerprint.clone())
                .collect();
            expired
                .into_iter()
                .filter_map(|fingerprint| inner.idle.remove(&fingerprint))
                .collect()
        };
        let count = removed.len();
        for entry in removed {
            self.teardown(entry);
        }
        count
    }

    /// Trim the idle set down to `max_size`, oldest last-use first. Active
    /// entries are never touched regardless of pressure. Returns the number
    /// of entries destroyed.
    pub fn evict_excess(&self, max_size: usize) -> usize {
        let removed: Vec<ResourceEntry<T>> = {
            let mut inner = self.inner.lock();
            if inner.idle.len() <= max_size {
                Vec::new()
            } else {
                let mut by_age: Vec<(Fingerprint, Instant)> = inner
                    .idle
                    .iter()
                    .map(|(fingerprint, entry)| (fingerprint.clone(), entry.last_used_at))
                    .collect();
                by_age.sort_by_key(|(_, last_used_at)| *last_used_at);
                let excess = inner.idle.len() - max_size;
                by_age
                    .into_iter()
                    .take(excess)
                    .filter_map(|(fingerprint, _)| inner.idle.remove(&fingerprint))
                    .collect()
            }
        };
        let count = removed.len();
        for entry in removed {
            self.teardown(entry);
        }
        count
    }

    /// Runs outside the pool lock; a failing hook is logged and eviction
    /// continues for the remaining entries.
    fn teardown(&self, entry: ResourceEntry<T>) {
        debug!(
            fingerprint = %entry.fingerprint,
            age = ?entry.created_at.elapsed(),
            "evicting idle entry",
        );
        if let Some(hook) = self.config.on_evict {
            if let Err(error) = hook(&entry.resource) {
                warn!(fingerprint = %entry.fingerprint, %error, "teardown hook failed");
            }
        }
    }

    /// The configuration a cached entry was constructed from, if cached.
    pub fn entry_config(&self, fingerprint: &Fingerprint) -> Option<Config> {
        let inner = self.inner.lock();
        inner
            .active
            .get(fingerprint)
            .or_else(|| inner.idle.get(fingerprint))
            .map(|entry| entry.config.clone())
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().active.len()
    }

    pub fn idle_count(&self) -> usize {
        self.inner.lock().idle.len()
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            active_count: inner.active.len(),
            idle_count: inner.idle.len(),
            ttl: self.config.ttl,
            max_idle_size: self.config.max_idle_size,
        }
    }

    /// Spawn the background reaper for this pool using its configured
    /// `cleanup_interval`, `ttl`, and `max_idle_size`.
    pub fn start_reaper(self: &Arc<Self>) -> Reaper
    where
        T: Send + Sync + 'static,
    {
        Reaper::spawn(
            Arc::clone(self),
            self.config.cleanup_interval,
            self.config.ttl,
            self.config.max_idle_size,
        )
    }

    #[cfg(test)]
    fn ref_count_of(&self, fingerprint: &Fingerprint) -> Option<usize> {
        let inner = self.inner.lock();
        inner
            .active
            .get(fingerprint)
            .or_else(|| inner.idle.get(fingerprint))
            .map(|entry| entry.ref_count)
    }
}

/// A per-checkout wrapper around one pooled resource.
///
/// `release` is idempotent: the first call returns the reference to the
/// pool exactly once, every later call (including the `Drop` safety net) is
/// a no-op, so explicit release plus drop never double-decrements.
pub struct Handle<T> {
    pool: Arc<ResourcePool<T>>,
    fingerprint: Fingerprint,
    resource: Option<Arc<T>>,
}

impl<T> Handle<T> {
    fn new(pool: Arc<ResourcePool<T>>, fingerprint: Fingerprint, resource: Arc<T>) -> Self {
        Self {
            pool,
            fingerprint,
            resource: Some(resource),
        }
    }

    /// The wrapped resource, or `None` once released.
    pub fn get(&self) -> Option<&T> {
        self.resource.as_deref()
    }

    /// A shared pointer to the wrapped resource, or `None` once released.
    pub fn resource(&self) -> Option<Arc<T>> {
        self.resource.clone()
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Return this checkout to the pool. Safe to call any number of times.
    pub fn release(&mut self) {
        if self.resource.take().is_some() {
            self.pool.release(&self.fingerprint);
        }
    }

    /// Run `f` against the resource, then release on the way out. Returns
    /// `None` if the handle was already released.
    pub fn with<R>(mut self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let out = self.resource.as_deref().map(f);
        self.release();
        out
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::ConfigValue;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config_with(key: &str, value: i64) -> Config {
        let mut config = Config::new();
        config.insert(key.to_string(), ConfigValue::Int(value));
        config
    }

    #[test]
    fn sequential_acquires_share_one_entry() {
        let pool = Arc::new(ResourcePool::new(PoolConfiguration::default()));
        let config = config_with("model", 1);
        let built = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&built);
        let first = pool
            .acquire(&config, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(String::from("client"))
            })
            .unwrap();
        let counter = Arc::clone(&built);
        let second = pool
            .acquire(&config, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(String::from("client"))
            })
            .unwrap();

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(
            &first.resource().unwrap(),
            &second.resource().unwrap()
        ));
        assert_eq!(pool.ref_count_of(first.fingerprint()), Some(2));
        assert_eq!(pool.active_count(), 1);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn release_is_idempotent() {
        let pool = Arc::new(ResourcePool::new(PoolConfiguration::default()));
        let config = config_with("model", 1);
        let mut handle = pool.acquire(&config, |_| Ok(1u32)).unwrap();
        let fingerprint = handle.fingerprint().clone();

        handle.release();
        handle.release();
        drop(handle); // drop safety net must not decrement again

        assert_eq!(pool.ref_count_of(&fingerprint), Some(0));
        assert_eq!(pool.idle_count(), 1);

        // pool-level release on an already idle fingerprint is ignored
        pool.release(&fingerprint);
        assert_eq!(pool.ref_count_of(&fingerprint), Some(0));

        // and so is a release for a fingerprint the pool has never seen
        pool.release(&Fingerprint::of(&config_with("other", 9)));
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn get_returns_none_after_release() {
        let pool = Arc::new(ResourcePool::new(PoolConfiguration::default()));
        let mut handle = pool
            .acquire(&config_with("model", 1), |_| Ok(5u32))
            .unwrap();
        assert_eq!(handle.get(), Some(&5));
        handle.release();
        assert_eq!(handle.get(), None);
        assert!(handle.resource().is_none());
    }

    #[test]
    fn with_releases_on_exit() {
        let pool = Arc::new(ResourcePool::new(PoolConfiguration::default()));
        let handle = pool
            .acquire(&config_with("model", 1), |_| Ok(5u32))
            .unwrap();
        let doubled = handle.with(|value| value * 2);
        assert_eq!(doubled, Some(10));
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn idle_entry_is_revived_without_reconstruction() {
        let pool = Arc::new(ResourcePool::new(PoolConfiguration::default()));
        let config = config_with("model", 1);

        let first = pool.acquire(&config, |_| Ok(String::from("a"))).unwrap();
        let original = first.resource().unwrap();
        drop(first);
        assert_eq!(pool.idle_count(), 1);

        let revived = pool
            .acquire(&config, |_| panic!("must not reconstruct"))
            .unwrap();
        assert!(Arc::ptr_eq(&original, &revived.resource().unwrap()));
        assert_eq!(pool.active_count(), 1);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn expired_idle_entries_are_removed() {
        let pool = Arc::new(ResourcePool::new(PoolConfiguration::default()));
        drop(pool.acquire(&config_with("model", 1), |_| Ok(1u32)).unwrap());
        drop(pool.acquire(&config_with("model", 2), |_| Ok(2u32)).unwrap());
        std::thread::sleep(Duration::from_millis(20));

        // young enough to survive a generous ttl
        assert_eq!(pool.evict_expired(Duration::from_secs(60)), 0);
        assert_eq!(pool.idle_count(), 2);

        // but both are older than a zero ttl by now
        assert_eq!(pool.evict_expired(Duration::ZERO), 2);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn excess_idle_entries_are_evicted_oldest_first() {
        let pool = Arc::new(ResourcePool::new(PoolConfiguration::default()));
        let configs = [
            config_with("model", 1),
            config_with("model", 2),
            config_with("model", 3),
        ];
        for config in &configs {
            drop(pool.acquire(config, |_| Ok(0u32)).unwrap());
            std::thread::sleep(Duration::from_millis(5));
        }
        let active = pool.acquire(&config_with("model", 4), |_| Ok(0u32)).unwrap();

        assert_eq!(pool.evict_excess(2), 1);
        assert_eq!(pool.idle_count(), 2);
        assert!(pool.ref_count_of(&Fingerprint::of(&configs[0])).is_none());
        assert!(pool.ref_count_of(&Fingerprint::of(&configs[1])).is_some());
        assert!(pool.ref_count_of(&Fingerprint::of(&configs[2])).is_some());

        // active entries are immune even when the bound is zero
        assert_eq!(pool.evict_excess(0), 2);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.active_count(), 1);
        assert_eq!(pool.ref_count_of(active.fingerprint()), Some(1));
    }

    #[test]
    fn distinct_configs_never_share_an_entry() {
        let pool = Arc::new(ResourcePool::new(PoolConfiguration::default()));
        let first = pool
            .acquire(&config_with("model", 1), |_| Ok(String::from("a")))
            .unwrap();
        let second = pool
            .acquire(&config_with("model", 2), |_| Ok(String::from("b")))
            .unwrap();

        assert_ne!(first.fingerprint(), second.fingerprint());
        assert!(!Arc::ptr_eq(
            &first.resource().unwrap(),
            &second.resource().unwrap()
        ));
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn constructor_failure_inserts_nothing() {
        let pool: Arc<ResourcePool<u32>> = Arc::new(ResourcePool::new(PoolConfiguration::default()));
        let config = config_with("model", 1);

        let result = pool.acquire(&config, |_| Err("remote unreachable".into()));
        assert!(matches!(result, Err(PoolError::Construction { .. })));
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn teardown_hook_runs_on_eviction_and_failures_do_not_stop_it() {
        fn failing_hook(_: &u32) -> Result<(), BoxError> {
            Err("close failed".into())
        }

        let pool = Arc::new(ResourcePool::new(
            PoolConfiguration::default().with_teardown(failing_hook),
        ));
        drop(pool.acquire(&config_with("model", 1), |_| Ok(1u32)).unwrap());
        drop(pool.acquire(&config_with("model", 2), |_| Ok(2u32)).unwrap());
        std::thread::sleep(Duration::from_millis(5));

        // both entries go despite the hook failing on each
        assert_eq!(pool.evict_expired(Duration::ZERO), 2);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn racing_constructions_converge_on_one_entry() {
        let pool: Arc<ResourcePool<String>> =
            Arc::new(ResourcePool::new(PoolConfiguration::default()));
        let config = config_with("model", 1);
        let barrier = Barrier::new(2);

        let (first, second) = std::thread::scope(|scope| {
            let spawn_acquire = || {
                scope.spawn(|| {
                    barrier.wait();
                    pool.acquire(&config, |_| {
                        std::thread::sleep(Duration::from_millis(10));
                        Ok(String::from("client"))
                    })
                    .unwrap()
                })
            };
            let a = spawn_acquire();
            let b = spawn_acquire();
            (a.join().unwrap(), b.join().unwrap())
        });

        assert!(Arc::ptr_eq(
            &first.resource().unwrap(),
            &second.resource().unwrap()
        ));
        assert_eq!(pool.active_count(), 1);
        assert_eq!(pool.ref_count_of(&Fingerprint::of(&config)), Some(2));
    }

    #[test]
    fn entry_config_reflects_the_originating_config() {
        let pool = Arc::new(ResourcePool::new(PoolConfiguration::default()));
        let config = config_with("model", 7);
        let handle = pool.acquire(&config, |_| Ok(0u32)).unwrap();
        assert_eq!(pool.entry_config(handle.fingerprint()), Some(config));
        assert_eq!(pool.entry_config(&Fingerprint::of(&config_with("x", 1))), None);
    }
}
