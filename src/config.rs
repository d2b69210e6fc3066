//! Pool configuration knobs

use std::time::Duration;

use crate::errors::BoxError;

/// Teardown hook run against a resource when its idle entry is destroyed.
pub type TeardownFn<T> = fn(&T) -> Result<(), BoxError>;

/// Configuration for pool lifecycle behavior
///
/// # Examples
///
/// ```
/// use handlepool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::<i32>::new()
///     .with_ttl(Duration::from_secs(600))
///     .with_max_idle_size(10);
///
/// assert_eq!(config.ttl, Duration::from_secs(600));
/// assert_eq!(config.max_idle_size, 10);
/// ```
pub struct PoolConfiguration<T> {
    /// How long an idle entry may sit unused before the reaper removes it
    pub ttl: Duration,

    /// How often the background reaper wakes up
    pub cleanup_interval: Duration,

    /// Maximum number of idle entries retained; the oldest beyond this
    /// bound are evicted least-recently-used first
    pub max_idle_size: usize,

    /// Optional hook run when an idle entry is destroyed; failures are
    /// logged and never stop eviction
    pub on_evict: Option<TeardownFn<T>>,
}

impl<T> Default for PoolConfiguration<T> {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(300),
            max_idle_size: 100,
            on_evict: None,
        }
    }
}

impl<T> Clone for PoolConfiguration<T> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            cleanup_interval: self.cleanup_interval,
            max_idle_size: self.max_idle_size,
            on_evict: self.on_evict,
        }
    }
}

impl<T> PoolConfiguration<T> {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle time-to-live
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the reaper wake-up interval
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the idle-set size bound
    pub fn with_max_idle_size(mut self, size: usize) -> Self {
        self.max_idle_size = size;
        self
    }

    /// Install a teardown hook for evicted resources
    pub fn with_teardown(mut self, hook: TeardownFn<T>) -> Self {
        self.on_evict = Some(hook);
        self
    }
}
