//! # handlepool
//!
//! Process-wide cache and registry for expensive-to-construct, shareable
//! service handles, such as language-model clients.
//!
//! ## Features
//!
//! - Fingerprint-keyed caching: identical configurations share one resource
//! - Reference counting with active/idle sets and idempotent release
//! - TTL and LRU eviction of idle entries via a cancelable background reaper
//! - Name registry mapping (name, config) to a stable id with one pluggable
//!   factory per logical name, idempotent or rejecting duplicate policy, and
//!   optional auto-registration
//! - Typed errors that carry the failing name or fingerprint
//! - Stats snapshots with Prometheus exposition export
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use handlepool::{Config, ConfigValue, PoolConfiguration, ResourcePool};
//!
//! let pool = Arc::new(ResourcePool::new(PoolConfiguration::default()));
//!
//! let mut config = Config::new();
//! config.insert("endpoint".into(), ConfigValue::Str("https://example.test".into()));
//!
//! let handle = pool.acquire(&config, |_| Ok(String::from("client"))).unwrap();
//! assert_eq!(handle.get().map(String::as_str), Some("client"));
//!
//! drop(handle); // checkout returned; the entry parks in the idle set
//! assert_eq!(pool.idle_count(), 1);
//! ```

mod config;
mod errors;
mod fingerprint;
mod metrics;
mod pool;
mod reaper;
mod registry;

pub use config::{PoolConfiguration, TeardownFn};
pub use errors::{BoxError, PoolError, PoolResult, RegistryError, RegistryResult};
pub use fingerprint::{Config, ConfigValue, Fingerprint};
pub use metrics::{MetricsExporter, PoolStats, RegistryStats};
pub use pool::{Handle, ResourcePool};
pub use reaper::Reaper;
pub use registry::{DuplicatePolicy, EntityFactory, Registry, RegistryEntry, RegistryOptions};
