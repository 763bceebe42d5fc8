//! Cache Warden - CI cache maintenance
//!
//! Keeps shared build caches on CI machines bounded: Conan package caches,
//! the clang-tidy result cache and plain directory stores are pruned by
//! least-recent use, one process at a time per cache, and disk capacity is
//! reported around every job.

pub mod ci;
pub mod conan_conf;
pub mod config;
pub mod disk;
pub mod lock;
pub mod platform;
pub mod prune;
pub mod retention;
pub mod timing;

pub use ci::{CiError, CiResult};
pub use config::{Context, EffectiveConfig, Environment, Settings};
pub use lock::{force_unlock, with_lock, CacheLock, LockError, LockWait};
pub use platform::{CacheDirectorySet, Platform};
pub use prune::{CacheBackend, PruneError, PrunePolicy, PruneReport, Pruner};
pub use retention::{RetentionError, RetentionWindow};
