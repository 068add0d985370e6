//! Construction-time options for [`GcsFilesystem`](crate::GcsFilesystem).

use std::time::Duration;

use rusty_gcsfs_common::{
    DEFAULT_BLOCK_SIZE, DEFAULT_MATCHING_PATHS_CACHE_MAX_ENTRIES, DEFAULT_MAX_CACHE_BYTES,
    DEFAULT_STAT_CACHE_MAX_AGE_SECS, DEFAULT_STAT_CACHE_MAX_ENTRIES,
};
use rusty_gcsfs_http::RetryConfig;
use rusty_gcsfs_storage::TimeoutConfig;

/// All tuning knobs, read once at construction.
///
/// Environment-driven overrides are the caller's concern: parse them
/// into this record before constructing the filesystem.
#[derive(Debug, Clone)]
pub struct GcsOptions {
    /// Read granularity of the block cache. Zero disables the block
    /// cache; reads then issue direct ranged downloads.
    pub block_size: u64,
    /// Total block cache capacity in bytes.
    pub max_cache_bytes: u64,
    /// Age at which cached blocks are treated as missing. Zero keeps
    /// blocks until eviction or invalidation.
    pub max_staleness: Duration,
    /// Stat cache TTL; zero disables the stat cache.
    pub stat_cache_max_age: Duration,
    /// Stat cache entry cap; zero disables the stat cache.
    pub stat_cache_max_entries: usize,
    /// Matching-paths cache TTL; zero disables that cache.
    pub matching_paths_cache_max_age: Duration,
    /// Matching-paths cache entry cap; zero disables that cache.
    pub matching_paths_cache_max_entries: usize,
    /// Retry budget and backoff base for HTTP calls.
    pub retry: RetryConfig,
    /// Per-class HTTP timeouts.
    pub timeouts: TimeoutConfig,
    /// Allowed bucket locations. Empty means unconstrained; the single
    /// entry `"auto"` means the detected zone's region.
    pub allowed_locations: Vec<String>,
    /// Optional header attached to every request.
    pub additional_header: Option<(String, String)>,
}

impl Default for GcsOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            max_staleness: Duration::ZERO,
            stat_cache_max_age: Duration::from_secs(DEFAULT_STAT_CACHE_MAX_AGE_SECS),
            stat_cache_max_entries: DEFAULT_STAT_CACHE_MAX_ENTRIES,
            matching_paths_cache_max_age: Duration::ZERO,
            matching_paths_cache_max_entries: DEFAULT_MATCHING_PATHS_CACHE_MAX_ENTRIES,
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            allowed_locations: Vec::new(),
            additional_header: None,
        }
    }
}
