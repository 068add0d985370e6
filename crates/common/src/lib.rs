//! Shared foundations for the rusty-gcsfs workspace.
//!
//! This crate holds what every layer needs: the error taxonomy returned
//! by all public operations, `gs://` URI parsing, and the default
//! constants for cache sizing.

mod error;
mod path;

pub use error::{ErrorKind, GcsError};
pub use path::{parse_gcs_path, GcsPath};

/// Scheme accepted by all public entry points.
pub const GCS_SCHEME: &str = "gs";

/// Default read granularity of the block cache (64 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// Default total capacity of the block cache (128 MiB).
pub const DEFAULT_MAX_CACHE_BYTES: u64 = 2 * DEFAULT_BLOCK_SIZE;

/// Default TTL for stat cache entries, in seconds.
pub const DEFAULT_STAT_CACHE_MAX_AGE_SECS: u64 = 5;

/// Default stat cache entry cap.
pub const DEFAULT_STAT_CACHE_MAX_ENTRIES: usize = 4096;

/// Default matching-paths cache entry cap.
pub const DEFAULT_MATCHING_PATHS_CACHE_MAX_ENTRIES: usize = 1024;

/// Default number of attempts before a retried operation aborts.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 10;

/// Default base delay for exponential backoff, in microseconds.
pub const DEFAULT_RETRY_INIT_DELAY_US: u64 = 1_000_000;
