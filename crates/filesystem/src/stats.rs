//! Observation tap for cache and metadata traffic.

/// Observer invoked on block load requests, block retrievals, and stat
/// requests.
///
/// Installed at construction; implementations must not outlive the
/// filesystem that calls them. All methods default to no-ops so a tap
/// can observe only what it cares about.
pub trait FilesystemStats: Send + Sync {
    /// The filesystem's block size, reported once at construction.
    fn configure(&self, _block_size: u64) {}

    /// A block is needed and absent from the cache.
    fn record_block_load_request(&self, _path: &str, _offset: u64) {}

    /// A block fetch completed, transferring `bytes` bytes.
    fn record_block_retrieved(&self, _path: &str, _offset: u64, _bytes: usize) {}

    /// An object metadata request is about to be issued.
    fn record_stat_request(&self, _path: &str) {}
}
