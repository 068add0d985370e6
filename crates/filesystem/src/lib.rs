//! Filesystem facade over Cloud Storage.
//!
//! [`GcsFilesystem`] makes `gs://bucket/object` blobs behave like
//! random-access files in a directory tree: ranged reads flow through a
//! block-aligned content cache, writes stream through resumable upload
//! sessions, and directories are synthesized from prefix listings.
//!
//! All caches are owned per filesystem instance; there is no process
//! global state.

mod block_cache;
mod config;
mod expiring_cache;
mod fs;
mod glob_match;
mod reader;
mod singleflight;
mod stats;
mod writer;

pub use block_cache::{BlockFetcher, FileBlockCache};
pub use config::GcsOptions;
pub use expiring_cache::ExpiringCache;
pub use fs::{FileStatistics, GcsFilesystem, RemovalCounts};
pub use reader::GcsReader;
pub use stats::FilesystemStats;
pub use writer::GcsWriter;
