//! Block-aligned content cache.
//!
//! Caches fixed-size blocks of object bytes keyed by
//! `(path, signature, block offset)`. Because the signature is part of
//! the key, a new object generation opens a fresh key namespace and the
//! stale blocks age out under LRU pressure. Concurrent fetches of the
//! same block coalesce into one HTTP call.
//!
//! Block bytes are `Arc`-shared: eviction drops the cache's reference
//! only, so a reader copying bytes out can never observe a freed block.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use rusty_gcsfs_common::GcsError;
use rusty_gcsfs_storage::FileSignature;
use tracing::debug;

use crate::singleflight::SingleFlight;

/// Fetches one block's worth of bytes from the store.
///
/// The final block of a file may come back shorter than the requested
/// length; that is how end-of-file is discovered.
#[async_trait]
pub trait BlockFetcher: Send + Sync {
    /// Fetch up to `length` bytes of `path` starting at `offset`.
    async fn fetch_block(&self, path: &str, offset: u64, length: u64)
        -> Result<Vec<u8>, GcsError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BlockKey {
    path: String,
    signature: FileSignature,
    offset: u64,
}

struct CachedBlock {
    data: Arc<Vec<u8>>,
    fetched_at: Instant,
}

struct CacheState {
    blocks: LruCache<BlockKey, CachedBlock>,
    total_bytes: u64,
}

/// LRU cache of file blocks, bounded by total bytes.
pub struct FileBlockCache {
    block_size: u64,
    max_bytes: u64,
    max_staleness: Duration,
    state: Mutex<CacheState>,
    flight: SingleFlight<BlockKey, Arc<Vec<u8>>>,
}

impl FileBlockCache {
    /// # Arguments
    /// * `block_size` - Fetch granularity and alignment; must be nonzero
    /// * `max_bytes` - Total capacity across all cached blocks
    /// * `max_staleness` - Age at which a block is treated as missing;
    ///   zero keeps blocks until eviction or invalidation
    pub fn new(block_size: u64, max_bytes: u64, max_staleness: Duration) -> Self {
        assert!(block_size > 0, "block_size must be nonzero");
        Self {
            block_size,
            max_bytes,
            max_staleness,
            state: Mutex::new(CacheState {
                blocks: LruCache::unbounded(),
                total_bytes: 0,
            }),
            flight: SingleFlight::new(),
        }
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Read up to `n` bytes of `path` at `offset`.
    ///
    /// Missing blocks are loaded through `fetcher`; the result is short
    /// when end-of-file falls inside the requested range, and empty when
    /// `offset` is at or past end-of-file.
    pub async fn read(
        &self,
        path: &str,
        signature: FileSignature,
        offset: u64,
        n: usize,
        fetcher: &dyn BlockFetcher,
    ) -> Result<Vec<u8>, GcsError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut out: Vec<u8> = Vec::with_capacity(n);
        let mut block_offset: u64 = (offset / self.block_size) * self.block_size;

        loop {
            let key: BlockKey = BlockKey {
                path: path.to_string(),
                signature,
                offset: block_offset,
            };
            let data: Arc<Vec<u8>> = self.load_block(&key, fetcher).await?;

            let begin: usize = offset.saturating_sub(block_offset) as usize;
            if begin < data.len() {
                let take: usize = (data.len() - begin).min(n - out.len());
                out.extend_from_slice(&data[begin..begin + take]);
            }

            // A short block is the file's tail.
            if out.len() == n || (data.len() as u64) < self.block_size {
                break;
            }
            block_offset += self.block_size;
        }

        Ok(out)
    }

    async fn load_block(
        &self,
        key: &BlockKey,
        fetcher: &dyn BlockFetcher,
    ) -> Result<Arc<Vec<u8>>, GcsError> {
        if let Some(data) = self.cached(key) {
            return Ok(data);
        }
        self.flight
            .run(key.clone(), || async {
                // A concurrent leader may have populated the cache
                // between our miss and taking leadership.
                if let Some(data) = self.cached(key) {
                    return Ok(data);
                }
                let data: Vec<u8> = fetcher
                    .fetch_block(&key.path, key.offset, self.block_size)
                    .await?;
                let data: Arc<Vec<u8>> = Arc::new(data);
                self.insert(key.clone(), data.clone());
                Ok(data)
            })
            .await
    }

    fn fresh(&self, block: &CachedBlock) -> bool {
        self.max_staleness.is_zero() || block.fetched_at.elapsed() <= self.max_staleness
    }

    fn cached(&self, key: &BlockKey) -> Option<Arc<Vec<u8>>> {
        let mut state = self.state.lock();
        let stale: bool = match state.blocks.get(key) {
            Some(block) if self.fresh(block) => return Some(block.data.clone()),
            Some(_) => true,
            None => false,
        };
        if stale {
            if let Some(block) = state.blocks.pop(key) {
                state.total_bytes -= block.data.len() as u64;
            }
        }
        None
    }

    fn insert(&self, key: BlockKey, data: Arc<Vec<u8>>) {
        let mut state = self.state.lock();
        if let Some(previous) = state.blocks.put(
            key,
            CachedBlock {
                data: data.clone(),
                fetched_at: Instant::now(),
            },
        ) {
            state.total_bytes -= previous.data.len() as u64;
        }
        state.total_bytes += data.len() as u64;

        while state.total_bytes > self.max_bytes {
            match state.blocks.pop_lru() {
                Some((evicted_key, evicted)) => {
                    state.total_bytes -= evicted.data.len() as u64;
                    debug!(path = %evicted_key.path, offset = evicted_key.offset, "evicted block");
                }
                None => break,
            }
        }
    }

    /// Discard every cached block of `path`, across all signatures.
    pub fn remove_file(&self, path: &str) {
        let mut state = self.state.lock();
        let doomed: Vec<BlockKey> = state
            .blocks
            .iter()
            .filter(|(key, _)| key.path == path)
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            if let Some(block) = state.blocks.pop(&key) {
                state.total_bytes -= block.data.len() as u64;
            }
        }
    }

    /// Discard everything.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        state.blocks.clear();
        state.total_bytes = 0;
    }

    /// Bytes currently held, for capacity assertions in tests.
    pub fn cache_bytes(&self) -> u64 {
        self.state.lock().total_bytes
    }

    /// Number of cached blocks.
    pub fn block_count(&self) -> usize {
        self.state.lock().blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn signature(generation: i64) -> FileSignature {
        FileSignature {
            size: 0,
            generation,
            updated_us: 0,
        }
    }

    struct CountingFetcher {
        content: Vec<u8>,
        calls: AtomicU32,
        delay: Duration,
    }

    impl CountingFetcher {
        fn new(content: &[u8]) -> Self {
            Self {
                content: content.to_vec(),
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(content: &[u8], delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(content)
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl BlockFetcher for CountingFetcher {
        async fn fetch_block(
            &self,
            _path: &str,
            offset: u64,
            length: u64,
        ) -> Result<Vec<u8>, GcsError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let start: usize = (offset as usize).min(self.content.len());
            let end: usize = ((offset + length) as usize).min(self.content.len());
            Ok(self.content[start..end].to_vec())
        }
    }

    #[tokio::test]
    async fn test_read_spanning_blocks() {
        let cache: FileBlockCache = FileBlockCache::new(8, 64, Duration::ZERO);
        let fetcher: CountingFetcher = CountingFetcher::new(b"0123456789abcdef0123");

        let bytes: Vec<u8> = cache
            .read("gs://bucket/object", signature(1), 4, 10, &fetcher)
            .await
            .unwrap();
        assert_eq!(bytes, b"456789abcd");
        assert_eq!(fetcher.calls(), 2);

        // Both blocks are now cached.
        let bytes: Vec<u8> = cache
            .read("gs://bucket/object", signature(1), 0, 16, &fetcher)
            .await
            .unwrap();
        assert_eq!(bytes, b"0123456789abcdef");
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_partial_tail_block() {
        let cache: FileBlockCache = FileBlockCache::new(8, 64, Duration::ZERO);
        let fetcher: CountingFetcher = CountingFetcher::new(b"0123456789");

        let bytes: Vec<u8> = cache
            .read("gs://bucket/object", signature(1), 0, 100, &fetcher)
            .await
            .unwrap();
        assert_eq!(bytes, b"0123456789");
        // Block 0 was full, block 1 was the 2-byte tail; the short
        // block ends the scan.
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_read_past_eof_is_empty() {
        let cache: FileBlockCache = FileBlockCache::new(8, 64, Duration::ZERO);
        let fetcher: CountingFetcher = CountingFetcher::new(b"0123456789");

        let bytes: Vec<u8> = cache
            .read("gs://bucket/object", signature(1), 10, 4, &fetcher)
            .await
            .unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_reads_coalesce_fetches() {
        let cache: Arc<FileBlockCache> = Arc::new(FileBlockCache::new(8, 64, Duration::ZERO));
        let fetcher: Arc<CountingFetcher> = Arc::new(CountingFetcher::with_delay(
            b"0123456789abcdef",
            Duration::from_millis(20),
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let fetcher = fetcher.clone();
                tokio::spawn(async move {
                    cache
                        .read("gs://bucket/object", signature(1), 0, 8, fetcher.as_ref())
                        .await
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), b"01234567");
        }
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_capacity_eviction_is_lru() {
        let cache: FileBlockCache = FileBlockCache::new(8, 16, Duration::ZERO);
        let fetcher: CountingFetcher = CountingFetcher::new(b"0123456789abcdef01234567");

        // Load blocks 0 and 1, then touch block 0 to make block 1 the
        // eviction candidate.
        cache.read("gs://b/o", signature(1), 0, 16, &fetcher).await.unwrap();
        cache.read("gs://b/o", signature(1), 0, 4, &fetcher).await.unwrap();
        assert_eq!(cache.cache_bytes(), 16);

        // Block 2 pushes the cache over capacity.
        cache.read("gs://b/o", signature(1), 16, 8, &fetcher).await.unwrap();
        assert_eq!(cache.cache_bytes(), 16);
        assert_eq!(fetcher.calls(), 3);

        // Block 0 is still cached, block 1 was evicted.
        cache.read("gs://b/o", signature(1), 0, 4, &fetcher).await.unwrap();
        assert_eq!(fetcher.calls(), 3);
        cache.read("gs://b/o", signature(1), 8, 4, &fetcher).await.unwrap();
        assert_eq!(fetcher.calls(), 4);
    }

    #[tokio::test]
    async fn test_signature_change_opens_new_namespace() {
        let cache: FileBlockCache = FileBlockCache::new(8, 64, Duration::ZERO);
        let fetcher: CountingFetcher = CountingFetcher::new(b"01234567");

        cache.read("gs://b/o", signature(1), 0, 8, &fetcher).await.unwrap();
        cache.read("gs://b/o", signature(1), 0, 8, &fetcher).await.unwrap();
        assert_eq!(fetcher.calls(), 1);

        cache.read("gs://b/o", signature(2), 0, 8, &fetcher).await.unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_remove_file_discards_all_signatures() {
        let cache: FileBlockCache = FileBlockCache::new(8, 64, Duration::ZERO);
        let fetcher: CountingFetcher = CountingFetcher::new(b"01234567");

        cache.read("gs://b/one", signature(1), 0, 8, &fetcher).await.unwrap();
        cache.read("gs://b/one", signature(2), 0, 8, &fetcher).await.unwrap();
        cache.read("gs://b/two", signature(1), 0, 8, &fetcher).await.unwrap();
        assert_eq!(cache.block_count(), 3);

        cache.remove_file("gs://b/one");
        assert_eq!(cache.block_count(), 1);

        cache.read("gs://b/two", signature(1), 0, 8, &fetcher).await.unwrap();
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_flush_discards_everything() {
        let cache: FileBlockCache = FileBlockCache::new(8, 64, Duration::ZERO);
        let fetcher: CountingFetcher = CountingFetcher::new(b"01234567");

        cache.read("gs://b/o", signature(1), 0, 8, &fetcher).await.unwrap();
        cache.flush();
        assert_eq!(cache.block_count(), 0);
        assert_eq!(cache.cache_bytes(), 0);

        cache.read("gs://b/o", signature(1), 0, 8, &fetcher).await.unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_blocks_are_refetched() {
        let cache: FileBlockCache = FileBlockCache::new(8, 64, Duration::from_millis(20));
        let fetcher: CountingFetcher = CountingFetcher::new(b"01234567");

        cache.read("gs://b/o", signature(1), 0, 8, &fetcher).await.unwrap();
        cache.read("gs://b/o", signature(1), 0, 8, &fetcher).await.unwrap();
        assert_eq!(fetcher.calls(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.read("gs://b/o", signature(1), 0, 8, &fetcher).await.unwrap();
        assert_eq!(fetcher.calls(), 2);
    }
}
