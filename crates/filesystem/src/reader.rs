//! Random-access read handle.

use std::sync::Arc;

use async_trait::async_trait;
use rusty_gcsfs_common::{GcsError, GcsPath};
use rusty_gcsfs_storage::ObjectMetadata;

use crate::block_cache::BlockFetcher;
use crate::fs::FsShared;

/// Read handle for one object.
///
/// The handle holds the path only; bytes live in the facade's block
/// cache, so blocks outlive any one handle and are shared between
/// handles for the same object version.
pub struct GcsReader {
    shared: Arc<FsShared>,
    path: GcsPath,
    uri: String,
}

impl std::fmt::Debug for GcsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsReader")
            .field("path", &self.path)
            .field("uri", &self.uri)
            .finish()
    }
}

/// Loads blocks through the client, reporting to the stats tap.
struct BlockFetchAdapter<'a> {
    shared: &'a FsShared,
    bucket: &'a str,
    object: &'a str,
}

#[async_trait]
impl BlockFetcher for BlockFetchAdapter<'_> {
    async fn fetch_block(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, GcsError> {
        if let Some(stats) = &self.shared.stats {
            stats.record_block_load_request(path, offset);
        }
        let bytes = self
            .shared
            .client
            .read_range(self.bucket, self.object, offset, length)
            .await?;
        if let Some(stats) = &self.shared.stats {
            stats.record_block_retrieved(path, offset, bytes.len());
        }
        Ok(bytes.to_vec())
    }
}

impl GcsReader {
    pub(crate) fn new(shared: Arc<FsShared>, path: GcsPath) -> Self {
        let uri: String = path.to_uri();
        Self { shared, path, uri }
    }

    /// The full `gs://` URI this handle reads.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Read into `buf` at `offset`, returning `buf.len()` when every
    /// requested byte was available.
    ///
    /// When end-of-file falls at or inside the range, the available
    /// bytes (possibly none) are copied into the front of `buf` and the
    /// read fails as out-of-range; the partial bytes remain readable in
    /// the buffer. When the stat-cached size promises more bytes than
    /// the store produced, the read fails as internal: the cache and
    /// the store disagree.
    pub async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, GcsError> {
        let n: usize = buf.len();
        if n == 0 {
            return Ok(0);
        }

        let bytes: Vec<u8> = match &self.shared.block_cache {
            Some(cache) => {
                let metadata: ObjectMetadata = self
                    .shared
                    .stat_metadata(&self.path.bucket, &self.path.object, &self.uri)
                    .await?;
                let fetcher: BlockFetchAdapter<'_> = BlockFetchAdapter {
                    shared: &self.shared,
                    bucket: &self.path.bucket,
                    object: &self.path.object,
                };
                let bytes: Vec<u8> = cache
                    .read(&self.uri, metadata.signature(), offset, n, &fetcher)
                    .await?;

                let expected: usize = (metadata.size.saturating_sub(offset) as usize).min(n);
                if bytes.len() < expected {
                    return Err(GcsError::internal(format!(
                        "inconsistent read of {}: expected {} bytes at offset {} of a {}-byte \
                         object, got {}",
                        self.uri,
                        expected,
                        offset,
                        metadata.size,
                        bytes.len()
                    )));
                }
                bytes
            }
            None => self
                .shared
                .client
                .read_range(&self.path.bucket, &self.path.object, offset, n as u64)
                .await?
                .to_vec(),
        };

        buf[..bytes.len()].copy_from_slice(&bytes);
        if bytes.len() < n {
            return Err(GcsError::out_of_range(format!(
                "EOF reached: read {} of {} requested bytes at offset {} of {}",
                bytes.len(),
                n,
                offset,
                self.uri
            )));
        }
        Ok(n)
    }
}
