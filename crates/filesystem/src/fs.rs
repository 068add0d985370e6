//! The filesystem facade.
//!
//! Directories are synthesized from the flat key space: a path is a
//! directory when a marker object `path/` exists or anything lists
//! under the prefix `path/`. All caches live here, owned per instance.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rusty_gcsfs_common::{parse_gcs_path, ErrorKind, GcsError, GcsPath};
use rusty_gcsfs_http::HttpTransport;
use rusty_gcsfs_storage::{
    region_from_zone, AuthProvider, GcsClient, ObjectMetadata, ResumableUpload, ZoneProvider,
};
use tracing::debug;

use crate::block_cache::FileBlockCache;
use crate::config::GcsOptions;
use crate::expiring_cache::ExpiringCache;
use crate::glob_match;
use crate::reader::GcsReader;
use crate::singleflight::SingleFlight;
use crate::stats::FilesystemStats;
use crate::writer::GcsWriter;

/// Stat result of a file or synthesized directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStatistics {
    /// Object size in bytes; zero for directories.
    pub size: u64,
    /// Last update time in microseconds since Unix epoch; zero for
    /// directories.
    pub mtime_us: i64,
    /// Whether the path names a directory.
    pub is_directory: bool,
}

impl FileStatistics {
    fn directory() -> Self {
        Self {
            size: 0,
            mtime_us: 0,
            is_directory: true,
        }
    }
}

/// What `delete_recursively` could not remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalCounts {
    pub undeleted_files: u64,
    pub undeleted_dirs: u64,
}

/// State shared between the facade and its handles.
pub(crate) struct FsShared {
    pub(crate) client: GcsClient,
    zone: Arc<dyn ZoneProvider>,
    options: GcsOptions,
    pub(crate) block_cache: Option<FileBlockCache>,
    stat_cache: ExpiringCache<ObjectMetadata>,
    matching_paths_cache: ExpiringCache<Vec<String>>,
    /// Bucket locations persist until `flush_caches`.
    bucket_locations: Mutex<HashMap<String, String>>,
    location_flight: SingleFlight<String, String>,
    pub(crate) stats: Option<Arc<dyn FilesystemStats>>,
}

impl FsShared {
    /// Object metadata through the stat cache. While a cached entry is
    /// fresh it is the sole signature authority and no HTTP call is
    /// made.
    pub(crate) async fn stat_metadata(
        &self,
        bucket: &str,
        object: &str,
        uri: &str,
    ) -> Result<ObjectMetadata, GcsError> {
        if let Some(metadata) = self.stat_cache.lookup(uri) {
            return Ok(metadata);
        }
        if let Some(stats) = &self.stats {
            stats.record_stat_request(uri);
        }
        let metadata: ObjectMetadata = self.client.stat_object(bucket, object).await?;
        self.stat_cache.insert(uri, metadata);
        Ok(metadata)
    }

    /// Drop all cached state for one path. Runs before any write
    /// returns, so later reads cannot observe pre-write data.
    pub(crate) fn invalidate_file(&self, uri: &str) {
        self.stat_cache.delete(uri);
        if let Some(cache) = &self.block_cache {
            cache.remove_file(uri);
        }
    }

    /// Enforce the allowed-locations constraint for a bucket.
    pub(crate) async fn ensure_bucket_allowed(&self, bucket: &str) -> Result<(), GcsError> {
        if self.options.allowed_locations.is_empty() {
            return Ok(());
        }
        let location: String = self.bucket_location(bucket).await?;

        let mut allowed: Vec<String> = Vec::with_capacity(self.options.allowed_locations.len());
        for entry in &self.options.allowed_locations {
            if entry == "auto" {
                let zone: String = self.zone.zone().await?;
                allowed.push(region_from_zone(&zone).to_lowercase());
            } else {
                allowed.push(entry.to_lowercase());
            }
        }
        if allowed.iter().any(|candidate| *candidate == location) {
            return Ok(());
        }
        Err(GcsError::failed_precondition(format!(
            "bucket '{}' is in location '{}', which is not among the allowed locations: {}",
            bucket,
            location,
            allowed.join(", ")
        )))
    }

    /// The bucket's location, fetched at most once per bucket.
    async fn bucket_location(&self, bucket: &str) -> Result<String, GcsError> {
        if let Some(location) = self.bucket_locations.lock().get(bucket) {
            return Ok(location.clone());
        }
        let location: String = self
            .location_flight
            .run(bucket.to_string(), || async {
                self.client.bucket_location(bucket).await
            })
            .await?;
        self.bucket_locations
            .lock()
            .insert(bucket.to_string(), location.clone());
        Ok(location)
    }

    /// Whether anything lists under `object/`.
    async fn folder_exists(&self, bucket: &str, object: &str) -> Result<bool, GcsError> {
        let prefix: String = format!("{}/", object.trim_end_matches('/'));
        self.client.prefix_nonempty(bucket, &prefix).await
    }
}

/// Filesystem over `gs://bucket/object` URIs.
///
/// Safe for concurrent use: operations on distinct paths are
/// independent, and a write's cache invalidation happens before the
/// write returns.
pub struct GcsFilesystem {
    shared: Arc<FsShared>,
}

impl GcsFilesystem {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        auth: Arc<dyn AuthProvider>,
        zone: Arc<dyn ZoneProvider>,
        options: GcsOptions,
        stats: Option<Arc<dyn FilesystemStats>>,
    ) -> Self {
        let client: GcsClient = GcsClient::new(
            transport,
            auth,
            options.timeouts,
            options.retry,
            options.additional_header.clone(),
        );
        let block_cache: Option<FileBlockCache> = (options.block_size > 0).then(|| {
            FileBlockCache::new(
                options.block_size,
                options.max_cache_bytes,
                options.max_staleness,
            )
        });
        if let Some(stats) = &stats {
            stats.configure(options.block_size);
        }
        let stat_cache: ExpiringCache<ObjectMetadata> = ExpiringCache::new(
            options.stat_cache_max_age,
            options.stat_cache_max_entries,
        );
        let matching_paths_cache: ExpiringCache<Vec<String>> = ExpiringCache::new(
            options.matching_paths_cache_max_age,
            options.matching_paths_cache_max_entries,
        );

        Self {
            shared: Arc::new(FsShared {
                client,
                zone,
                options,
                block_cache,
                stat_cache,
                matching_paths_cache,
                bucket_locations: Mutex::new(HashMap::new()),
                location_flight: SingleFlight::new(),
                stats,
            }),
        }
    }

    /// Open a handle for random-access reads.
    pub async fn open_for_read(&self, uri: &str) -> Result<GcsReader, GcsError> {
        let path: GcsPath = parse_gcs_path(uri, false)?;
        self.shared.ensure_bucket_allowed(&path.bucket).await?;
        Ok(GcsReader::new(self.shared.clone(), path))
    }

    /// Open a handle that replaces the object's content on close.
    pub async fn open_for_write(&self, uri: &str) -> Result<GcsWriter, GcsError> {
        let path: GcsPath = parse_gcs_path(uri, false)?;
        self.shared.ensure_bucket_allowed(&path.bucket).await?;
        Ok(GcsWriter::new(self.shared.clone(), path, Vec::new()))
    }

    /// Open a handle whose buffer starts with the object's current
    /// content; the object must exist.
    pub async fn open_for_append(&self, uri: &str) -> Result<GcsWriter, GcsError> {
        let path: GcsPath = parse_gcs_path(uri, false)?;
        self.shared.ensure_bucket_allowed(&path.bucket).await?;
        let content: Vec<u8> = self.read_entire_file(uri).await?;
        Ok(GcsWriter::new(self.shared.clone(), path, content))
    }

    /// The whole object as one buffer.
    pub async fn read_entire_file(&self, uri: &str) -> Result<Vec<u8>, GcsError> {
        let path: GcsPath = parse_gcs_path(uri, false)?;
        self.shared.ensure_bucket_allowed(&path.bucket).await?;
        let metadata: ObjectMetadata = self
            .shared
            .stat_metadata(&path.bucket, &path.object, uri)
            .await?;
        let mut buffer: Vec<u8> = vec![0; metadata.size as usize];
        if !buffer.is_empty() {
            let reader: GcsReader = GcsReader::new(self.shared.clone(), path);
            reader.read_at(0, &mut buffer).await?;
        }
        Ok(buffer)
    }

    /// Stat a file, directory, or bucket root.
    pub async fn stat(&self, uri: &str) -> Result<FileStatistics, GcsError> {
        let path: GcsPath = parse_gcs_path(uri, true)?;
        if path.object.is_empty() {
            return if self.shared.client.bucket_exists(&path.bucket).await? {
                Ok(FileStatistics::directory())
            } else {
                Err(GcsError::not_found(uri))
            };
        }
        self.shared.ensure_bucket_allowed(&path.bucket).await?;

        match self
            .shared
            .stat_metadata(&path.bucket, &path.object, uri)
            .await
        {
            Ok(metadata) => Ok(FileStatistics {
                size: metadata.size,
                mtime_us: metadata.updated_us,
                is_directory: path.object.ends_with('/'),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self
                    .shared
                    .folder_exists(&path.bucket, &path.object)
                    .await?
                {
                    Ok(FileStatistics::directory())
                } else {
                    Err(GcsError::not_found(uri))
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Object size; the path must name an object.
    pub async fn get_file_size(&self, uri: &str) -> Result<u64, GcsError> {
        let path: GcsPath = parse_gcs_path(uri, false)?;
        self.shared.ensure_bucket_allowed(&path.bucket).await?;
        let metadata: ObjectMetadata = self
            .shared
            .stat_metadata(&path.bucket, &path.object, uri)
            .await?;
        Ok(metadata.size)
    }

    /// Whether the path names an object, a directory, or (for bucket
    /// roots) an existing bucket.
    pub async fn file_exists(&self, uri: &str) -> Result<bool, GcsError> {
        let path: GcsPath = parse_gcs_path(uri, true)?;
        if path.object.is_empty() {
            return self.shared.client.bucket_exists(&path.bucket).await;
        }
        self.shared.ensure_bucket_allowed(&path.bucket).await?;

        match self
            .shared
            .stat_metadata(&path.bucket, &path.object, uri)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.shared.folder_exists(&path.bucket, &path.object).await
            }
            Err(e) => Err(e),
        }
    }

    /// `Ok(true)` for directories and existing bucket roots. A path
    /// resolving to a plain object fails with failed-precondition;
    /// not-found when neither exists.
    pub async fn is_directory(&self, uri: &str) -> Result<bool, GcsError> {
        let path: GcsPath = parse_gcs_path(uri, true)?;
        if path.object.is_empty() {
            return self.shared.client.bucket_exists(&path.bucket).await;
        }
        self.shared.ensure_bucket_allowed(&path.bucket).await?;

        if self
            .shared
            .folder_exists(&path.bucket, &path.object)
            .await?
        {
            return Ok(true);
        }
        match self
            .shared
            .stat_metadata(&path.bucket, &path.object, uri)
            .await
        {
            Ok(_) => Err(GcsError::failed_precondition(format!(
                "{} is not a directory",
                uri
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(GcsError::not_found(uri)),
            Err(e) => Err(e),
        }
    }

    /// Immediate children of a directory, relative names; common
    /// prefixes keep their trailing `/`. The self-directory marker is
    /// omitted.
    pub async fn get_children(&self, uri: &str) -> Result<Vec<String>, GcsError> {
        let path: GcsPath = parse_gcs_path(uri, true)?;
        self.shared.ensure_bucket_allowed(&path.bucket).await?;
        let prefix: String = Self::dir_prefix(&path.object);

        let page = self
            .shared
            .client
            .list_objects(&path.bucket, &prefix, true)
            .await?;

        let mut children: Vec<String> = Vec::new();
        for item in &page.items {
            let name: &str = item.strip_prefix(&prefix).unwrap_or(item);
            if name.is_empty() {
                continue;
            }
            children.push(name.to_string());
        }
        for common_prefix in &page.prefixes {
            let name: &str = common_prefix
                .strip_prefix(&prefix)
                .unwrap_or(common_prefix);
            children.push(name.to_string());
        }
        Ok(children)
    }

    /// Expand a glob pattern to matching URIs in lexicographic order.
    pub async fn get_matching_paths(&self, pattern: &str) -> Result<Vec<String>, GcsError> {
        if let Some(cached) = self.shared.matching_paths_cache.lookup(pattern) {
            return Ok(cached);
        }

        let root: &str = glob_match::listing_root(pattern).ok_or_else(|| {
            GcsError::invalid_argument(format!(
                "glob pattern has no concrete directory prefix: {}",
                pattern
            ))
        })?;
        let path: GcsPath = parse_gcs_path(root, true)?;
        self.shared.ensure_bucket_allowed(&path.bucket).await?;
        let prefix: String = Self::dir_prefix(&path.object);
        let compiled = glob_match::compile(pattern)?;

        let page = self
            .shared
            .client
            .list_objects(&path.bucket, &prefix, false)
            .await?;
        let mut matches: Vec<String> = page
            .items
            .iter()
            .filter(|name| !name.ends_with('/'))
            .map(|name| format!("gs://{}/{}", path.bucket, name))
            .filter(|uri| compiled.matches(uri))
            .collect();
        matches.sort();

        self.shared
            .matching_paths_cache
            .insert(pattern, matches.clone());
        Ok(matches)
    }

    /// Rename an object or a whole directory via copy-then-delete.
    pub async fn rename(&self, src: &str, dst: &str) -> Result<(), GcsError> {
        let src_path: GcsPath = parse_gcs_path(src, false)?;
        let dst_path: GcsPath = parse_gcs_path(dst, false)?;
        if src_path.bucket != dst_path.bucket {
            return Err(GcsError::invalid_argument(format!(
                "cannot rename across buckets: {} -> {}",
                src, dst
            )));
        }
        self.shared.ensure_bucket_allowed(&src_path.bucket).await?;

        match self.is_directory(src).await {
            Ok(true) => {
                let src_prefix: String = Self::dir_prefix(&src_path.object);
                let dst_prefix: String = Self::dir_prefix(&dst_path.object);
                let page = self
                    .shared
                    .client
                    .list_objects(&src_path.bucket, &src_prefix, false)
                    .await?;
                for item in &page.items {
                    // The marker `src/` itself maps onto `dst/`.
                    let suffix: &str = item.strip_prefix(&src_prefix).unwrap_or("");
                    let target: String = format!("{}{}", dst_prefix, suffix);
                    self.rename_object(&src_path.bucket, item, &target).await?;
                }
                Ok(())
            }
            // The source resolved to a plain object; rename it alone.
            Ok(false) | Err(GcsError::FailedPrecondition { .. }) => {
                self.rename_object(&src_path.bucket, &src_path.object, &dst_path.object)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn rename_object(&self, bucket: &str, src: &str, dst: &str) -> Result<(), GcsError> {
        self.shared.client.rewrite_object(bucket, src, dst).await?;
        self.shared.client.delete_object(bucket, src).await?;
        self.shared
            .invalidate_file(&format!("gs://{}/{}", bucket, src));
        self.shared
            .invalidate_file(&format!("gs://{}/{}", bucket, dst));
        Ok(())
    }

    /// Materialize an empty directory by creating its marker object.
    pub async fn create_dir(&self, uri: &str) -> Result<(), GcsError> {
        let path: GcsPath = parse_gcs_path(uri, true)?;
        if path.object.is_empty() {
            return if self.shared.client.bucket_exists(&path.bucket).await? {
                Ok(())
            } else {
                Err(GcsError::not_found(uri))
            };
        }
        self.shared.ensure_bucket_allowed(&path.bucket).await?;

        let marker: String = Self::dir_prefix(&path.object);
        let marker_uri: String = format!("gs://{}/{}", path.bucket, marker);
        match self
            .shared
            .stat_metadata(&path.bucket, &marker, &marker_uri)
            .await
        {
            Ok(_) => Err(GcsError::AlreadyExists { uri: marker_uri }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                ResumableUpload::new(&self.shared.client, &path.bucket, &marker)
                    .run(b"")
                    .await?;
                self.shared.invalidate_file(&marker_uri);
                debug!(uri = %marker_uri, "created directory marker");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Delete an object.
    pub async fn delete_file(&self, uri: &str) -> Result<(), GcsError> {
        let path: GcsPath = parse_gcs_path(uri, false)?;
        self.shared.ensure_bucket_allowed(&path.bucket).await?;
        self.shared
            .client
            .delete_object(&path.bucket, &path.object)
            .await?;
        self.shared.invalidate_file(uri);
        Ok(())
    }

    /// Delete an empty directory: nothing but the self marker may
    /// remain under it.
    pub async fn delete_dir(&self, uri: &str) -> Result<(), GcsError> {
        let path: GcsPath = parse_gcs_path(uri, false)?;
        self.shared.ensure_bucket_allowed(&path.bucket).await?;
        let prefix: String = Self::dir_prefix(&path.object);

        let page = self
            .shared
            .client
            .list_objects_bounded(&path.bucket, &prefix, true, 2)
            .await?;
        let mut children: Vec<String> = page
            .items
            .iter()
            .map(|item| item.strip_prefix(&prefix).unwrap_or(item).to_string())
            .collect();
        children.extend(page.prefixes.iter().cloned());

        if children.len() > 1 || children.iter().any(|child| !child.is_empty()) {
            return Err(GcsError::failed_precondition(format!(
                "cannot delete a non-empty directory: {}",
                uri
            )));
        }
        if children.len() == 1 {
            // The self marker is the only entry.
            let marker_uri: String = format!("gs://{}/{}", path.bucket, prefix);
            self.shared
                .client
                .delete_object(&path.bucket, &prefix)
                .await?;
            self.shared.invalidate_file(&marker_uri);
        }
        Ok(())
    }

    /// Delete everything under a directory, counting what could not be
    /// removed. Items that answer 404 count as deleted.
    pub async fn delete_recursively(&self, uri: &str) -> Result<RemovalCounts, GcsError> {
        let path: GcsPath = parse_gcs_path(uri, false)?;
        self.shared.ensure_bucket_allowed(&path.bucket).await?;
        match self.is_directory(uri).await {
            Ok(true) => {}
            // Missing, or a plain object: either way there is no
            // directory to delete.
            Ok(false) => return Err(GcsError::not_found(uri)),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::NotFound | ErrorKind::FailedPrecondition
                ) =>
            {
                return Err(GcsError::not_found(uri))
            }
            Err(e) => return Err(e),
        }

        let prefix: String = Self::dir_prefix(&path.object);
        let page = self
            .shared
            .client
            .list_objects(&path.bucket, &prefix, false)
            .await?;

        let mut counts: RemovalCounts = RemovalCounts::default();
        for item in &page.items {
            let item_uri: String = format!("gs://{}/{}", path.bucket, item);
            match self
                .shared
                .client
                .delete_object(&path.bucket, item)
                .await
            {
                Ok(()) => self.shared.invalidate_file(&item_uri),
                // Someone else already deleted it; that is the outcome
                // we wanted.
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    self.shared.invalidate_file(&item_uri)
                }
                Err(_) if item.ends_with('/') => counts.undeleted_dirs += 1,
                Err(_) => counts.undeleted_files += 1,
            }
        }
        Ok(counts)
    }

    /// Drop every cache: blocks, stats, matching paths, and bucket
    /// locations.
    pub fn flush_caches(&self) {
        if let Some(cache) = &self.shared.block_cache {
            cache.flush();
        }
        self.shared.stat_cache.clear();
        self.shared.matching_paths_cache.clear();
        self.shared.bucket_locations.lock().clear();
    }

    /// `"a/b"` or `"a/b/"` become `"a/b/"`; the empty object stays
    /// empty (bucket root).
    fn dir_prefix(object: &str) -> String {
        let trimmed: &str = object.trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        }
    }
}
