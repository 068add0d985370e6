//! Typed operations over the Cloud Storage JSON API.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rusty_gcsfs_common::{ErrorKind, GcsError};
use rusty_gcsfs_http::{
    call_with_retries, status_to_error, HttpRequest, HttpResponse, HttpTransport, RetryConfig,
    Timeouts,
};
use tracing::debug;

use crate::auth::AuthProvider;
use crate::wire;

/// Metadata endpoint base.
pub(crate) const GCS_METADATA_BASE: &str = "https://www.googleapis.com/storage/v1";

/// Resumable upload endpoint base.
pub(crate) const GCS_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/storage/v1";

/// Media download endpoint base.
pub(crate) const GCS_MEDIA_BASE: &str = "https://storage.googleapis.com";

/// Everything except unreserved characters is escaped, so `/` in object
/// keys becomes `%2F`.
const OBJECT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode an object key for use in a URL path or query value.
pub fn encode_object_name(name: &str) -> String {
    utf8_percent_encode(name, OBJECT_ENCODE_SET).to_string()
}

/// Per-class operation timeouts, in addition to the shared connect and
/// idle bounds.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    pub connect: Duration,
    pub idle: Duration,
    pub metadata: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(32),
            idle: Duration::from_secs(64),
            metadata: Duration::from_secs(32),
            read: Duration::from_secs(300),
            write: Duration::from_secs(3600),
        }
    }
}

impl TimeoutConfig {
    /// Timeouts for metadata calls (stat, list, delete, rewrite).
    pub fn metadata_timeouts(&self) -> Timeouts {
        Timeouts::new(self.connect, self.idle, self.metadata)
    }

    /// Timeouts for object media downloads.
    pub fn read_timeouts(&self) -> Timeouts {
        Timeouts::new(self.connect, self.idle, self.read)
    }

    /// Timeouts for upload body PUTs.
    pub fn write_timeouts(&self) -> Timeouts {
        Timeouts::new(self.connect, self.idle, self.write)
    }
}

/// Identifies one version of an object's content.
///
/// The block cache keys cached bytes by this, so any observed change of
/// size, generation, or update time makes prior blocks unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileSignature {
    pub size: u64,
    pub generation: i64,
    pub updated_us: i64,
}

/// Parsed object metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Object size in bytes.
    pub size: u64,
    /// Object generation, bumped on every successful write.
    pub generation: i64,
    /// Last update time in microseconds since Unix epoch.
    pub updated_us: i64,
}

impl ObjectMetadata {
    /// The content signature of this version.
    pub fn signature(&self) -> FileSignature {
        FileSignature {
            size: self.size,
            generation: self.generation,
            updated_us: self.updated_us,
        }
    }
}

/// Accumulated result of a (paginated) listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Full object names (not stripped of the listing prefix).
    pub items: Vec<String>,
    /// Common prefixes, each ending in `/`.
    pub prefixes: Vec<String>,
}

/// The `gs://` form of an object, for error messages.
pub(crate) fn gs_uri(bucket: &str, object: &str) -> String {
    if object.is_empty() {
        format!("gs://{}", bucket)
    } else {
        format!("gs://{}/{}", bucket, object)
    }
}

/// Client for the JSON API subset the filesystem needs.
///
/// Every call attaches the bearer token from the [`AuthProvider`], the
/// per-class timeouts, and the optional additional header; transient
/// failures are retried within the configured budget.
pub struct GcsClient {
    transport: Arc<dyn HttpTransport>,
    auth: Arc<dyn AuthProvider>,
    timeouts: TimeoutConfig,
    retry: RetryConfig,
    additional_header: Option<(String, String)>,
}

impl GcsClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        auth: Arc<dyn AuthProvider>,
        timeouts: TimeoutConfig,
        retry: RetryConfig,
        additional_header: Option<(String, String)>,
    ) -> Self {
        Self {
            transport,
            auth,
            timeouts,
            retry,
            additional_header,
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn timeout_config(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// Attach the auth token and the optional additional header.
    pub(crate) async fn authorized(&self, request: HttpRequest) -> Result<HttpRequest, GcsError> {
        let token: String = self.auth.token().await?;
        let mut request = request.header("Authorization", format!("Bearer {}", token));
        if let Some((name, value)) = &self.additional_header {
            request = request.header(name.clone(), value.clone());
        }
        Ok(request)
    }

    pub(crate) async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, GcsError> {
        self.transport.send(request).await
    }

    /// Fail unless the response is success (or 308).
    pub(crate) fn check(&self, response: &HttpResponse, uri: &str) -> Result<(), GcsError> {
        match status_to_error(
            response.status,
            uri,
            wire::error_message(&response.body).as_deref(),
        ) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Object metadata via `fields=size,generation,updated`.
    pub async fn stat_object(
        &self,
        bucket: &str,
        object: &str,
    ) -> Result<ObjectMetadata, GcsError> {
        let uri: String = gs_uri(bucket, object);
        let url: String = format!(
            "{}/b/{}/o/{}?fields=size%2Cgeneration%2Cupdated",
            GCS_METADATA_BASE,
            bucket,
            encode_object_name(object)
        );

        call_with_retries(&self.retry, || async {
            let request = self
                .authorized(HttpRequest::get(&url))
                .await?
                .timeouts(self.timeouts.metadata_timeouts());
            let response: HttpResponse = self.send(&request).await?;
            self.check(&response, &uri)?;

            let resource: wire::ObjectResource =
                serde_json::from_slice(&response.body).map_err(|e| {
                    GcsError::internal(format!("malformed metadata response for {}: {}", uri, e))
                })?;
            let size: i64 = wire::parse_i64_field(resource.size.as_deref(), "size", &uri)?;
            let generation: i64 =
                wire::parse_i64_field(resource.generation.as_deref(), "generation", &uri)?;
            let updated_us: i64 = wire::parse_updated_field(resource.updated.as_deref(), &uri)?;

            Ok(ObjectMetadata {
                size: size as u64,
                generation,
                updated_us,
            })
        })
        .await
    }

    /// Whether the bucket exists and is visible to the caller.
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool, GcsError> {
        match self.bucket_request(bucket).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The bucket's canonical location, lowercased.
    pub async fn bucket_location(&self, bucket: &str) -> Result<String, GcsError> {
        let body: Bytes = self.bucket_request(bucket).await?;
        let resource: wire::BucketResource = serde_json::from_slice(&body).map_err(|e| {
            GcsError::internal(format!(
                "malformed bucket metadata response for gs://{}: {}",
                bucket, e
            ))
        })?;
        let location: String = resource.location.ok_or_else(|| {
            GcsError::internal(format!(
                "'location' missing in bucket metadata for gs://{}",
                bucket
            ))
        })?;
        Ok(location.to_lowercase())
    }

    async fn bucket_request(&self, bucket: &str) -> Result<Bytes, GcsError> {
        let uri: String = format!("gs://{}", bucket);
        let url: String = format!("{}/b/{}", GCS_METADATA_BASE, bucket);

        call_with_retries(&self.retry, || async {
            let request = self
                .authorized(HttpRequest::get(&url))
                .await?
                .timeouts(self.timeouts.metadata_timeouts());
            let response: HttpResponse = self.send(&request).await?;
            self.check(&response, &uri)?;
            Ok(response.body)
        })
        .await
    }

    /// List all objects under `prefix`, following pagination to the end.
    ///
    /// With `delimiter`, keys past the next `/` collapse into
    /// `prefixes`; without it, the listing is fully recursive.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: bool,
    ) -> Result<ListPage, GcsError> {
        let mut out: ListPage = ListPage::default();
        let mut page_token: Option<String> = None;

        loop {
            let page: wire::ListResponse = self
                .list_page(bucket, prefix, delimiter, None, page_token.as_deref())
                .await?;
            if let Some(items) = page.items {
                out.items
                    .extend(items.into_iter().filter_map(|item| item.name));
            }
            if let Some(prefixes) = page.prefixes {
                out.prefixes.extend(prefixes);
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(out)
    }

    /// First page of a listing, capped at `max_results` entries.
    pub async fn list_objects_bounded(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: bool,
        max_results: u64,
    ) -> Result<ListPage, GcsError> {
        let page: wire::ListResponse = self
            .list_page(bucket, prefix, delimiter, Some(max_results), None)
            .await?;
        Ok(ListPage {
            items: page
                .items
                .unwrap_or_default()
                .into_iter()
                .filter_map(|item| item.name)
                .collect(),
            prefixes: page.prefixes.unwrap_or_default(),
        })
    }

    /// Whether anything (object or common prefix) exists under `prefix`.
    pub async fn prefix_nonempty(&self, bucket: &str, prefix: &str) -> Result<bool, GcsError> {
        let page: wire::ListResponse = self.list_page(bucket, prefix, true, Some(1), None).await?;
        let has_item: bool = page.items.map(|i| !i.is_empty()).unwrap_or(false);
        let has_prefix: bool = page.prefixes.map(|p| !p.is_empty()).unwrap_or(false);
        Ok(has_item || has_prefix)
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: bool,
        max_results: Option<u64>,
        page_token: Option<&str>,
    ) -> Result<wire::ListResponse, GcsError> {
        let uri: String = gs_uri(bucket, prefix);
        let mut url: String = format!(
            "{}/b/{}/o?fields=items%2Fname%2Cprefixes%2CnextPageToken",
            GCS_METADATA_BASE, bucket
        );
        if delimiter {
            url.push_str("&delimiter=%2F");
        }
        if let Some(max_results) = max_results {
            url.push_str(&format!("&maxResults={}", max_results));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", encode_object_name(token)));
        }
        if !prefix.is_empty() {
            url.push_str(&format!("&prefix={}", encode_object_name(prefix)));
        }

        call_with_retries(&self.retry, || async {
            let request = self
                .authorized(HttpRequest::get(&url))
                .await?
                .timeouts(self.timeouts.metadata_timeouts());
            let response: HttpResponse = self.send(&request).await?;
            self.check(&response, &uri)?;
            serde_json::from_slice(&response.body).map_err(|e| {
                GcsError::internal(format!("malformed list response for {}: {}", uri, e))
            })
        })
        .await
    }

    /// Download the byte range `[offset, offset + n)` of an object.
    ///
    /// A range that begins at or past end-of-file yields empty bytes;
    /// a range that extends past end-of-file yields the available tail.
    pub async fn read_range(
        &self,
        bucket: &str,
        object: &str,
        offset: u64,
        n: u64,
    ) -> Result<Bytes, GcsError> {
        if n == 0 {
            return Ok(Bytes::new());
        }
        let uri: String = gs_uri(bucket, object);
        let url: String = format!(
            "{}/{}/{}",
            GCS_MEDIA_BASE,
            bucket,
            encode_object_name(object)
        );

        call_with_retries(&self.retry, || async {
            let request = self
                .authorized(HttpRequest::get(&url))
                .await?
                .range(offset, offset + n - 1)
                .timeouts(self.timeouts.read_timeouts());
            let response: HttpResponse = self.send(&request).await?;
            match self.check(&response, &uri) {
                Ok(()) => Ok(response.body),
                // The store answers 416 for ranges starting past the end.
                Err(e) if e.kind() == ErrorKind::OutOfRange => Ok(Bytes::new()),
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Server-side copy via the rewrite API; only the single-RPC case
    /// is supported.
    pub async fn rewrite_object(
        &self,
        bucket: &str,
        src: &str,
        dst: &str,
    ) -> Result<(), GcsError> {
        let src_uri: String = gs_uri(bucket, src);
        let dst_uri: String = gs_uri(bucket, dst);
        let url: String = format!(
            "{}/b/{}/o/{}/rewriteTo/b/{}/o/{}",
            GCS_METADATA_BASE,
            bucket,
            encode_object_name(src),
            bucket,
            encode_object_name(dst)
        );

        call_with_retries(&self.retry, || async {
            let request = self
                .authorized(HttpRequest::post(&url))
                .await?
                .timeouts(self.timeouts.metadata_timeouts());
            let response: HttpResponse = self.send(&request).await?;
            self.check(&response, &src_uri)?;

            let rewrite: wire::RewriteResponse =
                serde_json::from_slice(&response.body).map_err(|e| {
                    GcsError::internal(format!(
                        "malformed rewrite response for {}: {}",
                        src_uri, e
                    ))
                })?;
            if !rewrite.done {
                return Err(GcsError::Unimplemented {
                    message: format!(
                        "multi-RPC rewrite from {} to {} is not supported",
                        src_uri, dst_uri
                    ),
                });
            }
            debug!(src = %src_uri, dst = %dst_uri, "rewrite complete");
            Ok(())
        })
        .await
    }

    /// Delete an object.
    ///
    /// A 404 on a retry is success: the deletion is idempotent and is
    /// assumed to have taken effect on the earlier attempt.
    pub async fn delete_object(&self, bucket: &str, object: &str) -> Result<(), GcsError> {
        let uri: String = gs_uri(bucket, object);
        let url: String = format!(
            "{}/b/{}/o/{}",
            GCS_METADATA_BASE,
            bucket,
            encode_object_name(object)
        );
        let attempts = AtomicU32::new(0);

        call_with_retries(&self.retry, || async {
            let attempt: u32 = attempts.fetch_add(1, Ordering::Relaxed);
            let request = self
                .authorized(HttpRequest::delete(&url))
                .await?
                .timeouts(self.timeouts.metadata_timeouts());
            let response: HttpResponse = self.send(&request).await?;
            match self.check(&response, &uri) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound && attempt > 0 => {
                    debug!(uri = %uri, "object already gone after retried delete");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        })
        .await
    }
}
