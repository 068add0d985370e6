//! Parsing of `gs://bucket/object` URIs.

use crate::error::GcsError;
use crate::GCS_SCHEME;

/// A parsed `gs://` URI.
///
/// The object key is an opaque UTF-8 string that may contain `/`. A
/// trailing slash is preserved: it marks directory semantics at the
/// filesystem layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsPath {
    /// Bucket name, never empty.
    pub bucket: String,
    /// Object key, possibly empty for bucket-root references.
    pub object: String,
}

impl GcsPath {
    /// Re-assemble the full `gs://` URI.
    pub fn to_uri(&self) -> String {
        if self.object.is_empty() {
            format!("{}://{}", GCS_SCHEME, self.bucket)
        } else {
            format!("{}://{}/{}", GCS_SCHEME, self.bucket, self.object)
        }
    }
}

/// Split a URI into `(bucket, object)`.
///
/// # Arguments
/// * `uri` - Full URI, e.g. `gs://bucket/path/to/object`
/// * `empty_object_ok` - Whether a bucket-root reference is acceptable
///
/// # Errors
/// `GcsError::InvalidArgument` when the scheme is not `gs://`, the
/// bucket is empty, or the object is empty while required.
pub fn parse_gcs_path(uri: &str, empty_object_ok: bool) -> Result<GcsPath, GcsError> {
    let prefix: String = format!("{}://", GCS_SCHEME);
    let rest: &str = uri.strip_prefix(&prefix).ok_or_else(|| {
        GcsError::invalid_argument(format!("GCS path does not start with '{}': {}", prefix, uri))
    })?;

    let (bucket, object) = match rest.split_once('/') {
        Some((bucket, object)) => (bucket, object),
        None => (rest, ""),
    };

    if bucket.is_empty() {
        return Err(GcsError::invalid_argument(format!(
            "GCS path does not contain a bucket name: {}",
            uri
        )));
    }
    if object.is_empty() && !empty_object_ok {
        return Err(GcsError::invalid_argument(format!(
            "GCS path does not contain an object name: {}",
            uri
        )));
    }

    Ok(GcsPath {
        bucket: bucket.to_string(),
        object: object.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_object_path() {
        let path: GcsPath = parse_gcs_path("gs://bucket/path/to/file.txt", false).unwrap();
        assert_eq!(path.bucket, "bucket");
        assert_eq!(path.object, "path/to/file.txt");
        assert_eq!(path.to_uri(), "gs://bucket/path/to/file.txt");
    }

    #[test]
    fn test_trailing_slash_preserved() {
        let path: GcsPath = parse_gcs_path("gs://bucket/folder/", false).unwrap();
        assert_eq!(path.object, "folder/");
    }

    #[test]
    fn test_bucket_root() {
        let path: GcsPath = parse_gcs_path("gs://bucket", true).unwrap();
        assert_eq!(path.bucket, "bucket");
        assert_eq!(path.object, "");
        assert_eq!(path.to_uri(), "gs://bucket");

        // Trailing slash on the bucket itself is also a root reference.
        let path: GcsPath = parse_gcs_path("gs://bucket/", true).unwrap();
        assert_eq!(path.object, "");
    }

    #[test]
    fn test_missing_scheme_rejected() {
        let err = parse_gcs_path("s3://bucket/object", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = parse_gcs_path("bucket/object", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let err = parse_gcs_path("gs:///object", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_empty_object_rejected_when_required() {
        let err = parse_gcs_path("gs://bucket", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
