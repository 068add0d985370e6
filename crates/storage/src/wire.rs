//! Serde types for the subset of the Cloud Storage JSON API in use.
//!
//! Numeric fields arrive as JSON strings (`"size": "1010"`), matching
//! the service's int64 encoding.

use chrono::DateTime;
use rusty_gcsfs_common::GcsError;
use serde::Deserialize;

/// Object resource, restricted to the fields the client requests.
#[derive(Debug, Deserialize)]
pub(crate) struct ObjectResource {
    pub name: Option<String>,
    pub size: Option<String>,
    pub generation: Option<String>,
    pub updated: Option<String>,
}

/// Response of an objects list call.
#[derive(Debug, Deserialize)]
pub(crate) struct ListResponse {
    pub items: Option<Vec<ObjectResource>>,
    pub prefixes: Option<Vec<String>>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// Bucket resource, restricted to the location field.
#[derive(Debug, Deserialize)]
pub(crate) struct BucketResource {
    pub location: Option<String>,
}

/// Response of a rewrite call.
#[derive(Debug, Deserialize)]
pub(crate) struct RewriteResponse {
    #[serde(default)]
    pub done: bool,
}

/// Error envelope the service wraps failures in.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    pub message: Option<String>,
}

/// Extract the server-side message from an error body, if any.
pub(crate) fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error)
        .and_then(|d| d.message)
}

/// Parse an int64-as-string field.
pub(crate) fn parse_i64_field(value: Option<&str>, field: &str, uri: &str) -> Result<i64, GcsError> {
    let raw: &str = value.ok_or_else(|| {
        GcsError::internal(format!("'{}' missing in metadata response for {}", field, uri))
    })?;
    raw.parse::<i64>().map_err(|_| {
        GcsError::internal(format!(
            "'{}' is not a number in metadata response for {}: {}",
            field, uri, raw
        ))
    })
}

/// Parse an RFC 3339 timestamp into epoch microseconds.
pub(crate) fn parse_updated_field(value: Option<&str>, uri: &str) -> Result<i64, GcsError> {
    let raw: &str = value.ok_or_else(|| {
        GcsError::internal(format!("'updated' missing in metadata response for {}", uri))
    })?;
    let parsed = DateTime::parse_from_rfc3339(raw).map_err(|e| {
        GcsError::internal(format!(
            "'updated' is not RFC 3339 in metadata response for {}: {} ({})",
            uri, raw, e
        ))
    })?;
    Ok(parsed.timestamp_micros())
}
