//! Status-code classification into the shared error taxonomy.

use rusty_gcsfs_common::GcsError;

/// Map a response status to an error, or `None` for success.
///
/// 308 is deliberately not mapped here: during resumable uploads it is
/// the "resume incomplete" signal and carries a `Range` header the
/// upload state machine consumes directly.
///
/// # Arguments
/// * `status` - HTTP status code of the response
/// * `uri` - Target URI, named in the produced error
/// * `detail` - Optional server-provided message (parsed error body)
pub fn status_to_error(status: u16, uri: &str, detail: Option<&str>) -> Option<GcsError> {
    let describe = |what: &str| -> String {
        match detail {
            Some(detail) => format!("{} for {}: {}", what, uri, detail),
            None => format!("{} for {}", what, uri),
        }
    };

    match status {
        200..=299 => None,
        308 => None,
        401 | 403 => Some(GcsError::PermissionDenied {
            uri: uri.to_string(),
        }),
        404 | 410 => Some(GcsError::not_found(uri)),
        416 => Some(GcsError::out_of_range(describe("requested range not satisfiable"))),
        429 => Some(GcsError::unavailable(describe("HTTP 429"))),
        400..=499 => Some(GcsError::failed_precondition(describe(&format!(
            "HTTP {}",
            status
        )))),
        500..=599 => Some(GcsError::unavailable(describe(&format!("HTTP {}", status)))),
        other => Some(GcsError::internal(describe(&format!(
            "unexpected HTTP status {}",
            other
        )))),
    }
}
