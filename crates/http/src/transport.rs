//! The transport capability seam.

use async_trait::async_trait;
use rusty_gcsfs_common::GcsError;

use crate::request::{HttpRequest, HttpResponse};

/// Executes HTTP requests.
///
/// Implementations return `Ok` for every response that arrived,
/// regardless of status code; classifying non-2xx statuses into the
/// error taxonomy is the caller's job (see
/// [`status_to_error`](crate::status_to_error)). Transport-level
/// failures that never produced a response (connect failure, timeout)
/// surface as [`GcsError::Unavailable`] so the retry layer re-issues
/// them.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute one request and return the response.
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, GcsError>;
}
