//! Production transport backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use rusty_gcsfs_common::GcsError;
use tracing::debug;

use crate::request::{HttpRequest, HttpResponse, Method};
use crate::transport::HttpTransport;

/// [`HttpTransport`] implementation over a shared `reqwest::Client`.
///
/// The connect timeout is a client-level setting in reqwest, so it is
/// fixed at construction; per-request operation timeouts are applied
/// from each [`HttpRequest`].
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the given connect timeout.
    ///
    /// # Errors
    /// `GcsError::Internal` if the underlying client cannot be built.
    pub fn new(connect_timeout: Duration) -> Result<Self, GcsError> {
        let client: reqwest::Client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| GcsError::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, GcsError> {
        let mut builder = match request.method() {
            Method::Get => self.client.get(request.uri()),
            Method::Post => self.client.post(request.uri()),
            Method::Put => self.client.put(request.uri()),
            Method::Delete => self.client.delete(request.uri()),
        };

        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.to_vec());
        }
        builder = builder.timeout(request.timeout_config().operation);

        debug!(uri = request.uri(), method = ?request.method(), "sending request");

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GcsError::unavailable(format!("request to {} timed out: {}", request.uri(), e))
            } else {
                GcsError::unavailable(format!("request to {} failed: {}", request.uri(), e))
            }
        })?;

        let status: u16 = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| {
            GcsError::unavailable(format!(
                "reading response body from {} failed: {}",
                request.uri(),
                e
            ))
        })?;

        Ok(HttpResponse::new(status, headers, body))
    }
}
