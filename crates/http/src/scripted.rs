//! Scripted transport for tests.
//!
//! Holds an ordered script of expected requests. Each `send` pops the
//! next entry, asserts the outbound request's canonical summary matches
//! it exactly, and replies with the canned response. This is how every
//! wire-level test in the workspace pins the request sequence: URL,
//! method, headers, body, and timeouts all participate in the match.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rusty_gcsfs_common::GcsError;

use crate::request::{HttpRequest, HttpResponse};
use crate::transport::HttpTransport;

enum Reply {
    Response(HttpResponse),
    TransportError(String),
}

/// One expected request and its canned reply.
pub struct ScriptedCall {
    expected: String,
    reply: Reply,
}

impl ScriptedCall {
    /// Expect `summary` (see [`HttpRequest::summary`]) and reply with
    /// the given status and body.
    pub fn new(expected: impl Into<String>, status: u16, body: impl AsRef<[u8]>) -> Self {
        Self {
            expected: expected.into(),
            reply: Reply::Response(HttpResponse::new(
                status,
                Vec::new(),
                Bytes::copy_from_slice(body.as_ref()),
            )),
        }
    }

    /// Add a header to the canned response.
    pub fn respond_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Reply::Response(response) = &mut self.reply {
            response.headers.push((name.into(), value.into()));
        }
        self
    }

    /// Expect `summary` and fail at the transport level (no response),
    /// surfacing as `GcsError::Unavailable`.
    pub fn transport_failure(expected: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            reply: Reply::TransportError(message.into()),
        }
    }
}

/// [`HttpTransport`] that serves from a script and asserts each call.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedCall>>,
}

impl ScriptedTransport {
    pub fn new(calls: Vec<ScriptedCall>) -> Self {
        Self {
            script: Mutex::new(calls.into_iter().collect()),
        }
    }

    /// Number of scripted calls not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    /// Panic unless every scripted call was consumed.
    pub fn assert_drained(&self) {
        let remaining: usize = self.remaining();
        assert_eq!(remaining, 0, "{} scripted request(s) never issued", remaining);
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, GcsError> {
        let call: ScriptedCall = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected request:\n{}", request.summary()));

        assert_eq!(request.summary(), call.expected, "request mismatch");

        match call.reply {
            Reply::Response(response) => Ok(response),
            Reply::TransportError(message) => Err(GcsError::unavailable(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_match_and_reply() {
        let transport = ScriptedTransport::new(vec![ScriptedCall::new(
            "GET https://example/a\nTimeouts: 32 64 3600\n",
            200,
            "hello",
        )
        .respond_header("Location", "https://session/uri")]);

        let response: HttpResponse = transport
            .send(&HttpRequest::get("https://example/a"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"hello");
        assert_eq!(response.header("Location"), Some("https://session/uri"));
        transport.assert_drained();
    }

    #[tokio::test]
    async fn test_transport_failure_reply() {
        let transport = ScriptedTransport::new(vec![ScriptedCall::transport_failure(
            "GET https://example/a\nTimeouts: 32 64 3600\n",
            "connection reset",
        )]);

        let err = transport
            .send(&HttpRequest::get("https://example/a"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    #[should_panic(expected = "request mismatch")]
    async fn test_mismatch_panics() {
        let transport = ScriptedTransport::new(vec![ScriptedCall::new(
            "GET https://example/expected\nTimeouts: 32 64 3600\n",
            200,
            "",
        )]);
        let _ = transport
            .send(&HttpRequest::get("https://example/actual"))
            .await;
    }
}
