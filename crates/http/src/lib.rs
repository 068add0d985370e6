//! HTTP plumbing for rusty-gcsfs.
//!
//! The storage layer talks to Cloud Storage through the [`HttpTransport`]
//! capability trait. Production uses [`ReqwestTransport`]; tests use
//! [`ScriptedTransport`], which asserts every outbound request and
//! replies from a script.
//!
//! Status-code classification and the bounded retry policy live here so
//! that every caller shares one mapping from wire failures to the
//! [`GcsError`](rusty_gcsfs_common::GcsError) taxonomy.

mod classify;
mod request;
mod reqwest_transport;
mod retry;
mod scripted;
mod transport;

pub use classify::status_to_error;
pub use request::{HttpRequest, HttpResponse, Method, Timeouts};
pub use reqwest_transport::ReqwestTransport;
pub use retry::{call_with_retries, RetryConfig};
pub use scripted::{ScriptedCall, ScriptedTransport};
pub use transport::HttpTransport;
