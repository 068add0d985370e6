//! Request and response value types.

use std::time::Duration;

use bytes::Bytes;

/// HTTP method of an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Per-request timeouts.
///
/// `connect` bounds connection establishment, `idle` bounds the gap
/// between received bytes, and `operation` bounds the whole call. The
/// operation value differs by request class (metadata, read, write).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub idle: Duration,
    pub operation: Duration,
}

impl Timeouts {
    pub fn new(connect: Duration, idle: Duration, operation: Duration) -> Self {
        Self {
            connect,
            idle,
            operation,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(32),
            idle: Duration::from_secs(64),
            operation: Duration::from_secs(3600),
        }
    }
}

/// An outbound HTTP request, built by the storage client and executed
/// by an [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    timeouts: Timeouts,
}

impl HttpRequest {
    /// Start a GET request.
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::Get, uri)
    }

    /// Start a POST request with an empty body.
    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::Post, uri)
    }

    /// Start a PUT request with an empty body.
    pub fn put(uri: impl Into<String>) -> Self {
        Self::new(Method::Put, uri)
    }

    /// Start a DELETE request.
    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new(Method::Delete, uri)
    }

    fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: None,
            timeouts: Timeouts::default(),
        }
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Request the byte range `[begin, end]`, inclusive on both ends as
    /// the HTTP `Range` header requires.
    pub fn range(self, begin: u64, end: u64) -> Self {
        self.header("Range", format!("bytes={}-{}", begin, end))
    }

    /// Attach a request body (PUT uploads, POST payloads).
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Set all three timeouts.
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn timeout_config(&self) -> Timeouts {
        self.timeouts
    }

    /// Canonical one-request-per-block text form.
    ///
    /// The scripted transport compares this against the expected script
    /// line-for-line, so every field that matters on the wire shows up
    /// here: method, URI, headers in insertion order, timeouts in
    /// seconds, and the body when present (UTF-8 lossy).
    pub fn summary(&self) -> String {
        let mut out: String = format!("{} {}\n", self.method.as_str(), self.uri);
        for (name, value) in &self.headers {
            out.push_str(&format!("Header {}: {}\n", name, value));
        }
        out.push_str(&format!(
            "Timeouts: {} {} {}\n",
            self.timeouts.connect.as_secs(),
            self.timeouts.idle.as_secs(),
            self.timeouts.operation.as_secs()
        ));
        if let Some(body) = &self.body {
            out.push_str(&format!("Body: {}\n", String::from_utf8_lossy(body)));
        }
        out
    }
}

/// A received HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// First header with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
