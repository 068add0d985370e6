//! Credential seam.
//!
//! Token acquisition (service accounts, metadata server, refresh flows)
//! is an external collaborator; the client only needs something that
//! yields a bearer token per call.

use async_trait::async_trait;
use rusty_gcsfs_common::GcsError;

/// Supplies the OAuth2 bearer token attached to every request.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current access token. Invoked once per HTTP call.
    async fn token(&self) -> Result<String, GcsError>;
}

/// Fixed-token provider, for tests and pre-authorized environments.
pub struct StaticAuthProvider {
    token: String,
}

impl StaticAuthProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn token(&self) -> Result<String, GcsError> {
        Ok(self.token.clone())
    }
}
