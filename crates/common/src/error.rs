//! Error taxonomy shared across the workspace.
//!
//! Every public operation returns `Result<_, GcsError>`. Transient
//! failures (`Unavailable`) are retried internally by the HTTP layer;
//! everything else surfaces to the caller unchanged apart from message
//! enrichment naming the target URI.

use thiserror::Error;

/// Errors produced by filesystem, storage, and transport operations.
///
/// `Clone` lets a coalesced fetch share one failure with every waiter.
#[derive(Debug, Clone, Error)]
pub enum GcsError {
    /// Malformed URI, bucket-only path where an object is required, or
    /// a glob with no concrete prefix.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected input.
        message: String,
    },

    /// Object, folder, or bucket absent.
    #[error("not found: {uri}")]
    NotFound {
        /// The URI that does not exist.
        uri: String,
    },

    /// `create_dir` on an existing directory marker.
    #[error("already exists: {uri}")]
    AlreadyExists {
        /// The URI that already exists.
        uri: String,
    },

    /// Location mismatch, non-empty `delete_dir`, or a directory probe
    /// hitting a plain object.
    #[error("failed precondition: {message}")]
    FailedPrecondition {
        /// Description of the violated precondition.
        message: String,
    },

    /// Read beginning at or past end-of-file.
    #[error("out of range: {message}")]
    OutOfRange {
        /// Description of the out-of-range access.
        message: String,
    },

    /// Transient HTTP failure (429/5xx, timeout, or a persistent 410
    /// on an upload session). Retryable.
    #[error("unavailable: {message}")]
    Unavailable {
        /// The underlying transient condition.
        message: String,
    },

    /// Retry budget exhausted.
    #[error("{message}")]
    Aborted {
        /// Names the attempt count and the last cause.
        message: String,
    },

    /// Server behavior the core does not handle (multi-RPC rewrite).
    #[error("unimplemented: {message}")]
    Unimplemented {
        /// Description of the unhandled response.
        message: String,
    },

    /// Cache-vs-store inconsistency (stated size disagrees with the
    /// observed bytes).
    #[error("internal error: {message}")]
    Internal {
        /// Description of the inconsistency.
        message: String,
    },

    /// HTTP 401/403.
    #[error("permission denied: {uri}")]
    PermissionDenied {
        /// The URI access was denied to.
        uri: String,
    },
}

/// Discriminant of [`GcsError`], for assertions and dispatch that only
/// care about the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    OutOfRange,
    Unavailable,
    Aborted,
    Unimplemented,
    Internal,
    PermissionDenied,
}

impl GcsError {
    /// Shorthand constructor for [`GcsError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Shorthand constructor for [`GcsError::NotFound`].
    pub fn not_found(uri: impl Into<String>) -> Self {
        Self::NotFound { uri: uri.into() }
    }

    /// Shorthand constructor for [`GcsError::FailedPrecondition`].
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::FailedPrecondition {
            message: message.into(),
        }
    }

    /// Shorthand constructor for [`GcsError::OutOfRange`].
    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::OutOfRange {
            message: message.into(),
        }
    }

    /// Shorthand constructor for [`GcsError::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Shorthand constructor for [`GcsError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GcsError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            GcsError::NotFound { .. } => ErrorKind::NotFound,
            GcsError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            GcsError::FailedPrecondition { .. } => ErrorKind::FailedPrecondition,
            GcsError::OutOfRange { .. } => ErrorKind::OutOfRange,
            GcsError::Unavailable { .. } => ErrorKind::Unavailable,
            GcsError::Aborted { .. } => ErrorKind::Aborted,
            GcsError::Unimplemented { .. } => ErrorKind::Unimplemented,
            GcsError::Internal { .. } => ErrorKind::Internal,
            GcsError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
        }
    }

    /// Whether the retry layer may re-issue the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GcsError::Unavailable { .. })
    }
}
