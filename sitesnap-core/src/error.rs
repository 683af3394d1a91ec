//! Error types for the snapshot pipeline.
//!
//! Two layers:
//! - [`ServiceError`] is what a [`crate::contract::SnapshotService`] or
//!   [`crate::contract::ResourceFetcher`] call fails with. A closed subset of its
//!   variants is *recoverable*: the session records it, raises the run-level
//!   failed flag and unwinds to the next checkpoint instead of aborting.
//! - [`SnapshotError`] is fatal for the run and propagates to the caller.

use std::path::PathBuf;

/// Failure of a single interaction with the remote snapshot service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("payment required: {0}")]
    PaymentRequired(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("unexpected API response {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Maps a non-success HTTP status and its body to an error kind.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 => ServiceError::Unauthorized(body),
            402 => ServiceError::PaymentRequired(body),
            409 => ServiceError::Conflict(body),
            500..=599 => ServiceError::Server { status, body },
            _ => ServiceError::Api { status, body },
        }
    }

    /// Whether this failure is absorbed at the run level (failed flag) rather
    /// than terminating the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ServiceError::Server { .. }
                | ServiceError::Unauthorized(_)
                | ServiceError::PaymentRequired(_)
                | ServiceError::Conflict(_)
                | ServiceError::Connection(_)
                | ServiceError::Timeout(_)
        )
    }
}

/// Fatal errors that terminate a snapshot run.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("baseurl must start with '/': {0:?}")]
    InvalidBaseUrl(String),

    #[error("invalid snapshots regex: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("server reported missing resource {digest} that was never submitted")]
    MissingResource { digest: String },

    #[error("snapshot service error: {0}")]
    Service(#[from] ServiceError),

    #[error("cannot {action} while session is {state}")]
    InvalidTransition { state: String, action: &'static str },

    #[error("no repo given and none could be derived")]
    MissingRepo,

    #[error("no root resources found in {}", root_dir.display())]
    NoRootResources { root_dir: PathBuf },
}

impl SnapshotError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.into(),
            source,
        }
    }
}
