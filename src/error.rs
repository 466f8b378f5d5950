//! # Error types
//!
//! Two error families cross module boundaries inside the crate:
//!
//! - [`EmbedError`]: a single embedding attempt against a provider failed.
//!   The [`Embedder`](crate::embedder::Embedder) consumes these, retries the
//!   transient ones, and degrades to an empty vector instead of surfacing them.
//! - [`SnapshotError`]: a JSON snapshot could not be written. The store logs
//!   and swallows these so the in-memory state stays authoritative.

use thiserror::Error;

/// Failure of one embedding call.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The request never produced an HTTP response (DNS, connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with a non-success status.
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider answered 2xx but carried no vector.
    #[error("provider returned no embedding")]
    EmptyResponse,

    /// The vector does not match the dimensionality already established by the store.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The request itself is unusable (e.g. empty input, no models configured).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Every model already failed for this exact text earlier in the session.
    #[error("embedding previously failed for this text")]
    PreviouslyFailed,

    /// The retry policy's overall deadline ran out before any model succeeded.
    #[error("embedding deadline of {0:?} exceeded")]
    DeadlineExceeded(std::time::Duration),
}

impl EmbedError {
    /// Whether retrying the *same* model may succeed.
    ///
    /// Transport errors, `429` and `5xx` are transient. Everything else moves
    /// straight to the next fallback model.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::Transport(_) => true,
            EmbedError::Status { status, .. } => *status == 429 || *status >= 500,
            EmbedError::EmptyResponse
            | EmbedError::DimensionMismatch { .. }
            | EmbedError::InvalidRequest(_)
            | EmbedError::PreviouslyFailed
            | EmbedError::DeadlineExceeded(_) => false,
        }
    }
}

impl From<reqwest::Error> for EmbedError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => EmbedError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => EmbedError::Transport(err.to_string()),
        }
    }
}

/// Failure writing a snapshot file.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not move snapshot into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EmbedError::Transport("reset".into()).is_transient());
        assert!(
            EmbedError::Status {
                status: 429,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            EmbedError::Status {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !EmbedError::Status {
                status: 400,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !EmbedError::DimensionMismatch {
                expected: 3,
                actual: 4
            }
            .is_transient()
        );
        assert!(!EmbedError::EmptyResponse.is_transient());
        assert!(!EmbedError::DeadlineExceeded(std::time::Duration::ZERO).is_transient());
    }
}
