//! Crate-level error types for remote calls, store preconditions, and workflows.

use serde::{Deserialize, Serialize};

/// Failure reported by a remote service adapter.
///
/// Opaque to the workflows: the `code` is whatever the backend uses to
/// classify errors (e.g. `"auth/wrong-password"`), and `message` is meant
/// for display. Auth failures are stored verbatim in the snapshot's error
/// field, which is why this type is `Clone` and serializable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteError {
    /// Backend-specific error code, if the backend provides one.
    pub code: Option<String>,
    /// Human-readable description of the failure.
    pub message: String,
}

impl RemoteError {
    /// Create an error with a message and no code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Create an error with a backend error code.
    ///
    /// # Arguments
    ///
    /// * `code` - Backend classification (e.g. `"auth/user-not-found"`).
    /// * `message` - Human-readable description.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Error produced when a remote call exceeds the configured request timeout.
    pub(crate) fn timed_out(timeout: std::time::Duration) -> Self {
        Self::with_code("timeout", format!("remote call timed out after {timeout:?}"))
    }
}

/// A store mutation or workflow required state that is not present.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    /// The operation needs a signed-in user, but the snapshot has none.
    #[error("no user is signed in")]
    NoCurrentUser,
}

/// Error returned by a workflow operation.
///
/// Each variant identifies which class of step failed. Steps already
/// committed to the remote service before the failure are not rolled back.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Writing, patching, deleting, or uploading to the remote service failed.
    #[error("remote write failed: {0}")]
    RemoteWrite(#[source] RemoteError),

    /// Reading documents or resolving a blob URL failed.
    #[error("remote read failed: {0}")]
    RemoteRead(#[source] RemoteError),

    /// The identity provider rejected the request.
    #[error("authentication failed: {0}")]
    Auth(#[source] RemoteError),

    /// The workflow could not run against the current snapshot.
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
}

impl SyncError {
    /// The underlying remote failure, if this error came from the backend.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::RemoteWrite(e) | Self::RemoteRead(e) | Self::Auth(e) => Some(e),
            Self::Precondition(_) => None,
        }
    }

    /// Returns `true` for identity provider failures.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Returns `true` when the operation was refused before reaching the backend.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}

/// Error returned by [`WorkflowsBuilder::build`](crate::WorkflowsBuilder::build).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// A required remote capability was never supplied to the builder.
    #[error("missing remote capability: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_displays_message_only() {
        let err = RemoteError::with_code("auth/wrong-password", "wrong password");
        assert_eq!(err.to_string(), "wrong password");
        assert_eq!(err.code.as_deref(), Some("auth/wrong-password"));
    }

    #[test]
    fn sync_error_wraps_remote_message() {
        let err = SyncError::RemoteWrite(RemoteError::new("disk full"));
        assert_eq!(err.to_string(), "remote write failed: disk full");
        assert_eq!(err.remote().map(|e| e.message.as_str()), Some("disk full"));
    }

    #[test]
    fn precondition_converts_and_is_transparent() {
        let err: SyncError = PreconditionError::NoCurrentUser.into();
        assert!(err.is_precondition());
        assert!(err.remote().is_none());
        assert_eq!(err.to_string(), "no user is signed in");
    }

    #[test]
    fn timed_out_carries_timeout_code() {
        let err = RemoteError::timed_out(std::time::Duration::from_millis(250));
        assert_eq!(err.code.as_deref(), Some("timeout"));
        assert!(err.message.contains("250ms"));
    }

    #[test]
    fn remote_error_serde_roundtrip() {
        let err = RemoteError::with_code("auth/user-not-found", "no such user");
        let json = serde_json::to_string(&err).expect("serialization should succeed");
        let back: RemoteError =
            serde_json::from_str(&json).expect("deserialization should succeed");
        assert_eq!(back, err);
    }

    // Errors must cross task boundaries when workflows are spawned.
    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<SyncError>();
            assert_send_sync::<RemoteError>();
            assert_send_sync::<BuildError>();
        }
    };
}
