//! Error types for the coordination core.

use fencekeeper_store::StoreError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for coordination operations.
pub type CoordResult<T> = Result<T, CoordError>;

/// The operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Session establishment.
    Connect,
    /// Existence check.
    Exists,
    /// Node creation.
    Create,
    /// Data read.
    GetData,
    /// Data write.
    SetData,
    /// Node deletion.
    Delete,
    /// Child listing.
    GetChildren,
    /// ACL read.
    GetAcl,
    /// Version assertion inside a transaction.
    Check,
    /// Transaction commit.
    Commit,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Connect => "connect",
            OpKind::Exists => "exists",
            OpKind::Create => "create",
            OpKind::GetData => "get_data",
            OpKind::SetData => "set_data",
            OpKind::Delete => "delete",
            OpKind::GetChildren => "get_children",
            OpKind::GetAcl => "get_acl",
            OpKind::Check => "check",
            OpKind::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in coordination operations.
///
/// Every variant names the operation and, where one applies, the path.
#[derive(Debug, Error)]
pub enum CoordError {
    /// A session could not be established.
    #[error("cannot connect to {connect_string}: {reason}")]
    Connect {
        /// The connect string that was tried.
        connect_string: String,
        /// Last failure observed.
        reason: String,
    },

    /// The store rejected the session's credentials.
    #[error("authentication to {connect_string} failed: {reason}")]
    AuthFailed {
        /// The connect string that was tried.
        connect_string: String,
        /// Failure reported by the store.
        reason: String,
    },

    /// The connection dropped mid-operation; the same call may be retried.
    #[error("{op} {path}: retryable failure: {reason}")]
    Retryable {
        /// Operation that failed.
        op: OpKind,
        /// Target path.
        path: String,
        /// Underlying condition.
        reason: String,
    },

    /// The session stayed suspended for longer than the configured wait.
    #[error("{op} {path}: session unavailable after {waited:?}")]
    Unavailable {
        /// Operation that was refused.
        op: OpKind,
        /// Target path.
        path: String,
        /// How long the call waited for reconnection.
        waited: Duration,
    },

    /// The session was closed before or during the operation.
    #[error("{op} {path}: session closed")]
    SessionClosed {
        /// Operation that was refused.
        op: OpKind,
        /// Target path.
        path: String,
    },

    /// The node does not exist.
    #[error("{op} {path}: no node")]
    NoNode {
        /// Operation that failed.
        op: OpKind,
        /// Missing node.
        path: String,
    },

    /// The node already exists.
    #[error("{op} {path}: node exists")]
    NodeExists {
        /// Operation that failed.
        op: OpKind,
        /// Existing node.
        path: String,
    },

    /// An ancestor of the node does not exist.
    #[error("{op} {path}: parent does not exist")]
    NoParent {
        /// Operation that failed.
        op: OpKind,
        /// Node whose parent is missing.
        path: String,
    },

    /// The node still has children.
    #[error("{op} {path}: node has children")]
    NotEmpty {
        /// Operation that failed.
        op: OpKind,
        /// Non-empty node.
        path: String,
    },

    /// The node's version did not match the expected version.
    #[error("{op} {path}: bad version, expected {expected}")]
    BadVersion {
        /// Operation that failed.
        op: OpKind,
        /// Checked node.
        path: String,
        /// Version the caller expected.
        expected: i32,
    },

    /// The path is malformed.
    #[error("{op} {path:?}: invalid path: {reason}")]
    InvalidPath {
        /// Operation that was refused.
        op: OpKind,
        /// Rejected path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The fencing node exists: another owner claimed exclusivity.
    #[error("commit fenced: {fencing_path} exists")]
    Fenced {
        /// The fencing node.
        fencing_path: String,
    },

    /// Programmer error, such as reusing a committed transaction.
    #[error("{op}: invalid state: {message}")]
    InvalidState {
        /// Operation that was refused.
        op: OpKind,
        /// What was wrong.
        message: String,
    },

    /// An ACL or auth string could not be parsed.
    #[error("invalid ACL {entry:?}: {reason}")]
    InvalidAcl {
        /// The offending entry.
        entry: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Any other store failure.
    #[error("{op} {path}: {source}")]
    Store {
        /// Operation that failed.
        op: OpKind,
        /// Target path.
        path: String,
        /// The store error.
        source: StoreError,
    },
}

impl CoordError {
    /// Maps a store error raised by `op` on `path`.
    pub fn from_store(op: OpKind, path: &str, err: StoreError) -> Self {
        match err {
            StoreError::ConnectionLoss
            | StoreError::OperationTimeout
            | StoreError::SessionExpired
            | StoreError::Unreachable { .. } => Self::Retryable {
                op,
                path: path.to_string(),
                reason: err.to_string(),
            },
            StoreError::Closed => Self::SessionClosed {
                op,
                path: path.to_string(),
            },
            StoreError::NoNode { path } => Self::NoNode { op, path },
            StoreError::NodeExists { path } => Self::NodeExists { op, path },
            StoreError::NoParent { path } => Self::NoParent { op, path },
            StoreError::NotEmpty { path } => Self::NotEmpty { op, path },
            StoreError::BadVersion { path, expected, .. } => Self::BadVersion { op, path, expected },
            StoreError::InvalidPath { path, reason } => Self::InvalidPath { op, path, reason },
            StoreError::MultiFailed { cause, .. } => Self::from_store(op, path, *cause),
            other => Self::Store {
                op,
                path: path.to_string(),
                source: other,
            },
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(op: OpKind, message: impl Into<String>) -> Self {
        Self::InvalidState {
            op,
            message: message.into(),
        }
    }

    /// Creates an invalid ACL error.
    pub fn invalid_acl(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAcl {
            entry: entry.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the same call may be retried as-is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoordError::Retryable { .. })
    }

    /// Returns true if a commit lost its exclusive right to write.
    #[must_use]
    pub fn is_fenced(&self) -> bool {
        matches!(self, CoordError::Fenced { .. })
    }

    /// Returns true for programmer errors, including use of a closed session.
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            CoordError::InvalidState { .. } | CoordError::SessionClosed { .. }
        )
    }

    /// Returns the operation the error belongs to.
    #[must_use]
    pub fn op(&self) -> OpKind {
        match self {
            CoordError::Connect { .. } | CoordError::AuthFailed { .. } => OpKind::Connect,
            CoordError::Fenced { .. } => OpKind::Commit,
            CoordError::InvalidAcl { .. } => OpKind::Create,
            CoordError::Retryable { op, .. }
            | CoordError::Unavailable { op, .. }
            | CoordError::SessionClosed { op, .. }
            | CoordError::NoNode { op, .. }
            | CoordError::NodeExists { op, .. }
            | CoordError::NoParent { op, .. }
            | CoordError::NotEmpty { op, .. }
            | CoordError::BadVersion { op, .. }
            | CoordError::InvalidPath { op, .. }
            | CoordError::InvalidState { op, .. }
            | CoordError::Store { op, .. } => *op,
        }
    }

    /// Returns the path the error refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            CoordError::Fenced { fencing_path } => Some(fencing_path),
            CoordError::Retryable { path, .. }
            | CoordError::Unavailable { path, .. }
            | CoordError::SessionClosed { path, .. }
            | CoordError::NoNode { path, .. }
            | CoordError::NodeExists { path, .. }
            | CoordError::NoParent { path, .. }
            | CoordError::NotEmpty { path, .. }
            | CoordError::BadVersion { path, .. }
            | CoordError::InvalidPath { path, .. }
            | CoordError::Store { path, .. } => Some(path),
            CoordError::Connect { .. }
            | CoordError::AuthFailed { .. }
            | CoordError::InvalidState { .. }
            | CoordError::InvalidAcl { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_store_errors_are_retryable() {
        for err in [
            StoreError::ConnectionLoss,
            StoreError::OperationTimeout,
            StoreError::SessionExpired,
        ] {
            let mapped = CoordError::from_store(OpKind::GetData, "/a", err);
            assert!(mapped.is_retryable());
            assert_eq!(mapped.path(), Some("/a"));
            assert_eq!(mapped.op(), OpKind::GetData);
        }
    }

    #[test]
    fn protocol_errors_are_not_retryable() {
        let err = CoordError::from_store(
            OpKind::Create,
            "/a",
            StoreError::NodeExists { path: "/a".into() },
        );
        assert!(matches!(err, CoordError::NodeExists { op: OpKind::Create, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn bad_version_keeps_expected() {
        let err = CoordError::from_store(
            OpKind::SetData,
            "/a",
            StoreError::BadVersion {
                path: "/a".into(),
                expected: 2,
                actual: 5,
            },
        );
        assert!(matches!(err, CoordError::BadVersion { expected: 2, .. }));
    }

    #[test]
    fn multi_failure_unwraps_cause() {
        let err = CoordError::from_store(
            OpKind::Commit,
            "/fencing",
            StoreError::MultiFailed {
                index: 2,
                cause: Box::new(StoreError::NoNode { path: "/x".into() }),
            },
        );
        assert!(matches!(err, CoordError::NoNode { ref path, .. } if path == "/x"));
    }

    #[test]
    fn closed_store_session_is_invalid_state() {
        let err = CoordError::from_store(OpKind::Exists, "/a", StoreError::Closed);
        assert!(matches!(err, CoordError::SessionClosed { .. }));
        assert!(err.is_invalid_state());
    }

    #[test]
    fn error_display() {
        let err = CoordError::Fenced {
            fencing_path: "/fencing".into(),
        };
        assert_eq!(err.to_string(), "commit fenced: /fencing exists");
        assert!(err.is_fenced());
        assert_eq!(err.op(), OpKind::Commit);

        let err = CoordError::NoNode {
            op: OpKind::Delete,
            path: "/gone".into(),
        };
        assert_eq!(err.to_string(), "delete /gone: no node");
    }
}
