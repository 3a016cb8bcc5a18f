//! Error types for coordination store calls.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a coordination store client handle.
///
/// Connection-level conditions ([`StoreError::ConnectionLoss`],
/// [`StoreError::OperationTimeout`], [`StoreError::SessionExpired`]) are
/// transient from the caller's point of view; everything else is a
/// protocol-level precondition failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The connection to the store was lost mid-call.
    #[error("connection loss")]
    ConnectionLoss,

    /// The call did not complete within the session timeout.
    #[error("operation timed out")]
    OperationTimeout,

    /// The store session expired and must be re-established.
    #[error("session expired")]
    SessionExpired,

    /// No server in the connect string could be reached.
    #[error("store unreachable: {connect_string}")]
    Unreachable {
        /// The connect string that was tried.
        connect_string: String,
    },

    /// Authentication was rejected or could not be set up.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The node does not exist.
    #[error("no node: {path}")]
    NoNode {
        /// The missing node.
        path: String,
    },

    /// The node already exists.
    #[error("node exists: {path}")]
    NodeExists {
        /// The existing node.
        path: String,
    },

    /// The parent of the node does not exist.
    #[error("parent missing for {path}")]
    NoParent {
        /// The node whose parent is missing.
        path: String,
    },

    /// The node still has children.
    #[error("node not empty: {path}")]
    NotEmpty {
        /// The non-empty node.
        path: String,
    },

    /// The expected version did not match the node's version.
    #[error("bad version for {path}: expected {expected}, actual {actual}")]
    BadVersion {
        /// The node that was checked.
        path: String,
        /// Version supplied by the caller.
        expected: i32,
        /// Version held by the store.
        actual: i32,
    },

    /// Ephemeral nodes cannot have children.
    #[error("ephemeral node cannot have children: {path}")]
    NoChildrenForEphemerals {
        /// The ephemeral parent.
        path: String,
    },

    /// The path is malformed.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The rejected path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// One operation of a multi-op request failed; nothing was applied.
    #[error("multi-op failed at index {index}: {cause}")]
    MultiFailed {
        /// Index of the first failing operation.
        index: usize,
        /// The failure of that operation.
        cause: Box<StoreError>,
    },

    /// The store session is closed.
    #[error("session is closed")]
    Closed,
}

impl StoreError {
    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for connection-level conditions that heal on their own.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionLoss | StoreError::OperationTimeout | StoreError::SessionExpired
        )
    }
}
