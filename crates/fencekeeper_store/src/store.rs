//! Coordination store trait definition.

use crate::error::StoreResult;
use crate::types::{Acl, ConnectRequest, CreateMode, Op, OpResult, SessionId, Stat};

/// A client handle to a hierarchical, versioned coordination store.
///
/// This is the contract the coordination core needs from the external
/// store. Implementations translate each call into the store's wire
/// protocol; the core never interprets anything beyond these results.
///
/// # Invariants
///
/// - Every node call is scoped to a store session returned by `connect`
/// - `multi` is atomic: either every op applies or none does
/// - A `version` of `-1` skips the optimistic version check
/// - Connection-level failures surface as transient [`crate::StoreError`]s
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - single-process emulation for tests
pub trait CoordinationStore: Send + Sync {
    /// Opens a session, authenticating as configured in the request.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` or `ConnectionLoss` if no server answers and
    /// `AuthFailed` if the login context cannot be resolved.
    fn connect(&self, request: &ConnectRequest) -> StoreResult<SessionId>;

    /// Closes a session, dropping its ephemeral nodes.
    ///
    /// Closing an unknown or already closed session is not an error.
    fn close_session(&self, session: SessionId) -> StoreResult<()>;

    /// Checks the session is alive and the connection is up.
    fn ping(&self, session: SessionId) -> StoreResult<()>;

    /// Returns the node's metadata, or `None` if it does not exist.
    fn exists(&self, session: SessionId, path: &str) -> StoreResult<Option<Stat>>;

    /// Creates a node and returns its actual path.
    ///
    /// Sequential modes append a suffix, so the returned path may differ
    /// from `path`.
    fn create(
        &self,
        session: SessionId,
        path: &str,
        data: Option<&[u8]>,
        acl: &[Acl],
        mode: CreateMode,
    ) -> StoreResult<String>;

    /// Reads a node's data and metadata.
    fn get_data(&self, session: SessionId, path: &str) -> StoreResult<(Option<Vec<u8>>, Stat)>;

    /// Replaces a node's data if `version` matches.
    fn set_data(
        &self,
        session: SessionId,
        path: &str,
        data: Option<&[u8]>,
        version: i32,
    ) -> StoreResult<Stat>;

    /// Deletes a node if `version` matches and it has no children.
    fn delete(&self, session: SessionId, path: &str, version: i32) -> StoreResult<()>;

    /// Lists a node's children names.
    fn get_children(&self, session: SessionId, path: &str) -> StoreResult<Vec<String>>;

    /// Reads a node's ACL.
    fn get_acl(&self, session: SessionId, path: &str) -> StoreResult<(Vec<Acl>, Stat)>;

    /// Applies `ops` atomically.
    ///
    /// # Errors
    ///
    /// Returns `MultiFailed` naming the first failing op when any
    /// precondition fails; in that case nothing is applied.
    fn multi(&self, session: SessionId, ops: &[Op]) -> StoreResult<Vec<OpResult>>;
}
