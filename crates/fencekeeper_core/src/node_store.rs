//! Synchronous node operations over a [`Session`].
//!
//! [`NodeStore`] is a thin facade: every call validates its path locally,
//! runs the matching store call through the session, retries transient
//! failures per [`RetryConfig`], and surfaces protocol failures verbatim.

use crate::config::RetryConfig;
use crate::error::{CoordError, CoordResult, OpKind};
use crate::session::Session;
use crate::transaction::FencedTransaction;
use fencekeeper_store::path::{self, validate_path};
use fencekeeper_store::{Acl, CreateMode, Stat, StoreError};
use std::thread;
use tracing::debug;

/// Node CRUD against one session.
///
/// Cheap to clone; clones share the session.
#[derive(Debug, Clone)]
pub struct NodeStore {
    session: Session,
    retry: RetryConfig,
    default_acl: Vec<Acl>,
}

impl NodeStore {
    /// Creates a node store using the session's retry policy and default ACL.
    #[must_use]
    pub fn new(session: Session) -> Self {
        let retry = session.config().retry.clone();
        let default_acl = session.config().default_acl.clone();
        Self {
            session,
            retry,
            default_acl,
        }
    }

    /// Returns the session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the ACL applied when a call does not name one.
    #[must_use]
    pub fn default_acl(&self) -> &[Acl] {
        &self.default_acl
    }

    /// Returns true if the node exists.
    ///
    /// A missing node is not an error.
    pub fn exists(&self, path: &str) -> CoordResult<bool> {
        Ok(self.stat(path)?.is_some())
    }

    /// Returns the node's stat, or `None` if it does not exist.
    pub fn stat(&self, path: &str) -> CoordResult<Option<Stat>> {
        check_path(OpKind::Exists, path)?;
        debug!(path, "exists");
        self.with_retries(OpKind::Exists, path, || {
            self.session
                .call(OpKind::Exists, path, |store, sid| store.exists(sid, path))
        })
    }

    /// Creates a persistent node without data, using the default ACL.
    ///
    /// # Errors
    ///
    /// `NodeExists` if the node is present, `NoParent` if its parent is not.
    pub fn create(&self, path: &str) -> CoordResult<()> {
        self.create_with(path, None, &self.default_acl, CreateMode::Persistent)
            .map(|_| ())
    }

    /// Creates a persistent node without data, using `acl`.
    pub fn create_with_acl(&self, path: &str, acl: &[Acl]) -> CoordResult<()> {
        self.create_with(path, None, acl, CreateMode::Persistent)
            .map(|_| ())
    }

    /// Creates a node and returns its actual path.
    ///
    /// The returned path differs from `path` for sequential modes.
    pub fn create_with(
        &self,
        path: &str,
        data: Option<&[u8]>,
        acl: &[Acl],
        mode: CreateMode,
    ) -> CoordResult<String> {
        check_path(OpKind::Create, path)?;
        debug!(path, ?mode, "create");
        self.with_retries(OpKind::Create, path, || {
            self.session.call(OpKind::Create, path, |store, sid| {
                store.create(sid, path, data, acl, mode)
            })
        })
    }

    /// Creates `path` and every missing ancestor as persistent nodes.
    ///
    /// Nodes that already exist, or appear concurrently, are left alone.
    pub fn create_root_dir_recursively(&self, path: &str, acl: &[Acl]) -> CoordResult<()> {
        check_path(OpKind::Create, path)?;
        for dir in path::ancestors(path).into_iter().chain(std::iter::once(path)) {
            if dir == path::ROOT || self.exists(dir)? {
                continue;
            }
            match self.create_with(dir, None, acl, CreateMode::Persistent) {
                Ok(_) | Err(CoordError::NodeExists { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Returns the node's data; `None` if the node carries none.
    ///
    /// # Errors
    ///
    /// `NoNode` if the node does not exist.
    pub fn get_data(&self, path: &str) -> CoordResult<Option<Vec<u8>>> {
        Ok(self.get_data_with_stat(path)?.0)
    }

    /// Returns the node's data together with its stat.
    pub fn get_data_with_stat(&self, path: &str) -> CoordResult<(Option<Vec<u8>>, Stat)> {
        check_path(OpKind::GetData, path)?;
        debug!(path, "get_data");
        self.with_retries(OpKind::GetData, path, || {
            self.session
                .call(OpKind::GetData, path, |store, sid| store.get_data(sid, path))
        })
    }

    /// Returns the node's data decoded as UTF-8.
    ///
    /// Invalid sequences are replaced rather than rejected.
    pub fn get_string_data(&self, path: &str) -> CoordResult<Option<String>> {
        Ok(self.get_string_data_with_stat(path)?.0)
    }

    /// Returns the node's data decoded as UTF-8 together with its stat.
    pub fn get_string_data_with_stat(&self, path: &str) -> CoordResult<(Option<String>, Stat)> {
        let (data, stat) = self.get_data_with_stat(path)?;
        let text = data.map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        Ok((text, stat))
    }

    /// Replaces the node's data.
    ///
    /// `version` of `-1` overwrites unconditionally; otherwise it must match
    /// the node's current version.
    ///
    /// # Errors
    ///
    /// `NoNode` if the node does not exist, `BadVersion` on a version mismatch.
    pub fn set_data(&self, path: &str, data: &[u8], version: i32) -> CoordResult<Stat> {
        check_path(OpKind::SetData, path)?;
        debug!(path, version, len = data.len(), "set_data");
        self.with_retries(OpKind::SetData, path, || {
            self.session.call(OpKind::SetData, path, |store, sid| {
                store.set_data(sid, path, Some(data), version)
            })
        })
    }

    /// Replaces the node's data with a UTF-8 string.
    pub fn set_string_data(&self, path: &str, data: &str, version: i32) -> CoordResult<Stat> {
        self.set_data(path, data.as_bytes(), version)
    }

    /// Lists the node's children.
    ///
    /// The list is materialized at call time; its order is unspecified.
    pub fn get_children(&self, path: &str) -> CoordResult<Vec<String>> {
        check_path(OpKind::GetChildren, path)?;
        debug!(path, "get_children");
        self.with_retries(OpKind::GetChildren, path, || {
            self.session.call(OpKind::GetChildren, path, |store, sid| {
                store.get_children(sid, path)
            })
        })
    }

    /// Deletes the node regardless of its version.
    pub fn delete(&self, path: &str) -> CoordResult<()> {
        self.delete_with_version(path, -1)
    }

    /// Deletes the node if its version matches.
    ///
    /// # Errors
    ///
    /// `NoNode` if absent, `BadVersion` on a mismatch, `NotEmpty` if the
    /// node has children.
    pub fn delete_with_version(&self, path: &str, version: i32) -> CoordResult<()> {
        check_path(OpKind::Delete, path)?;
        debug!(path, version, "delete");
        self.with_retries(OpKind::Delete, path, || {
            self.session
                .call(OpKind::Delete, path, |store, sid| store.delete(sid, path, version))
        })
    }

    /// Returns the node's ACL.
    pub fn get_acl(&self, path: &str) -> CoordResult<Vec<Acl>> {
        check_path(OpKind::GetAcl, path)?;
        debug!(path, "get_acl");
        let (acl, _) = self.with_retries(OpKind::GetAcl, path, || {
            self.session
                .call(OpKind::GetAcl, path, |store, sid| store.get_acl(sid, path))
        })?;
        Ok(acl)
    }

    /// Starts a transaction guarded by `fencing_path`.
    ///
    /// The fencing node is created with `fence_acl` for the duration of the
    /// commit. An empty `fencing_path` yields an unfenced transaction, which
    /// is only allowed when the configuration does not require fencing.
    ///
    /// # Errors
    ///
    /// `InvalidState` for a missing but required fencing path, `InvalidPath`
    /// for a malformed one.
    pub fn create_transaction(
        &self,
        fence_acl: &[Acl],
        fencing_path: &str,
    ) -> CoordResult<FencedTransaction<'_>> {
        if fencing_path.is_empty() {
            if self.session.config().require_fencing {
                return Err(CoordError::invalid_state(
                    OpKind::Commit,
                    "a fencing path is required",
                ));
            }
        } else {
            check_path(OpKind::Commit, fencing_path)?;
        }
        Ok(FencedTransaction::new(self, fence_acl.to_vec(), fencing_path))
    }

    /// Creates a node under fencing, unless it already exists.
    ///
    /// Returns true if the node was created.
    pub fn safe_create(
        &self,
        path: &str,
        data: Option<&[u8]>,
        acl: &[Acl],
        mode: CreateMode,
        fence_acl: &[Acl],
        fencing_path: &str,
    ) -> CoordResult<bool> {
        if self.exists(path)? {
            return Ok(false);
        }
        let mut txn = self.create_transaction(fence_acl, fencing_path)?;
        txn.stage_create(path, data, acl, mode)?;
        txn.commit()?;
        Ok(true)
    }

    /// Deletes a node under fencing, if it exists.
    ///
    /// Returns true if the node was deleted.
    pub fn safe_delete(
        &self,
        path: &str,
        fence_acl: &[Acl],
        fencing_path: &str,
    ) -> CoordResult<bool> {
        if !self.exists(path)? {
            return Ok(false);
        }
        let mut txn = self.create_transaction(fence_acl, fencing_path)?;
        txn.stage_delete(path, -1)?;
        txn.commit()?;
        Ok(true)
    }

    /// Replaces a node's data under fencing.
    pub fn safe_set_data(
        &self,
        path: &str,
        data: &[u8],
        version: i32,
        fence_acl: &[Acl],
        fencing_path: &str,
    ) -> CoordResult<()> {
        let mut txn = self.create_transaction(fence_acl, fencing_path)?;
        txn.stage_set_data(path, data, version)?;
        txn.commit()?;
        Ok(())
    }

    fn with_retries<T>(
        &self,
        op: OpKind,
        path: &str,
        mut f: impl FnMut() -> CoordResult<T>,
    ) -> CoordResult<T> {
        let mut attempt = 0u32;
        loop {
            match f() {
                Err(err) if err.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    attempt += 1;
                    let delay = self.retry.delay_for_attempt(attempt);
                    debug!(%op, path, attempt, ?delay, error = %err, "retrying");
                    thread::sleep(delay);
                }
                other => return other,
            }
        }
    }
}

pub(crate) fn check_path(op: OpKind, path: &str) -> CoordResult<()> {
    validate_path(path).map_err(|err| match err {
        StoreError::InvalidPath { path, reason } => CoordError::InvalidPath { op, path, reason },
        other => CoordError::from_store(op, path, other),
    })
}
