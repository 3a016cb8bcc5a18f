//! The fenced transaction itself.

use super::state::{PendingOp, StagedOps, TransactionState};
use crate::error::{CoordError, CoordResult, OpKind};
use crate::node_store::{check_path, NodeStore};
use fencekeeper_store::{Acl, CreateMode, Op, OpResult, StoreError};
use tracing::{debug, warn};

/// A batch of node mutations committed atomically under a fencing check.
///
/// Operations are buffered by the `stage_*` methods and sent to the store
/// only by [`commit`](Self::commit), as one multi-op request of the shape
/// `[create(fencing), staged..., delete(fencing)]`. If the fencing node
/// already exists the create fails, the whole request is rejected, and the
/// commit reports [`CoordError::Fenced`].
///
/// A transaction is single-use: after `commit` returns, successfully or not,
/// every further call fails with `InvalidState`.
#[derive(Debug)]
pub struct FencedTransaction<'a> {
    nodes: &'a NodeStore,
    fence_acl: Vec<Acl>,
    fencing_path: String,
    staged: StagedOps,
}

impl<'a> FencedTransaction<'a> {
    pub(crate) fn new(nodes: &'a NodeStore, fence_acl: Vec<Acl>, fencing_path: &str) -> Self {
        Self {
            nodes,
            fence_acl,
            fencing_path: fencing_path.to_string(),
            staged: StagedOps::new(),
        }
    }

    /// Returns the fencing node path; empty for an unfenced transaction.
    #[must_use]
    pub fn fencing_path(&self) -> &str {
        &self.fencing_path
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.staged.state()
    }

    /// Returns true until the transaction is committed or aborted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Returns the number of staged operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.staged.ops().len()
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.staged.ops().is_empty()
    }

    /// Returns the staged operations in staging order.
    #[must_use]
    pub fn pending_ops(&self) -> &[PendingOp] {
        self.staged.ops()
    }

    /// Stages a node creation.
    pub fn stage_create(
        &mut self,
        path: &str,
        data: Option<&[u8]>,
        acl: &[Acl],
        mode: CreateMode,
    ) -> CoordResult<&mut Self> {
        self.stage(PendingOp::Create {
            path: path.to_string(),
            data: data.map(<[u8]>::to_vec),
            acl: acl.to_vec(),
            mode,
        })
    }

    /// Stages a data replacement; `-1` skips the version check.
    pub fn stage_set_data(&mut self, path: &str, data: &[u8], version: i32) -> CoordResult<&mut Self> {
        self.stage(PendingOp::SetData {
            path: path.to_string(),
            data: data.to_vec(),
            version,
        })
    }

    /// Stages a deletion; `-1` skips the version check.
    pub fn stage_delete(&mut self, path: &str, version: i32) -> CoordResult<&mut Self> {
        self.stage(PendingOp::Delete {
            path: path.to_string(),
            version,
        })
    }

    /// Stages a version assertion that changes nothing.
    pub fn stage_check(&mut self, path: &str, version: i32) -> CoordResult<&mut Self> {
        self.stage(PendingOp::Check {
            path: path.to_string(),
            version,
        })
    }

    fn stage(&mut self, op: PendingOp) -> CoordResult<&mut Self> {
        self.staged.ensure_active(op.kind())?;
        check_path(op.kind(), op.path())?;
        self.staged.push(op)?;
        Ok(self)
    }

    /// Commits every staged operation atomically.
    ///
    /// Returns the results of the staged operations, in staging order.
    /// Commit is never retried internally.
    ///
    /// # Errors
    ///
    /// - `Fenced` if the fencing node exists; ownership must be re-acquired
    ///   before trying again
    /// - The failing operation's own error (`BadVersion`, `NoNode`, ...)
    ///   if one of its preconditions does not hold
    /// - `InvalidState` if the transaction was already committed
    ///
    /// - `Retryable` or `SessionClosed` if the connection failed while the
    ///   request was in flight
    ///
    /// Nothing was applied when the store rejected the request. After a
    /// connection-level failure the outcome is unknown: the request may
    /// have been applied before the connection dropped.
    pub fn commit(&mut self) -> CoordResult<Vec<OpResult>> {
        self.staged.ensure_active(OpKind::Commit)?;

        let fenced = !self.fencing_path.is_empty();
        let mut ops = Vec::with_capacity(self.len() + 2);
        if fenced {
            ops.push(Op::Create {
                path: self.fencing_path.clone(),
                data: Some(Vec::new()),
                acl: self.fence_acl.clone(),
                mode: CreateMode::Persistent,
            });
        }
        ops.extend(self.staged.ops().iter().map(PendingOp::to_op));
        if fenced {
            ops.push(Op::Delete {
                path: self.fencing_path.clone(),
                version: -1,
            });
        }

        debug!(fencing_path = %self.fencing_path, staged = self.len(), "commit");
        let outcome = self
            .nodes
            .session()
            .call_raw(OpKind::Commit, &self.fencing_path, |store, sid| {
                store.multi(sid, &ops)
            });

        match outcome {
            Ok(Ok(mut results)) => {
                self.staged.mark_committed();
                if fenced {
                    results.pop();
                    results.remove(0);
                }
                Ok(results)
            }
            Ok(Err(err)) => {
                self.staged.mark_aborted();
                Err(self.map_failure(fenced, err))
            }
            Err(err) => {
                self.staged.mark_aborted();
                Err(err)
            }
        }
    }

    fn map_failure(&self, fenced: bool, err: StoreError) -> CoordError {
        let (index, cause) = match err {
            StoreError::MultiFailed { index, cause } => (index, cause),
            other => return CoordError::from_store(OpKind::Commit, &self.fencing_path, other),
        };
        let staged_index = if fenced { index.checked_sub(1) } else { Some(index) };
        match staged_index.and_then(|i| self.staged.ops().get(i)) {
            Some(op) => {
                debug!(index, path = op.path(), cause = %cause, "commit rejected");
                CoordError::from_store(op.kind(), op.path(), *cause)
            }
            None if index == 0 && matches!(*cause, StoreError::NodeExists { .. }) => {
                warn!(fencing_path = %self.fencing_path, "commit fenced");
                CoordError::Fenced {
                    fencing_path: self.fencing_path.clone(),
                }
            }
            None => CoordError::from_store(OpKind::Commit, &self.fencing_path, *cause),
        }
    }
}
