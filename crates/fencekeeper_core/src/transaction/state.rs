//! Transaction state.

use crate::error::{CoordError, CoordResult, OpKind};
use fencekeeper_store::{Acl, CreateMode, Op};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is accepting operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Commit was attempted and failed; nothing was applied.
    Aborted,
}

/// A mutation staged in a transaction, not yet sent to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    /// Create a node.
    Create {
        /// Node path.
        path: String,
        /// Initial data.
        data: Option<Vec<u8>>,
        /// ACL attached to the node.
        acl: Vec<Acl>,
        /// Creation mode.
        mode: CreateMode,
    },
    /// Replace a node's data.
    SetData {
        /// Node path.
        path: String,
        /// New data.
        data: Vec<u8>,
        /// Expected version, `-1` for any.
        version: i32,
    },
    /// Delete a node.
    Delete {
        /// Node path.
        path: String,
        /// Expected version, `-1` for any.
        version: i32,
    },
    /// Assert a node's version without changing it.
    Check {
        /// Node path.
        path: String,
        /// Expected version, `-1` for any.
        version: i32,
    },
}

impl PendingOp {
    /// Returns the path the operation targets.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            PendingOp::Create { path, .. }
            | PendingOp::SetData { path, .. }
            | PendingOp::Delete { path, .. }
            | PendingOp::Check { path, .. } => path,
        }
    }

    /// Returns the kind of node operation.
    #[must_use]
    pub fn kind(&self) -> OpKind {
        match self {
            PendingOp::Create { .. } => OpKind::Create,
            PendingOp::SetData { .. } => OpKind::SetData,
            PendingOp::Delete { .. } => OpKind::Delete,
            PendingOp::Check { .. } => OpKind::Check,
        }
    }

    pub(crate) fn to_op(&self) -> Op {
        match self {
            PendingOp::Create {
                path,
                data,
                acl,
                mode,
            } => Op::Create {
                path: path.clone(),
                data: data.clone(),
                acl: acl.clone(),
                mode: *mode,
            },
            PendingOp::SetData {
                path,
                data,
                version,
            } => Op::SetData {
                path: path.clone(),
                data: Some(data.clone()),
                version: *version,
            },
            PendingOp::Delete { path, version } => Op::Delete {
                path: path.clone(),
                version: *version,
            },
            PendingOp::Check { path, version } => Op::Check {
                path: path.clone(),
                version: *version,
            },
        }
    }
}

/// Staged operations plus the state that gates them.
#[derive(Debug)]
pub(crate) struct StagedOps {
    state: TransactionState,
    ops: Vec<PendingOp>,
}

impl StagedOps {
    pub(crate) fn new() -> Self {
        Self {
            state: TransactionState::Active,
            ops: Vec::new(),
        }
    }

    pub(crate) fn state(&self) -> TransactionState {
        self.state
    }

    pub(crate) fn ops(&self) -> &[PendingOp] {
        &self.ops
    }

    /// Appends an operation, preserving staging order.
    pub(crate) fn push(&mut self, op: PendingOp) -> CoordResult<()> {
        self.ensure_active(op.kind())?;
        self.ops.push(op);
        Ok(())
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = TransactionState::Committed;
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.state = TransactionState::Aborted;
    }

    pub(crate) fn ensure_active(&self, op: OpKind) -> CoordResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => Err(CoordError::invalid_state(
                op,
                "transaction already committed",
            )),
            TransactionState::Aborted => {
                Err(CoordError::invalid_state(op, "transaction already aborted"))
            }
        }
    }
}
