//! Fenced transactions.
//!
//! A fenced transaction buffers node mutations locally and commits them as
//! one atomic multi-op request guarded by a fencing node:
//!
//! - **Atomicity**: every staged operation applies, or none does
//! - **Fencing**: the commit fails with `Fenced` if the fencing node exists
//! - **Single use**: a transaction commits at most once

mod fenced;
mod state;

pub use fenced::FencedTransaction;
pub use state::{PendingOp, TransactionState};
