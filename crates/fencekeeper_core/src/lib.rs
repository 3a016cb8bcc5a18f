//! # fencekeeper core
//!
//! Fenced-transaction coordination client.
//!
//! This crate provides:
//! - Session lifecycle (start, suspend, resume, close)
//! - Per-session authentication identities that never clobber each other
//! - Synchronous node CRUD with optimistic versioning
//! - Fenced transactions: atomic multi-node writes guarded by a fencing node
//! - Retry with exponential backoff for transient failures
//! - ACL and auth string parsing
//!
//! ## Architecture
//!
//! ```text
//! SessionManager --start--> Session --wraps--> CoordinationStore
//!                              |
//!                          NodeStore --create_transaction--> FencedTransaction
//! ```
//!
//! ## Key Invariants
//!
//! - A commit applies every staged operation or none of them
//! - A commit fails with `Fenced` while the fencing node exists
//! - Transactions are single-use
//! - Protocol errors are never retried; transient ones may be
//! - Closing a session fails its in-flight calls promptly
//!
//! ## Example
//!
//! ```rust
//! use fencekeeper_core::{Config, NodeStore, SessionManager};
//! use fencekeeper_store::{Acl, CreateMode, InMemoryStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let manager = SessionManager::new(store.clone());
//! let session = manager.start(&Config::new(store.connect_string()), None).unwrap();
//! let nodes = NodeStore::new(session.clone());
//!
//! let acl = Acl::open_unsafe();
//! let mut txn = nodes.create_transaction(&acl, "/fencing").unwrap();
//! txn.stage_create("/a", Some(b"x"), &acl, CreateMode::Persistent).unwrap();
//! txn.commit().unwrap();
//!
//! assert_eq!(nodes.get_string_data("/a").unwrap().as_deref(), Some("x"));
//! manager.close(&session);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod acl;
mod config;
mod error;
mod identity;
mod node_store;
mod session;
mod transaction;

pub use acl::{parse_acls, parse_auth};
pub use config::{Config, RetryConfig, SuspendedPolicy};
pub use error::{CoordError, CoordResult, OpKind};
pub use identity::{
    Identity, IdentityBinding, IdentityProvider, DEFAULT_SERVICE_NAME, LOGIN_CONTEXT_PREFIX,
};
pub use node_store::NodeStore;
pub use session::{Session, SessionManager, SessionState};
pub use transaction::{FencedTransaction, PendingOp, TransactionState};
