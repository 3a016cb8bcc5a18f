//! # fencekeeper store
//!
//! Coordination store client interface for fencekeeper.
//!
//! This crate is the lowest layer of fencekeeper: the contract the
//! coordination core needs from a hierarchical, versioned key-value store,
//! plus an in-memory emulation of such a store.
//!
//! ## Design Principles
//!
//! - The store is an external service; [`CoordinationStore`] is its client handle
//! - Nodes carry optional data, a version, and an ACL fixed at creation
//! - Multi-op requests are all-or-nothing
//! - Authentication resolves a login context name through a [`LoginRegistry`]
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and single-process use
//!
//! ## Example
//!
//! ```rust
//! use fencekeeper_store::{Acl, ConnectRequest, CoordinationStore, CreateMode, InMemoryStore};
//! use std::time::Duration;
//!
//! let store = InMemoryStore::new();
//! let session = store
//!     .connect(&ConnectRequest::new(store.connect_string(), Duration::from_secs(10)))
//!     .unwrap();
//! store.create(session, "/app", None, &Acl::open_unsafe(), CreateMode::Persistent).unwrap();
//! assert_eq!(store.get_data(session, "/app").unwrap().0, None);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod login;
mod memory;
pub mod path;
mod store;
mod types;

pub use error::{StoreError, StoreResult};
pub use login::{LoginEntry, LoginRegistry, KERBEROS_LOGIN_MODULE, KEYTAB_OPTION, PRINCIPAL_OPTION};
pub use memory::{InMemoryStore, NodeSnapshot, TreeSnapshot};
pub use store::CoordinationStore;
pub use types::{
    Acl, AuthInfo, ClientConfig, ConnectRequest, CreateMode, Id, Op, OpResult, Perms, SessionId,
    Stat, ENABLE_CLIENT_SASL_KEY, LOGIN_CONTEXT_NAME_KEY, SERVICE_NAME_KEY,
};
