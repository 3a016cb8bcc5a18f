//! # fencekeeper testkit
//!
//! Test utilities for fencekeeper.
//!
//! This crate provides:
//! - A disposable in-memory cluster with session helpers
//! - Property-based test generators using proptest
//! - Test log initialisation
//! - Concurrent multi-client fencing stress runs
//!
//! ## Usage
//!
//! ```rust
//! use fencekeeper_testkit::prelude::*;
//!
//! with_node_store(|nodes| {
//!     nodes.create("/node1").unwrap();
//!     assert!(nodes.exists("/node1").unwrap());
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use stress::*;
