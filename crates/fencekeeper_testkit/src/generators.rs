//! Property-based test generators using proptest.
//!
//! Provides strategies for generating node names, paths, data and
//! operation sequences that respect the store's path rules.

use fencekeeper_store::{Acl, Id, Perms};
use proptest::prelude::*;

/// Strategy for generating valid node names.
///
/// Never yields the store's reserved system node name.
pub fn node_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_-]{1,16}")
        .expect("Invalid regex")
        .prop_filter("Node name must not be reserved", |s| s != "zookeeper")
}

/// Strategy for generating absolute paths up to `max_depth` segments deep.
pub fn node_path_strategy(max_depth: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(node_name_strategy(), 1..=max_depth.max(1))
        .prop_map(|segments| format!("/{}", segments.join("/")))
}

/// Strategy for generating node data (arbitrary bytes, possibly empty).
pub fn node_data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..1024)
}

/// Strategy for generating non-empty permission sets.
pub fn perms_strategy() -> impl Strategy<Value = Perms> {
    (1u32..32).prop_map(Perms)
}

/// Strategy for generating single-entry ACLs.
pub fn acl_strategy() -> impl Strategy<Value = Vec<Acl>> {
    prop_oneof![
        Just(Acl::open_unsafe()),
        (node_name_strategy(), perms_strategy())
            .prop_map(|(user, perms)| vec![Acl::new(perms, Id::new("digest", user))]),
    ]
}

/// One node operation against a flat namespace under the root.
#[derive(Debug, Clone)]
pub enum NodeOperation {
    /// Create a child of the root
    Create {
        /// Node name
        name: String,
        /// Initial data
        data: Option<Vec<u8>>,
    },
    /// Overwrite a child's data
    SetData {
        /// Node name
        name: String,
        /// New data
        data: Vec<u8>,
    },
    /// Delete a child
    Delete {
        /// Node name
        name: String,
    },
}

impl NodeOperation {
    /// Returns the absolute path the operation targets.
    #[must_use]
    pub fn path(&self) -> String {
        let name = match self {
            NodeOperation::Create { name, .. }
            | NodeOperation::SetData { name, .. }
            | NodeOperation::Delete { name } => name,
        };
        format!("/{name}")
    }
}

/// Strategy for operations over a small set of names, so that operations
/// collide with each other often.
pub fn node_operation_strategy() -> impl Strategy<Value = NodeOperation> {
    let name = prop::sample::select(vec!["a", "b", "c", "d", "e"]).prop_map(str::to_string);
    prop_oneof![
        3 => (name.clone(), prop::option::of(node_data_strategy()))
            .prop_map(|(name, data)| NodeOperation::Create { name, data }),
        2 => (name.clone(), node_data_strategy())
            .prop_map(|(name, data)| NodeOperation::SetData { name, data }),
        1 => name.prop_map(|name| NodeOperation::Delete { name }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<NodeOperation>> {
    prop::collection::vec(node_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fencekeeper_store::path::validate_path;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_paths_are_valid(path in node_path_strategy(4)) {
            prop_assert!(validate_path(&path).is_ok(), "{}", path);
        }

        #[test]
        fn generated_names_have_no_separator(name in node_name_strategy()) {
            prop_assert!(!name.contains('/'));
            prop_assert_ne!(name.as_str(), "zookeeper");
        }

        #[test]
        fn generated_perms_are_not_empty(perms in perms_strategy()) {
            prop_assert!(perms.0 != 0);
            prop_assert!(Perms::ALL.contains(perms));
        }
    }
}
