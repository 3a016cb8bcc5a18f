//! Test fixtures and cluster helpers.
//!
//! [`TestCluster`] stands in for an embedded store server: an
//! [`InMemoryStore`] with its own login registry, and a [`SessionManager`]
//! wired to both, configured with short timeouts so failure paths finish
//! quickly.

use fencekeeper_core::{
    Config, Identity, IdentityProvider, NodeStore, RetryConfig, Session, SessionManager,
    SuspendedPolicy,
};
use fencekeeper_store::{InMemoryStore, LoginRegistry};
use std::sync::Arc;
use std::time::Duration;

/// An in-memory store plus a session manager bound to it.
pub struct TestCluster {
    store: Arc<InMemoryStore>,
    manager: SessionManager,
    config: Config,
}

impl TestCluster {
    /// Creates a cluster with a private login registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(LoginRegistry::new()))
    }

    /// Creates a cluster resolving logins through `registry`.
    pub fn with_registry(registry: Arc<LoginRegistry>) -> Self {
        let store = Arc::new(InMemoryStore::with_login_registry(Arc::clone(&registry)));
        let manager =
            SessionManager::with_identity_provider(store.clone(), IdentityProvider::new(registry));
        let config = test_config(store.connect_string());
        Self {
            store,
            manager,
            config,
        }
    }

    /// Replaces the session configuration used by this cluster.
    pub fn configure(mut self, f: impl FnOnce(Config) -> Config) -> Self {
        self.config = f(self.config);
        self
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Returns the session manager.
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Returns the login registry shared by the store and the manager.
    pub fn registry(&self) -> &Arc<LoginRegistry> {
        self.manager.identity_provider().registry()
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the connect string of the store.
    pub fn connect_string(&self) -> &str {
        self.store.connect_string()
    }

    /// Starts an unauthenticated session.
    pub fn start_session(&self) -> Session {
        self.manager
            .start(&self.config, None)
            .expect("Failed to start session")
    }

    /// Starts a session authenticated as `identity`.
    pub fn start_session_as(&self, identity: &Identity) -> Session {
        self.manager
            .start(&self.config, Some(identity))
            .expect("Failed to start authenticated session")
    }

    /// Starts a session and wraps it in a node store.
    pub fn node_store(&self) -> NodeStore {
        NodeStore::new(self.start_session())
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Session configuration with timeouts suited to tests.
pub fn test_config(connect_string: &str) -> Config {
    Config::new(connect_string)
        .with_session_timeout(Duration::from_secs(2))
        .with_connection_timeout(Duration::from_secs(2))
        .with_heartbeat_interval(Duration::from_millis(20))
        .with_suspended_policy(SuspendedPolicy::Block(Duration::from_secs(2)))
        .with_retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(5))
                .with_max_delay(Duration::from_millis(50)),
        )
}

/// Runs a test against a node store on a fresh cluster.
///
/// # Example
///
/// ```rust
/// use fencekeeper_testkit::with_node_store;
///
/// with_node_store(|nodes| {
///     nodes.create("/a").unwrap();
///     assert_eq!(nodes.get_data("/a").unwrap(), None);
/// });
/// ```
pub fn with_node_store<F, R>(f: F) -> R
where
    F: FnOnce(&NodeStore) -> R,
{
    let cluster = TestCluster::new();
    let nodes = cluster.node_store();
    let result = f(&nodes);
    nodes.session().close();
    result
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a cluster whose root holds `count` extra children
    /// `/child-0`, `/child-1`, ...
    pub fn populated_cluster(count: usize) -> (TestCluster, NodeStore) {
        let cluster = TestCluster::new();
        let nodes = cluster.node_store();
        for i in 0..count {
            let path = format!("/child-{i}");
            nodes.create(&path).expect("Failed to create child");
            nodes
                .set_data(&path, i.to_string().as_bytes(), -1)
                .expect("Failed to write child");
        }
        (cluster, nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_starts_sessions() {
        let cluster = TestCluster::new();
        let session = cluster.start_session();
        assert!(session.is_connected());
        assert_eq!(session.connect_string(), cluster.connect_string());
        assert_eq!(cluster.store().session_count(), 1);
    }

    #[test]
    fn with_node_store_closes_session() {
        let session = with_node_store(|nodes| {
            nodes.create("/a").unwrap();
            nodes.session().clone()
        });
        assert!(session.is_closed());
    }

    #[test]
    fn populated_scenario() {
        let (_cluster, nodes) = scenarios::populated_cluster(3);
        // The root also holds the store's system node.
        assert_eq!(nodes.get_children("/").unwrap().len(), 4);
        assert_eq!(nodes.get_string_data("/child-2").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn configure_overrides() {
        let cluster = TestCluster::new().configure(|c| c.with_require_fencing(false));
        assert!(!cluster.config().require_fencing);
    }
}
