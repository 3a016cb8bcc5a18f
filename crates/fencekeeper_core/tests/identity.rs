//! Several identities in one process.

use fencekeeper_core::{Config, Identity, SessionManager};
use fencekeeper_store::{InMemoryStore, LoginEntry, LoginRegistry};
use fencekeeper_testkit::prelude::*;
use std::sync::Arc;

fn identity1() -> Identity {
    Identity::new("foo1", "bar1", "bar1.keytab")
}

fn identity2() -> Identity {
    Identity::new("foo2", "bar2", "bar2.keytab")
}

fn assert_login(cluster: &TestCluster, session: &fencekeeper_core::Session, principal: &str, keytab: &str) {
    let entry = session.login_entry().expect("session has a login entry");
    assert_eq!(entry.principal(), Some(principal));
    assert_eq!(entry.keytab_path().unwrap().to_str(), Some(keytab));
    assert_eq!(
        cluster.store().session_principal(session.store_session_id()).as_deref(),
        Some(principal)
    );
}

#[test]
fn two_identities_do_not_clobber_each_other() {
    init_test_logging();
    let cluster = TestCluster::new();

    let session1 = cluster.start_session_as(&identity1());
    let session2 = cluster.start_session_as(&identity2());

    assert_ne!(session1.login_context_name(), session2.login_context_name());
    assert_login(&cluster, &session1, "bar1", "bar1.keytab");
    assert_login(&cluster, &session2, "bar2", "bar2.keytab");

    session1.close();
    session2.close();
    assert!(cluster.registry().is_empty());
}

#[test]
fn start_order_does_not_matter() {
    let cluster = TestCluster::new();

    let session2 = cluster.start_session_as(&identity2());
    let session1 = cluster.start_session_as(&identity1());

    assert_login(&cluster, &session1, "bar1", "bar1.keytab");
    assert_login(&cluster, &session2, "bar2", "bar2.keytab");
}

#[test]
fn closing_one_session_keeps_the_other_authenticated() {
    let cluster = TestCluster::new();
    let session1 = cluster.start_session_as(&identity1());
    let session2 = cluster.start_session_as(&identity2());

    session1.close();
    assert!(session1.login_entry().is_none());
    assert_login(&cluster, &session2, "bar2", "bar2.keytab");
}

#[test]
fn host_login_configuration_takes_precedence() {
    let registry = Arc::new(LoginRegistry::new());
    registry.install("TestClientConfig", LoginEntry::keytab("test", "test.keytab"));
    registry.set_default_context("TestClientConfig");
    let cluster = TestCluster::with_registry(Arc::clone(&registry));

    let session = cluster.start_session_as(&Identity::new("foo3", "bar3", "bar3.keytab"));

    assert_eq!(session.login_context_name(), Some("TestClientConfig"));
    assert_login(&cluster, &session, "test", "test.keytab");

    session.close();
    assert!(registry.contains("TestClientConfig"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn unauthenticated_session_has_no_login() {
    let cluster = TestCluster::new();
    let session = cluster.start_session();
    assert_eq!(session.login_context_name(), None);
    assert!(session.login_entry().is_none());
    assert_eq!(cluster.store().session_principal(session.store_session_id()), None);
}

#[test]
fn process_wide_registry() {
    let store = Arc::new(InMemoryStore::new());
    let manager = SessionManager::new(store.clone());
    let config = test_config(store.connect_string());

    let session1 = manager.start(&config, Some(&identity1())).unwrap();
    let session2 = manager.start(&config, Some(&identity2())).unwrap();
    let name1 = session1.login_context_name().unwrap().to_string();

    assert!(LoginRegistry::global().contains(&name1));
    assert_eq!(
        store.session_principal(session1.store_session_id()).as_deref(),
        Some("bar1")
    );
    assert_eq!(
        store.session_principal(session2.store_session_id()).as_deref(),
        Some("bar2")
    );

    manager.close(&session1);
    manager.close(&session2);
    assert!(!LoginRegistry::global().contains(&name1));
}

#[test]
fn digest_auth_is_passed_to_the_store() {
    let cluster = TestCluster::new().configure(|config: Config| {
        config.with_auth(fencekeeper_core::parse_auth("digest:user:secret").unwrap())
    });
    let session = cluster.start_session();
    let auth = cluster.store().session_auth(session.store_session_id());
    assert_eq!(auth.len(), 1);
    assert_eq!(auth[0].scheme, "digest");
    assert_eq!(auth[0].auth, b"user:secret".to_vec());
}

#[test]
fn concurrent_identities_stress() {
    let cluster = TestCluster::new();
    let config = StressConfig {
        operations: 20,
        threads: 4,
        ..StressConfig::default()
    };
    let result = stress_concurrent_identities(&cluster, &config);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(result.successful_ops, 80);
}
