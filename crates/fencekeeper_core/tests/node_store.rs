//! Node CRUD against a live session.

use fencekeeper_core::{CoordError, OpKind};
use fencekeeper_store::{Acl, CreateMode};
use fencekeeper_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

#[test]
fn read_write_data() {
    init_test_logging();
    with_node_store(|nodes| {
        let path = "/test";
        assert!(!nodes.exists(path).unwrap());
        nodes.create(path).unwrap();
        assert!(nodes.exists(path).unwrap());
        assert_eq!(nodes.get_data(path).unwrap(), None);

        let data = b"testing";
        nodes.set_data(path, data, -1).unwrap();
        assert_eq!(nodes.get_data(path).unwrap().as_deref(), Some(&data[..]));
    });
}

#[test]
fn get_string_data() {
    with_node_store(|nodes| {
        nodes.create("/node1").unwrap();
        assert_eq!(nodes.get_string_data("/node1").unwrap(), None);

        nodes.set_string_data("/node1", "setData", -1).unwrap();
        assert_eq!(
            nodes.get_string_data("/node1").unwrap().as_deref(),
            Some("setData")
        );
    });
}

#[test]
fn children() {
    with_node_store(|nodes| {
        let before = nodes.get_children("/").unwrap().len();
        nodes.create("/node1").unwrap();
        nodes.create("/node2").unwrap();
        assert_eq!(nodes.get_children("/").unwrap().len(), before + 2);

        nodes.delete("/node1").unwrap();
        let children = nodes.get_children("/").unwrap();
        assert_eq!(children.len(), before + 1);
        assert!(children.contains(&"node2".to_string()));
    });
}

#[test]
fn errors_carry_operation_and_path() {
    with_node_store(|nodes| {
        let err = nodes.set_data("/absent", b"x", -1).unwrap_err();
        assert!(matches!(err, CoordError::NoNode { .. }));
        assert_eq!(err.op(), OpKind::SetData);
        assert_eq!(err.path(), Some("/absent"));
        assert!(!err.is_retryable());
    });
}

#[test]
fn stat_tracks_versions_and_children() {
    with_node_store(|nodes| {
        nodes.create("/p").unwrap();
        nodes.create("/p/c").unwrap();
        nodes.set_data("/p", b"abc", 0).unwrap();

        let stat = nodes.stat("/p").unwrap().unwrap();
        assert_eq!(stat.version, 1);
        assert_eq!(stat.num_children, 1);
        assert_eq!(stat.data_length, 3);
        assert_eq!(nodes.stat("/q").unwrap(), None);
    });
}

#[test]
fn ephemeral_node_goes_with_its_session() {
    let cluster = TestCluster::new();
    let owner = cluster.node_store();
    let observer = cluster.node_store();

    owner
        .create_with("/lock", None, &Acl::open_unsafe(), CreateMode::Ephemeral)
        .unwrap();
    assert!(observer.exists("/lock").unwrap());

    owner.session().close();
    assert!(!observer.exists("/lock").unwrap());
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn create_then_exists(path in node_path_strategy(3)) {
        with_node_store(|nodes| {
            prop_assert!(!nodes.exists(&path).unwrap());
            nodes.create_root_dir_recursively(&path, &Acl::open_unsafe()).unwrap();
            prop_assert!(nodes.exists(&path).unwrap());
            prop_assert_eq!(nodes.get_data(&path).unwrap(), None);
            Ok(())
        })?;
    }

    #[test]
    fn set_then_get_round_trips(data in node_data_strategy()) {
        with_node_store(|nodes| {
            nodes.create("/data").unwrap();
            nodes.set_data("/data", &data, -1).unwrap();
            prop_assert_eq!(nodes.get_data("/data").unwrap(), Some(data.clone()));
            Ok(())
        })?;
    }

    #[test]
    fn stale_version_is_rejected(first in node_data_strategy(), second in node_data_strategy()) {
        with_node_store(|nodes| {
            nodes.create("/v").unwrap();
            let version = nodes.stat("/v").unwrap().unwrap().version;
            nodes.set_data("/v", &first, version).unwrap();
            let err = nodes.set_data("/v", &second, version).unwrap_err();
            let is_bad_version = matches!(err, CoordError::BadVersion { .. });
            prop_assert!(is_bad_version);
            prop_assert_eq!(nodes.get_data("/v").unwrap(), Some(first.clone()));
            Ok(())
        })?;
    }

    #[test]
    fn operations_match_model(ops in operation_sequence_strategy(1, 40)) {
        with_node_store(|nodes| {
            let base = nodes.get_children("/").unwrap().len();
            let mut model: BTreeMap<String, Option<Vec<u8>>> = BTreeMap::new();

            for op in &ops {
                let path = op.path();
                match op {
                    NodeOperation::Create { data, .. } => {
                        let result = nodes.create_with(
                            &path,
                            data.as_deref(),
                            &Acl::open_unsafe(),
                            CreateMode::Persistent,
                        );
                        if model.contains_key(&path) {
                            let exists = matches!(result, Err(CoordError::NodeExists { .. }));
                            prop_assert!(exists);
                        } else {
                            prop_assert!(result.is_ok());
                            model.insert(path.clone(), data.clone());
                        }
                    }
                    NodeOperation::SetData { data, .. } => {
                        let result = nodes.set_data(&path, data, -1);
                        if let Some(slot) = model.get_mut(&path) {
                            prop_assert!(result.is_ok());
                            *slot = Some(data.clone());
                        } else {
                            let missing = matches!(result, Err(CoordError::NoNode { .. }));
                            prop_assert!(missing);
                        }
                    }
                    NodeOperation::Delete { .. } => {
                        let result = nodes.delete(&path);
                        prop_assert_eq!(result.is_ok(), model.remove(&path).is_some());
                    }
                }
            }

            prop_assert_eq!(nodes.get_children("/").unwrap().len(), base + model.len());
            for (path, data) in &model {
                prop_assert_eq!(&nodes.get_data(path).unwrap(), data);
            }
            Ok(())
        })?;
    }
}
