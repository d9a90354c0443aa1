//! End-to-end durability scenarios: cascading delete survives a reopen,
//! a batch committed but never snapshotted recovers from WAL replay alone,
//! and a property index created mid-session recovers in the same order it
//! was built.

use graphcask::batch::Batch;
use graphcask::config::{AdjacencyMode, StoreConfig};
use graphcask::store::GraphStore;
use graphcask_core::{Value, ValueType};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn scenario_cascade_delete_survives_reopen() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_path_buf();

    let (a_id, e1, e2) = {
        let store = GraphStore::open(StoreConfig::new(&data_dir).shard_count(4)).unwrap();
        let a = store
            .create_node(vec!["Person".into()], BTreeMap::new(), None)
            .unwrap();
        let b = store
            .create_node(vec!["Person".into()], BTreeMap::new(), None)
            .unwrap();
        let c = store
            .create_node(vec!["Person".into()], BTreeMap::new(), None)
            .unwrap();
        let e1 = store
            .create_edge(a.id, b.id, "KNOWS".into(), BTreeMap::new(), 1.0, None)
            .unwrap();
        let e2 = store
            .create_edge(c.id, a.id, "KNOWS".into(), BTreeMap::new(), 1.0, None)
            .unwrap();
        store.delete_node(a.id).unwrap();
        // no close(): the delete's single WAL record is all that is durable
        (a.id, e1.id, e2.id)
    };

    let store = GraphStore::open(StoreConfig::new(&data_dir).shard_count(4)).unwrap();
    assert!(store.get_node(a_id).unwrap_err().is_not_found());
    assert!(store.get_edge(e1).unwrap_err().is_not_found());
    assert!(store.get_edge(e2).unwrap_err().is_not_found());
    assert_eq!(store.get_statistics().node_count, 2);
    assert_eq!(store.get_statistics().edge_count, 0);
}

#[test]
fn scenario_batch_commit_recovers_without_snapshot() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_path_buf();

    {
        let store = Arc::new(GraphStore::open(StoreConfig::new(&data_dir).shard_count(4)).unwrap());
        let mut batch = Batch::new(store.clone());
        let a = batch
            .queue_create_node(vec!["Person".into()], BTreeMap::new(), None)
            .unwrap();
        let b = batch
            .queue_create_node(vec!["Person".into()], BTreeMap::new(), None)
            .unwrap();
        batch
            .queue_create_edge(a, b, "KNOWS".into(), BTreeMap::new(), 1.0, None)
            .unwrap();
        batch.commit().unwrap();
    }

    let store = GraphStore::open(StoreConfig::new(&data_dir).shard_count(4)).unwrap();
    assert_eq!(store.find_nodes_by_label("Person").unwrap().len(), 2);
    assert_eq!(store.find_edges_by_type("KNOWS").unwrap().len(), 1);
}

#[test]
fn scenario_property_index_recovers_in_build_order() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_path_buf();

    {
        let store = GraphStore::open(StoreConfig::new(&data_dir).shard_count(4)).unwrap();
        store.create_property_index("age", ValueType::Int).unwrap();
        for age in 0..15 {
            let mut props = BTreeMap::new();
            props.insert("age".to_string(), Value::Int(age));
            store.create_node(vec![], props, None).unwrap();
        }
        store.drop_property_index("age").unwrap();
        store.create_property_index("age", ValueType::Int).unwrap();
    }

    let store = GraphStore::open(StoreConfig::new(&data_dir).shard_count(4)).unwrap();
    let hits = store
        .find_nodes_by_property_indexed("age", &Value::Int(7))
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn disk_backed_adjacency_mode_survives_reopen() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_path_buf();
    let config = StoreConfig::new(&data_dir)
        .shard_count(4)
        .adjacency_mode(AdjacencyMode::DiskBacked)
        .lru_capacity(2);

    let (a, b) = {
        let store = GraphStore::open(config.clone()).unwrap();
        let a = store.create_node(vec![], BTreeMap::new(), None).unwrap();
        let b = store.create_node(vec![], BTreeMap::new(), None).unwrap();
        store
            .create_edge(a.id, b.id, "KNOWS".into(), BTreeMap::new(), 1.0, None)
            .unwrap();
        store.close().unwrap();
        (a.id, b.id)
    };

    let store = GraphStore::open(config).unwrap();
    let edge = store.find_edge_between(a, b, "KNOWS").unwrap();
    assert!(edge.is_some());
}
