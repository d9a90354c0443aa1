//! Batch mutations: a flat list of ops queued against pre-allocated ids,
//! applied sequentially to the store at `commit`. Unlike a transaction, a
//! batch has no read-your-writes view and no rollback — it is a convenience
//! for grouping independent writes, not an isolation boundary.

use crate::store::GraphStore;
use graphcask_core::{Edge, EdgeId, Node, NodeId, Result, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

enum QueuedOp {
    CreateNode {
        id: NodeId,
        labels: Vec<String>,
        properties: BTreeMap<String, Value>,
        tenant: Option<String>,
    },
    CreateEdge {
        id: EdgeId,
        from: NodeId,
        to: NodeId,
        edge_type: String,
        properties: BTreeMap<String, Value>,
        weight: f64,
        tenant: Option<String>,
    },
    UpdateNode {
        node_id: NodeId,
        patch: BTreeMap<String, Value>,
    },
    DeleteNode {
        node_id: NodeId,
    },
    DeleteEdge {
        edge_id: EdgeId,
    },
}

/// The outcome of applying one queued op during `commit`.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOpResult {
    NodeCreated(Node),
    EdgeCreated(Edge),
    NodeUpdated(Node),
    NodeDeleted(NodeId),
    EdgeDeleted(EdgeId),
}

/// A queue of mutations against one store, ids pre-allocated at queue time
/// so dependent ops (e.g. an edge between two not-yet-committed nodes) can
/// be queued before `commit` runs any of them.
pub struct Batch {
    store: Arc<GraphStore>,
    ops: Vec<QueuedOp>,
}

impl Batch {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Batch {
            store,
            ops: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.ops.len()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn queue_create_node(
        &mut self,
        labels: Vec<String>,
        properties: BTreeMap<String, Value>,
        tenant: Option<String>,
    ) -> Result<NodeId> {
        let id = self.store.allocate_node_id()?;
        self.ops.push(QueuedOp::CreateNode {
            id,
            labels,
            properties,
            tenant,
        });
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn queue_create_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        edge_type: String,
        properties: BTreeMap<String, Value>,
        weight: f64,
        tenant: Option<String>,
    ) -> Result<EdgeId> {
        let id = self.store.allocate_edge_id()?;
        self.ops.push(QueuedOp::CreateEdge {
            id,
            from,
            to,
            edge_type,
            properties,
            weight,
            tenant,
        });
        Ok(id)
    }

    pub fn queue_update_node(&mut self, node_id: NodeId, patch: BTreeMap<String, Value>) {
        self.ops.push(QueuedOp::UpdateNode { node_id, patch });
    }

    pub fn queue_delete_node(&mut self, node_id: NodeId) {
        self.ops.push(QueuedOp::DeleteNode { node_id });
    }

    pub fn queue_delete_edge(&mut self, edge_id: EdgeId) {
        self.ops.push(QueuedOp::DeleteEdge { edge_id });
    }

    /// Applies every queued op in order, one store call at a time. Stops at
    /// the first error and returns it; results for ops already applied are
    /// not rolled back — a batch is not a transaction.
    pub fn commit(mut self) -> Result<Vec<BatchOpResult>> {
        let ops = std::mem::take(&mut self.ops);
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            let result = match op {
                QueuedOp::CreateNode {
                    id,
                    labels,
                    properties,
                    tenant,
                } => BatchOpResult::NodeCreated(
                    self.store.create_node_with_id(id, labels, properties, tenant)?,
                ),
                QueuedOp::CreateEdge {
                    id,
                    from,
                    to,
                    edge_type,
                    properties,
                    weight,
                    tenant,
                } => BatchOpResult::EdgeCreated(self.store.create_edge_with_id(
                    id, from, to, edge_type, properties, weight, tenant,
                )?),
                QueuedOp::UpdateNode { node_id, patch } => {
                    BatchOpResult::NodeUpdated(self.store.update_node(node_id, patch)?)
                }
                QueuedOp::DeleteNode { node_id } => {
                    self.store.delete_node(node_id)?;
                    BatchOpResult::NodeDeleted(node_id)
                }
                QueuedOp::DeleteEdge { edge_id } => {
                    self.store.delete_edge(edge_id)?;
                    BatchOpResult::EdgeDeleted(edge_id)
                }
            };
            results.push(result);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use tempfile::tempdir;

    fn open_store(dir: &std::path::Path) -> Arc<GraphStore> {
        Arc::new(GraphStore::open(StoreConfig::new(dir).shard_count(4)).unwrap())
    }

    #[test]
    fn batch_pre_allocates_ids_for_dependent_edge() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let mut batch = Batch::new(store.clone());
        let a = batch
            .queue_create_node(vec![], BTreeMap::new(), None)
            .unwrap();
        let b = batch
            .queue_create_node(vec![], BTreeMap::new(), None)
            .unwrap();
        batch
            .queue_create_edge(a, b, "KNOWS".into(), BTreeMap::new(), 1.0, None)
            .unwrap();
        let results = batch.commit().unwrap();
        assert_eq!(results.len(), 3);
        assert!(matches!(results[2], BatchOpResult::EdgeCreated(_)));
        assert_eq!(store.find_edges_by_type("KNOWS").unwrap().len(), 1);
    }

    #[test]
    fn empty_batch_commit_is_a_no_op() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let batch = Batch::new(store);
        assert_eq!(batch.commit().unwrap().len(), 0);
    }

    #[test]
    fn batch_stops_at_first_error_leaving_prior_ops_applied() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let mut batch = Batch::new(store.clone());
        batch
            .queue_create_node(vec![], BTreeMap::new(), None)
            .unwrap();
        batch.queue_delete_node(9999);
        let err = batch.commit().unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.get_statistics().node_count, 1);
    }

    #[test]
    fn batch_survives_crash_between_commit_and_close() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();
        {
            let store = open_store(&data_dir);
            let mut batch = Batch::new(store.clone());
            for _ in 0..4 {
                batch
                    .queue_create_node(vec!["Item".into()], BTreeMap::new(), None)
                    .unwrap();
            }
            batch.commit().unwrap();
            // no close(): simulate a crash after commit's WAL appends landed
        }
        let store = GraphStore::open(StoreConfig::new(&data_dir).shard_count(4)).unwrap();
        assert_eq!(store.find_nodes_by_label("Item").unwrap().len(), 4);
    }
}
