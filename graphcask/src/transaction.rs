//! Buffered transactions: creates/updates/deletes accumulate in memory
//! against a read-your-writes view, then commit sequentially against the
//! store or discard entirely on rollback. IDs for buffered creations are
//! allocated at queue time, matching the batch engine, so an edge can
//! reference a node created earlier in the same transaction before either
//! has touched the store.

use crate::store::GraphStore;
use graphcask_core::{Edge, EdgeId, EntityKind, Error, Node, NodeId, Result, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Active,
    Committed,
    RolledBack,
}

/// One buffered unit of work against a [`GraphStore`].
///
/// Reads are served from the transaction's own buffer first: a deleted id
/// reads as absent, a buffered creation reads from the buffer, and anything
/// else is forwarded to the store unmodified — a pending update patch does
/// not retroactively change what a read through the transaction sees before
/// commit.
pub struct Transaction {
    store: Arc<GraphStore>,
    created_nodes: BTreeMap<NodeId, Node>,
    created_edges: BTreeMap<EdgeId, Edge>,
    updated_nodes: BTreeMap<NodeId, BTreeMap<String, Value>>,
    deleted_nodes: BTreeSet<NodeId>,
    deleted_edges: BTreeSet<EdgeId>,
    state: TxState,
}

impl Transaction {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Transaction {
            store,
            created_nodes: BTreeMap::new(),
            created_edges: BTreeMap::new(),
            updated_nodes: BTreeMap::new(),
            deleted_nodes: BTreeSet::new(),
            deleted_edges: BTreeSet::new(),
            state: TxState::Active,
        }
    }

    fn check_active(&self) -> Result<()> {
        match self.state {
            TxState::Active => Ok(()),
            TxState::Committed => Err(Error::TransactionAlreadyEnded),
            TxState::RolledBack => Err(Error::TransactionNotActive),
        }
    }

    fn node_visible(&self, node_id: NodeId) -> Result<bool> {
        if self.deleted_nodes.contains(&node_id) {
            return Ok(false);
        }
        if self.created_nodes.contains_key(&node_id) {
            return Ok(true);
        }
        match self.store.get_node(node_id) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn create_node(
        &mut self,
        labels: Vec<String>,
        properties: BTreeMap<String, Value>,
        tenant: Option<String>,
    ) -> Result<NodeId> {
        self.check_active()?;
        let id = self.store.allocate_node_id()?;
        let now = crate::store::now_secs();
        let properties = self.store.sanitize_properties(properties);
        self.created_nodes.insert(
            id,
            Node {
                id,
                labels,
                properties,
                created_at: now,
                updated_at: now,
                tenant,
            },
        );
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        edge_type: String,
        properties: BTreeMap<String, Value>,
        weight: f64,
        tenant: Option<String>,
    ) -> Result<EdgeId> {
        self.check_active()?;
        if !self.node_visible(from)? {
            return Err(Error::not_found("create_edge", EntityKind::Node, from));
        }
        if !self.node_visible(to)? {
            return Err(Error::not_found("create_edge", EntityKind::Node, to));
        }
        let id = self.store.allocate_edge_id()?;
        let now = crate::store::now_secs();
        let properties = self.store.sanitize_properties(properties);
        self.created_edges.insert(
            id,
            Edge {
                id,
                from,
                to,
                edge_type,
                properties,
                weight,
                created_at: now,
                tenant,
            },
        );
        Ok(id)
    }

    pub fn update_node(&mut self, node_id: NodeId, patch: BTreeMap<String, Value>) -> Result<()> {
        self.check_active()?;
        if self.deleted_nodes.contains(&node_id) {
            return Err(Error::not_found("update_node", EntityKind::Node, node_id));
        }
        let patch = self.store.sanitize_properties(patch);
        if let Some(node) = self.created_nodes.get_mut(&node_id) {
            for (key, value) in patch {
                node.properties.insert(key, value);
            }
            node.updated_at = crate::store::now_secs();
        } else {
            let entry = self.updated_nodes.entry(node_id).or_default();
            for (key, value) in patch {
                entry.insert(key, value);
            }
        }
        Ok(())
    }

    pub fn delete_node(&mut self, node_id: NodeId) -> Result<()> {
        self.check_active()?;
        self.created_nodes.remove(&node_id);
        self.updated_nodes.remove(&node_id);
        self.deleted_nodes.insert(node_id);
        Ok(())
    }

    pub fn delete_edge(&mut self, edge_id: EdgeId) -> Result<()> {
        self.check_active()?;
        self.created_edges.remove(&edge_id);
        self.deleted_edges.insert(edge_id);
        Ok(())
    }

    pub fn get_node(&self, node_id: NodeId) -> Result<Node> {
        self.check_active()?;
        if self.deleted_nodes.contains(&node_id) {
            return Err(Error::not_found("get_node", EntityKind::Node, node_id));
        }
        if let Some(node) = self.created_nodes.get(&node_id) {
            return Ok(node.clone());
        }
        self.store.get_node(node_id)
    }

    pub fn get_edge(&self, edge_id: EdgeId) -> Result<Edge> {
        self.check_active()?;
        if self.deleted_edges.contains(&edge_id) {
            return Err(Error::not_found("get_edge", EntityKind::Edge, edge_id));
        }
        if let Some(edge) = self.created_edges.get(&edge_id) {
            return Ok(edge.clone());
        }
        self.store.get_edge(edge_id)
    }

    /// Applies buffered work to the store in the order created nodes,
    /// created edges, updates, then deletions. Within deletions, edges apply
    /// before nodes: a node delete cascades to its incident edges, so
    /// applying an explicitly queued edge delete first avoids that cascade
    /// silently beating the explicit delete to it and turning a real delete
    /// into a spurious not-found.
    pub fn commit(mut self) -> Result<()> {
        self.check_active()?;
        let created_nodes = std::mem::take(&mut self.created_nodes);
        let created_edges = std::mem::take(&mut self.created_edges);
        let updated_nodes = std::mem::take(&mut self.updated_nodes);
        let deleted_edges = std::mem::take(&mut self.deleted_edges);
        let deleted_nodes = std::mem::take(&mut self.deleted_nodes);

        for (id, node) in created_nodes {
            self.store
                .create_node_with_id(id, node.labels, node.properties, node.tenant)?;
        }
        for (id, edge) in created_edges {
            self.store.create_edge_with_id(
                id,
                edge.from,
                edge.to,
                edge.edge_type,
                edge.properties,
                edge.weight,
                edge.tenant,
            )?;
        }
        for (node_id, patch) in updated_nodes {
            self.store.update_node(node_id, patch)?;
        }
        for edge_id in deleted_edges {
            self.store.delete_edge(edge_id)?;
        }
        for node_id in deleted_nodes {
            self.store.delete_node(node_id)?;
        }

        self.state = TxState::Committed;
        Ok(())
    }

    /// Discards every buffered op. Idempotent while still active; errors
    /// only if the transaction already committed.
    pub fn rollback(&mut self) -> Result<()> {
        if self.state == TxState::Committed {
            return Err(Error::TransactionAlreadyEnded);
        }
        self.created_nodes.clear();
        self.created_edges.clear();
        self.updated_nodes.clear();
        self.deleted_nodes.clear();
        self.deleted_edges.clear();
        self.state = TxState::RolledBack;
        Ok(())
    }
}
