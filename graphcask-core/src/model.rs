use crate::ids::{EdgeId, NodeId};
use crate::value::Value;
use std::collections::BTreeMap;

/// A labelled node with typed properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub labels: Vec<String>,
    pub properties: BTreeMap<String, Value>,
    pub created_at: i64,
    pub updated_at: i64,
    pub tenant: Option<String>,
}

impl Node {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// A typed, weighted edge between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub edge_type: String,
    pub properties: BTreeMap<String, Value>,
    pub weight: f64,
    pub created_at: i64,
    pub tenant: Option<String>,
}
