//! An embedded, durable, labelled property graph store: sharded node/edge
//! maps with label/type/property secondary indexes, a write-ahead log and
//! periodic snapshots for crash recovery, compressed on-disk adjacency with
//! an LRU front, and batch and transaction engines layered on top of the
//! single-entity mutation API.

pub mod adjacency;
pub mod batch;
pub mod bufpool;
pub mod cache;
pub mod codec;
pub mod config;
pub mod edgelist;
pub mod index;
pub mod kv;
pub mod sanitize;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod transaction;
pub mod varint;
pub mod wal;

pub use batch::{Batch, BatchOpResult};
pub use config::{AdjacencyMode, StoreConfig};
pub use graphcask_core::{Edge, EdgeId, EntityKind, Error, Node, NodeId, Result, Value, ValueType};
pub use index::{CompositeIndex, PropertyIndex};
pub use stats::StatisticsSnapshot;
pub use store::GraphStore;
pub use transaction::Transaction;
pub use wal::SyncMode;
