//! Core types shared by the graphcask engine: identifiers, the typed
//! property `Value`, the `Node`/`Edge` models, and the error taxonomy.
//!
//! This crate mirrors the teacher's `nervusdb-v2-api` split: a small,
//! dependency-light layer the storage engine builds on, with no I/O of its
//! own.

pub mod error;
pub mod ids;
pub mod model;
pub mod value;

pub use error::{EntityKind, Error, Result};
pub use ids::{EdgeId, NodeId, DEFAULT_TENANT};
pub use model::{Edge, Node};
pub use value::{Value, ValueType};
