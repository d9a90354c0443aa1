/// Unique, monotonic node identifier. Never reused.
pub type NodeId = u64;

/// Unique, monotonic edge identifier. Never reused.
pub type EdgeId = u64;

/// Tenant tag used when a node or edge does not carry an explicit one.
pub const DEFAULT_TENANT: &str = "__default__";
