use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Entity kind an error refers to, carried so callers can report precise
/// diagnostics without the error type itself naming every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Edge,
    PropertyIndex,
    Transaction,
    Batch,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Node => "node",
            EntityKind::Edge => "edge",
            EntityKind::PropertyIndex => "property index",
            EntityKind::Transaction => "transaction",
            EntityKind::Batch => "batch",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{op}: {kind} {id} not found")]
    NotFound {
        op: &'static str,
        kind: EntityKind,
        id: u64,
    },

    #[error("id space exhausted allocating a new {0}")]
    IdSpaceExhausted(EntityKind),

    #[error("{op}: type mismatch on field {field}")]
    TypeMismatch {
        op: &'static str,
        field: String,
    },

    #[error("transaction is not active")]
    TransactionNotActive,

    #[error("transaction has already ended")]
    TransactionAlreadyEnded,

    #[error("operation attempted on a closed store")]
    StorageClosed,

    #[error("wal append failed: {0}")]
    WalAppendFailed(String),

    #[error("wal is corrupt: {0}")]
    CorruptWal(String),

    #[error("index operation failed on field {field}: {reason}")]
    IndexOperationFailed { field: String, reason: String },

    #[error("failed to marshal payload: {0}")]
    MarshalFailed(String),

    #[error("compressed edge list encoder received unsortable input")]
    UnsortedInput,

    #[error("compressed edge list decoder found corrupt data: {0}")]
    CompressionCorruption(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("disk-backed adjacency store error: {0}")]
    Kv(String),
}

impl Error {
    pub fn not_found(op: &'static str, kind: EntityKind, id: u64) -> Self {
        Error::NotFound { op, kind, id }
    }

    pub fn type_mismatch(op: &'static str, field: impl Into<String>) -> Self {
        Error::TypeMismatch {
            op,
            field: field.into(),
        }
    }

    pub fn index_failed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::IndexOperationFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for any `NotFound` variant, regardless of entity kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True when the error indicates the store was already closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::StorageClosed)
    }
}
