//! The disk-backed adjacency tier treats its backing store as an opaque
//! ordered key-value collaborator: put, get, sync, close. `RedbKvEngine` is
//! the production implementation; tests can swap in any other `KvEngine`.

use graphcask_core::{Error, Result};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const ADJACENCY_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("adjacency");

/// An ordered byte-key, byte-value store. Implementations need not be
/// transactional beyond single-call atomicity; the graph store layers its
/// own durability (WAL + snapshot) on top.
pub trait KvEngine: Send + Sync {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn delete(&self, key: &[u8]) -> Result<()>;
    fn sync(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// A `redb`-backed implementation of [`KvEngine`].
pub struct RedbKvEngine {
    db: Arc<Database>,
}

impl RedbKvEngine {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(|e| Error::Kv(e.to_string()))?;
        let write_txn = db.begin_write().map_err(|e| Error::Kv(e.to_string()))?;
        {
            write_txn
                .open_table(ADJACENCY_TABLE)
                .map_err(|e| Error::Kv(e.to_string()))?;
        }
        write_txn.commit().map_err(|e| Error::Kv(e.to_string()))?;
        Ok(RedbKvEngine { db: Arc::new(db) })
    }
}

impl KvEngine for RedbKvEngine {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let txn = self.db.begin_write().map_err(|e| Error::Kv(e.to_string()))?;
        {
            let mut table = txn
                .open_table(ADJACENCY_TABLE)
                .map_err(|e| Error::Kv(e.to_string()))?;
            table
                .insert(key, value)
                .map_err(|e| Error::Kv(e.to_string()))?;
        }
        txn.commit().map_err(|e| Error::Kv(e.to_string()))?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(|e| Error::Kv(e.to_string()))?;
        let table = match txn.open_table(ADJACENCY_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(Error::Kv(e.to_string())),
        };
        let value = table.get(key).map_err(|e| Error::Kv(e.to_string()))?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let txn = self.db.begin_write().map_err(|e| Error::Kv(e.to_string()))?;
        {
            let mut table = txn
                .open_table(ADJACENCY_TABLE)
                .map_err(|e| Error::Kv(e.to_string()))?;
            table.remove(key).map_err(|e| Error::Kv(e.to_string()))?;
        }
        txn.commit().map_err(|e| Error::Kv(e.to_string()))?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        // Each commit above is already durable via redb's own WAL; nothing
        // further to flush here.
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// An in-memory [`KvEngine`] used by tests and by stores configured for
/// pure in-memory adjacency (spec's `AdjacencyMode::InMemory`).
pub struct MemoryKvEngine {
    map: parking_lot::RwLock<std::collections::BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKvEngine {
    pub fn new() -> Self {
        MemoryKvEngine {
            map: parking_lot::RwLock::new(std::collections::BTreeMap::new()),
        }
    }
}

impl Default for MemoryKvEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KvEngine for MemoryKvEngine {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.map.write().remove(key);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_engine_put_get_delete() {
        let kv = MemoryKvEngine::new();
        assert_eq!(kv.get(b"k").unwrap(), None);
        kv.put(b"k", b"v").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), Some(b"v".to_vec()));
        kv.delete(b"k").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), None);
    }

    #[test]
    fn redb_engine_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adjacency.redb");
        {
            let kv = RedbKvEngine::open(&path).unwrap();
            kv.put(b"k1", b"v1").unwrap();
            kv.sync().unwrap();
            kv.close().unwrap();
        }
        {
            let kv = RedbKvEngine::open(&path).unwrap();
            assert_eq!(kv.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        }
    }
}
