//! Programmatic store configuration. Parsing from files/env/CLI is out of
//! scope; callers build a `StoreConfig` directly, in the same
//! plain-struct-with-setters shape the teacher's wider workspace uses for
//! `GraphEngine::open_with_config`.

use crate::wal::SyncMode;
use std::path::PathBuf;

/// Which adjacency backing a store uses for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjacencyMode {
    InMemory,
    DiskBacked,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub adjacency_mode: AdjacencyMode,
    pub lru_capacity: usize,
    /// Must be a power of two; spec's reference choice is 256.
    pub shard_count: usize,
    pub wal_sync_mode: SyncMode,
    /// Disables the ingress sanitizer for string properties when `false`.
    pub sanitize_strings: bool,
    pub byte_pool_max_buffer_size: usize,
    pub byte_pool_max_pooled: usize,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        StoreConfig {
            data_dir: data_dir.into(),
            ..StoreConfig::default()
        }
    }

    pub fn adjacency_mode(mut self, mode: AdjacencyMode) -> Self {
        self.adjacency_mode = mode;
        self
    }

    pub fn lru_capacity(mut self, capacity: usize) -> Self {
        self.lru_capacity = capacity;
        self
    }

    pub fn shard_count(mut self, count: usize) -> Self {
        assert!(count.is_power_of_two(), "shard_count must be a power of two");
        self.shard_count = count;
        self
    }

    pub fn wal_sync_mode(mut self, mode: SyncMode) -> Self {
        self.wal_sync_mode = mode;
        self
    }

    /// Convenience for `wal_sync_mode(SyncMode::GroupCommit { .. })`: fsync
    /// once `max_records` appends have accumulated, or once the oldest of
    /// them has waited `max_delay_ms`, whichever comes first.
    pub fn group_commit(mut self, max_records: usize, max_delay_ms: u64) -> Self {
        self.wal_sync_mode = SyncMode::GroupCommit {
            max_records,
            max_delay_ms,
        };
        self
    }

    pub fn sanitize_strings(mut self, enabled: bool) -> Self {
        self.sanitize_strings = enabled;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_dir: PathBuf::from("."),
            adjacency_mode: AdjacencyMode::InMemory,
            lru_capacity: 10_000,
            shard_count: 256,
            wal_sync_mode: SyncMode::Immediate,
            sanitize_strings: true,
            byte_pool_max_buffer_size: 64 * 1024,
            byte_pool_max_pooled: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shard_count_is_256() {
        assert_eq!(StoreConfig::default().shard_count, 256);
    }

    #[test]
    fn builder_setters_chain() {
        let cfg = StoreConfig::new("/tmp/graphcask")
            .adjacency_mode(AdjacencyMode::DiskBacked)
            .lru_capacity(128)
            .sanitize_strings(false);
        assert_eq!(cfg.adjacency_mode, AdjacencyMode::DiskBacked);
        assert_eq!(cfg.lru_capacity, 128);
        assert!(!cfg.sanitize_strings);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn shard_count_rejects_non_power_of_two() {
        StoreConfig::default().shard_count(100);
    }

    #[test]
    fn group_commit_sets_both_thresholds() {
        let cfg = StoreConfig::new("/tmp/graphcask").group_commit(64, 10);
        assert_eq!(
            cfg.wal_sync_mode,
            SyncMode::GroupCommit {
                max_records: 64,
                max_delay_ms: 10
            }
        );
    }
}
