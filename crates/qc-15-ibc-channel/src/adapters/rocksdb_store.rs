//! # RocksDB Storage Adapter
//!
//! Persistent [`KeyValueStore`] for channel state.
//!
//! All ICS-24 paths live in the default column family; keys are the path
//! strings, so `channelEnds/...`, `commitments/...` and friends stay
//! prefix-scannable. Batches go through one `WriteBatch`.

use parking_lot::RwLock;
use rocksdb::{Options, WriteBatch, WriteOptions, DB};
use std::sync::Arc;

use crate::domain::StoreError;
use crate::ports::{BatchOperation, KeyValueStore};

/// RocksDB configuration.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: String,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 32MB)
    pub write_buffer_size: usize,
    /// Enable fsync after each write (default: true for durability)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "./data/ibc-channel".to_string(),
            block_cache_size: 64 * 1024 * 1024,  // 64MB
            write_buffer_size: 32 * 1024 * 1024, // 32MB
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Create config for testing (small buffers, no sync)
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,  // 8MB
            write_buffer_size: 4 * 1024 * 1024, // 4MB
            sync_writes: false,
        }
    }
}

/// RocksDB-backed key-value store.
pub struct RocksDbStore {
    db: Arc<RwLock<DB>>,
    config: RocksDbConfig,
}

fn io_error(op: &str, e: rocksdb::Error) -> StoreError {
    StoreError::Io(format!("RocksDB {} failed: {}", op, e))
}

impl RocksDbStore {
    /// Open or create a database.
    pub fn open(config: RocksDbConfig) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path).map_err(|e| io_error("open", e))?;
        tracing::info!("[qc-15] 💾 Channel store opened at {}", config.path);

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            config,
        })
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let db = self.db.read();
        db.get(key).map_err(|e| io_error("get", e))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let db = self.db.write();
        db.put_opt(key, value, &self.write_options())
            .map_err(|e| io_error("put", e))
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        let db = self.db.write();
        db.delete_opt(key, &self.write_options())
            .map_err(|e| io_error("delete", e))
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        let db = self.db.write();
        let mut batch = WriteBatch::default();

        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
                BatchOperation::Delete { key } => batch.delete(&key),
            }
        }

        db.write_opt(batch, &self.write_options())
            .map_err(|e| io_error("batch write", e))
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        let db = self.db.read();
        db.get_pinned(key)
            .map(|v| v.is_some())
            .map_err(|e| io_error("exists check", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rocksdb_batch_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        let mut store = RocksDbStore::open(RocksDbConfig::for_testing(path)).unwrap();

        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"nextChannelSequence".to_vec(), 1u64.to_be_bytes().to_vec()),
                BatchOperation::put(b"channelEnds/ports/transfer/channels/channel-0".to_vec(), vec![1]),
            ])
            .unwrap();
        assert!(store.exists(b"nextChannelSequence").unwrap());

        store
            .atomic_batch_write(vec![BatchOperation::delete(b"nextChannelSequence".to_vec())])
            .unwrap();
        assert_eq!(store.get(b"nextChannelSequence").unwrap(), None);
        assert_eq!(
            store
                .get(b"channelEnds/ports/transfer/channels/channel-0")
                .unwrap(),
            Some(vec![1])
        );
    }
}
