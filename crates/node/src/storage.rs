//! RocksDB-backed key/value store.
//!
//! All operations are synchronous blocking I/O. Writes are flushed with
//! `sync = true` so that epoch state and committed blocks survive a crash;
//! callers in async contexts should use `spawn_blocking` if needed.

use neatcon_epoch::{KvStore, StoreError};
use rocksdb::{Options, WriteOptions, DB};
use std::path::Path;
use std::sync::Arc;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
}

/// RocksDB-based storage for production use.
///
/// LZ4 compression, a modest write buffer, and bloom filters for point
/// lookups. The epoch manager and the block store share one database.
pub struct RocksDbStore {
    db: Arc<DB>,
}

impl RocksDbStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_background_jobs(4);
        opts.set_bytes_per_sync(1 << 20);
        opts.set_keep_log_file_num(10);
        opts.set_max_write_buffer_number(4);
        opts.set_write_buffer_size(64 << 20);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, path).map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    fn sync_writes() -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        write_opts
    }
}

impl KvStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db.get(key).map_err(|e| StoreError(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db
            .put_opt(key, value, &Self::sync_writes())
            .map_err(|e| StoreError(e.to_string()))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.db
            .delete_opt(key, &Self::sync_writes())
            .map_err(|e| StoreError(e.to_string()))
    }
}
