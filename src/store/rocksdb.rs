//! Generic RocksDB utilities shared by the persistent stores.
//!
//! No domain logic lives here: just configuration, a handle wrapper with
//! bincode rows, and the two scan shapes the stores need — key-suffix scans
//! over an index prefix and typed full scans over a row column family.

use crate::error::{ColloquyError, Result};
use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Configuration for RocksDB storage.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Maximum number of open files.
    pub max_open_files: i32,
    /// Number of log files to keep.
    pub keep_log_file_num: usize,
    /// Maximum WAL size in bytes.
    pub max_wal_size: u64,
    /// Write buffer size in bytes.
    pub write_buffer_size: usize,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            max_open_files: 128,
            keep_log_file_num: 2,
            max_wal_size: 32 * 1024 * 1024,      // 32MB
            write_buffer_size: 32 * 1024 * 1024, // 32MB
        }
    }
}

impl RocksDbConfig {
    fn build_options(&self) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(self.max_open_files);
        opts.set_keep_log_file_num(self.keep_log_file_num);
        opts.set_max_total_wal_size(self.max_wal_size);
        opts.increase_parallelism(num_cpus::get() as i32);
        opts.set_write_buffer_size(self.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }
}

/// Joins an index prefix and a record id into one key.
///
/// Format: `{prefix}:{id}`. Ids are fixed-width, so the separator never
/// introduces prefix ambiguity.
pub fn composite_key(prefix: &[u8], id: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + id.len());
    key.extend_from_slice(prefix);
    key.push(b':');
    key.extend_from_slice(id);
    key
}

/// A wrapper around RocksDB providing bincode rows and index scans.
pub struct RocksDbHandle {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksDbHandle {
    /// Opens a RocksDB database with the given column families.
    pub fn open(
        db_path: impl AsRef<Path>,
        config: &RocksDbConfig,
        column_families: &[&str],
    ) -> Result<Self> {
        let cf_opts = Options::default();
        let cf_descriptors: Vec<_> = column_families
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(*cf, cf_opts.clone()))
            .collect();

        let db = DBWithThreadMode::<MultiThreaded>::open_cf_descriptors(
            &config.build_options(),
            db_path.as_ref(),
            cf_descriptors,
        )
        .map_err(|e| ColloquyError::storage(format!("opening RocksDB failed: {}", e)))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ColloquyError::storage(format!("unknown column family '{}'", name)))
    }

    /// Stores a bincode-serialized value at the given key.
    pub fn put<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)
            .map_err(|e| ColloquyError::serialization(format!("row encode failed: {}", e)))?;
        self.db
            .put_cf(&self.cf(cf_name)?, key, &bytes)
            .map_err(|e| ColloquyError::storage(format!("write failed: {}", e)))
    }

    /// Loads and deserializes the value at the given key, if present.
    pub fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let found = self
            .db
            .get_cf(&self.cf(cf_name)?, key)
            .map_err(|e| ColloquyError::storage(format!("read failed: {}", e)))?;
        match found {
            Some(bytes) => {
                let value: T = bincode::deserialize(&bytes).map_err(|e| {
                    ColloquyError::serialization(format!("row decode failed: {}", e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Deletes a key.
    pub fn delete(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        self.db
            .delete_cf(&self.cf(cf_name)?, key)
            .map_err(|e| ColloquyError::storage(format!("delete failed: {}", e)))
    }

    /// Scans an index column family and returns the key suffix after
    /// `prefix` for every matching entry.
    ///
    /// Index entries carry their payload in the key (`{prefix}:{id}` -> ()),
    /// so the suffixes are the record ids under that prefix.
    pub fn key_suffixes(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let mut suffixes = Vec::new();
        for item in self.db.prefix_iterator_cf(&cf, prefix) {
            let (key, _) =
                item.map_err(|e| ColloquyError::storage(format!("iterator failed: {}", e)))?;
            if !key.starts_with(prefix) {
                break;
            }
            suffixes.push(key[prefix.len()..].to_vec());
        }
        debug!(
            cf = cf_name,
            prefix_len = prefix.len(),
            matched = suffixes.len(),
            "index prefix scan"
        );
        Ok(suffixes)
    }

    /// Scans every row in a column family, deserializing each and passing it
    /// to the callback. The callback returns `false` to stop early.
    pub fn for_each_row<T, F>(&self, cf_name: &str, mut callback: F) -> Result<()>
    where
        T: DeserializeOwned,
        F: FnMut(T) -> bool,
    {
        let cf = self.cf(cf_name)?;
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_, value) =
                item.map_err(|e| ColloquyError::storage(format!("iterator failed: {}", e)))?;
            let row: T = bincode::deserialize(&value)
                .map_err(|e| ColloquyError::serialization(format!("row decode failed: {}", e)))?;
            if !callback(row) {
                break;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for RocksDbHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbHandle").field("db", &"RocksDB").finish()
    }
}
