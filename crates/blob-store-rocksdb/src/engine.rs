//! RocksDB-backed [`BlobStorageEngine`].
//!
//! Keys are `root (32 bytes) || index (u64, big-endian)`, so all sidecars of
//! a block sit next to each other in index order and a prefix scan over the
//! root answers `exists_any` and `indices`. Values are the canonical sidecar
//! bytes.

use anyhow::Result;
use async_trait::async_trait;
use blob_sync::{BlobStorageEngine, Root, SyncError, SyncResult};
use log::{debug, info};
use rocksdb::{Options, WriteOptions, DB};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::retry::{with_retry, OutOfSpacePolicy};

pub const KEY_LENGTH: usize = 32 + 8;

/// Number of write lock shards; sidecars of one root always share a shard.
pub const WRITE_LOCK_SHARDS: usize = 16;

pub fn sidecar_key(root: &Root, index: u64) -> [u8; KEY_LENGTH] {
    let mut key = [0u8; KEY_LENGTH];
    key[..32].copy_from_slice(root.as_bytes());
    key[32..].copy_from_slice(&index.to_be_bytes());
    key
}

/// Default options for a blob sidecar database
pub fn blob_store_options() -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.set_write_buffer_size(64 * 1024 * 1024);
    opts.set_max_write_buffer_number(4);
    opts
}

#[derive(Clone)]
pub struct RocksDbBlobEngine {
    db: Arc<DB>,
    // check-then-put on one key must not interleave, or two workers could both write it
    write_locks: Arc<Vec<Mutex<()>>>,
    out_of_space: OutOfSpacePolicy,
}

impl RocksDbBlobEngine {
    pub fn new(db: Arc<DB>) -> Self {
        Self {
            db,
            write_locks: Arc::new((0..WRITE_LOCK_SHARDS).map(|_| Mutex::new(())).collect()),
            out_of_space: OutOfSpacePolicy::default(),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P, opts: Options) -> Result<Self> {
        let db = DB::open(&opts, path.as_ref())?;
        info!("Opened blob store at {}", path.as_ref().display());
        Ok(Self::new(Arc::new(db)))
    }

    /// Open (or create) a database with [`blob_store_options`].
    pub fn open_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path, blob_store_options())
    }

    pub fn with_out_of_space_policy(mut self, policy: OutOfSpacePolicy) -> Self {
        self.out_of_space = policy;
        self
    }

    pub fn out_of_space_policy(&self) -> OutOfSpacePolicy {
        self.out_of_space
    }

    fn scan_indices(&self, root: &Root, limit: Option<usize>) -> SyncResult<Vec<u64>> {
        let prefix = root.as_bytes();
        let mut iter = self.db.raw_iterator();
        iter.seek(prefix);

        let mut indices = Vec::new();
        while iter.valid() {
            let Some(key) = iter.key() else { break };
            if !key.starts_with(prefix) {
                break;
            }
            let index_bytes: [u8; 8] = key[32..]
                .try_into()
                .map_err(|_| SyncError::Storage(format!("Malformed sidecar key under {}", root)))?;
            indices.push(u64::from_be_bytes(index_bytes));
            if limit.is_some_and(|limit| indices.len() >= limit) {
                break;
            }
            iter.next();
        }
        iter.status()
            .map_err(|e| SyncError::Storage(format!("Database error: {}", e)))?;
        Ok(indices)
    }
}

fn write_shard(root: &Root) -> usize {
    root.as_bytes()[31] as usize % WRITE_LOCK_SHARDS
}

#[async_trait]
impl BlobStorageEngine for RocksDbBlobEngine {
    async fn put(&self, root: &Root, index: u64, bytes: &[u8]) -> SyncResult<bool> {
        let db = self.db.clone();
        let write_locks = self.write_locks.clone();
        let shard = write_shard(root);
        let policy = self.out_of_space;
        let key = sidecar_key(root, index);
        let value = bytes.to_vec();

        let written = tokio::task::spawn_blocking(move || {
            let mut opts = WriteOptions::default();
            opts.set_sync(true);
            // The shard lock is released between out-of-space waits
            with_retry(db.path(), &policy, || -> Result<bool, rocksdb::Error> {
                let _guard = write_locks[shard]
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if db.get_pinned(key)?.is_some() {
                    return Ok(false);
                }
                db.put_opt(key, &value, &opts)?;
                Ok(true)
            })
        })
        .await
        .map_err(|e| SyncError::Storage(format!("Write task failed: {}", e)))?
        .map_err(|e| SyncError::Storage(format!("Failed to store sidecar: {}", e)))?;

        if written {
            debug!("Stored sidecar {} index {} ({} bytes)", root, index, bytes.len());
        }
        Ok(written)
    }

    async fn get(&self, root: &Root, index: u64) -> SyncResult<Option<Vec<u8>>> {
        self.db
            .get(sidecar_key(root, index))
            .map_err(|e| SyncError::Storage(format!("Database error: {}", e)))
    }

    async fn exists_any(&self, root: &Root) -> SyncResult<bool> {
        Ok(!self.scan_indices(root, Some(1))?.is_empty())
    }

    async fn indices(&self, root: &Root) -> SyncResult<Vec<u64>> {
        self.scan_indices(root, None)
    }
}
