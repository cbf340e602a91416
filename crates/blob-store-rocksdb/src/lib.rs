//! RocksDB storage engine for blob sidecars

pub mod engine;
pub mod retry;

pub use engine::{blob_store_options, sidecar_key, RocksDbBlobEngine, KEY_LENGTH, WRITE_LOCK_SHARDS};
pub use retry::{
    is_out_of_space, is_out_of_space_message, with_retry, OutOfSpacePolicy, OUT_OF_SPACE_MAX_WAITS,
    OUT_OF_SPACE_RETRY_INTERVAL,
};

/// Sidecar store over RocksDB, as used by the retriever binary
pub type RocksDbBlobStore = blob_sync::BlobStore<RocksDbBlobEngine>;
