//! # Core Trait Definitions
//!
//! The sync engine talks to the outside world through three seams:
//!
//! ### [`BeaconNodeAdapter`]
//! Read-only access to a beacon node: block headers by slot or root, and the
//! blob sidecars of a block. Implementations report a missing block as
//! [`SyncError::NotFound`](crate::SyncError::NotFound) so the fetcher can tell
//! an empty slot apart from a failing node.
//!
//! ### [`BlobStorageEngine`]
//! The durable key-value engine that holds canonical sidecar bytes under
//! `(root, index)`. Writes never overwrite an existing key.
//!
//! ### [`SidecarStore`]
//! The store contract the engine drives (exist / save / get / valid). The
//! production implementation is [`BlobStore`](crate::BlobStore), which wraps a
//! storage engine and the format adapter.
//!
//! All traits use `async_trait` and require `Send + Sync`: one instance of each
//! is shared by every worker of a run.

use async_trait::async_trait;

use crate::{BlockHeaderInfo, BlockId, CanonicalBlobSidecar, Root, SyncResult, WireBlobSidecar};

/// Trait for beacon node adapters that serve headers and blob sidecars.
#[async_trait]
pub trait BeaconNodeAdapter: Send + Sync {
    /// Get the block header identified by `block_id`.
    ///
    /// # Errors
    /// [`SyncError::NotFound`](crate::SyncError::NotFound) when the node has no
    /// block for the identifier; any other variant for transport or server
    /// failures.
    async fn get_block_header(&self, block_id: &BlockId) -> SyncResult<BlockHeaderInfo>;

    /// Get all blob sidecars of the block identified by `block_id`.
    async fn get_blob_sidecars(&self, block_id: &BlockId) -> SyncResult<Vec<WireBlobSidecar>>;
}

/// Trait for storage engines that persist canonical sidecar bytes.
#[async_trait]
pub trait BlobStorageEngine: Send + Sync {
    /// Store `bytes` under `(root, index)` unless the key already exists.
    ///
    /// Returns `true` when the bytes were written and `false` when the key was
    /// already present (the stored value is left untouched). A successful
    /// write is durable before this returns.
    async fn put(&self, root: &Root, index: u64, bytes: &[u8]) -> SyncResult<bool>;

    /// Get the bytes stored under `(root, index)`
    async fn get(&self, root: &Root, index: u64) -> SyncResult<Option<Vec<u8>>>;

    /// Check whether any index is stored under `root`
    async fn exists_any(&self, root: &Root) -> SyncResult<bool>;

    /// List the stored indices under `root` in ascending order
    async fn indices(&self, root: &Root) -> SyncResult<Vec<u64>>;
}

/// Content-addressed sidecar store driven by the sync engine.
#[async_trait]
pub trait SidecarStore: Send + Sync {
    /// True if any sidecar of `root` is stored.
    async fn exist(&self, root: &Root) -> SyncResult<bool>;

    /// Canonicalize and persist `sidecar`. Saving an existing key is a no-op.
    async fn save(&self, root: &Root, sidecar: &WireBlobSidecar) -> SyncResult<()>;

    /// Load the stored sidecar; `NotFound` if absent.
    async fn get(&self, root: &Root, index: u64) -> SyncResult<CanonicalBlobSidecar>;

    /// Compare the canonical bytes of `sidecar` with the stored copy.
    ///
    /// A missing stored copy is an error, not `false`.
    async fn valid(&self, root: &Root, sidecar: &WireBlobSidecar) -> SyncResult<bool>;
}
