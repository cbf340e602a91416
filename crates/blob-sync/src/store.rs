//! Store gateway: the [`SidecarStore`] contract on top of a [`BlobStorageEngine`].

use async_trait::async_trait;
use log::debug;

use crate::{
    canonicalize, BlobStorageEngine, CanonicalBlobSidecar, Root, SidecarStore, SyncError,
    SyncResult, WireBlobSidecar,
};

/// Sidecar store backed by a storage engine.
#[derive(Debug, Clone)]
pub struct BlobStore<E> {
    engine: E,
}

impl<E: BlobStorageEngine> BlobStore<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Get a reference to the underlying storage engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Stored indices under `root`
    pub async fn indices(&self, root: &Root) -> SyncResult<Vec<u64>> {
        self.engine.indices(root).await
    }
}

#[async_trait]
impl<E: BlobStorageEngine> SidecarStore for BlobStore<E> {
    async fn exist(&self, root: &Root) -> SyncResult<bool> {
        self.engine.exists_any(root).await
    }

    async fn save(&self, root: &Root, sidecar: &WireBlobSidecar) -> SyncResult<()> {
        let canonical = canonicalize(sidecar);
        let written = self
            .engine
            .put(root, canonical.index, &canonical.to_canonical_bytes())
            .await?;
        if !written {
            debug!(
                "Blob sidecar {} index {} already stored, left untouched",
                root, canonical.index
            );
        }
        Ok(())
    }

    async fn get(&self, root: &Root, index: u64) -> SyncResult<CanonicalBlobSidecar> {
        match self.engine.get(root, index).await? {
            Some(bytes) => CanonicalBlobSidecar::from_canonical_bytes(&bytes),
            None => Err(SyncError::NotFound(format!(
                "blob sidecar {} index {}",
                root, index
            ))),
        }
    }

    async fn valid(&self, root: &Root, sidecar: &WireBlobSidecar) -> SyncResult<bool> {
        let fresh = canonicalize(sidecar);
        let stored = self.get(root, fresh.index).await?;
        Ok(fresh.to_canonical_bytes() == stored.to_canonical_bytes())
    }
}
