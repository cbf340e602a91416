//! Shared fixtures for the end-to-end tests

use async_trait::async_trait;
use blob_sync::mock::{sample_sidecar, MockBeaconNode};
use blob_sync::{
    CanonicalBlobSidecar, Root, SidecarStore, Slot, SyncConfig, SyncResult, WireBlobSidecar,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;


/// First mainnet slot that can carry blobs, used as the scenario anchor.
pub const DENEB_SLOT: Slot = 8_626_176;

/// Builds a mock beacon chain with deterministic roots.
pub struct TestChain {
    node: MockBeaconNode,
}

impl TestChain {
    pub fn new() -> Self {
        Self {
            node: MockBeaconNode::new(),
        }
    }

    /// Deterministic non-zero root for `slot`
    pub fn root(slot: Slot) -> Root {
        let mut bytes = [0x5au8; 32];
        bytes[24..].copy_from_slice(&slot.to_be_bytes());
        Root::new(bytes)
    }

    pub fn sidecars(slot: Slot, count: u64) -> Vec<WireBlobSidecar> {
        (0..count).map(|index| sample_sidecar(slot, index)).collect()
    }

    /// Add a block with `count` sidecars at `slot`.
    pub fn with_block(self, slot: Slot, count: u64) -> Self {
        self.node
            .add_block(slot, Self::root(slot), Self::sidecars(slot, count));
        self
    }

    pub fn with_blocks(self, slots: impl IntoIterator<Item = Slot>, count: u64) -> Self {
        slots
            .into_iter()
            .fold(self, |chain, slot| chain.with_block(slot, count))
    }

    pub fn node(&self) -> MockBeaconNode {
        self.node.clone()
    }
}

impl Default for TestChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine configuration with short retry delays.
pub fn fast_config(workers: usize) -> SyncConfig {
    SyncConfig {
        workers,
        retry_attempts: 5,
        retry_delay: Duration::from_millis(2),
        request_timeout: Duration::from_secs(5),
        ..SyncConfig::default()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Sidecar store wrapper that counts calls into the inner store.
#[derive(Clone)]
pub struct CountingStore<S> {
    inner: Arc<S>,
    saves: Arc<AtomicUsize>,
    validations: Arc<AtomicUsize>,
}

impl<S: SidecarStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Arc::new(inner),
            saves: Arc::new(AtomicUsize::new(0)),
            validations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Successful save calls
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: SidecarStore> SidecarStore for CountingStore<S> {
    async fn exist(&self, root: &Root) -> SyncResult<bool> {
        self.inner.exist(root).await
    }

    async fn save(&self, root: &Root, sidecar: &WireBlobSidecar) -> SyncResult<()> {
        self.inner.save(root, sidecar).await?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, root: &Root, index: u64) -> SyncResult<CanonicalBlobSidecar> {
        self.inner.get(root, index).await
    }

    async fn valid(&self, root: &Root, sidecar: &WireBlobSidecar) -> SyncResult<bool> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        self.inner.valid(root, sidecar).await
    }
}
