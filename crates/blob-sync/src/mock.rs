//! Mock implementations for testing

use alloy_primitives::Bytes;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::{
    BeaconNodeAdapter, BlobStorageEngine, BlockHeaderInfo, BlockId, Root, Slot, SyncError,
    SyncResult, WireBeaconBlockHeader, WireBlobSidecar, WireSignedBeaconBlockHeader,
    KZG_COMMITMENT_INCLUSION_PROOF_DEPTH,
};

/// Build a small but fully populated sidecar whose bytes depend on `slot`
/// and `index`. The blob is short; canonicalization pads it.
pub fn sample_sidecar(slot: Slot, index: u64) -> WireBlobSidecar {
    let seed = (slot as u8) ^ (index as u8).wrapping_mul(31);
    WireBlobSidecar {
        index,
        blob: Bytes::from((0..256u32).map(|i| seed.wrapping_add(i as u8)).collect::<Vec<u8>>()),
        kzg_commitment: Bytes::from(vec![seed ^ 0xc0; 48]),
        kzg_proof: Bytes::from(vec![seed ^ 0x0f; 48]),
        signed_block_header: Some(sample_signed_header(slot)),
        kzg_commitment_inclusion_proof: (0..KZG_COMMITMENT_INCLUSION_PROOF_DEPTH)
            .map(|level| Bytes::from(vec![seed.wrapping_add(level as u8); 32]))
            .collect(),
    }
}

pub fn sample_signed_header(slot: Slot) -> WireSignedBeaconBlockHeader {
    WireSignedBeaconBlockHeader {
        message: WireBeaconBlockHeader {
            slot,
            proposer_index: slot % 1000,
            parent_root: Bytes::from(vec![0x01; 32]),
            state_root: Bytes::from(vec![0x02; 32]),
            body_root: Bytes::from(vec![0x03; 32]),
        },
        signature: Bytes::from(vec![0xaa; 96]),
    }
}

#[derive(Debug, Clone)]
struct MockBlock {
    header: BlockHeaderInfo,
    sidecars: Vec<WireBlobSidecar>,
}

/// Remaining forced failures; `None` fails forever.
type FailureBudget = Option<u32>;

/// Mock beacon node for testing.
///
/// Slots without an added block answer `NotFound`. Failures can be injected
/// per slot (header lookups) or per root (sidecar lookups), and every call can
/// be delayed to exercise timeouts and worker concurrency.
#[derive(Debug, Clone, Default)]
pub struct MockBeaconNode {
    blocks: Arc<RwLock<HashMap<Slot, MockBlock>>>,
    header_failures: Arc<RwLock<HashMap<Slot, FailureBudget>>>,
    sidecar_failures: Arc<RwLock<HashMap<Root, FailureBudget>>>,
    sidecars_not_found: Arc<RwLock<HashSet<Root>>>,
    header_calls: Arc<RwLock<HashMap<Slot, usize>>>,
    sidecar_calls: Arc<AtomicUsize>,
    latency: Arc<RwLock<Duration>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockBeaconNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&self, slot: Slot, root: Root, sidecars: Vec<WireBlobSidecar>) {
        let header = BlockHeaderInfo {
            root,
            canonical: true,
            header: sample_signed_header(slot),
        };
        self.blocks
            .write()
            .unwrap()
            .insert(slot, MockBlock { header, sidecars });
    }

    /// Fail header lookups for `slot`, `times` times or forever.
    pub fn fail_header(&self, slot: Slot, times: Option<u32>) {
        self.header_failures.write().unwrap().insert(slot, times);
    }

    /// Fail sidecar lookups for `root`, `times` times or forever.
    pub fn fail_sidecars(&self, root: Root, times: Option<u32>) {
        self.sidecar_failures.write().unwrap().insert(root, times);
    }

    pub fn set_sidecars_not_found(&self, root: Root) {
        self.sidecars_not_found.write().unwrap().insert(root);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write().unwrap() = latency;
    }

    pub fn header_calls(&self, slot: Slot) -> usize {
        self.header_calls
            .read()
            .unwrap()
            .get(&slot)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_header_calls(&self) -> usize {
        self.header_calls.read().unwrap().values().sum()
    }

    pub fn sidecar_calls(&self) -> usize {
        self.sidecar_calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in flight at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_failure<K: std::hash::Hash + Eq>(
        failures: &RwLock<HashMap<K, FailureBudget>>,
        key: &K,
    ) -> bool {
        let mut failures = failures.write().unwrap();
        match failures.get_mut(key) {
            Some(None) => true,
            Some(Some(0)) => false,
            Some(Some(remaining)) => {
                *remaining -= 1;
                true
            }
            None => false,
        }
    }

    async fn simulate_call(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let latency = *self.latency.read().unwrap();
        let _guard = InFlightGuard(self.in_flight.clone());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        } else {
            tokio::task::yield_now().await;
        }
    }

    fn block_by_id(&self, block_id: &BlockId) -> Option<MockBlock> {
        let blocks = self.blocks.read().unwrap();
        match block_id {
            BlockId::Slot(slot) => blocks.get(slot).cloned(),
            BlockId::Root(root) => blocks.values().find(|b| b.header.root == *root).cloned(),
        }
    }
}

/// Decrements the in-flight counter even when the call future is dropped.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BeaconNodeAdapter for MockBeaconNode {
    async fn get_block_header(&self, block_id: &BlockId) -> SyncResult<BlockHeaderInfo> {
        if let BlockId::Slot(slot) = block_id {
            *self.header_calls.write().unwrap().entry(*slot).or_insert(0) += 1;
        }
        self.simulate_call().await;

        if let BlockId::Slot(slot) = block_id {
            if Self::take_failure(&self.header_failures, slot) {
                return Err(SyncError::BeaconNode(format!(
                    "injected failure for header {}",
                    block_id
                )));
            }
        }

        self.block_by_id(block_id)
            .map(|block| block.header)
            .ok_or_else(|| SyncError::NotFound(format!("block {}", block_id)))
    }

    async fn get_blob_sidecars(&self, block_id: &BlockId) -> SyncResult<Vec<WireBlobSidecar>> {
        self.sidecar_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_call().await;

        if let BlockId::Root(root) = block_id {
            if Self::take_failure(&self.sidecar_failures, root) {
                return Err(SyncError::BeaconNode(format!(
                    "injected failure for sidecars {}",
                    block_id
                )));
            }
            if self.sidecars_not_found.read().unwrap().contains(root) {
                return Err(SyncError::NotFound(format!("blob sidecars {}", block_id)));
            }
        }

        self.block_by_id(block_id)
            .map(|block| block.sidecars)
            .ok_or_else(|| SyncError::NotFound(format!("block {}", block_id)))
    }
}

/// In-memory storage engine for testing
///
/// Besides blanket read/write failures it can fail writes of one sidecar
/// index, delay every write, and track how many writes were attempted and
/// how many overlapped.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobEngine {
    data: Arc<RwLock<BTreeMap<(Root, u64), Vec<u8>>>>,
    writes: Arc<AtomicUsize>,
    put_attempts: Arc<RwLock<Vec<(Root, u64)>>>,
    fail_writes: Arc<AtomicBool>,
    fail_write_index: Arc<RwLock<Option<u64>>>,
    fail_reads: Arc<AtomicBool>,
    write_latency: Arc<RwLock<Duration>>,
    in_flight_writes: Arc<AtomicUsize>,
    max_in_flight_writes: Arc<AtomicUsize>,
}

impl MemoryBlobEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self, root: &Root, index: u64) -> Option<Vec<u8>> {
        self.data.read().unwrap().get(&(*root, index)).cloned()
    }

    /// Number of successful writes (no-op saves are not counted)
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Corrupt one stored byte to simulate on-disk damage.
    pub fn flip_byte(&self, root: &Root, index: u64, offset: usize) {
        if let Some(bytes) = self.data.write().unwrap().get_mut(&(*root, index)) {
            bytes[offset] ^= 0xff;
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail every write of sidecar `index`, for any root.
    pub fn fail_writes_at(&self, index: u64) {
        *self.fail_write_index.write().unwrap() = Some(index);
    }

    /// Every `put` call in order, including failed and no-op ones
    pub fn put_attempts(&self) -> Vec<(Root, u64)> {
        self.put_attempts.read().unwrap().clone()
    }

    pub fn set_write_latency(&self, latency: Duration) {
        *self.write_latency.write().unwrap() = latency;
    }

    /// Highest number of writes that were in flight at the same time
    pub fn max_in_flight_writes(&self) -> usize {
        self.max_in_flight_writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> SyncResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::Storage("injected read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStorageEngine for MemoryBlobEngine {
    async fn put(&self, root: &Root, index: u64, bytes: &[u8]) -> SyncResult<bool> {
        self.put_attempts.write().unwrap().push((*root, index));
        let current = self.in_flight_writes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_writes.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(self.in_flight_writes.clone());
        let latency = *self.write_latency.read().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.fail_writes.load(Ordering::SeqCst)
            || *self.fail_write_index.read().unwrap() == Some(index)
        {
            return Err(SyncError::Storage("injected write failure".to_string()));
        }
        let mut data = self.data.write().unwrap();
        if data.contains_key(&(*root, index)) {
            return Ok(false);
        }
        data.insert((*root, index), bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn get(&self, root: &Root, index: u64) -> SyncResult<Option<Vec<u8>>> {
        self.check_reads()?;
        Ok(self.raw(root, index))
    }

    async fn exists_any(&self, root: &Root) -> SyncResult<bool> {
        self.check_reads()?;
        let data = self.data.read().unwrap();
        Ok(data.range((*root, 0)..=(*root, u64::MAX)).next().is_some())
    }

    async fn indices(&self, root: &Root) -> SyncResult<Vec<u64>> {
        self.check_reads()?;
        let data = self.data.read().unwrap();
        Ok(data
            .range((*root, 0)..=(*root, u64::MAX))
            .map(|((_, index), _)| *index)
            .collect())
    }
}
