//! # Slot-Range Sync Engine
//!
//! [`BlobSync`] walks an inclusive slot range and, for every slot, fetches the
//! block root and blob sidecars from a [`BeaconNodeAdapter`] and either stores
//! them ([`RunMode::Retrieve`]) or compares them with the stored copies
//! ([`RunMode::Check`]).
//!
//! ## Pipeline
//!
//! - **Feeder**: pushes every slot of the normalised range into a bounded
//!   queue (`workers * QUEUE_DEPTH_PER_WORKER` entries).
//! - **Workers**: `workers` tasks in a [`JoinSet`] share the queue receiver
//!   and run one slot at a time. Within a slot, sidecars are handled in the
//!   order the node returned them.
//! - **Aggregator**: the caller of [`BlobSync::run`] folds the per-slot
//!   [`SlotReport`]s into a [`RunSummary`] once the pool drains.
//!
//! ## Failure isolation
//!
//! A failing slot never affects its siblings. Fetch and storage errors end as
//! [`SlotOutcome::Fatal`], mismatches as [`SlotOutcome::VerifiedFailed`]. Only
//! an invalid [`SyncConfig`] makes `run` itself return an error. With
//! `halt_on_mismatch` set, the first failed verification cancels the rest of
//! the run.
//!
//! ## Cancellation
//!
//! The caller's [`CancellationToken`] is checked before each slot, during
//! fetch retries, and between sidecars. Slots still queued are never started
//! and are counted as `not_started`; slots in flight report
//! [`SlotOutcome::Cancelled`].
//!
//! ```rust,ignore
//! use blob_sync::*;
//!
//! let engine = BlobSync::new(node, BlobStore::new(engine), SyncConfig::default());
//! let summary = engine
//!     .run(RunMode::Retrieve, 8626176, 8626200, CancellationToken::new())
//!     .await?;
//! println!("{}", summary);
//! ```

use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    BeaconNodeAdapter, ChainFetcher, Root, RunMode, RunSummary, SidecarStore, Slot, SlotOutcome,
    SlotReport, SyncConfig, SyncResult, WireBlobSidecar, QUEUE_DEPTH_PER_WORKER,
};

/// Blob sidecar sync engine over a beacon node and a sidecar store.
pub struct BlobSync<N, S>
where
    N: BeaconNodeAdapter,
    S: SidecarStore,
{
    fetcher: Arc<ChainFetcher<N>>,
    store: Arc<S>,
    config: SyncConfig,
}

impl<N, S> BlobSync<N, S>
where
    N: BeaconNodeAdapter + 'static,
    S: SidecarStore + 'static,
{
    /// Create a new sync engine
    pub fn new(node: N, store: S, config: SyncConfig) -> Self {
        Self::from_shared(Arc::new(node), Arc::new(store), config)
    }

    /// Create a sync engine over adapters that are shared with the caller
    pub fn from_shared(node: Arc<N>, store: Arc<S>, config: SyncConfig) -> Self {
        let fetcher = ChainFetcher::new(node, (&config).into());
        Self {
            fetcher: Arc::new(fetcher),
            store,
            config,
        }
    }

    /// Get a reference to the node adapter
    pub fn node(&self) -> &Arc<N> {
        self.fetcher.node()
    }

    /// Get a reference to the sidecar store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Apply the minimum blob slot and make sure `to >= from`.
    pub fn normalize_range(&self, from: Slot, to: Slot) -> (Slot, Slot) {
        let mut from = from;
        if from < self.config.min_blob_slot {
            warn!(
                "From slot {} precedes the first blob slot, starting at {}",
                from, self.config.min_blob_slot
            );
            from = self.config.min_blob_slot;
        }
        let mut to = to;
        if to < from {
            warn!("To slot {} precedes from slot {}, syncing slot {} only", to, from, from);
            to = from;
        }
        (from, to)
    }

    /// Process every slot in `[from, to]` and return the per-outcome counts.
    ///
    /// # Errors
    /// Only [`SyncError::Config`](crate::SyncError::Config), before any slot is
    /// scheduled. Per-slot failures are reported in the summary.
    pub async fn run(
        &self,
        mode: RunMode,
        from: Slot,
        to: Slot,
        cancel: CancellationToken,
    ) -> SyncResult<RunSummary> {
        self.config.validate()?;
        let (from, to) = self.normalize_range(from, to);
        let workers = self.config.worker_count();

        info!(
            "Starting {} run over slots {}..={} with {} workers",
            mode, from, to, workers
        );

        // Halting on mismatch must not cancel the caller's token.
        let run_token = cancel.child_token();

        let (slot_sender, slot_receiver) = mpsc::channel::<Slot>(workers * QUEUE_DEPTH_PER_WORKER);
        let (report_sender, mut report_receiver) = mpsc::unbounded_channel::<SlotReport>();

        let feeder_handle = {
            let token = run_token.clone();
            tokio::spawn(async move {
                for slot in from..=to {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        sent = slot_sender.send(slot) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                debug!("Slot feeder completed");
            })
        };

        let slot_receiver = Arc::new(Mutex::new(slot_receiver));
        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let worker = self.clone_for_processing();
            let slots = slot_receiver.clone();
            let reports = report_sender.clone();
            let token = run_token.clone();

            pool.spawn(async move {
                loop {
                    let next = {
                        let mut slots = slots.lock().await;
                        tokio::select! {
                            _ = token.cancelled() => None,
                            slot = slots.recv() => slot,
                        }
                    };
                    let Some(slot) = next else { break };
                    if token.is_cancelled() {
                        break;
                    }

                    let report = worker.process_slot(mode, slot, &token).await;
                    if reports.send(report).is_err() {
                        break;
                    }
                }
                debug!("Worker {} completed", worker_id);
            });
        }
        drop(slot_receiver);
        drop(report_sender);

        let mut summary = RunSummary::new(from, to);
        while let Some(report) = report_receiver.recv().await {
            summary.record(&report);

            if self.config.halt_on_mismatch
                && matches!(report.outcome, SlotOutcome::VerifiedFailed { .. })
                && !run_token.is_cancelled()
            {
                error!(
                    "Halting run: slot {} failed verification",
                    report.slot
                );
                summary.halted = true;
                run_token.cancel();
            }
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }
        if let Err(e) = feeder_handle.await {
            error!("Slot feeder failed: {}", e);
        }

        summary.interrupted = cancel.is_cancelled();
        summary.not_started = summary.total_slots().saturating_sub(summary.processed());

        if summary.is_clean() {
            info!("Finished {} run: {}", mode, summary);
        } else {
            warn!("Finished {} run with failures: {}", mode, summary);
            if !summary.failed_slots.is_empty() {
                warn!("Failed slots: {:?}", summary.failed_slots);
            }
        }
        Ok(summary)
    }

    /// Run a single slot task outside the worker pool.
    pub async fn process_slot(&self, mode: RunMode, slot: Slot) -> SlotReport {
        self.clone_for_processing()
            .process_slot(mode, slot, &CancellationToken::new())
            .await
    }

    /// Verify one stored sidecar of `slot` against the beacon node.
    ///
    /// Returns `Ok(false)` when the slot has no block or the block has no
    /// sidecar with `index`.
    pub async fn check_sidecar(&self, slot: Slot, index: u64) -> SyncResult<bool> {
        let Some(block) = self.fetcher.fetch(slot, &CancellationToken::new()).await? else {
            return Ok(false);
        };
        match block.sidecars.iter().find(|sidecar| sidecar.index == index) {
            Some(sidecar) => self.store.valid(&block.header.root, sidecar).await,
            None => {
                debug!("Slot {} has no blob sidecar with index {}", slot, index);
                Ok(false)
            }
        }
    }

    fn clone_for_processing(&self) -> SlotWorker<N, S> {
        SlotWorker {
            fetcher: self.fetcher.clone(),
            store: self.store.clone(),
        }
    }
}

/// Per-task handle on the engine's shared adapters
struct SlotWorker<N, S> {
    fetcher: Arc<ChainFetcher<N>>,
    store: Arc<S>,
}

impl<N, S> SlotWorker<N, S>
where
    N: BeaconNodeAdapter,
    S: SidecarStore,
{
    async fn process_slot(&self, mode: RunMode, slot: Slot, cancel: &CancellationToken) -> SlotReport {
        let block = match self.fetcher.fetch(slot, cancel).await {
            Ok(Some(block)) => block,
            Ok(None) => {
                debug!("Slot {}: no block, skipping", slot);
                return SlotReport::new(slot, None, SlotOutcome::SkippedNoBlock);
            }
            Err(e) if e.is_cancelled() => {
                return SlotReport::new(slot, None, SlotOutcome::Cancelled);
            }
            Err(e) => {
                error!("Slot {}: fetch failed: {}", slot, e);
                return SlotReport::new(slot, None, SlotOutcome::Fatal { error: e.to_string() });
            }
        };

        let root = block.header.root;
        if block.sidecars.is_empty() {
            debug!("Slot {} ({}): no blob sidecars, skipping", slot, root);
            return SlotReport::new(slot, Some(root), SlotOutcome::SkippedNoSidecars);
        }

        let outcome = match mode {
            RunMode::Retrieve => self.retrieve(slot, &root, &block.sidecars, cancel).await,
            RunMode::Check => self.check(slot, &root, &block.sidecars, cancel).await,
        };
        SlotReport::new(slot, Some(root), outcome)
    }

    async fn retrieve(
        &self,
        slot: Slot,
        root: &Root,
        sidecars: &[WireBlobSidecar],
        cancel: &CancellationToken,
    ) -> SlotOutcome {
        match self.store.exist(root).await {
            Ok(true) => {
                debug!("Slot {} ({}): already stored, skipping", slot, root);
                return SlotOutcome::SkippedExisting;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Slot {} ({}): failed to query store: {}", slot, root, e);
                return SlotOutcome::Fatal { error: e.to_string() };
            }
        }

        for sidecar in sidecars {
            if cancel.is_cancelled() {
                warn!("Slot {} ({}): cancelled before sidecar {}", slot, root, sidecar.index);
                return SlotOutcome::Cancelled;
            }
            if let Err(e) = self.store.save(root, sidecar).await {
                error!(
                    "Slot {} ({}): failed to save sidecar {}: {}",
                    slot, root, sidecar.index, e
                );
                return SlotOutcome::Fatal {
                    error: format!("sidecar {}: {}", sidecar.index, e),
                };
            }
        }

        info!("Slot {} ({}): saved {} blob sidecars", slot, root, sidecars.len());
        SlotOutcome::Saved { count: sidecars.len() }
    }

    async fn check(
        &self,
        slot: Slot,
        root: &Root,
        sidecars: &[WireBlobSidecar],
        cancel: &CancellationToken,
    ) -> SlotOutcome {
        for sidecar in sidecars {
            if cancel.is_cancelled() {
                warn!("Slot {} ({}): cancelled before sidecar {}", slot, root, sidecar.index);
                return SlotOutcome::Cancelled;
            }
            match self.store.valid(root, sidecar).await {
                Ok(true) => {}
                Ok(false) => {
                    error!(
                        "Slot {} ({}): blob sidecar {} does not match the stored copy",
                        slot, root, sidecar.index
                    );
                    return SlotOutcome::VerifiedFailed {
                        index: sidecar.index,
                        reason: "mismatch".to_string(),
                    };
                }
                Err(e) => {
                    error!(
                        "Slot {} ({}): cannot verify blob sidecar {}: {}",
                        slot, root, sidecar.index, e
                    );
                    return SlotOutcome::VerifiedFailed {
                        index: sidecar.index,
                        reason: e.to_string(),
                    };
                }
            }
        }

        info!("Slot {} ({}): verified {} blob sidecars", slot, root, sidecars.len());
        SlotOutcome::VerifiedOk { count: sidecars.len() }
    }
}
