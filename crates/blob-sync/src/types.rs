//! Common types for blob-sync

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{SyncError, WireSignedBeaconBlockHeader};

/// Beacon chain slot number.
pub type Slot = u64;

/// First mainnet slot of the Deneb fork, the earliest slot that can carry blobs.
pub const MAINNET_MIN_BLOB_SLOT: Slot = 8_626_176;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Slots waiting in the task queue per worker before the feeder blocks.
pub const QUEUE_DEPTH_PER_WORKER: usize = 2;

/// Block root. The all-zero root is the "no block at this slot" sentinel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Root(pub B256);

impl Root {
    pub const ZERO: Root = Root(B256::ZERO);

    pub fn new(bytes: [u8; 32]) -> Self {
        Root(B256::new(bytes))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }
}

impl From<[u8; 32]> for Root {
    fn from(bytes: [u8; 32]) -> Self {
        Root::new(bytes)
    }
}

impl FromStr for Root {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut bytes)?;
        Ok(Root::new(bytes))
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.as_bytes()))
    }
}

/// Identifier accepted by the beacon API `{block_id}` path parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockId {
    Slot(Slot),
    Root(Root),
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockId::Slot(slot) => write!(f, "{}", slot),
            BlockId::Root(root) => write!(f, "{}", root),
        }
    }
}

/// Block header as returned by `/eth/v1/beacon/headers/{block_id}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeaderInfo {
    pub root: Root,
    #[serde(default)]
    pub canonical: bool,
    pub header: WireSignedBeaconBlockHeader,
}

impl BlockHeaderInfo {
    pub fn slot(&self) -> Slot {
        self.header.message.slot
    }
}

/// What a run does with the sidecars it fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunMode {
    /// Fetch and persist sidecars that are not stored yet.
    Retrieve,
    /// Re-fetch sidecars and compare them against the stored bytes.
    Check,
}

impl FromStr for RunMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retrieve" => Ok(RunMode::Retrieve),
            "check" => Ok(RunMode::Check),
            other => Err(SyncError::Config(format!(
                "unknown run mode '{}' (expected 'retrieve' or 'check')",
                other
            ))),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Retrieve => f.write_str("retrieve"),
            RunMode::Check => f.write_str("check"),
        }
    }
}

/// Configuration for the sync engine, built once at startup.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Number of concurrent slot workers (clamped to at least 1)
    pub workers: usize,
    /// Attempts per beacon API lookup, including the first one
    pub retry_attempts: u32,
    /// Fixed pause between attempts
    pub retry_delay: Duration,
    /// Timeout applied to every beacon API call
    pub request_timeout: Duration,
    /// Ranges starting below this slot are moved up to it; 0 disables the clamp
    pub min_blob_slot: Slot,
    /// Cancel the whole run on the first failed verification
    pub halt_on_mismatch: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            min_blob_slot: MAINNET_MIN_BLOB_SLOT,
            halt_on_mismatch: false,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.retry_attempts == 0 {
            return Err(SyncError::Config(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(SyncError::Config(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }
}

/// Terminal result of one slot task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotOutcome {
    /// The beacon node has no block at this slot
    SkippedNoBlock,
    /// The block carries no blob sidecars
    SkippedNoSidecars,
    /// The store already holds sidecars for this root
    SkippedExisting,
    /// All sidecars were written
    Saved { count: usize },
    /// All sidecars matched the stored bytes
    VerifiedOk { count: usize },
    /// The sidecar at `index` mismatched or could not be verified
    VerifiedFailed { index: u64, reason: String },
    /// Fetch or storage failure that ended this slot's task
    Fatal { error: String },
    /// The run was cancelled while this slot was in flight
    Cancelled,
}

impl SlotOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SlotOutcome::VerifiedFailed { .. } | SlotOutcome::Fatal { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotReport {
    pub slot: Slot,
    pub root: Option<Root>,
    pub outcome: SlotOutcome,
}

impl SlotReport {
    pub fn new(slot: Slot, root: Option<Root>, outcome: SlotOutcome) -> Self {
        Self { slot, root, outcome }
    }
}

/// Per-outcome counters for a finished run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub from_slot: Slot,
    pub to_slot: Slot,
    pub skipped_no_block: u64,
    pub skipped_no_sidecars: u64,
    pub skipped_existing: u64,
    pub saved: u64,
    pub sidecars_saved: u64,
    pub verified_ok: u64,
    pub verified_failed: u64,
    pub fatal: u64,
    pub cancelled: u64,
    /// Slots that were queued but never started because the run was cancelled
    pub not_started: u64,
    /// Slots with a `Fatal` or `VerifiedFailed` outcome, in completion order
    pub failed_slots: Vec<Slot>,
    /// Set when `halt_on_mismatch` stopped the run early
    pub halted: bool,
    /// Set when the caller's cancellation token fired during the run
    pub interrupted: bool,
}

impl RunSummary {
    pub fn new(from_slot: Slot, to_slot: Slot) -> Self {
        Self {
            from_slot,
            to_slot,
            ..Default::default()
        }
    }

    pub fn record(&mut self, report: &SlotReport) {
        match &report.outcome {
            SlotOutcome::SkippedNoBlock => self.skipped_no_block += 1,
            SlotOutcome::SkippedNoSidecars => self.skipped_no_sidecars += 1,
            SlotOutcome::SkippedExisting => self.skipped_existing += 1,
            SlotOutcome::Saved { count } => {
                self.saved += 1;
                self.sidecars_saved += *count as u64;
            }
            SlotOutcome::VerifiedOk { .. } => self.verified_ok += 1,
            SlotOutcome::VerifiedFailed { .. } => self.verified_failed += 1,
            SlotOutcome::Fatal { .. } => self.fatal += 1,
            SlotOutcome::Cancelled => self.cancelled += 1,
        }
        if report.outcome.is_failure() {
            self.failed_slots.push(report.slot);
        }
    }

    pub fn skipped(&self) -> u64 {
        self.skipped_no_block + self.skipped_no_sidecars + self.skipped_existing
    }

    /// Number of slots that reached a terminal outcome.
    pub fn processed(&self) -> u64 {
        self.skipped()
            + self.saved
            + self.verified_ok
            + self.verified_failed
            + self.fatal
            + self.cancelled
    }

    pub fn total_slots(&self) -> u64 {
        self.to_slot.saturating_sub(self.from_slot).saturating_add(1)
    }

    /// True when every slot finished without a fatal error or failed
    /// verification and the run was not cut short.
    pub fn is_clean(&self) -> bool {
        self.fatal == 0
            && self.verified_failed == 0
            && self.cancelled == 0
            && self.not_started == 0
            && !self.halted
            && !self.interrupted
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slots {}..={}: saved={} ({} sidecars) verified_ok={} verified_failed={} \
             skipped={} (no_block={} no_sidecars={} existing={}) fatal={} cancelled={} not_started={}",
            self.from_slot,
            self.to_slot,
            self.saved,
            self.sidecars_saved,
            self.verified_ok,
            self.verified_failed,
            self.skipped(),
            self.skipped_no_block,
            self.skipped_no_sidecars,
            self.skipped_existing,
            self.fatal,
            self.cancelled,
            self.not_started,
        )
    }
}
