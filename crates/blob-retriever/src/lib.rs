//! # blob-retriever
//!
//! Command-line front end for the `blob-sync` engine. It wires a
//! [`BeaconApiAdapter`] and a RocksDB-backed sidecar store into a
//! [`BlobSync`] engine, runs one slot range in `retrieve` or `check` mode and
//! reports the [`RunSummary`].
//!
//! Every flag has an environment variable fallback, so the binary can be
//! configured entirely from the environment in container deployments.

pub mod adapters;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::adapters::BeaconApiAdapter;
use blob_store_rocksdb::{OutOfSpacePolicy, RocksDbBlobEngine, OUT_OF_SPACE_MAX_WAITS};
use blob_sync::{BlobStore, BlobSync, RunMode, RunSummary, Slot, SyncConfig, MAINNET_MIN_BLOB_SLOT};

/// Command-line arguments for `blob-retriever`.
#[derive(Parser, Debug, Clone)]
#[command(version, about = "Retrieve and verify beacon chain blob sidecars", long_about = None)]
pub struct Args {
    #[arg(short, long, env = "MODE", default_value = "retrieve", help = "Run mode: retrieve or check")]
    pub mode: String,
    #[arg(short, long, env = "BEACON_URL", help = "Beacon node HTTP endpoint")]
    pub beacon_url: String,
    #[arg(short, long, env = "DATA_PATH", help = "Directory of the sidecar database")]
    pub data: PathBuf,
    #[arg(short, long, env = "NUM_WORKER", default_value_t = 1)]
    pub worker: usize,
    #[arg(short, long, env = "FROM_SLOT", default_value_t = 0)]
    pub from: Slot,
    #[arg(short, long, env = "TO_SLOT", default_value_t = 0)]
    pub to: Slot,
    #[arg(long, env = "TIMEOUT_SECS", default_value_t = 60, help = "Timeout per beacon API request")]
    pub timeout: u64,
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 5)]
    pub retry_attempts: u32,
    #[arg(long, env = "RETRY_DELAY_MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,
    #[arg(
        long,
        env = "MIN_BLOB_SLOT",
        default_value_t = MAINNET_MIN_BLOB_SLOT,
        help = "Ranges starting earlier are moved up to this slot (0 disables)"
    )]
    pub min_blob_slot: Slot,
    #[arg(long, env = "HALT_ON_MISMATCH", help = "Stop the run at the first failed verification")]
    pub halt_on_mismatch: bool,
    #[arg(
        long,
        env = "DISK_FULL_WAITS",
        default_value_t = OUT_OF_SPACE_MAX_WAITS,
        help = "Waits for free disk space before a sidecar write fails"
    )]
    pub disk_full_waits: u32,
    #[arg(long, env = "DISK_FULL_WAIT_SECS", default_value_t = 20)]
    pub disk_full_wait_secs: u64,
}

impl Args {
    pub fn run_mode(&self) -> Result<RunMode> {
        Ok(RunMode::from_str(&self.mode)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            workers: self.worker,
            retry_attempts: self.retry_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            request_timeout: self.request_timeout(),
            min_blob_slot: self.min_blob_slot,
            halt_on_mismatch: self.halt_on_mismatch,
        }
    }

    pub fn out_of_space_policy(&self) -> OutOfSpacePolicy {
        OutOfSpacePolicy {
            max_waits: self.disk_full_waits,
            interval: Duration::from_secs(self.disk_full_wait_secs),
        }
    }
}

/// Open the store, connect to the beacon node and run one slot range.
pub async fn run(args: Args, cancel: CancellationToken) -> Result<RunSummary> {
    let mode = args.run_mode()?;
    let config = args.sync_config();
    config.validate()?;

    let node = BeaconApiAdapter::new(&args.beacon_url, args.request_timeout())
        .context("Failed to build beacon API client")?;
    let engine = RocksDbBlobEngine::open_default(&args.data)
        .with_context(|| format!("Failed to open blob store at {}", args.data.display()))?
        .with_out_of_space_policy(args.out_of_space_policy());

    info!(
        "Beacon node {}, blob store {}, {} workers",
        node.base_url(),
        args.data.display(),
        config.worker_count()
    );

    let sync = BlobSync::new(node, BlobStore::new(engine), config);
    let summary = sync.run(mode, args.from, args.to, cancel).await?;
    Ok(summary)
}

/// Cancel the returned token on the first Ctrl-C; exit on the second.
pub fn setup_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        loop {
            match signal::ctrl_c().await {
                Ok(()) => {
                    if token.is_cancelled() {
                        error!("Second interrupt received, exiting immediately");
                        std::process::exit(130);
                    }
                    warn!("Interrupt received, finishing in-flight slots. Press Ctrl-C again to force exit");
                    token.cancel();
                }
                Err(err) => {
                    error!("Error setting up signal handler: {}", err);
                    break;
                }
            }
        }
    });

    cancel
}
