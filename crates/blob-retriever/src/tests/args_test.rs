use crate::{setup_signal_handler, Args};
use blob_sync::{RunMode, MAINNET_MIN_BLOB_SLOT};
use clap::Parser;
use std::time::Duration;

#[test]
fn test_defaults() {
    let args = Args::try_parse_from(["blob-retriever", "-b", "http://node:5052", "-d", "/tmp/blobs"]).unwrap();
    assert_eq!(args.run_mode().unwrap(), RunMode::Retrieve);
    assert_eq!(args.worker, 1);
    assert_eq!((args.from, args.to), (0, 0));

    let config = args.sync_config();
    assert_eq!(config.retry_attempts, 5);
    assert_eq!(config.retry_delay, Duration::from_secs(1));
    assert_eq!(config.request_timeout, Duration::from_secs(60));
    assert_eq!(config.min_blob_slot, MAINNET_MIN_BLOB_SLOT);
    assert!(!config.halt_on_mismatch);

    let policy = args.out_of_space_policy();
    assert_eq!(policy.max_waits, 3);
    assert_eq!(policy.interval, Duration::from_secs(20));
}

#[test]
fn test_disk_full_flags() {
    let args = Args::try_parse_from([
        "blob-retriever",
        "-b",
        "http://node:5052",
        "-d",
        "/tmp/blobs",
        "--disk-full-waits",
        "0",
        "--disk-full-wait-secs",
        "5",
    ])
    .unwrap();
    let policy = args.out_of_space_policy();
    assert_eq!(policy.max_waits, 0);
    assert_eq!(policy.interval, Duration::from_secs(5));
}

#[test]
fn test_short_flags() {
    let args = Args::try_parse_from([
        "blob-retriever",
        "-m",
        "check",
        "-b",
        "http://node:5052",
        "-d",
        "/tmp/blobs",
        "-w",
        "8",
        "-f",
        "8626176",
        "-t",
        "8626200",
        "--retry-delay-ms",
        "250",
        "--halt-on-mismatch",
    ])
    .unwrap();
    assert_eq!(args.run_mode().unwrap(), RunMode::Check);
    assert_eq!((args.from, args.to), (8626176, 8626200));

    let config = args.sync_config();
    assert_eq!(config.workers, 8);
    assert_eq!(config.retry_delay, Duration::from_millis(250));
    assert!(config.halt_on_mismatch);
}

#[test]
fn test_unknown_mode_is_rejected() {
    let args = Args::try_parse_from([
        "blob-retriever",
        "--mode",
        "backfill",
        "--beacon-url",
        "http://node:5052",
        "--data",
        "/tmp/blobs",
    ])
    .unwrap();
    assert!(args.run_mode().is_err());
}

#[test]
fn test_beacon_url_is_required() {
    assert!(Args::try_parse_from(["blob-retriever", "-d", "/tmp/blobs"]).is_err());
}

#[tokio::test]
async fn test_signal_handler_setup() {
    let cancel = setup_signal_handler();
    assert!(!cancel.is_cancelled());
}
