//! Out-of-space handling for RocksDB writes.

use fs2::free_space;
use log::{error, warn};
use rocksdb::Error as RocksDBError;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

/// Pause between write attempts while the disk is full.
pub const OUT_OF_SPACE_RETRY_INTERVAL: Duration = Duration::from_secs(20);

/// Waits allowed before a disk-full write is reported as a failure.
pub const OUT_OF_SPACE_MAX_WAITS: u32 = 3;

/// How long a write keeps waiting for disk space before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfSpacePolicy {
    pub max_waits: u32,
    pub interval: Duration,
}

impl Default for OutOfSpacePolicy {
    fn default() -> Self {
        Self {
            max_waits: OUT_OF_SPACE_MAX_WAITS,
            interval: OUT_OF_SPACE_RETRY_INTERVAL,
        }
    }
}

pub fn is_out_of_space_message(message: &str) -> bool {
    message.contains("No space left on device")
}

pub fn is_out_of_space(err: &RocksDBError) -> bool {
    is_out_of_space_message(err.as_ref())
}

/// Run a blocking write, waiting out "disk full" failures up to
/// `policy.max_waits` times.
///
/// Any other error, or a disk-full error once the waits are used up, is
/// returned. Must be called from a blocking context; it sleeps the current
/// thread. `operation` should take any locks itself so they are released
/// while waiting.
pub fn with_retry<F, T, E>(path: &Path, policy: &OutOfSpacePolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: AsRef<str>,
{
    let mut waits = 0u32;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if is_out_of_space_message(e.as_ref()) => {
                let free = free_space(path).unwrap_or(0);
                if waits >= policy.max_waits {
                    error!(
                        "Out of space writing to {} ({} bytes free), giving up after {} waits",
                        path.display(),
                        free,
                        waits
                    );
                    return Err(e);
                }
                waits += 1;
                warn!(
                    "Out of space writing to {} ({} bytes free, wait {}/{}). Retrying in {:?}...",
                    path.display(),
                    free,
                    waits,
                    policy.max_waits,
                    policy.interval
                );
                sleep(policy.interval);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISK_FULL: &str = "IO error: No space left on device";

    fn fast_policy(max_waits: u32) -> OutOfSpacePolicy {
        OutOfSpacePolicy {
            max_waits,
            interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_disk_full_classification() {
        assert!(is_out_of_space_message(DISK_FULL));
        assert!(!is_out_of_space_message("IO error: Permission denied"));
        assert!(!is_out_of_space_message("Corruption: bad block"));
    }

    #[test]
    fn test_success_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut calls = 0;
        let value: Result<u32, String> = with_retry(dir.path(), &fast_policy(3), || {
            calls += 1;
            Ok(7)
        });
        assert_eq!(value, Ok(7));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_disk_full_gives_up_after_max_waits() {
        let dir = tempfile::tempdir().unwrap();
        let mut calls = 0;
        let result: Result<(), String> = with_retry(dir.path(), &fast_policy(2), || {
            calls += 1;
            Err(DISK_FULL.to_string())
        });
        assert_eq!(result.unwrap_err(), DISK_FULL);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_disk_full_recovers_when_space_returns() {
        let dir = tempfile::tempdir().unwrap();
        let mut calls = 0;
        let result: Result<bool, String> = with_retry(dir.path(), &fast_policy(3), || {
            calls += 1;
            if calls < 3 {
                Err(DISK_FULL.to_string())
            } else {
                Ok(true)
            }
        });
        assert_eq!(result, Ok(true));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_zero_waits_fails_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut calls = 0;
        let result: Result<(), String> = with_retry(dir.path(), &fast_policy(0), || {
            calls += 1;
            Err(DISK_FULL.to_string())
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_other_errors_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("plain-file");
        std::fs::write(&not_a_dir, b"x").unwrap();

        let mut calls = 0;
        let result = with_retry(dir.path(), &fast_policy(3), || {
            calls += 1;
            rocksdb::DB::open_default(&not_a_dir).map(|_| ())
        });
        let err = result.unwrap_err();
        assert!(!is_out_of_space(&err));
        assert_eq!(calls, 1);
    }
}
