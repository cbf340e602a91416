//! Error types for blob-sync

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The beacon node or the local store has nothing under the requested key.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Beacon node error: {0}")]
    BeaconNode(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }

    /// Not-found and cancellation end a retry loop immediately; everything else
    /// is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !self.is_not_found() && !self.is_cancelled()
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SyncError::NotFound("slot 1".into()).is_not_found());
        assert!(!SyncError::NotFound("slot 1".into()).is_retryable());
        assert!(SyncError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(SyncError::BeaconNode("503".into()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }
}
