//! Retry-wrapped retrieval of a slot's header and blob sidecars.

use log::{debug, error, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::{
    BeaconNodeAdapter, BlockHeaderInfo, BlockId, Slot, SyncConfig, SyncError, SyncResult,
    WireBlobSidecar,
};

/// Fixed-delay retry policy for beacon API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl From<&SyncConfig> for RetryPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            delay: config.retry_delay,
            timeout: config.request_timeout,
        }
    }
}

/// A block that exists at the requested slot, with its sidecars.
#[derive(Debug, Clone)]
pub struct FetchedBlock {
    pub header: BlockHeaderInfo,
    pub sidecars: Vec<WireBlobSidecar>,
}

pub struct ChainFetcher<N> {
    node: Arc<N>,
    policy: RetryPolicy,
}

impl<N: BeaconNodeAdapter> ChainFetcher<N> {
    pub fn new(node: Arc<N>, policy: RetryPolicy) -> Self {
        Self { node, policy }
    }

    pub fn node(&self) -> &Arc<N> {
        &self.node
    }

    /// Fetch the block at `slot` and its blob sidecars.
    ///
    /// `Ok(None)` means the slot is empty: the node answered not-found or
    /// returned the zero root. A sidecar lookup that answers not-found yields
    /// an empty sidecar list.
    pub async fn fetch(&self, slot: Slot, cancel: &CancellationToken) -> SyncResult<Option<FetchedBlock>> {
        let slot_id = BlockId::Slot(slot);
        let header = match self
            .with_retry(slot, "block header", cancel, || self.node.get_block_header(&slot_id))
            .await
        {
            Ok(header) => header,
            Err(e) if e.is_not_found() => {
                debug!("No block at slot {}", slot);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if header.root.is_zero() {
            debug!("Slot {} resolved to the zero root", slot);
            return Ok(None);
        }

        let root_id = BlockId::Root(header.root);
        let sidecars = match self
            .with_retry(slot, "blob sidecars", cancel, || self.node.get_blob_sidecars(&root_id))
            .await
        {
            Ok(sidecars) => sidecars,
            Err(e) if e.is_not_found() => {
                debug!("No blob sidecars for {} at slot {}", header.root, slot);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        Ok(Some(FetchedBlock { header, sidecars }))
    }

    async fn with_retry<T, F, Fut>(
        &self,
        slot: Slot,
        what: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::select! {
                _ = cancel.cancelled() => Err(SyncError::Cancelled),
                outcome = timeout(self.policy.timeout, operation()) => match outcome {
                    Ok(result) => result,
                    Err(_) => Err(SyncError::Timeout(self.policy.timeout)),
                },
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt >= self.policy.attempts {
                error!(
                    "Failed to get {} for slot {} after {} attempts: {}",
                    what, slot, attempt, err
                );
                return Err(err);
            }

            warn!(
                "Failed to get {} for slot {} (attempt {}/{}): {} | retrying...",
                what, slot, attempt, self.policy.attempts, err
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = sleep(self.policy.delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{sample_sidecar, MockBeaconNode};
    use crate::Root;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_fetch_block_with_sidecars() {
        let node = MockBeaconNode::new();
        let root = Root::new([9; 32]);
        node.add_block(100, root, vec![sample_sidecar(100, 0), sample_sidecar(100, 1)]);
        let fetcher = ChainFetcher::new(Arc::new(node.clone()), policy(3));

        let block = fetcher.fetch(100, &CancellationToken::new()).await.unwrap().unwrap();
        assert_eq!(block.header.root, root);
        assert_eq!(block.header.slot(), 100);
        assert_eq!(block.sidecars.len(), 2);
        assert_eq!(node.sidecar_calls(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let node = MockBeaconNode::new();
        let fetcher = ChainFetcher::new(Arc::new(node.clone()), policy(5));

        assert!(fetcher.fetch(7, &CancellationToken::new()).await.unwrap().is_none());
        assert_eq!(node.header_calls(7), 1);
        assert_eq!(node.sidecar_calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_root_is_empty_slot() {
        let node = MockBeaconNode::new();
        node.add_block(8, Root::ZERO, vec![sample_sidecar(8, 0)]);
        let fetcher = ChainFetcher::new(Arc::new(node.clone()), policy(5));

        assert!(fetcher.fetch(8, &CancellationToken::new()).await.unwrap().is_none());
        assert_eq!(node.sidecar_calls(), 0);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let node = MockBeaconNode::new();
        node.add_block(9, Root::new([1; 32]), vec![sample_sidecar(9, 0)]);
        node.fail_header(9, Some(2));
        let fetcher = ChainFetcher::new(Arc::new(node.clone()), policy(5));

        let block = fetcher.fetch(9, &CancellationToken::new()).await.unwrap();
        assert!(block.is_some());
        assert_eq!(node.header_calls(9), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_surfaces_last_error() {
        let node = MockBeaconNode::new();
        node.fail_header(10, None);
        let fetcher = ChainFetcher::new(Arc::new(node.clone()), policy(4));

        let err = fetcher.fetch(10, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::BeaconNode(_)));
        assert_eq!(node.header_calls(10), 4);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_attempt() {
        let node = MockBeaconNode::new();
        node.add_block(11, Root::new([2; 32]), vec![]);
        node.set_latency(Duration::from_millis(200));
        let fetcher = ChainFetcher::new(
            Arc::new(node.clone()),
            RetryPolicy {
                attempts: 2,
                delay: Duration::from_millis(1),
                timeout: Duration::from_millis(20),
            },
        );

        let err = fetcher.fetch(11, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout(_)));
        assert_eq!(node.header_calls(11), 2);
    }

    #[tokio::test]
    async fn test_cancellation_stops_retries() {
        let node = MockBeaconNode::new();
        node.fail_header(12, None);
        let fetcher = ChainFetcher::new(
            Arc::new(node.clone()),
            RetryPolicy {
                attempts: 100,
                delay: Duration::from_secs(30),
                timeout: Duration::from_secs(5),
            },
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = fetcher.fetch(12, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(node.header_calls(12), 1);
    }

    #[tokio::test]
    async fn test_missing_sidecars_yield_empty_list() {
        let node = MockBeaconNode::new();
        let root = Root::new([3; 32]);
        node.add_block(13, root, vec![]);
        node.set_sidecars_not_found(root);
        let fetcher = ChainFetcher::new(Arc::new(node), policy(3));

        let block = fetcher.fetch(13, &CancellationToken::new()).await.unwrap().unwrap();
        assert!(block.sidecars.is_empty());
    }
}
