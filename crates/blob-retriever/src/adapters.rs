//! Beacon node adapter over the standard beacon REST API

use async_trait::async_trait;
use anyhow::Result;
use log::debug;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use blob_sync::serde_helpers::DataEnvelope;
use blob_sync::{BeaconNodeAdapter, BlockHeaderInfo, BlockId, SyncError, SyncResult, WireBlobSidecar};

/// Beacon node adapter that talks to a node's HTTP API
#[derive(Clone, Debug)]
pub struct BeaconApiAdapter {
    client: Client,
    base_url: String,
}

impl BeaconApiAdapter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn header_url(&self, block_id: &BlockId) -> String {
        format!("{}/eth/v1/beacon/headers/{}", self.base_url, block_id)
    }

    pub fn blob_sidecars_url(&self, block_id: &BlockId) -> String {
        format!("{}/eth/v1/beacon/blob_sidecars/{}", self.base_url, block_id)
    }

    async fn get_data<T: DeserializeOwned>(&self, url: &str) -> SyncResult<T> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| SyncError::BeaconNode(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::BeaconNode(format!(
                "{} returned {}: {}",
                url, status, body
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::BeaconNode(format!("Failed to read {}: {}", url, e)))?;
        decode_envelope(&body)
    }
}

/// Decode a `{"data": ...}` beacon API response body.
pub fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> SyncResult<T> {
    serde_json::from_slice::<DataEnvelope<T>>(body)
        .map(|envelope| envelope.data)
        .map_err(|e| SyncError::Serialization(format!("JSON parsing error: {}", e)))
}

#[async_trait]
impl BeaconNodeAdapter for BeaconApiAdapter {
    async fn get_block_header(&self, block_id: &BlockId) -> SyncResult<BlockHeaderInfo> {
        self.get_data(&self.header_url(block_id)).await
    }

    async fn get_blob_sidecars(&self, block_id: &BlockId) -> SyncResult<Vec<WireBlobSidecar>> {
        self.get_data(&self.blob_sidecars_url(block_id)).await
    }
}
