//! # Blob Sidecar Formats
//!
//! Two representations of a Deneb blob sidecar live here:
//!
//! - [`WireBlobSidecar`]: what the beacon API returns. Byte fields are hex
//!   strings of whatever length the node sent and any field may be missing.
//! - [`CanonicalBlobSidecar`]: the storage form. Every field has its fixed
//!   declared length, so the SSZ encoding is deterministic and always
//!   `CANONICAL_SIDECAR_SIZE` bytes long.
//!
//! [`canonicalize`] converts the first into the second, zero-filling anything
//! the source omitted. Byte-exact validation compares the SSZ encodings of two
//! canonical sidecars.

use alloy_primitives::{Bytes, FixedBytes, B256};
use serde::{Deserialize, Serialize};
use ssz::{Decode, Encode};
use ssz_derive::{Decode, Encode};
use ssz_types::typenum::{U131072, U17};
use ssz_types::FixedVector;

use crate::{SyncError, SyncResult};

pub type BytesPerBlob = U131072;
pub type KzgCommitmentInclusionProofDepth = U17;

pub const BYTES_PER_BLOB: usize = 131_072;
pub const KZG_COMMITMENT_LENGTH: usize = 48;
pub const KZG_PROOF_LENGTH: usize = 48;
pub const BLS_SIGNATURE_LENGTH: usize = 96;
pub const ROOT_LENGTH: usize = 32;
pub const KZG_COMMITMENT_INCLUSION_PROOF_DEPTH: usize = 17;

/// Size of the SSZ encoding of a [`CanonicalBlobSidecar`].
pub const CANONICAL_SIDECAR_SIZE: usize = 8
    + BYTES_PER_BLOB
    + KZG_COMMITMENT_LENGTH
    + KZG_PROOF_LENGTH
    + (8 + 8 + 3 * ROOT_LENGTH + BLS_SIGNATURE_LENGTH)
    + KZG_COMMITMENT_INCLUSION_PROOF_DEPTH * ROOT_LENGTH;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireBeaconBlockHeader {
    #[serde(with = "crate::serde_helpers::quoted_u64")]
    pub slot: u64,
    #[serde(with = "crate::serde_helpers::quoted_u64")]
    pub proposer_index: u64,
    pub parent_root: Bytes,
    pub state_root: Bytes,
    pub body_root: Bytes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireSignedBeaconBlockHeader {
    pub message: WireBeaconBlockHeader,
    pub signature: Bytes,
}

/// Blob sidecar as served by `/eth/v1/beacon/blob_sidecars/{block_id}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireBlobSidecar {
    #[serde(with = "crate::serde_helpers::quoted_u64")]
    pub index: u64,
    pub blob: Bytes,
    pub kzg_commitment: Bytes,
    pub kzg_proof: Bytes,
    pub signed_block_header: Option<WireSignedBeaconBlockHeader>,
    pub kzg_commitment_inclusion_proof: Vec<Bytes>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct CanonicalBeaconBlockHeader {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: B256,
    pub state_root: B256,
    pub body_root: B256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct CanonicalSignedBeaconBlockHeader {
    pub message: CanonicalBeaconBlockHeader,
    pub signature: FixedBytes<BLS_SIGNATURE_LENGTH>,
}

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct CanonicalBlobSidecar {
    pub index: u64,
    pub blob: FixedVector<u8, BytesPerBlob>,
    pub kzg_commitment: FixedBytes<KZG_COMMITMENT_LENGTH>,
    pub kzg_proof: FixedBytes<KZG_PROOF_LENGTH>,
    pub signed_block_header: CanonicalSignedBeaconBlockHeader,
    pub kzg_commitment_inclusion_proof: FixedVector<B256, KzgCommitmentInclusionProofDepth>,
}

impl CanonicalBlobSidecar {
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        self.as_ssz_bytes()
    }

    pub fn from_canonical_bytes(bytes: &[u8]) -> SyncResult<Self> {
        Self::from_ssz_bytes(bytes).map_err(|e| {
            SyncError::Serialization(format!(
                "Invalid canonical blob sidecar ({} bytes): {:?}",
                bytes.len(),
                e
            ))
        })
    }
}

/// Copy `src` into a zeroed `N`-byte array, truncating anything longer.
fn fixed_bytes<const N: usize>(src: &[u8]) -> FixedBytes<N> {
    let mut out = FixedBytes::<N>::ZERO;
    let len = src.len().min(N);
    out.0[..len].copy_from_slice(&src[..len]);
    out
}

fn canonical_header(header: Option<&WireSignedBeaconBlockHeader>) -> CanonicalSignedBeaconBlockHeader {
    let Some(header) = header else {
        return CanonicalSignedBeaconBlockHeader::default();
    };
    CanonicalSignedBeaconBlockHeader {
        message: CanonicalBeaconBlockHeader {
            slot: header.message.slot,
            proposer_index: header.message.proposer_index,
            parent_root: fixed_bytes(&header.message.parent_root),
            state_root: fixed_bytes(&header.message.state_root),
            body_root: fixed_bytes(&header.message.body_root),
        },
        signature: fixed_bytes(&header.signature),
    }
}

/// Convert a wire sidecar into its fixed-length storage form.
pub fn canonicalize(sidecar: &WireBlobSidecar) -> CanonicalBlobSidecar {
    let mut blob = vec![0u8; BYTES_PER_BLOB];
    let blob_len = sidecar.blob.len().min(BYTES_PER_BLOB);
    blob[..blob_len].copy_from_slice(&sidecar.blob[..blob_len]);

    let inclusion_proof: Vec<B256> = (0..KZG_COMMITMENT_INCLUSION_PROOF_DEPTH)
        .map(|level| {
            sidecar
                .kzg_commitment_inclusion_proof
                .get(level)
                .map(|node| fixed_bytes(node))
                .unwrap_or(B256::ZERO)
        })
        .collect();

    CanonicalBlobSidecar {
        index: sidecar.index,
        blob: FixedVector::from(blob),
        kzg_commitment: fixed_bytes(&sidecar.kzg_commitment),
        kzg_proof: fixed_bytes(&sidecar.kzg_proof),
        signed_block_header: canonical_header(sidecar.signed_block_header.as_ref()),
        kzg_commitment_inclusion_proof: FixedVector::from(inclusion_proof),
    }
}
