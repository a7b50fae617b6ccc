//! The execution-layer block header, as served by `eth_getBlockByNumber`.
//!
//! The header is deserialized from the JSON field set geth exposes over RPC
//! and its canonical hash is recomputed locally (keccak-256 of the RLP list)
//! rather than trusted from the response.

use keccak_hash::keccak;
use rlp::RlpStream;
use serde::{Deserialize, Serialize};

pub use ethereum_types::{Address, Bloom, H256, H64, U256};

/// An execution block header with the full field set required to recompute
/// its hash deterministically.
///
/// Fields activated by later forks (base fee, withdrawals root, blob gas,
/// parent beacon block root, requests hash) are optional; a header carries
/// exactly the fields of the fork it was produced under.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionBlockHeader {
    pub parent_hash: H256,
    #[serde(rename = "sha3Uncles")]
    pub ommers_hash: H256,
    #[serde(rename = "miner")]
    pub beneficiary: Address,
    pub state_root: H256,
    pub transactions_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: Bloom,
    pub difficulty: U256,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub number: u64,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub gas_limit: u64,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub gas_used: u64,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub timestamp: u64,
    #[serde(with = "serde_utils::hex_vec")]
    pub extra_data: Vec<u8>,
    pub mix_hash: H256,
    pub nonce: H64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals_root: Option<H256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_gas_used: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excess_blob_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_beacon_block_root: Option<H256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_hash: Option<H256>,
}

impl ExecutionBlockHeader {
    /// Returns the canonical block hash: `keccak256(rlp(header))`.
    ///
    /// This is a pure function of the header fields.
    pub fn hash(&self) -> H256 {
        keccak(rlp_encode_block_header(self))
    }
}

/// RLP-encodes a block header.
///
/// Optional fork fields are appended only when present. Their activation
/// order is fixed, so a `Some` field is never preceded by a `None` one in a
/// well-formed header; encoding does not re-validate this.
pub fn rlp_encode_block_header(header: &ExecutionBlockHeader) -> Vec<u8> {
    let mut stream = RlpStream::new();
    stream.begin_unbounded_list();
    stream.append(&header.parent_hash);
    stream.append(&header.ommers_hash);
    stream.append(&header.beneficiary);
    stream.append(&header.state_root);
    stream.append(&header.transactions_root);
    stream.append(&header.receipts_root);
    stream.append(&header.logs_bloom);
    stream.append(&header.difficulty);
    stream.append(&header.number);
    stream.append(&header.gas_limit);
    stream.append(&header.gas_used);
    stream.append(&header.timestamp);
    stream.append(&header.extra_data);
    stream.append(&header.mix_hash);
    stream.append(&header.nonce);
    if let Some(base_fee_per_gas) = header.base_fee_per_gas {
        stream.append(&base_fee_per_gas);
    }
    if let Some(withdrawals_root) = header.withdrawals_root {
        stream.append(&withdrawals_root);
    }
    if let Some(blob_gas_used) = header.blob_gas_used {
        stream.append(&blob_gas_used);
    }
    if let Some(excess_blob_gas) = header.excess_blob_gas {
        stream.append(&excess_blob_gas);
    }
    if let Some(parent_beacon_block_root) = header.parent_beacon_block_root {
        stream.append(&parent_beacon_block_root);
    }
    if let Some(requests_hash) = header.requests_hash {
        stream.append(&requests_hash);
    }
    stream.finalize_unbounded_list();
    stream.out().into()
}
