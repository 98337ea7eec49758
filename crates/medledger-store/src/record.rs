//! JSON wire form of a block.
//!
//! Digests are 64-character lowercase hex, the signature is standard base64,
//! the timestamp is epoch milliseconds. Decoding checks encodings and lengths
//! but not content: a decoded block must still go through verification.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use medledger_core::{Block, BlockHash, BlockHeader, Ed25519Signature, PayloadRef, ValidatorId};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BlockRecord {
    pub index: u64,
    pub timestamp: i64,
    pub previous_hash: String,
    pub payload_ref: String,
    pub validator_id: String,
    pub signature: String,
    pub hash: String,
}

impl BlockRecord {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode into a block.
    pub fn into_block(self) -> Result<Block> {
        let previous_hash = decode_hash("previousHash", &self.previous_hash)?;
        let hash = decode_hash("hash", &self.hash)?;
        let signature_bytes = BASE64
            .decode(&self.signature)
            .map_err(|e| StoreError::Serialization(format!("signature: {}", e)))?;
        let signature = Ed25519Signature::from_slice(&signature_bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(Block {
            header: BlockHeader {
                index: self.index,
                timestamp: self.timestamp,
                previous_hash,
                payload_ref: PayloadRef::from_stored(self.payload_ref),
                validator_id: ValidatorId::from_stored(self.validator_id),
            },
            signature,
            hash,
        })
    }
}

fn decode_hash(field: &str, hex: &str) -> Result<BlockHash> {
    if hex.len() != 64 {
        return Err(StoreError::Serialization(format!(
            "{}: expected 64 hex characters, got {}",
            field,
            hex.len()
        )));
    }
    BlockHash::from_hex(hex).map_err(|e| StoreError::Serialization(format!("{}: {}", field, e)))
}

impl From<&Block> for BlockRecord {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index(),
            timestamp: block.timestamp(),
            previous_hash: block.previous_hash().to_hex(),
            payload_ref: block.payload_ref().as_str().to_owned(),
            validator_id: block.validator_id().as_str().to_owned(),
            signature: BASE64.encode(block.signature.as_bytes()),
            hash: block.hash.to_hex(),
        }
    }
}

impl TryFrom<BlockRecord> for Block {
    type Error = StoreError;

    fn try_from(record: BlockRecord) -> Result<Self> {
        record.into_block()
    }
}
