//! Strong type definitions for MedLedger.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Maximum length of a payload reference, in bytes.
pub const MAX_PAYLOAD_REF_LEN: usize = 512;

/// Maximum length of a validator identifier, in bytes.
pub const MAX_VALIDATOR_ID_LEN: usize = 128;

/// A 32-byte block digest, computed as Blake3 over the canonical block form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockHash(pub [u8; 32]);

/// The `previous_hash` carried by the genesis block.
///
/// All-zero, reserved: no block may hash to it and no non-genesis block may
/// link to it.
pub const GENESIS_SENTINEL: BlockHash = BlockHash::ZERO;

impl BlockHash {
    /// Compute the Blake3 digest of the given data.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create a new BlockHash from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }

    /// Whether this is the genesis sentinel.
    pub fn is_sentinel(&self) -> bool {
        *self == GENESIS_SENTINEL
    }

    /// The zero hash.
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for BlockHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for BlockHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for BlockHash {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// Identity of a validator.
///
/// [`ValidatorId::new`] enforces the identifier rules. Values read back from
/// storage go through [`ValidatorId::from_stored`] so that corrupted records
/// still load and are flagged by verification instead of failing the read.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatorId(String);

impl ValidatorId {
    /// Create a validated identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = Self(id.into());
        id.validate()?;
        Ok(id)
    }

    /// Wrap a value read from storage without validating it.
    pub fn from_stored(id: String) -> Self {
        Self(id)
    }

    /// Check the identifier rules: non-empty, bounded, no whitespace or control characters.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.0.is_empty() {
            return Err(CoreError::InvalidValidatorId("empty".into()));
        }
        if self.0.len() > MAX_VALIDATOR_ID_LEN {
            return Err(CoreError::InvalidValidatorId(format!(
                "longer than {} bytes",
                MAX_VALIDATOR_ID_LEN
            )));
        }
        if self.0.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CoreError::InvalidValidatorId(
                "contains whitespace or control characters".into(),
            ));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorId({})", self.0)
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ValidatorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque reference to (or digest of) a medical-record payload.
///
/// The payload itself lives with an external document store; the ledger only
/// binds this reference into the hash chain.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadRef(String);

impl PayloadRef {
    /// Create a validated payload reference.
    pub fn new(reference: impl Into<String>) -> Result<Self, CoreError> {
        let reference = Self(reference.into());
        reference.validate()?;
        Ok(reference)
    }

    /// Wrap a value read from storage without validating it.
    pub fn from_stored(reference: String) -> Self {
        Self(reference)
    }

    /// Derive a reference from a JSON document.
    ///
    /// The document is serialized with sorted object keys, so two documents
    /// with the same content always produce the same reference.
    pub fn for_document(document: &serde_json::Value) -> Result<Self, CoreError> {
        let bytes = serde_json::to_vec(document)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(Self(format!("blake3:{}", hex::encode(blake3::hash(&bytes).as_bytes()))))
    }

    /// Check the reference rules.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.0.is_empty() {
            return Err(CoreError::InvalidPayload("empty".into()));
        }
        if self.0.len() > MAX_PAYLOAD_REF_LEN {
            return Err(CoreError::InvalidPayload(format!(
                "longer than {} bytes",
                MAX_PAYLOAD_REF_LEN
            )));
        }
        if self.0.trim() != self.0 {
            return Err(CoreError::InvalidPayload(
                "leading or trailing whitespace".into(),
            ));
        }
        if self.0.chars().any(|c| c.is_control()) {
            return Err(CoreError::InvalidPayload("contains control characters".into()));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PayloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadRef({})", self.0)
    }
}

impl fmt::Display for PayloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_hash_hex_roundtrip() {
        let hash = BlockHash::from_bytes([0x42; 32]);
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(BlockHash::from_hex(&hex).unwrap(), hash);
    }

    #[test]
    fn test_block_hash_rejects_short_hex() {
        assert!(BlockHash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_block_hash_display() {
        let hash = BlockHash::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", hash), "abababababababab");
    }

    #[test]
    fn test_sentinel_is_zero() {
        assert!(GENESIS_SENTINEL.is_sentinel());
        assert!(!BlockHash::digest(b"anything").is_sentinel());
    }

    #[test]
    fn test_validator_id_rules() {
        assert!(ValidatorId::new("validator_001").is_ok());
        assert!(ValidatorId::new("").is_err());
        assert!(ValidatorId::new("has space").is_err());
        assert!(ValidatorId::new("x".repeat(MAX_VALIDATOR_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_payload_ref_rules() {
        assert!(PayloadRef::new("rec-1").is_ok());
        assert!(PayloadRef::new("").is_err());
        assert!(PayloadRef::new(" rec-1").is_err());
        assert!(PayloadRef::new("rec\n1").is_err());
        assert!(PayloadRef::new("r".repeat(MAX_PAYLOAD_REF_LEN + 1)).is_err());
    }

    #[test]
    fn test_from_stored_skips_validation() {
        let stored = PayloadRef::from_stored(String::new());
        assert!(stored.validate().is_err());
    }

    #[test]
    fn test_payload_ref_for_document_ignores_key_order() {
        let a: serde_json::Value =
            serde_json::from_str(r#"{"type":"PhysicalExam","patient_id":"p-1"}"#).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(r#"{"patient_id":"p-1","type":"PhysicalExam"}"#).unwrap();

        let ra = PayloadRef::for_document(&a).unwrap();
        let rb = PayloadRef::for_document(&b).unwrap();
        assert_eq!(ra, rb);
        assert!(ra.as_str().starts_with("blake3:"));
        assert!(ra.validate().is_ok());
    }
}
