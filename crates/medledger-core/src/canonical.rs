//! Canonical CBOR encoding for deterministic block hashing.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Two byte strings are derived from a block header:
//!
//! - the **signing message**: `SIGN_DOMAIN || canonical_header`
//! - the **digest input**: `HASH_DOMAIN || canonical_header || signature`
//!
//! Distinct domain tags keep a signature from ever being valid as a hash
//! preimage and vice versa.

use ciborium::value::Value;

use crate::crypto::Ed25519Signature;
use crate::error::CoreError;
use crate::types::{BlockHash, PayloadRef, ValidatorId};

/// Domain tag prefixed to the digest input.
pub const HASH_DOMAIN: &[u8] = b"medledger/block-hash/v0";

/// Domain tag prefixed to the signing message.
pub const SIGN_DOMAIN: &[u8] = b"medledger/block-sig/v0";

/// Header field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const INDEX: u64 = 1;
    pub const TIMESTAMP: u64 = 2;
    pub const PREVIOUS_HASH: u64 = 3;
    pub const PAYLOAD_REF: u64 = 4;
    pub const VALIDATOR_ID: u64 = 5;
}

/// Encode the signed header fields of a block to canonical CBOR bytes.
pub fn canonical_header_bytes(
    index: u64,
    timestamp: i64,
    previous_hash: &BlockHash,
    payload_ref: &PayloadRef,
    validator_id: &ValidatorId,
) -> Result<Vec<u8>, CoreError> {
    if payload_ref.as_str().is_empty() {
        return Err(CoreError::MalformedBlock("empty payload reference".into()));
    }
    if validator_id.as_str().is_empty() {
        return Err(CoreError::MalformedBlock("empty validator id".into()));
    }

    let value = Value::Map(vec![
        (Value::Integer(keys::INDEX.into()), Value::Integer(index.into())),
        (
            Value::Integer(keys::TIMESTAMP.into()),
            Value::Integer(timestamp.into()),
        ),
        (
            Value::Integer(keys::PREVIOUS_HASH.into()),
            Value::Bytes(previous_hash.0.to_vec()),
        ),
        (
            Value::Integer(keys::PAYLOAD_REF.into()),
            Value::Text(payload_ref.as_str().to_owned()),
        ),
        (
            Value::Integer(keys::VALIDATOR_ID.into()),
            Value::Text(validator_id.as_str().to_owned()),
        ),
    ]);

    let mut buf = Vec::with_capacity(128 + payload_ref.as_str().len());
    encode_value_to(&mut buf, &value)?;
    Ok(buf)
}

/// Construct the message a validator signs for a block header.
pub fn signing_message(
    index: u64,
    timestamp: i64,
    previous_hash: &BlockHash,
    payload_ref: &PayloadRef,
    validator_id: &ValidatorId,
) -> Result<Vec<u8>, CoreError> {
    let header = canonical_header_bytes(index, timestamp, previous_hash, payload_ref, validator_id)?;
    let mut buf = Vec::with_capacity(SIGN_DOMAIN.len() + header.len());
    buf.extend_from_slice(SIGN_DOMAIN);
    buf.extend_from_slice(&header);
    Ok(buf)
}

/// Compute the digest of a block from its fields.
///
/// Deterministic and side-effect free. The digest covers the signature, so a
/// signed block cannot be re-signed without changing its hash.
pub fn digest(
    index: u64,
    timestamp: i64,
    previous_hash: &BlockHash,
    payload_ref: &PayloadRef,
    validator_id: &ValidatorId,
    signature: &Ed25519Signature,
) -> Result<BlockHash, CoreError> {
    let header = canonical_header_bytes(index, timestamp, previous_hash, payload_ref, validator_id)?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(HASH_DOMAIN);
    hasher.update(&header);
    hasher.update(signature.as_bytes());
    Ok(BlockHash(*hasher.finalize().as_bytes()))
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<(), CoreError> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr)?,
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => {
            return Err(CoreError::EncodingError(
                "floats not supported in canonical encoding".into(),
            ))
        }
        _ => return Err(CoreError::EncodingError("unsupported CBOR value type".into())),
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) -> Result<(), CoreError> {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item)?;
    }
    Ok(())
}

/// Encode a map canonically (major type 5), keys sorted by encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<(), CoreError> {
    let mut pairs = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    if pairs.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(CoreError::EncodingError("duplicate map key".into()));
    }

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}
