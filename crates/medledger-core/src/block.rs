//! Block: one immutable, hash-linked record in the ledger.
//!
//! A block moves through three stages before it can be committed:
//!
//! 1. **Built**: a [`BlockHeader`] positioned on top of the current tail
//! 2. **Signed**: the validator's signature over the canonical header
//! 3. **Hashed**: the digest over header and signature, yielding a [`Block`]
//!
//! [`BlockFactory::build`] runs all three. Nothing here touches persistence;
//! a block that is never committed simply disappears.

use crate::canonical;
use crate::crypto::{Ed25519PublicKey, Ed25519Signature};
use crate::error::CoreError;
use crate::types::{BlockHash, PayloadRef, ValidatorId, GENESIS_SENTINEL};

/// Produces signatures on behalf of validators.
///
/// Implementations hold (or reach) the signing credential for each identity
/// they are asked to sign for.
pub trait BlockSigner: Send + Sync {
    /// Sign `message` as `validator_id`.
    ///
    /// Fails with [`CoreError::MissingCredential`] if no key is held for the
    /// validator.
    fn sign(&self, validator_id: &ValidatorId, message: &[u8])
        -> Result<Ed25519Signature, CoreError>;
}

/// The signed fields of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Position in the chain, starting at 0.
    pub index: u64,

    /// Creation instant, Unix milliseconds.
    pub timestamp: i64,

    /// Hash of the preceding block, or [`GENESIS_SENTINEL`] for index 0.
    pub previous_hash: BlockHash,

    /// Reference to the medical-record payload.
    pub payload_ref: PayloadRef,

    /// Identity of the authorizing validator.
    pub validator_id: ValidatorId,
}

impl BlockHeader {
    /// Position a new header on top of `tail`, or as genesis if there is none.
    pub fn on_tail(
        tail: Option<&Block>,
        payload_ref: PayloadRef,
        validator_id: ValidatorId,
        timestamp: i64,
    ) -> Result<Self, CoreError> {
        let (index, previous_hash) = match tail {
            Some(tail) => {
                let index = tail.header.index.checked_add(1).ok_or_else(|| {
                    CoreError::MalformedBlock("chain index overflow".into())
                })?;
                (index, tail.hash)
            }
            None => (0, GENESIS_SENTINEL),
        };

        Ok(Self {
            index,
            timestamp,
            previous_hash,
            payload_ref,
            validator_id,
        })
    }

    /// Canonical CBOR encoding of this header.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CoreError> {
        canonical::canonical_header_bytes(
            self.index,
            self.timestamp,
            &self.previous_hash,
            &self.payload_ref,
            &self.validator_id,
        )
    }

    /// The message the validator signs.
    pub fn signing_message(&self) -> Result<Vec<u8>, CoreError> {
        canonical::signing_message(
            self.index,
            self.timestamp,
            &self.previous_hash,
            &self.payload_ref,
            &self.validator_id,
        )
    }

    /// Sign this header, moving it to the signed stage.
    pub fn sign(self, signer: &dyn BlockSigner) -> Result<SignedHeader, CoreError> {
        let message = self.signing_message()?;
        let signature = signer.sign(&self.validator_id, &message)?;
        Ok(SignedHeader {
            header: self,
            signature,
        })
    }
}

/// A header carrying its validator's signature, not yet hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeader {
    pub header: BlockHeader,
    pub signature: Ed25519Signature,
}

impl SignedHeader {
    /// Compute the digest and produce the final block.
    pub fn seal(self) -> Result<Block, CoreError> {
        let hash = canonical::digest(
            self.header.index,
            self.header.timestamp,
            &self.header.previous_hash,
            &self.header.payload_ref,
            &self.header.validator_id,
            &self.signature,
        )?;
        Ok(Block {
            header: self.header,
            signature: self.signature,
            hash,
        })
    }
}

/// A complete block.
///
/// Immutable once committed. Blocks read back from storage are not trusted:
/// [`crate::ChainValidator`] recomputes every hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub signature: Ed25519Signature,
    pub hash: BlockHash,
}

impl Block {
    pub fn index(&self) -> u64 {
        self.header.index
    }

    pub fn timestamp(&self) -> i64 {
        self.header.timestamp
    }

    pub fn previous_hash(&self) -> &BlockHash {
        &self.header.previous_hash
    }

    pub fn payload_ref(&self) -> &PayloadRef {
        &self.header.payload_ref
    }

    pub fn validator_id(&self) -> &ValidatorId {
        &self.header.validator_id
    }

    pub fn is_genesis(&self) -> bool {
        self.header.index == 0
    }

    /// Recompute the digest from this block's own fields.
    pub fn recompute_hash(&self) -> Result<BlockHash, CoreError> {
        canonical::digest(
            self.header.index,
            self.header.timestamp,
            &self.header.previous_hash,
            &self.header.payload_ref,
            &self.header.validator_id,
            &self.signature,
        )
    }

    /// Check the signature against a validator key.
    pub fn verify_signature(&self, public_key: &Ed25519PublicKey) -> Result<(), CoreError> {
        let message = self.header.signing_message()?;
        public_key.verify(&message, &self.signature)
    }
}

/// Builds candidate blocks on top of a chain tail.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockFactory;

impl BlockFactory {
    /// Build, sign and hash a block extending `tail`.
    ///
    /// With no tail the result is the genesis block. Fails with
    /// [`CoreError::InvalidPayload`] for a malformed reference and
    /// [`CoreError::MissingCredential`] if `signer` holds no key for the
    /// validator.
    pub fn build(
        payload_ref: &PayloadRef,
        tail: Option<&Block>,
        validator_id: &ValidatorId,
        timestamp: i64,
        signer: &dyn BlockSigner,
    ) -> Result<Block, CoreError> {
        payload_ref.validate()?;
        validator_id.validate()?;

        BlockHeader::on_tail(tail, payload_ref.clone(), validator_id.clone(), timestamp)?
            .sign(signer)?
            .seal()
    }
}
