//! Chain verification.
//!
//! [`ChainValidator`] walks blocks in index order and re-derives everything
//! that can be re-derived: index continuity, genesis rules, each block's
//! hash, the link to its predecessor, and optionally the authority of the
//! validator that signed it. Stored hashes are never trusted.
//!
//! Verification is incremental. A validator can be fed several batches in
//! sequence; between batches it carries forward only the last index and hash
//! it accepted, so the full chain never has to be in memory.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::block::Block;
use crate::crypto::Ed25519PublicKey;
use crate::types::{BlockHash, ValidatorId};
use crate::validator::ValidatorStatus;

/// Read access to validator facts, as needed for verification.
pub trait AuthorityView: Send + Sync {
    /// The credential a validator was registered with.
    fn public_key(&self, id: &ValidatorId) -> Option<Ed25519PublicKey>;

    /// The status a validator had at `at` (Unix milliseconds).
    fn status_at(&self, id: &ValidatorId, at: i64) -> Option<ValidatorStatus>;
}

/// How much authorization checking verification performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationMode {
    /// Structural checks only.
    Skip,
    /// The validator exists and the signature verifies under its key.
    ExistenceOnly,
    /// As `ExistenceOnly`, and the validator was active at the block's timestamp.
    #[default]
    PointInTime,
}

/// Where a verified sequence starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainAnchor {
    /// The sequence starts at index 0.
    Genesis {
        /// If set, the genesis block must hash to exactly this value.
        expected_genesis_hash: Option<BlockHash>,
    },
    /// The sequence continues after a trusted block.
    Checkpoint { index: u64, hash: BlockHash },
}

impl ChainAnchor {
    pub const GENESIS: Self = ChainAnchor::Genesis {
        expected_genesis_hash: None,
    };

    /// Index of the first block expected after this anchor.
    pub fn next_index(&self) -> Option<u64> {
        match self {
            ChainAnchor::Genesis { .. } => Some(0),
            ChainAnchor::Checkpoint { index, .. } => index.checked_add(1),
        }
    }
}

/// Options controlling a verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerifyOptions {
    pub mode: AuthorizationMode,
    /// Enumerate every break instead of stopping at the first.
    pub collect_all: bool,
}

/// The ways a chain can fail verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakKind {
    /// Block index does not follow its predecessor.
    IndexDiscontinuity,
    /// Sentinel misuse, or the genesis block is not the expected one.
    GenesisViolation,
    /// Recomputed hash disagrees with the stored hash.
    HashMismatch,
    /// Fields could not be canonicalized.
    Malformed,
    /// `previous_hash` does not match the predecessor.
    BrokenLink,
    /// Signer is not a known validator.
    UnknownValidator,
    /// Signature does not verify under the validator's key.
    BadSignature,
    /// Validator was not active when the block was created.
    RevokedAtCreation,
}

impl fmt::Display for BreakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakKind::IndexDiscontinuity => "index discontinuity",
            BreakKind::GenesisViolation => "genesis violation",
            BreakKind::HashMismatch => "hash mismatch",
            BreakKind::Malformed => "malformed block",
            BreakKind::BrokenLink => "broken link",
            BreakKind::UnknownValidator => "unknown validator",
            BreakKind::BadSignature => "bad signature",
            BreakKind::RevokedAtCreation => "validator not active at creation",
        };
        f.write_str(s)
    }
}

/// One detected integrity failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    /// Chain position at which the failure was found.
    pub index: u64,
    pub kind: BreakKind,
    pub detail: String,
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at index {}: {}", self.kind, self.index, self.detail)
    }
}

/// Result of verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Valid,
    Invalid {
        first_bad_index: u64,
        /// Never empty. A single entry unless `collect_all` was set.
        breaks: Vec<ChainBreak>,
    },
}

impl VerifyOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyOutcome::Valid)
    }

    pub fn first_bad_index(&self) -> Option<u64> {
        match self {
            VerifyOutcome::Valid => None,
            VerifyOutcome::Invalid { first_bad_index, .. } => Some(*first_bad_index),
        }
    }
}

/// Incremental chain verifier.
///
/// ```ignore
/// let mut validator = ChainValidator::new(ChainAnchor::GENESIS, VerifyOptions::default());
/// for batch in batches {
///     if !validator.feed(&batch, Some(&registry)) {
///         break;
///     }
/// }
/// let outcome = validator.finish();
/// ```
#[derive(Debug, Clone)]
pub struct ChainValidator {
    options: VerifyOptions,
    expected_genesis_hash: Option<BlockHash>,
    /// Position of the next block.
    next_index: u64,
    /// Hash the next block must link to; `None` before genesis.
    prev_hash: Option<BlockHash>,
    checked: u64,
    breaks: Vec<ChainBreak>,
}

impl ChainValidator {
    pub fn new(anchor: ChainAnchor, options: VerifyOptions) -> Self {
        let (next_index, prev_hash, expected_genesis_hash) = match anchor {
            ChainAnchor::Genesis {
                expected_genesis_hash,
            } => (0, None, expected_genesis_hash),
            ChainAnchor::Checkpoint { index, hash } => {
                (index.saturating_add(1), Some(hash), None)
            }
        };

        Self {
            options,
            expected_genesis_hash,
            next_index,
            prev_hash,
            checked: 0,
            breaks: Vec::new(),
        }
    }

    /// Verify a complete sequence in one call.
    pub fn verify(
        blocks: &[Block],
        anchor: ChainAnchor,
        authority: Option<&dyn AuthorityView>,
        options: VerifyOptions,
    ) -> VerifyOutcome {
        let mut validator = Self::new(anchor, options);
        validator.feed(blocks, authority);
        validator.finish()
    }

    /// Check the next batch of blocks.
    ///
    /// Returns `false` once verification has stopped at a break, after which
    /// further batches are ignored.
    pub fn feed(&mut self, blocks: &[Block], authority: Option<&dyn AuthorityView>) -> bool {
        for block in blocks {
            if self.is_stopped() {
                return false;
            }
            self.check(block, authority);
        }
        !self.is_stopped()
    }

    /// Number of blocks examined so far.
    pub fn checked(&self) -> u64 {
        self.checked
    }

    /// Position of the next expected block.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Anchor describing everything accepted so far.
    pub fn anchor(&self) -> ChainAnchor {
        match (self.next_index.checked_sub(1), self.prev_hash) {
            (Some(index), Some(hash)) => ChainAnchor::Checkpoint { index, hash },
            _ => ChainAnchor::Genesis {
                expected_genesis_hash: self.expected_genesis_hash,
            },
        }
    }

    pub fn finish(self) -> VerifyOutcome {
        match self.breaks.first() {
            None => VerifyOutcome::Valid,
            Some(first) => VerifyOutcome::Invalid {
                first_bad_index: first.index,
                breaks: self.breaks,
            },
        }
    }

    fn is_stopped(&self) -> bool {
        !self.options.collect_all && !self.breaks.is_empty()
    }

    fn check(&mut self, block: &Block, authority: Option<&dyn AuthorityView>) {
        let position = self.next_index;
        let mut found = Vec::new();

        if block.index() != position {
            found.push((
                BreakKind::IndexDiscontinuity,
                format!("expected index {}, found {}", position, block.index()),
            ));
        }

        let mut sentinel_violation = false;
        if position == 0 {
            if !block.previous_hash().is_sentinel() {
                sentinel_violation = true;
                found.push((
                    BreakKind::GenesisViolation,
                    "genesis block does not carry the sentinel".to_string(),
                ));
            }
            if let Some(expected) = self.expected_genesis_hash {
                if block.hash != expected {
                    found.push((
                        BreakKind::GenesisViolation,
                        format!("genesis hash {} is not the expected {}", block.hash, expected),
                    ));
                }
            }
        } else if block.previous_hash().is_sentinel() {
            sentinel_violation = true;
            found.push((
                BreakKind::GenesisViolation,
                "non-genesis block carries the sentinel".to_string(),
            ));
        }

        let recomputed = match block.recompute_hash() {
            Ok(hash) => {
                if hash != block.hash {
                    found.push((
                        BreakKind::HashMismatch,
                        format!("stored {}, recomputed {}", block.hash, hash),
                    ));
                }
                hash
            }
            Err(e) => {
                found.push((BreakKind::Malformed, e.to_string()));
                block.hash
            }
        };

        if !sentinel_violation {
            if let Some(prev) = self.prev_hash {
                if *block.previous_hash() != prev {
                    found.push((
                        BreakKind::BrokenLink,
                        format!("links to {}, predecessor is {}", block.previous_hash(), prev),
                    ));
                }
            }
        }

        if let Some(authority) = authority {
            if let Some(failure) = self.check_authority(block, authority) {
                found.push(failure);
            }
        }

        self.checked += 1;
        self.next_index = position.saturating_add(1);
        self.prev_hash = Some(recomputed);

        let limit = if self.options.collect_all { found.len() } else { 1 };
        self.breaks.extend(
            found
                .into_iter()
                .take(limit)
                .map(|(kind, detail)| ChainBreak {
                    index: position,
                    kind,
                    detail,
                }),
        );
    }

    fn check_authority(
        &self,
        block: &Block,
        authority: &dyn AuthorityView,
    ) -> Option<(BreakKind, String)> {
        if self.options.mode == AuthorizationMode::Skip {
            return None;
        }

        let id = block.validator_id();
        let Some(public_key) = authority.public_key(id) else {
            return Some((BreakKind::UnknownValidator, format!("validator {} is not registered", id)));
        };

        if let Err(e) = block.verify_signature(&public_key) {
            return Some((BreakKind::BadSignature, e.to_string()));
        }

        if self.options.mode == AuthorizationMode::PointInTime {
            match authority.status_at(id, block.timestamp()) {
                Some(ValidatorStatus::Active) => {}
                Some(ValidatorStatus::Revoked) => {
                    return Some((
                        BreakKind::RevokedAtCreation,
                        format!("validator {} was revoked at {}", id, block.timestamp()),
                    ))
                }
                None => {
                    return Some((
                        BreakKind::RevokedAtCreation,
                        format!("validator {} was not provisioned at {}", id, block.timestamp()),
                    ))
                }
            }
        }

        None
    }
}

/// Recompute a single block's hash and compare it with the stored one.
pub fn verify_block(block: &Block) -> Result<(), ChainBreak> {
    let malformed = |detail: String| ChainBreak {
        index: block.index(),
        kind: BreakKind::Malformed,
        detail,
    };
    let recomputed = block.recompute_hash().map_err(|e| malformed(e.to_string()))?;
    if recomputed != block.hash {
        return Err(ChainBreak {
            index: block.index(),
            kind: BreakKind::HashMismatch,
            detail: format!("stored {}, recomputed {}", block.hash, recomputed),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockFactory, BlockSigner};
    use crate::crypto::{Ed25519Signature, Keypair};
    use crate::error::CoreError;
    use crate::types::{PayloadRef, GENESIS_SENTINEL};
    use proptest::prelude::*;
    use std::collections::HashMap;

    struct TestAuthority {
        keys: HashMap<ValidatorId, Keypair>,
        revoked_at: HashMap<ValidatorId, i64>,
    }

    impl TestAuthority {
        fn new(names: &[&str]) -> Self {
            let keys = names
                .iter()
                .enumerate()
                .map(|(i, n)| (ValidatorId::new(*n).unwrap(), Keypair::from_seed(&[i as u8 + 1; 32])))
                .collect();
            Self {
                keys,
                revoked_at: HashMap::new(),
            }
        }
    }

    impl BlockSigner for TestAuthority {
        fn sign(
            &self,
            validator_id: &ValidatorId,
            message: &[u8],
        ) -> Result<Ed25519Signature, CoreError> {
            self.keys
                .get(validator_id)
                .map(|kp| kp.sign(message))
                .ok_or_else(|| CoreError::MissingCredential(validator_id.clone()))
        }
    }

    impl AuthorityView for TestAuthority {
        fn public_key(&self, id: &ValidatorId) -> Option<Ed25519PublicKey> {
            self.keys.get(id).map(|kp| kp.public_key())
        }

        fn status_at(&self, id: &ValidatorId, at: i64) -> Option<ValidatorStatus> {
            self.keys.get(id)?;
            match self.revoked_at.get(id) {
                Some(t) if *t <= at => Some(ValidatorStatus::Revoked),
                _ => Some(ValidatorStatus::Active),
            }
        }
    }

    fn build_chain(authority: &TestAuthority, signer: &str, n: usize) -> Vec<Block> {
        let id = ValidatorId::new(signer).unwrap();
        let mut chain: Vec<Block> = Vec::with_capacity(n);
        for i in 0..n {
            let payload = PayloadRef::new(format!("rec-{}", i + 1)).unwrap();
            let block =
                BlockFactory::build(&payload, chain.last(), &id, 1_000 + i as i64, authority).unwrap();
            chain.push(block);
        }
        chain
    }

    fn full() -> VerifyOptions {
        VerifyOptions::default()
    }

    #[test]
    fn test_empty_sequence_is_valid() {
        let outcome = ChainValidator::verify(&[], ChainAnchor::GENESIS, None, full());
        assert!(outcome.is_valid());
    }

    #[test]
    fn test_built_chain_is_valid() {
        let auth = TestAuthority::new(&["v1"]);
        let chain = build_chain(&auth, "v1", 5);
        let outcome = ChainValidator::verify(&chain, ChainAnchor::GENESIS, Some(&auth), full());
        assert_eq!(outcome, VerifyOutcome::Valid);
    }

    #[test]
    fn test_expected_genesis_hash() {
        let auth = TestAuthority::new(&["v1"]);
        let chain = build_chain(&auth, "v1", 2);

        let anchor = ChainAnchor::Genesis {
            expected_genesis_hash: Some(chain[0].hash),
        };
        assert!(ChainValidator::verify(&chain, anchor, None, full()).is_valid());

        let anchor = ChainAnchor::Genesis {
            expected_genesis_hash: Some(BlockHash::from_bytes([9; 32])),
        };
        match ChainValidator::verify(&chain, anchor, None, full()) {
            VerifyOutcome::Invalid { first_bad_index, breaks } => {
                assert_eq!(first_bad_index, 0);
                assert_eq!(breaks[0].kind, BreakKind::GenesisViolation);
            }
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_suffix_from_checkpoint() {
        let auth = TestAuthority::new(&["v1"]);
        let chain = build_chain(&auth, "v1", 6);

        let anchor = ChainAnchor::Checkpoint {
            index: 2,
            hash: chain[2].hash,
        };
        assert!(ChainValidator::verify(&chain[3..], anchor, Some(&auth), full()).is_valid());

        let wrong = ChainAnchor::Checkpoint {
            index: 2,
            hash: chain[1].hash,
        };
        let outcome = ChainValidator::verify(&chain[3..], wrong, Some(&auth), full());
        assert_eq!(outcome.first_bad_index(), Some(3));
    }

    #[test]
    fn test_feed_in_batches_matches_single_pass() {
        let auth = TestAuthority::new(&["v1"]);
        let chain = build_chain(&auth, "v1", 7);

        let mut validator = ChainValidator::new(ChainAnchor::GENESIS, full());
        for batch in chain.chunks(3) {
            assert!(validator.feed(batch, Some(&auth)));
        }
        assert_eq!(validator.checked(), 7);
        assert_eq!(
            validator.anchor(),
            ChainAnchor::Checkpoint {
                index: 6,
                hash: chain[6].hash
            }
        );
        assert!(validator.finish().is_valid());
    }

    #[test]
    fn test_index_gap_detected() {
        let auth = TestAuthority::new(&["v1"]);
        let mut chain = build_chain(&auth, "v1", 4);
        chain.remove(2);

        let outcome = ChainValidator::verify(&chain, ChainAnchor::GENESIS, None, full());
        match outcome {
            VerifyOutcome::Invalid { first_bad_index, breaks } => {
                assert_eq!(first_bad_index, 2);
                assert_eq!(breaks[0].kind, BreakKind::IndexDiscontinuity);
            }
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_sentinel_only_at_genesis() {
        let auth = TestAuthority::new(&["v1"]);
        let chain = build_chain(&auth, "v1", 2);

        let mut forged = chain[1].clone();
        forged.header.previous_hash = GENESIS_SENTINEL;
        let signed = forged.header.clone().sign(&auth).unwrap();
        let forged = signed.seal().unwrap();

        let outcome = ChainValidator::verify(
            &[chain[0].clone(), forged],
            ChainAnchor::GENESIS,
            Some(&auth),
            full(),
        );
        match outcome {
            VerifyOutcome::Invalid { first_bad_index, breaks } => {
                assert_eq!(first_bad_index, 1);
                assert_eq!(breaks[0].kind, BreakKind::GenesisViolation);
            }
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_rehashed_payload_breaks_next_link() {
        // Rewriting a block and recomputing its hash still breaks the chain.
        let auth = TestAuthority::new(&["v1"]);
        let mut chain = build_chain(&auth, "v1", 3);

        let mut header = chain[1].header.clone();
        header.payload_ref = PayloadRef::new("rec-forged").unwrap();
        chain[1] = header.sign(&auth).unwrap().seal().unwrap();

        let outcome = ChainValidator::verify(&chain, ChainAnchor::GENESIS, Some(&auth), full());
        match outcome {
            VerifyOutcome::Invalid { first_bad_index, breaks } => {
                assert_eq!(first_bad_index, 2);
                assert_eq!(breaks[0].kind, BreakKind::BrokenLink);
            }
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_authorization_modes() {
        let auth = TestAuthority::new(&["v1", "v2"]);
        let chain = build_chain(&auth, "v2", 3);

        let mut revoked = TestAuthority::new(&["v1", "v2"]);
        revoked
            .revoked_at
            .insert(ValidatorId::new("v2").unwrap(), 1_001);

        let point_in_time = ChainValidator::verify(&chain, ChainAnchor::GENESIS, Some(&revoked), full());
        assert_eq!(point_in_time.first_bad_index(), Some(1));

        let existence = VerifyOptions {
            mode: AuthorizationMode::ExistenceOnly,
            collect_all: false,
        };
        assert!(ChainValidator::verify(&chain, ChainAnchor::GENESIS, Some(&revoked), existence).is_valid());

        let unknown = TestAuthority::new(&["v1"]);
        match ChainValidator::verify(&chain, ChainAnchor::GENESIS, Some(&unknown), existence) {
            VerifyOutcome::Invalid { breaks, .. } => {
                assert_eq!(breaks[0].kind, BreakKind::UnknownValidator)
            }
            other => panic!("expected invalid, got {:?}", other),
        }

        let skip = VerifyOptions {
            mode: AuthorizationMode::Skip,
            collect_all: false,
        };
        assert!(ChainValidator::verify(&chain, ChainAnchor::GENESIS, Some(&unknown), skip).is_valid());
    }

    #[test]
    fn test_bad_signature_detected() {
        let auth = TestAuthority::new(&["v1"]);
        let chain = build_chain(&auth, "v1", 2);

        // Same id, different key: hashes recompute but signatures fail.
        let mut impostor = TestAuthority::new(&["v1"]);
        impostor
            .keys
            .insert(ValidatorId::new("v1").unwrap(), Keypair::from_seed(&[0xee; 32]));

        match ChainValidator::verify(&chain, ChainAnchor::GENESIS, Some(&impostor), full()) {
            VerifyOutcome::Invalid { first_bad_index, breaks } => {
                assert_eq!(first_bad_index, 0);
                assert_eq!(breaks[0].kind, BreakKind::BadSignature);
            }
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_collect_all_enumerates_breaks() {
        let auth = TestAuthority::new(&["v1"]);
        let mut chain = build_chain(&auth, "v1", 5);
        chain[1].hash.0[0] ^= 0x01;
        chain[3].header.timestamp += 1;

        let options = VerifyOptions {
            mode: AuthorizationMode::Skip,
            collect_all: true,
        };
        match ChainValidator::verify(&chain, ChainAnchor::GENESIS, None, options) {
            VerifyOutcome::Invalid { first_bad_index, breaks } => {
                assert_eq!(first_bad_index, 1);
                let kinds: Vec<_> = breaks.iter().map(|b| (b.index, b.kind)).collect();
                assert!(kinds.contains(&(1, BreakKind::HashMismatch)));
                assert!(kinds.contains(&(3, BreakKind::HashMismatch)));
                assert!(kinds.contains(&(4, BreakKind::BrokenLink)));
            }
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_block() {
        let auth = TestAuthority::new(&["v1"]);
        let mut chain = build_chain(&auth, "v1", 1);
        assert!(verify_block(&chain[0]).is_ok());

        chain[0].header.payload_ref = PayloadRef::new("rec-x").unwrap();
        assert_eq!(verify_block(&chain[0]).unwrap_err().kind, BreakKind::HashMismatch);
    }

    /// Flip one bit in one stored field of `block`.
    fn flip(block: &mut Block, field: usize, bit: usize) {
        fn flip_str(s: &str, bit: usize) -> String {
            let mut bytes = s.as_bytes().to_vec();
            let i = (bit / 8) % bytes.len();
            bytes[i] ^= 1 << (bit % 8);
            String::from_utf8_lossy(&bytes).into_owned()
        }

        match field {
            0 => block.header.index ^= 1 << (bit % 64),
            1 => block.header.timestamp ^= 1 << (bit % 63),
            2 => block.header.previous_hash.0[(bit / 8) % 32] ^= 1 << (bit % 8),
            3 => {
                let s = flip_str(block.header.payload_ref.as_str(), bit);
                block.header.payload_ref = PayloadRef::from_stored(s);
            }
            4 => {
                let s = flip_str(block.header.validator_id.as_str(), bit);
                block.header.validator_id = ValidatorId::from_stored(s);
            }
            5 => block.signature.0[(bit / 8) % 64] ^= 1 << (bit % 8),
            _ => block.hash.0[(bit / 8) % 32] ^= 1 << (bit % 8),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_single_bit_flip_detected_at_block(
            len in 1usize..8,
            target in any::<prop::sample::Index>(),
            field in 0usize..7,
            bit in 0usize..512,
        ) {
            let auth = TestAuthority::new(&["validator_001"]);
            let mut chain = build_chain(&auth, "validator_001", len);
            let k = target.index(len);
            flip(&mut chain[k], field, bit);

            for mode in [AuthorizationMode::Skip, AuthorizationMode::PointInTime] {
                let options = VerifyOptions { mode, collect_all: false };
                let outcome = ChainValidator::verify(&chain, ChainAnchor::GENESIS, Some(&auth), options);
                prop_assert_eq!(outcome.first_bad_index(), Some(k as u64));
            }
        }

        #[test]
        fn prop_built_chains_verify(len in 0usize..10) {
            let auth = TestAuthority::new(&["validator_001"]);
            let chain = build_chain(&auth, "validator_001", len);
            let outcome = ChainValidator::verify(&chain, ChainAnchor::GENESIS, Some(&auth), full());
            prop_assert!(outcome.is_valid());
        }
    }
}
