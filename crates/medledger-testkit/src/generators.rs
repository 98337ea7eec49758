//! Proptest generators for property-based testing.

use proptest::prelude::*;

use medledger_core::{
    Block, BlockFactory, BlockHash, BlockSigner, CoreError, Ed25519PublicKey, Ed25519Signature,
    Keypair, PayloadRef, Role, ValidatorId, ValidatorStatus,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random Ed25519PublicKey.
pub fn public_key() -> impl Strategy<Value = Ed25519PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

/// Generate a random BlockHash. May collide with the sentinel only by chance.
pub fn block_hash() -> impl Strategy<Value = BlockHash> {
    any::<[u8; 32]>().prop_map(BlockHash::from_bytes)
}

/// Generate a valid ValidatorId.
pub fn validator_id() -> impl Strategy<Value = ValidatorId> {
    "[a-z][a-z0-9_]{0,31}".prop_map(|s| ValidatorId::new(s).expect("pattern yields valid ids"))
}

/// Generate a valid PayloadRef.
pub fn payload_ref() -> impl Strategy<Value = PayloadRef> {
    "[a-z]{2,8}-[0-9a-f]{1,16}".prop_map(|s| PayloadRef::new(s).expect("pattern yields valid refs"))
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=i64::MAX / 2
}

pub fn role() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::Administrator),
        Just(Role::Clinician),
        Just(Role::Auditor),
    ]
}

pub fn validator_status() -> impl Strategy<Value = ValidatorStatus> {
    prop_oneof![Just(ValidatorStatus::Active), Just(ValidatorStatus::Revoked)]
}

/// Inputs for building a chain with a single validator.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub seed: [u8; 32],
    pub validator_id: ValidatorId,
    pub start: i64,
    pub payloads: Vec<PayloadRef>,
}

impl Arbitrary for ChainParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<[u8; 32]>(),
            validator_id(),
            0i64..=i64::MAX / 4,
            prop::collection::vec(payload_ref(), 1..=16),
        )
            .prop_map(|(seed, validator_id, start, payloads)| ChainParams {
                seed,
                validator_id,
                start,
                payloads,
            })
            .boxed()
    }
}

/// Signs as a single validator.
pub struct SeedSigner {
    pub id: ValidatorId,
    pub keypair: Keypair,
}

impl BlockSigner for SeedSigner {
    fn sign(&self, validator_id: &ValidatorId, message: &[u8]) -> Result<Ed25519Signature, CoreError> {
        if validator_id != &self.id {
            return Err(CoreError::MissingCredential(validator_id.clone()));
        }
        Ok(self.keypair.sign(message))
    }
}

/// Build the chain described by `params`, one millisecond between blocks.
pub fn chain_from_params(params: &ChainParams) -> Vec<Block> {
    let signer = SeedSigner {
        id: params.validator_id.clone(),
        keypair: Keypair::from_seed(&params.seed),
    };

    let mut blocks: Vec<Block> = Vec::with_capacity(params.payloads.len());
    for (i, payload) in params.payloads.iter().enumerate() {
        let block = BlockFactory::build(
            payload,
            blocks.last(),
            &params.validator_id,
            params.start + i as i64,
            &signer,
        )
        .expect("generated inputs are valid");
        blocks.push(block);
    }
    blocks
}
