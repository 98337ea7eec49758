//! Golden test vectors for deterministic verification.
//!
//! Every implementation of the block format must produce identical signing
//! messages, signatures (Ed25519 is deterministic) and digests for these
//! inputs.

use medledger_core::{
    digest, signing_message, Block, BlockHash, BlockHeader, Ed25519Signature, Keypair,
    PayloadRef, SignedHeader, ValidatorId,
};
use serde::Serialize;

use crate::generators::SeedSigner;

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Seed for deterministic key generation.
    pub seed: [u8; 32],
    pub index: u64,
    pub timestamp: i64,
    /// Previous hash (hex).
    pub previous_hash: &'static str,
    pub payload_ref: &'static str,
    pub validator_id: &'static str,
    /// Expected public key (hex).
    pub expected_public_key: &'static str,
    /// Expected signing message (hex).
    pub expected_signing_message: &'static str,
    /// Expected signature (hex).
    pub expected_signature: &'static str,
    /// Expected block hash (hex).
    pub expected_hash: &'static str,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "genesis block",
            seed: [0x42; 32],
            index: 0,
            timestamp: 1_736_870_400_000, // 2025-01-14T16:00:00Z
            previous_hash: "0000000000000000000000000000000000000000000000000000000000000000",
            payload_ref: "rec-1",
            validator_id: "validator_001",
            expected_public_key: "2152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12",
            expected_signing_message: "6d65646c65646765722f626c6f636b2d7369672f7630a50100021b00000194658b1000035820000000000000000000000000000000000000000000000000000000000000000004657265632d31056d76616c696461746f725f303031",
            expected_signature: "9d81c65b894424137337fee7667f30107979bd2f9e55c88b0752cea6a67f8fdc5b39551c4628f06982ff7214541a1dde317f049a3d3bc9845d53b24cbfe9fb01",
            expected_hash: "d365aef74fc925b8451626baf7bb404c187f3364bf2e728e942b844348040c87",
        },
        GoldenVector {
            name: "second block linked to genesis",
            seed: [0x42; 32],
            index: 1,
            timestamp: 1_736_870_401_000,
            previous_hash: "d365aef74fc925b8451626baf7bb404c187f3364bf2e728e942b844348040c87",
            payload_ref: "rec-2",
            validator_id: "validator_001",
            expected_public_key: "2152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12",
            expected_signing_message: "6d65646c65646765722f626c6f636b2d7369672f7630a50101021b00000194658b13e8035820d365aef74fc925b8451626baf7bb404c187f3364bf2e728e942b844348040c8704657265632d32056d76616c696461746f725f303031",
            expected_signature: "4b49172a9b0e6814a581f0df11e524bf573ddef879a25eef676fcfcb94c265958dea8b1546097e735f69cb154b89a54c571562bbe4742fab6f41d760e4e7730f",
            expected_hash: "7fbb49d3e61347b7258a9d75e94ef216c58824c1867f79ed298493c212728443",
        },
        GoldenVector {
            name: "negative timestamp and long payload reference",
            seed: [0x07; 32],
            index: 300,
            timestamp: -5,
            previous_hash: "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            payload_ref: "blake3:abababababababababababababababababababababababababababababababab",
            validator_id: "auditor_7",
            expected_public_key: "ea4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c",
            expected_signing_message: "6d65646c65646765722f626c6f636b2d7369672f7630a50119012c0224035820aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa047847626c616b65333a61626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162056961756469746f725f37",
            expected_signature: "4d37d944edfed37848d84950ef45c1105e5db1921c46fa649b94088511bf4e327c50630c38d92d319aabb7104879f5989a13dde728b67cbdd606fa79a485550c",
            expected_hash: "0c2429386a30264079e4ae06b1a8be9a3bf28cb0185d3d1f3318733db334144d",
        },
    ]
}

/// Build the block a golden vector describes.
pub fn generate_block_from_vector(vector: &GoldenVector) -> Block {
    let validator_id = ValidatorId::new(vector.validator_id).expect("vector validator id");
    let signer = SeedSigner {
        id: validator_id.clone(),
        keypair: Keypair::from_seed(&vector.seed),
    };
    let header = BlockHeader {
        index: vector.index,
        timestamp: vector.timestamp,
        previous_hash: BlockHash::from_hex(vector.previous_hash).expect("vector previous hash"),
        payload_ref: PayloadRef::new(vector.payload_ref).expect("vector payload ref"),
        validator_id,
    };
    header
        .sign(&signer)
        .and_then(SignedHeader::seal)
        .expect("vector block seals")
}

/// Derived outputs of a vector, in hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorOutput {
    pub name: String,
    pub public_key: String,
    pub signing_message: String,
    pub signature: String,
    pub hash: String,
}

/// Compute the outputs of a vector from its inputs.
pub fn compute_vector(vector: &GoldenVector) -> VectorOutput {
    let keypair = Keypair::from_seed(&vector.seed);
    let previous_hash = BlockHash::from_hex(vector.previous_hash).expect("vector previous hash");
    let payload_ref = PayloadRef::new(vector.payload_ref).expect("vector payload ref");
    let validator_id = ValidatorId::new(vector.validator_id).expect("vector validator id");

    let message = signing_message(
        vector.index,
        vector.timestamp,
        &previous_hash,
        &payload_ref,
        &validator_id,
    )
    .expect("vector header encodes");
    let signature: Ed25519Signature = keypair.sign(&message);
    let hash = digest(
        vector.index,
        vector.timestamp,
        &previous_hash,
        &payload_ref,
        &validator_id,
        &signature,
    )
    .expect("vector header encodes");

    VectorOutput {
        name: vector.name.to_string(),
        public_key: keypair.public_key().to_hex(),
        signing_message: hex::encode(&message),
        signature: signature.to_hex(),
        hash: hash.to_hex(),
    }
}

/// Check every vector; returns `(name, matches, computed)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, VectorOutput)> {
    all_vectors()
        .iter()
        .map(|v| {
            let out = compute_vector(v);
            let matches = out.public_key == v.expected_public_key
                && out.signing_message == v.expected_signing_message
                && out.signature == v.expected_signature
                && out.hash == v.expected_hash;
            (v.name.to_string(), matches, out)
        })
        .collect()
}

/// The vectors' computed outputs as pretty JSON, for other implementations.
pub fn vectors_json() -> String {
    let outputs: Vec<VectorOutput> = all_vectors().iter().map(compute_vector).collect();
    serde_json::to_string_pretty(&outputs).unwrap_or_default()
}
