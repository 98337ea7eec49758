//! Custody of validator signing keys.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use medledger_core::{BlockSigner, CoreError, Ed25519PublicKey, Ed25519Signature, Keypair, ValidatorId};

/// Signing keys held on behalf of validators.
///
/// The caller's identity is trusted once received; the keyring signs as
/// whichever validator it is asked to, provided it holds that validator's key.
#[derive(Default)]
pub struct Keyring {
    keys: RwLock<HashMap<ValidatorId, Keypair>>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `keypair` for `id`, replacing any previous key.
    pub fn insert(&self, id: ValidatorId, keypair: Keypair) {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, keypair);
    }

    /// Drop the key held for `id`.
    pub fn remove(&self, id: &ValidatorId) -> bool {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    pub fn contains(&self, id: &ValidatorId) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Public half of the key held for `id`.
    pub fn public_key(&self, id: &ValidatorId) -> Option<Ed25519PublicKey> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(Keypair::public_key)
    }
}

impl BlockSigner for Keyring {
    fn sign(&self, validator_id: &ValidatorId, message: &[u8]) -> Result<Ed25519Signature, CoreError> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        let keypair = keys
            .get(validator_id)
            .ok_or_else(|| CoreError::MissingCredential(validator_id.clone()))?;
        Ok(keypair.sign(message))
    }
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.keys.read().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("Keyring").field("keys", &count).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signs_only_held_identities() {
        let keyring = Keyring::new();
        let id = ValidatorId::new("v1").unwrap();
        let keypair = Keypair::from_seed(&[5; 32]);
        let public = keypair.public_key();
        keyring.insert(id.clone(), keypair);

        let sig = keyring.sign(&id, b"header").unwrap();
        public.verify(b"header", &sig).unwrap();

        let other = ValidatorId::new("v2").unwrap();
        assert!(matches!(
            keyring.sign(&other, b"header"),
            Err(CoreError::MissingCredential(_))
        ));
    }

    #[test]
    fn test_remove_revokes_custody() {
        let keyring = Keyring::new();
        let id = ValidatorId::new("v1").unwrap();
        keyring.insert(id.clone(), Keypair::generate());
        assert!(keyring.contains(&id));
        assert!(keyring.remove(&id));
        assert!(!keyring.contains(&id));
        assert!(keyring.public_key(&id).is_none());
    }
}
