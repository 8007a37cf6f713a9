use capo_core::error::CapoError;
use capo_core::ledger::Signer;
use capo_core::objects::{PubKeyHash, TxId};
use capo_core::transaction::{Signature, Transaction};

const DEV_KEY_DOMAIN: &[u8] = b"capo-dev-key";
const DEV_SIG_DOMAIN: &[u8] = b"capo-dev-sig";

/// The signature a `DevSigner` produces for `tx_id`.
///
/// Development signatures are publicly recomputable; they only prove which
/// key a test meant to use.
pub fn dev_signature(signer: &PubKeyHash, tx_id: &TxId) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DEV_SIG_DOMAIN);
    hasher.update(signer.bytes());
    hasher.update(tx_id.bytes());
    hasher.finalize().as_bytes().to_vec()
}

/// A deterministic signer for tests and local development
#[derive(Debug, Clone)]
pub struct DevSigner {
    name: String,
    key: PubKeyHash,
}

impl DevSigner {
    pub fn new(name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DEV_KEY_DOMAIN);
        hasher.update(name.as_bytes());
        Self {
            name: name.to_string(),
            key: PubKeyHash::new(*hasher.finalize().as_bytes()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Signer for DevSigner {
    fn pub_key_hash(&self) -> PubKeyHash {
        self.key
    }

    fn sign(&self, tx: &Transaction) -> Result<Signature, CapoError> {
        Ok(Signature {
            signer: self.key,
            bytes: dev_signature(&self.key, &tx.id),
        })
    }
}
