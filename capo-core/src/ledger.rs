//! Interfaces to the collaborators that live outside this workspace: the
//! ledger (queries and submission), the on-chain verifier, and signers.

use crate::config::Network;
use crate::error::CapoError;
use crate::objects::{Address, PubKeyHash, TxOutputId, Utxo};
use crate::transaction::{Signature, SignedTransaction, Transaction, TxReceipt};

/// Read access to the ledger's unspent outputs
pub trait LedgerQuery {
    /// Every unspent output currently held at `address`
    fn spendable_utxos(&self, address: &Address) -> Result<Vec<Utxo>, CapoError>;

    /// Look up one unspent output
    fn utxo(&self, id: &TxOutputId) -> Result<Option<Utxo>, CapoError>;

    /// The network this ledger belongs to
    fn network(&self) -> Network;

    /// The slot the ledger is currently processing
    fn current_slot(&self) -> u64;
}

/// A ledger that accepts transactions
pub trait LedgerProvider: LedgerQuery {
    /// Submit a signed transaction and wait for it to be confirmed or rejected.
    ///
    /// Rejections surface as `CapoError::OnchainRejection` carrying the
    /// verifier's message verbatim.
    fn submit(&mut self, tx: SignedTransaction) -> Result<TxReceipt, CapoError>;
}

/// The transaction as seen by on-chain validation: with all inputs resolved
#[derive(Debug, Clone, Copy)]
pub struct ResolvedTx<'a> {
    pub tx: &'a Transaction,
    pub signatures: &'a [Signature],
}

/// Opaque on-chain validation logic.
///
/// Given a fully assembled transaction it deterministically accepts or
/// rejects it; the rejection message is passed to the caller unchanged.
pub trait Verifier {
    fn name(&self) -> &str;

    fn verify(&self, tx: ResolvedTx<'_>) -> Result<(), String>;
}

/// Produces signatures for one wallet key
pub trait Signer {
    fn pub_key_hash(&self) -> PubKeyHash;

    fn sign(&self, tx: &Transaction) -> Result<Signature, CapoError>;

    /// The wallet address controlled by this signer
    fn address(&self) -> Address {
        Address::PubKey(self.pub_key_hash())
    }
}
