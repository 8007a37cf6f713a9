pub mod config;
pub mod error;
pub mod id;
pub mod ledger;
pub mod objects;
pub mod transaction;

// Re-export the main types for convenience
pub use config::{Network, NetworkParams, SlotConfig};
pub use error::{CapoError, DelegateConfigNeeded, FieldErrors};
pub use id::{SeedReference, TokenName, UniqueTokenName, UutGenerator};
pub use ledger::{LedgerProvider, LedgerQuery, ResolvedTx, Signer, Verifier};
pub use objects::{
    Activity, Address, Datum, PolicyId, PubKeyHash, Script, ScriptHash, ScriptPurpose, TxId,
    TxOutput, TxOutputId, Utxo, Value,
};
pub use transaction::{
    CommitmentLevel, MintInstruction, Signature, SignedTransaction, Transaction, TxBuilder,
    TxInput, TxReceipt,
};
