pub mod mock_ledger;
pub mod session;
pub mod signer;
pub mod submit;

// Re-export the main types for convenience
pub use mock_ledger::MockLedger;
pub use session::{Session, SubmittedTx};
pub use signer::{dev_signature, DevSigner};
pub use submit::{finalize, MIN_COLLATERAL};
