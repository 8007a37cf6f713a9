pub mod addl;
pub mod context;
pub mod tree;
pub mod validity;

// Re-export the main types for convenience
pub use addl::{TxDescription, TxOrThunk, TxThunk};
pub use context::TxContext;
pub use tree::{TcxId, TxContextTree};
pub use validity::ValidityWindow;
