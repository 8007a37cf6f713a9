use std::fmt;

use capo_core::error::CapoError;
use capo_core::ledger::LedgerQuery;

use crate::context::TxContext;

/// Builds a follow-up transaction once its predecessors are confirmed
pub type TxThunk = Box<dyn FnOnce(&dyn LedgerQuery) -> Result<TxContext, CapoError>>;

/// A queued transaction, either already assembled or assembled on demand
pub enum TxOrThunk {
    Ready(TxContext),
    Deferred(TxThunk),
}

/// A named, deferred transaction executed after the one that queued it
pub struct TxDescription {
    pub description: String,
    pub more_info: Option<String>,
    /// Failure of an optional transaction doesn't stop the ones after it
    pub optional: bool,
    pub tx: TxOrThunk,
}

impl TxDescription {
    pub fn ready(description: impl Into<String>, tcx: TxContext) -> Self {
        Self {
            description: description.into(),
            more_info: None,
            optional: false,
            tx: TxOrThunk::Ready(tcx),
        }
    }

    pub fn deferred<F>(description: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&dyn LedgerQuery) -> Result<TxContext, CapoError> + 'static,
    {
        Self {
            description: description.into(),
            more_info: None,
            optional: false,
            tx: TxOrThunk::Deferred(Box::new(build)),
        }
    }

    pub fn with_more_info(mut self, info: impl Into<String>) -> Self {
        self.more_info = Some(info.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Produce the transaction context, running the thunk against current ledger state
    pub fn resolve(self, ledger: &dyn LedgerQuery) -> Result<TxContext, CapoError> {
        match self.tx {
            TxOrThunk::Ready(tcx) => Ok(tcx),
            TxOrThunk::Deferred(build) => build(ledger),
        }
    }
}

impl fmt::Debug for TxDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxDescription")
            .field("description", &self.description)
            .field("more_info", &self.more_info)
            .field("optional", &self.optional)
            .field(
                "tx",
                &match self.tx {
                    TxOrThunk::Ready(_) => "ready",
                    TxOrThunk::Deferred(_) => "deferred",
                },
            )
            .finish()
    }
}
