//! Capo: delegation contracts and capability tokens
//!
//! This crate re-exports all the components of the Capo system.

pub use capo_charter;
pub use capo_core;
pub use capo_delegation;
pub use capo_runtime;
pub use capo_transaction;

pub use capo_charter::{
    BootstrappedConfig, Capo, CapoState, CharterArgs, CharterDatum, CharterVerifier,
    DelegateChoice, ReplaceOptions,
};
pub use capo_core::{CapoError, NetworkParams, TokenName, UniqueTokenName, UutGenerator};
pub use capo_delegation::{
    ConfiguredDelegate, DelegateConfig, DelegateLink, Role, RoleMap, Strategy, TokenLifecycle,
};
pub use capo_runtime::{MockLedger, Session};
pub use capo_transaction::{TxContext, TxContextTree, TxDescription};
