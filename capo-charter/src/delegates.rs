//! Built-in delegate implementations and the base role map every capo starts from.

use std::sync::Arc;

use capo_core::error::{CapoError, DelegateConfigNeeded, FieldErrors};
use capo_core::objects::PubKeyHash;
use capo_delegation::{Delegate, DelegateConfig, Role, RoleMap, ScriptDelegate, Strategy, WalletDelegate};

pub const GOV_AUTHORITY: &str = "govAuthority";
pub const MINT_DELEGATE: &str = "mintDelegate";
pub const SPEND_DELEGATE: &str = "spendDelegate";
pub const MINT_INVARIANT: &str = "mintInvariant";
pub const SPEND_INVARIANT: &str = "spendInvariant";

/// Strategy name of the built-in mint, spend and invariant delegates
pub const DEFAULT_STRATEGY: &str = "defaultV1";
/// Strategy name of the wallet-held governance authority
pub const ADDRESS_STRATEGY: &str = "address";

/// Config key naming the wallet that holds an address authority
pub const ADDR_HINT: &str = "addr_hint";

pub fn basic_mint_delegate(config: &DelegateConfig) -> Result<Arc<dyn Delegate>, CapoError> {
    Ok(Arc::new(ScriptDelegate::new("BasicMintDelegate", "mintDgt", config)?))
}

pub fn basic_spend_delegate(config: &DelegateConfig) -> Result<Arc<dyn Delegate>, CapoError> {
    Ok(Arc::new(ScriptDelegate::new("BasicSpendDelegate", "spendDgt", config)?))
}

pub fn basic_invariant_delegate(config: &DelegateConfig) -> Result<Arc<dyn Delegate>, CapoError> {
    Ok(Arc::new(ScriptDelegate::new("BasicInvariantDelegate", "invariant", config)?))
}

fn addr_hint(config: &DelegateConfig) -> Result<PubKeyHash, String> {
    let hint = config
        .get_str(ADDR_HINT)
        .ok_or_else(|| "a wallet key hash is required".to_string())?;
    PubKeyHash::from_hex(hint).map_err(|e| e.to_string())
}

fn validate_address_authority(config: &DelegateConfig) -> Option<FieldErrors> {
    let mut errors = FieldErrors::new();
    if let Err(problem) = addr_hint(config) {
        errors.insert(ADDR_HINT.to_string(), vec![problem]);
    }
    Some(errors)
}

/// Governance authority held by a wallet: whoever holds the token governs
pub fn address_authority_policy(config: &DelegateConfig) -> Result<Arc<dyn Delegate>, CapoError> {
    let holder = addr_hint(config).map_err(|problem| {
        let mut errors = FieldErrors::new();
        errors.insert(ADDR_HINT.to_string(), vec![problem]);
        DelegateConfigNeeded::new("address authority needs a holder").with_field_errors(errors)
    })?;
    Ok(Arc::new(WalletDelegate::new("AddressAuthorityPolicy", holder, config)))
}

/// The roles every capo defines; applications `extend` this map with their own
pub fn base_roles() -> Result<RoleMap, CapoError> {
    RoleMap::new()
        .with_role(Role::new(GOV_AUTHORITY, "capoGov").variant(
            ADDRESS_STRATEGY,
            Strategy::new(address_authority_policy).with_validator(validate_address_authority),
        ))?
        .with_role(
            Role::new(MINT_DELEGATE, "mintDgt")
                .variant(DEFAULT_STRATEGY, Strategy::new(basic_mint_delegate)),
        )?
        .with_role(
            Role::new(SPEND_DELEGATE, "spendDgt")
                .variant(DEFAULT_STRATEGY, Strategy::new(basic_spend_delegate)),
        )?
        .with_role(
            Role::new(MINT_INVARIANT, "mintInv")
                .variant(DEFAULT_STRATEGY, Strategy::new(basic_invariant_delegate)),
        )?
        .with_role(
            Role::new(SPEND_INVARIANT, "spendInv")
                .variant(DEFAULT_STRATEGY, Strategy::new(basic_invariant_delegate)),
        )
}
