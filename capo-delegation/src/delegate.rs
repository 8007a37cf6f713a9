use std::fmt;

use capo_core::error::CapoError;
use capo_core::objects::{Address, PubKeyHash, Script, ScriptHash, ScriptPurpose};

use crate::config::DelegateConfig;

/// A live delegate: the thing a role resolves to.
///
/// The delegate's authority token lives at `address()`. Script delegates
/// expose the script that guards that address; wallet-held authorities
/// have no script and are exercised by the wallet's signature instead.
pub trait Delegate: fmt::Debug {
    /// Implementation name, e.g. `BasicMintDelegate`
    fn kind(&self) -> &str;

    fn config(&self) -> &DelegateConfig;

    /// Where the authority token is held
    fn address(&self) -> Address;

    fn script(&self) -> Option<&Script> {
        None
    }

    fn script_hash(&self) -> Option<ScriptHash> {
        self.script().map(|s| s.hash())
    }
}

/// A delegate whose authority token is guarded by its own spending script.
///
/// The script is specialised with the delegate's whole config, so two
/// delegates with different tokens never share an address.
#[derive(Debug, Clone)]
pub struct ScriptDelegate {
    kind: &'static str,
    script: Script,
    config: DelegateConfig,
}

impl ScriptDelegate {
    pub fn new(kind: &'static str, program: &str, config: &DelegateConfig) -> Result<Self, CapoError> {
        let script = Script::parameterized(program, ScriptPurpose::Spending, &config.to_json_string()?)?;
        Ok(Self {
            kind,
            script,
            config: config.clone(),
        })
    }
}

impl Delegate for ScriptDelegate {
    fn kind(&self) -> &str {
        self.kind
    }

    fn config(&self) -> &DelegateConfig {
        &self.config
    }

    fn address(&self) -> Address {
        self.script.address()
    }

    fn script(&self) -> Option<&Script> {
        Some(&self.script)
    }
}

/// An authority held directly in a wallet
#[derive(Debug, Clone)]
pub struct WalletDelegate {
    kind: &'static str,
    holder: PubKeyHash,
    config: DelegateConfig,
}

impl WalletDelegate {
    pub fn new(kind: &'static str, holder: PubKeyHash, config: &DelegateConfig) -> Self {
        Self {
            kind,
            holder,
            config: config.clone(),
        }
    }

    pub fn holder(&self) -> &PubKeyHash {
        &self.holder
    }
}

impl Delegate for WalletDelegate {
    fn kind(&self) -> &str {
        self.kind
    }

    fn config(&self) -> &DelegateConfig {
        &self.config
    }

    fn address(&self) -> Address {
        Address::PubKey(self.holder)
    }
}
