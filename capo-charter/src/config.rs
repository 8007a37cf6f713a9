use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use capo_core::error::CapoError;
use capo_core::id::SeedReference;
use capo_core::objects::{Address, PolicyId};
use capo_delegation::DelegateConfig;

/// Revision stamped into every delegate config the capo issues
pub const CAPO_REV: u64 = 1;

/// What a capo needs to find itself again after bootstrap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrappedConfig {
    pub seed: SeedReference,
    pub mph: PolicyId,
    pub capo_addr: Address,
    pub rev: u64,
}

impl BootstrappedConfig {
    pub fn save(&self, path: &Path) -> Result<(), CapoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("writing capo config to {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CapoError> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading capo config from {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("parsing capo config in {}", path.display()))?;
        Ok(config)
    }
}

/// Lifecycle of a capo instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapoState {
    Uninitialized,
    /// The charter transaction was composed but isn't known to be on the ledger yet
    Bootstrapping(BootstrappedConfig),
    Chartered(BootstrappedConfig),
}

/// A role's strategy choice plus the caller's config for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateChoice {
    pub strategy: String,
    pub config: DelegateConfig,
}

impl DelegateChoice {
    pub fn new(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            config: DelegateConfig::new(),
        }
    }

    pub fn with_config(mut self, config: DelegateConfig) -> Self {
        self.config = config;
        self
    }
}

/// Everything needed to mint a charter
#[derive(Debug, Clone)]
pub struct CharterArgs {
    pub gov_authority: DelegateChoice,
    pub mint_delegate: DelegateChoice,
    pub spend_delegate: DelegateChoice,
    /// Written by the `initialSettings` follow-up transaction
    pub initial_settings: BTreeMap<String, serde_json::Value>,
}

/// How a delegate replacement treats the outgoing delegate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceOptions {
    /// Skip the old delegate's cooperation; its token is left dangling
    pub forced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use capo_core::objects::{ScriptHash, TxId};
    use tempfile::tempdir;

    fn config() -> BootstrappedConfig {
        BootstrappedConfig {
            seed: SeedReference::new(TxId::new([3; 32]), 1),
            mph: ScriptHash::new([4; 32]),
            capo_addr: Address::Script(ScriptHash::new([5; 32])),
            rev: CAPO_REV,
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capo.json");
        config().save(&path).unwrap();
        assert_eq!(BootstrappedConfig::load(&path).unwrap(), config());
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = BootstrappedConfig::load(&path).unwrap_err();
        assert!(matches!(err, CapoError::Context(_)));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn test_load_garbage_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capo.json");
        fs::write(&path, "{\"seed\": 7}").unwrap();
        assert!(BootstrappedConfig::load(&path).is_err());
    }
}
