use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use capo_core::error::CapoError;
use capo_core::id::{SeedReference, TokenName};
use capo_core::objects::{Address, PolicyId, Script, ScriptPurpose};
use capo_delegation::DelegateLink;

/// Layout version of `CharterDatum`
pub const CHARTER_VERSION: u32 = 1;

/// Name of the charter token under the capo's policy
pub const CHARTER_TOKEN: &str = "charter";

/// Token purpose of the settings record
pub const SETTINGS_PURPOSE: &str = "set";

/// Program names of the capo's own scripts
pub const MINTER_PROGRAM: &str = "capoMinter";
pub const CAPO_PROGRAM: &str = "capo";

/// The central record of a capo, held in the charter token's datum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharterDatum {
    pub version: u32,
    pub gov_authority_link: DelegateLink,
    pub mint_delegate_link: DelegateLink,
    pub spend_delegate_link: DelegateLink,
    pub mint_invariants: Vec<DelegateLink>,
    pub spend_invariants: Vec<DelegateLink>,
    pub named_delegates: BTreeMap<String, DelegateLink>,
    /// Name of the settings token; fixed at bootstrap
    pub settings_ref: TokenName,
}

impl CharterDatum {
    /// Check that `next` is an allowed successor of this record
    pub fn check_update(&self, next: &CharterDatum) -> Result<(), CapoError> {
        if next.version != self.version {
            return Err(CapoError::CharterInvariant(format!(
                "charter version can't change from {} to {}",
                self.version, next.version
            )));
        }
        if next.settings_ref != self.settings_ref {
            return Err(CapoError::CharterInvariant(format!(
                "settings reference is immutable: expected {}, found {}",
                self.settings_ref, next.settings_ref
            )));
        }
        if !next.mint_invariants.starts_with(&self.mint_invariants) {
            return Err(CapoError::CharterInvariant(
                "mint invariants can only be added, not removed or changed".to_string(),
            ));
        }
        if !next.spend_invariants.starts_with(&self.spend_invariants) {
            return Err(CapoError::CharterInvariant(
                "spend invariants can only be added, not removed or changed".to_string(),
            ));
        }
        Ok(())
    }
}

/// Application settings, held at the capo address under the settings token
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SettingsDatum {
    pub values: BTreeMap<String, serde_json::Value>,
}

/// The capo's minting policy and spending script, both derived from the seed
#[derive(Debug, Clone)]
pub struct CapoScripts {
    pub minter: Script,
    pub capo: Script,
}

impl CapoScripts {
    pub fn for_seed(seed: &SeedReference) -> Result<Self, CapoError> {
        let minter = Script::parameterized(MINTER_PROGRAM, ScriptPurpose::Minting, seed)?;
        let capo = Script::parameterized(
            CAPO_PROGRAM,
            ScriptPurpose::Spending,
            &minter.hash().to_string(),
        )?;
        Ok(Self { minter, capo })
    }

    pub fn mph(&self) -> PolicyId {
        self.minter.hash()
    }

    pub fn address(&self) -> Address {
        self.capo.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capo_core::objects::TxId;
    use capo_delegation::DelegateConfig;

    fn link(name: &str) -> DelegateLink {
        DelegateLink {
            uut_name: Some(TokenName::new(name).unwrap()),
            strategy_name: "defaultV1".to_string(),
            config: DelegateConfig::new(),
            delegate_validator_hash: None,
        }
    }

    fn charter() -> CharterDatum {
        CharterDatum {
            version: CHARTER_VERSION,
            gov_authority_link: link("capoGov-1"),
            mint_delegate_link: link("mintDgt-1"),
            spend_delegate_link: link("spendDgt-1"),
            mint_invariants: vec![link("mintInv-1")],
            spend_invariants: Vec::new(),
            named_delegates: BTreeMap::new(),
            settings_ref: TokenName::new("set-1").unwrap(),
        }
    }

    #[test]
    fn test_delegate_change_allowed() {
        let mut next = charter();
        next.mint_delegate_link = link("mintDgt-2");
        next.mint_invariants.push(link("mintInv-2"));
        next.named_delegates.insert("notes".to_string(), link("notes-1"));
        charter().check_update(&next).unwrap();
    }

    #[test]
    fn test_settings_ref_immutable() {
        let mut next = charter();
        next.settings_ref = TokenName::new("set-2").unwrap();
        let err = charter().check_update(&next).unwrap_err();
        assert!(matches!(err, CapoError::CharterInvariant(_)));
        assert!(err.to_string().contains("settings reference"));
    }

    #[test]
    fn test_invariants_only_grow() {
        let mut shrunk = charter();
        shrunk.mint_invariants.clear();
        assert!(charter().check_update(&shrunk).is_err());

        let mut swapped = charter();
        swapped.mint_invariants = vec![link("mintInv-9")];
        assert!(charter().check_update(&swapped).is_err());
    }

    #[test]
    fn test_scripts_follow_seed() {
        let a = CapoScripts::for_seed(&SeedReference::new(TxId::new([1; 32]), 0)).unwrap();
        let a2 = CapoScripts::for_seed(&SeedReference::new(TxId::new([1; 32]), 0)).unwrap();
        let b = CapoScripts::for_seed(&SeedReference::new(TxId::new([1; 32]), 1)).unwrap();
        assert_eq!(a.mph(), a2.mph());
        assert_eq!(a.address(), a2.address());
        assert_ne!(a.mph(), b.mph());
        assert_ne!(a.address(), b.address());
    }
}
