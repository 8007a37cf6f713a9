use serde::{Deserialize, Serialize};

use capo_core::id::{SeedReference, TokenName};
use capo_delegation::ActivityKind;

/// Why the capo's minting policy is being run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapoMinterActivity {
    MintingCharter { seed: SeedReference },
    /// Minting on behalf of the current mint delegate
    MintWithDelegateAuthorizing,
    ReplacingMintDelegate { seed: SeedReference },
    /// Installs a new mint delegate without the old one's cooperation
    ForcingNewMintDelegate { seed: SeedReference },
    CreatingNewSpendDelegate {
        seed: SeedReference,
        replacing: Option<TokenName>,
    },
    AddingMintInvariant { seed: SeedReference },
    AddingSpendInvariant { seed: SeedReference },
    InstallingNamedDelegate { seed: SeedReference, name: String },
    /// Burns a named delegate's token as it leaves the charter
    RetiringNamedDelegate { name: String },
}

impl CapoMinterActivity {
    /// The seed whose suffix every token minted under this activity carries
    pub fn seed(&self) -> Option<&SeedReference> {
        match self {
            CapoMinterActivity::MintingCharter { seed }
            | CapoMinterActivity::ReplacingMintDelegate { seed }
            | CapoMinterActivity::ForcingNewMintDelegate { seed }
            | CapoMinterActivity::CreatingNewSpendDelegate { seed, .. }
            | CapoMinterActivity::AddingMintInvariant { seed }
            | CapoMinterActivity::AddingSpendInvariant { seed }
            | CapoMinterActivity::InstallingNamedDelegate { seed, .. } => Some(seed),
            CapoMinterActivity::MintWithDelegateAuthorizing
            | CapoMinterActivity::RetiringNamedDelegate { .. } => None,
        }
    }
}

impl ActivityKind for CapoMinterActivity {
    const LABELS: &'static [&'static str] = &[
        "MintingCharter",
        "MintWithDelegateAuthorizing",
        "ReplacingMintDelegate",
        "ForcingNewMintDelegate",
        "CreatingNewSpendDelegate",
        "AddingMintInvariant",
        "AddingSpendInvariant",
        "InstallingNamedDelegate",
        "RetiringNamedDelegate",
    ];

    fn label(&self) -> &'static str {
        match self {
            CapoMinterActivity::MintingCharter { .. } => "MintingCharter",
            CapoMinterActivity::MintWithDelegateAuthorizing => "MintWithDelegateAuthorizing",
            CapoMinterActivity::ReplacingMintDelegate { .. } => "ReplacingMintDelegate",
            CapoMinterActivity::ForcingNewMintDelegate { .. } => "ForcingNewMintDelegate",
            CapoMinterActivity::CreatingNewSpendDelegate { .. } => "CreatingNewSpendDelegate",
            CapoMinterActivity::AddingMintInvariant { .. } => "AddingMintInvariant",
            CapoMinterActivity::AddingSpendInvariant { .. } => "AddingSpendInvariant",
            CapoMinterActivity::InstallingNamedDelegate { .. } => "InstallingNamedDelegate",
            CapoMinterActivity::RetiringNamedDelegate { .. } => "RetiringNamedDelegate",
        }
    }
}

/// Why an output at the capo's address is being spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapoSpendActivity {
    UpdatingCharter,
    UpdatingSettings,
}

impl ActivityKind for CapoSpendActivity {
    const LABELS: &'static [&'static str] = &["UpdatingCharter", "UpdatingSettings"];

    fn label(&self) -> &'static str {
        match self {
            CapoSpendActivity::UpdatingCharter => "UpdatingCharter",
            CapoSpendActivity::UpdatingSettings => "UpdatingSettings",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capo_core::objects::TxId;

    #[test]
    fn test_minter_label_table() {
        let seed = SeedReference::new(TxId::new([3; 32]), 1);
        let all = vec![
            CapoMinterActivity::MintingCharter { seed },
            CapoMinterActivity::MintWithDelegateAuthorizing,
            CapoMinterActivity::ReplacingMintDelegate { seed },
            CapoMinterActivity::ForcingNewMintDelegate { seed },
            CapoMinterActivity::CreatingNewSpendDelegate {
                seed,
                replacing: None,
            },
            CapoMinterActivity::AddingMintInvariant { seed },
            CapoMinterActivity::AddingSpendInvariant { seed },
            CapoMinterActivity::InstallingNamedDelegate {
                seed,
                name: "notes".to_string(),
            },
            CapoMinterActivity::RetiringNamedDelegate {
                name: "notes".to_string(),
            },
        ];
        let labels: Vec<&str> = all.iter().map(|a| a.label()).collect();
        assert_eq!(labels, CapoMinterActivity::LABELS.to_vec());
        assert_eq!(all.iter().filter(|a| a.seed().is_none()).count(), 2);

        let activity = all[4].to_activity().unwrap();
        assert_eq!(CapoMinterActivity::from_activity(&activity).unwrap(), all[4]);
        assert!(CapoSpendActivity::from_activity(&activity).is_err());
    }

    #[test]
    fn test_spend_label_table() {
        for activity in [CapoSpendActivity::UpdatingCharter, CapoSpendActivity::UpdatingSettings] {
            let encoded = activity.to_activity().unwrap();
            assert_eq!(CapoSpendActivity::from_activity(&encoded).unwrap(), activity);
        }
    }
}
