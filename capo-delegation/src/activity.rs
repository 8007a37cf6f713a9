use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use capo_core::error::CapoError;
use capo_core::id::SeedReference;
use capo_core::objects::Activity;

/// A closed family of activities (redeemers) with a fixed label table.
///
/// Each variant maps to exactly one label listed in `LABELS`; decoding an
/// activity checks its label against the table before reading the payload.
pub trait ActivityKind: Serialize + DeserializeOwned {
    const LABELS: &'static [&'static str];

    fn label(&self) -> &'static str;

    /// Generic activities don't say what is being authorized
    fn is_generic(&self) -> bool {
        false
    }

    fn to_activity(&self) -> Result<Activity, CapoError> {
        Activity::with_payload(self.label(), self)
    }

    fn from_activity(activity: &Activity) -> Result<Self, CapoError> {
        if !Self::LABELS.contains(&activity.label.as_str()) {
            return Err(CapoError::NotFound(format!(
                "activity '{}' (known: {})",
                activity.label,
                Self::LABELS.join(", ")
            )));
        }
        let decoded: Self = activity.decode_payload()?;
        if decoded.label() != activity.label {
            return Err(CapoError::Serialization(format!(
                "activity labelled '{}' carries a '{}' payload",
                activity.label,
                decoded.label()
            )));
        }
        Ok(decoded)
    }
}

/// Why a delegate's authority token is being spent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelegateActivity {
    /// Unspecific authorization; not accepted when granting authority
    Authorizing,
    Retiring,
    ReplacingMe { seed: SeedReference, purpose: String },
    MintingUuts { seed: SeedReference, purposes: Vec<String> },
    ValidatingSettings,
    /// Governance approval of a charter or settings change
    ApprovingCharterChange,
}

impl ActivityKind for DelegateActivity {
    const LABELS: &'static [&'static str] = &[
        "Authorizing",
        "Retiring",
        "ReplacingMe",
        "MintingUuts",
        "ValidatingSettings",
        "ApprovingCharterChange",
    ];

    fn label(&self) -> &'static str {
        match self {
            DelegateActivity::Authorizing => "Authorizing",
            DelegateActivity::Retiring => "Retiring",
            DelegateActivity::ReplacingMe { .. } => "ReplacingMe",
            DelegateActivity::MintingUuts { .. } => "MintingUuts",
            DelegateActivity::ValidatingSettings => "ValidatingSettings",
            DelegateActivity::ApprovingCharterChange => "ApprovingCharterChange",
        }
    }

    fn is_generic(&self) -> bool {
        matches!(self, DelegateActivity::Authorizing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capo_core::objects::TxId;

    fn all() -> Vec<DelegateActivity> {
        let seed = SeedReference::new(TxId::new([1; 32]), 2);
        vec![
            DelegateActivity::Authorizing,
            DelegateActivity::Retiring,
            DelegateActivity::ReplacingMe {
                seed,
                purpose: "mintDgt".to_string(),
            },
            DelegateActivity::MintingUuts {
                seed,
                purposes: vec!["a".to_string()],
            },
            DelegateActivity::ValidatingSettings,
            DelegateActivity::ApprovingCharterChange,
        ]
    }

    #[test]
    fn test_label_table_covers_every_variant() {
        let labels: Vec<&str> = all().iter().map(|a| a.label()).collect();
        assert_eq!(labels, DelegateActivity::LABELS.to_vec());
    }

    #[test]
    fn test_decode_checks_label() {
        let activity = all()[2].to_activity().unwrap();
        assert_eq!(activity.label, "ReplacingMe");
        assert_eq!(DelegateActivity::from_activity(&activity).unwrap(), all()[2]);

        assert!(DelegateActivity::from_activity(&Activity::new("Bogus")).is_err());

        let mut mislabelled = DelegateActivity::Retiring.to_activity().unwrap();
        mislabelled.label = "ValidatingSettings".to_string();
        assert!(DelegateActivity::from_activity(&mislabelled).is_err());
    }

    #[test]
    fn test_only_authorizing_is_generic() {
        let generic: Vec<bool> = all().iter().map(|a| a.is_generic()).collect();
        assert_eq!(generic, vec![true, false, false, false, false, false]);
    }
}
