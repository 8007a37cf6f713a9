use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use capo_core::error::CapoError;
use capo_core::id::TokenName;
use capo_core::objects::{Address, PolicyId};

/// Config key for the issuing contract's address
pub const CAPO_ADDR: &str = "capo_addr";
/// Config key for the issuing contract's minting policy id
pub const MPH: &str = "mph";
/// Config key for the delegate's authority token name
pub const TOKEN_NAME: &str = "token_name";
/// Config key for the issuing contract's revision
pub const REV: &str = "rev";

/// Open-ended configuration for a delegate: field name to JSON value
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelegateConfig(BTreeMap<String, serde_json::Value>);

impl DelegateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, builder style
    pub fn with<T: Serialize>(mut self, key: &str, value: &T) -> Result<Self, CapoError> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn insert<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), CapoError> {
        self.0.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Decode one field; `None` when absent
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CapoError> {
        match self.0.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// A non-empty string field
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shallow merge: fields in `overrides` replace fields here
    pub fn merged(&self, overrides: &DelegateConfig) -> DelegateConfig {
        let mut out = self.clone();
        for (key, value) in &overrides.0 {
            out.0.insert(key.clone(), value.clone());
        }
        out
    }

    /// Canonical text form, used to specialise delegate scripts
    pub fn to_json_string(&self) -> Result<String, CapoError> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

/// The defaults an issuing contract contributes to every delegate it installs
pub fn contextual_defaults(
    capo_addr: &Address,
    mph: &PolicyId,
    token_name: Option<&TokenName>,
    rev: u64,
) -> Result<DelegateConfig, CapoError> {
    let mut config = DelegateConfig::new()
        .with(CAPO_ADDR, capo_addr)?
        .with(MPH, mph)?
        .with(REV, &rev)?;
    if let Some(name) = token_name {
        config.insert(TOKEN_NAME, name)?;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use capo_core::objects::ScriptHash;

    #[test]
    fn test_later_config_wins() {
        let base = DelegateConfig::new()
            .with("a", &1)
            .unwrap()
            .with("b", &"base")
            .unwrap();
        let over = DelegateConfig::new().with("b", &"over").unwrap();
        let merged = base.merged(&over);
        assert_eq!(merged.get_as::<i32>("a").unwrap(), Some(1));
        assert_eq!(merged.get_str("b"), Some("over"));
    }

    #[test]
    fn test_contextual_defaults_fields() {
        let mph = ScriptHash::new([4; 32]);
        let addr = Address::Script(ScriptHash::new([5; 32]));
        let name = TokenName::new("mintDgt-0123456789ab").unwrap();
        let config = contextual_defaults(&addr, &mph, Some(&name), 1).unwrap();
        assert_eq!(config.get_as::<Address>(CAPO_ADDR).unwrap(), Some(addr));
        assert_eq!(config.get_as::<PolicyId>(MPH).unwrap(), Some(mph));
        assert_eq!(config.get_as::<TokenName>(TOKEN_NAME).unwrap(), Some(name));

        let without = contextual_defaults(&addr, &mph, None, 1).unwrap();
        assert!(!without.contains(TOKEN_NAME));
    }

    #[test]
    fn test_blank_string_is_missing() {
        let config = DelegateConfig::new().with("addr_hint", &"  ").unwrap();
        assert_eq!(config.get_str("addr_hint"), None);
        assert!(config.contains("addr_hint"));
    }
}
