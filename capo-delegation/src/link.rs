use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use capo_core::error::CapoError;
use capo_core::id::TokenName;
use capo_core::objects::{Address, ScriptHash};

use crate::config::DelegateConfig;
use crate::delegate::Delegate;

/// Persisted pointer to a concrete delegate, stored in the charter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateLink {
    /// Name of the delegate's authority token; absent until a token is derived
    pub uut_name: Option<TokenName>,
    pub strategy_name: String,
    pub config: DelegateConfig,
    pub delegate_validator_hash: Option<ScriptHash>,
}

impl DelegateLink {
    /// The authority token name, which installed delegates always have
    pub fn uut(&self) -> Result<&TokenName, CapoError> {
        self.uut_name.as_ref().ok_or_else(|| {
            CapoError::InvalidState(format!(
                "delegate link for strategy '{}' has no authority token",
                self.strategy_name
            ))
        })
    }
}

/// A delegate link bound to a live delegate instance. Never persisted.
#[derive(Clone)]
pub struct ConfiguredDelegate {
    pub role_name: String,
    pub link: DelegateLink,
    pub delegate: Arc<dyn Delegate>,
}

impl ConfiguredDelegate {
    pub fn config(&self) -> &DelegateConfig {
        &self.link.config
    }

    pub fn strategy_name(&self) -> &str {
        &self.link.strategy_name
    }

    pub fn uut(&self) -> Result<&TokenName, CapoError> {
        self.link.uut()
    }

    pub fn address(&self) -> Address {
        self.delegate.address()
    }
}

impl fmt::Debug for ConfiguredDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredDelegate")
            .field("role_name", &self.role_name)
            .field("strategy", &self.link.strategy_name)
            .field("uut_name", &self.link.uut_name)
            .field("kind", &self.delegate.kind())
            .finish()
    }
}
