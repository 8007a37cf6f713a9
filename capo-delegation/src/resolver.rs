use log::debug;

use capo_core::error::{CapoError, DelegateConfigNeeded};
use capo_core::id::TokenName;

use crate::config::{DelegateConfig, TOKEN_NAME};
use crate::link::{ConfiguredDelegate, DelegateLink};
use crate::role::{Role, RoleMap, Strategy};

impl RoleMap {
    fn lookup(&self, role_name: &str, strategy_name: &str) -> Result<(&Role, &Strategy), CapoError> {
        let role = self.role(role_name).ok_or_else(|| {
            DelegateConfigNeeded::new(format!("no role named '{}'", role_name))
                .with_role_names(self.role_names())
        })?;
        let strategy = role.strategy(strategy_name).ok_or_else(|| {
            DelegateConfigNeeded::new(format!(
                "no strategy '{}' for role '{}'",
                strategy_name, role_name
            ))
            .with_strategy_names(role.strategy_names())
        })?;
        Ok((role, strategy))
    }

    /// Turn a role and strategy choice into a validated delegate.
    ///
    /// Config precedence, lowest first: the strategy's partial defaults, the
    /// issuing contract's `contextual` defaults, then `caller` config. This
    /// doesn't touch the ledger.
    pub fn resolve(
        &self,
        role_name: &str,
        strategy_name: &str,
        caller: &DelegateConfig,
        contextual: &DelegateConfig,
    ) -> Result<ConfiguredDelegate, CapoError> {
        let (role, strategy) = self.lookup(role_name, strategy_name)?;

        let config = strategy
            .partial_config
            .clone()
            .unwrap_or_default()
            .merged(contextual)
            .merged(caller);

        if let Some(errors) = strategy.field_errors(&config) {
            return Err(DelegateConfigNeeded::new(format!(
                "invalid config for role '{}' strategy '{}'",
                role.name(),
                strategy_name
            ))
            .with_field_errors(errors)
            .into());
        }

        let delegate = (strategy.factory)(&config)?;
        let uut_name: Option<TokenName> = config.get_as(TOKEN_NAME)?;
        debug!(
            "resolved role '{}' with strategy '{}' to {}",
            role.name(),
            strategy_name,
            delegate.kind()
        );

        Ok(ConfiguredDelegate {
            role_name: role.name().to_string(),
            link: DelegateLink {
                uut_name,
                strategy_name: strategy_name.to_string(),
                delegate_validator_hash: delegate.script_hash(),
                config,
            },
            delegate,
        })
    }

    /// Rebuild the live delegate behind a persisted link
    pub fn relink(&self, role_name: &str, link: &DelegateLink) -> Result<ConfiguredDelegate, CapoError> {
        let (role, strategy) = self.lookup(role_name, &link.strategy_name)?;
        let delegate = (strategy.factory)(&link.config)?;
        if let Some(expected) = &link.delegate_validator_hash {
            if delegate.script_hash().as_ref() != Some(expected) {
                return Err(CapoError::InvalidState(format!(
                    "role '{}': delegate script no longer matches the linked hash {}",
                    role.name(),
                    expected
                )));
            }
        }
        Ok(ConfiguredDelegate {
            role_name: role.name().to_string(),
            link: link.clone(),
            delegate,
        })
    }
}
