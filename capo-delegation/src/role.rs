use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use capo_core::error::{CapoError, FieldErrors};
use capo_core::id::{MAX_TOKEN_NAME_LEN, UUT_SUFFIX_BYTES};

use crate::config::DelegateConfig;
use crate::delegate::Delegate;

/// Longest purpose prefix that still leaves room for `-{suffix}` in a token name
pub const MAX_PURPOSE_LEN: usize = MAX_TOKEN_NAME_LEN - 1 - UUT_SUFFIX_BYTES * 2;

/// Builds a delegate from its fully merged config
pub type DelegateFactory = fn(&DelegateConfig) -> Result<Arc<dyn Delegate>, CapoError>;

/// Checks a merged config; `None` or an empty map means it's acceptable
pub type ConfigValidator = fn(&DelegateConfig) -> Option<FieldErrors>;

/// One concrete way to fill a role
#[derive(Clone)]
pub struct Strategy {
    pub factory: DelegateFactory,
    pub partial_config: Option<DelegateConfig>,
    pub validate: Option<ConfigValidator>,
}

impl Strategy {
    pub fn new(factory: DelegateFactory) -> Self {
        Self {
            factory,
            partial_config: None,
            validate: None,
        }
    }

    pub fn with_partial_config(mut self, config: DelegateConfig) -> Self {
        self.partial_config = Some(config);
        self
    }

    pub fn with_validator(mut self, validate: ConfigValidator) -> Self {
        self.validate = Some(validate);
        self
    }

    /// Run the validator, if any, returning only non-empty error maps
    pub fn field_errors(&self, config: &DelegateConfig) -> Option<FieldErrors> {
        self.validate
            .and_then(|validate| validate(config))
            .filter(|errors| !errors.is_empty())
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("partial_config", &self.partial_config)
            .field("validated", &self.validate.is_some())
            .finish()
    }
}

/// An extension point of a contract, with its named strategies
#[derive(Debug, Clone)]
pub struct Role {
    name: String,
    uut_purpose: String,
    variants: BTreeMap<String, Strategy>,
}

impl Role {
    pub fn new(name: impl Into<String>, uut_purpose: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uut_purpose: uut_purpose.into(),
            variants: BTreeMap::new(),
        }
    }

    /// Add (or replace) a named strategy
    pub fn variant(mut self, name: impl Into<String>, strategy: Strategy) -> Self {
        self.variants.insert(name.into(), strategy);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefix of the authority token names minted for this role
    pub fn uut_purpose(&self) -> &str {
        &self.uut_purpose
    }

    pub fn strategy(&self, name: &str) -> Option<&Strategy> {
        self.variants.get(name)
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.variants.keys().cloned().collect()
    }

    fn check(&self) -> Result<(), CapoError> {
        if self.name.trim().is_empty() {
            return Err(CapoError::Config("role name must not be empty".to_string()));
        }
        if self.uut_purpose.is_empty() || self.uut_purpose.len() > MAX_PURPOSE_LEN {
            return Err(CapoError::Config(format!(
                "role '{}': token purpose '{}' must be 1..={} bytes",
                self.name, self.uut_purpose, MAX_PURPOSE_LEN
            )));
        }
        if self.uut_purpose.contains('-') {
            return Err(CapoError::Config(format!(
                "role '{}': token purpose '{}' must not contain '-'",
                self.name, self.uut_purpose
            )));
        }
        if self.variants.is_empty() {
            return Err(CapoError::Config(format!(
                "role '{}' defines no strategies",
                self.name
            )));
        }
        Ok(())
    }
}

/// The registration table of a contract's roles.
///
/// Roles are checked when registered, so resolution only ever sees well-formed
/// definitions. A contract specialising another starts from the base map and
/// `extend`s it with its own roles.
#[derive(Debug, Clone, Default)]
pub struct RoleMap {
    roles: BTreeMap<String, Role>,
}

impl RoleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new role; its name must not be taken yet
    pub fn register(&mut self, role: Role) -> Result<(), CapoError> {
        role.check()?;
        if self.roles.contains_key(role.name()) {
            return Err(CapoError::Config(format!(
                "role '{}' is already registered",
                role.name()
            )));
        }
        self.roles.insert(role.name.clone(), role);
        Ok(())
    }

    /// Builder-style `register`
    pub fn with_role(mut self, role: Role) -> Result<Self, CapoError> {
        self.register(role)?;
        Ok(self)
    }

    /// Layer `overrides` on top of this map: new roles are added, same-named roles replaced
    pub fn extend(mut self, overrides: RoleMap) -> Self {
        for (name, role) in overrides.roles {
            if self.roles.contains_key(&name) {
                debug!("role '{}' overridden", name);
            }
            self.roles.insert(name, role);
        }
        self
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.keys().cloned().collect()
    }

    /// Role name to token purpose, for addressing unique tokens by role
    pub fn purpose_aliases(&self) -> BTreeMap<String, String> {
        self.roles
            .values()
            .map(|r| (r.name.clone(), r.uut_purpose.clone()))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::delegate::ScriptDelegate;

    pub(crate) fn test_factory(config: &DelegateConfig) -> Result<Arc<dyn Delegate>, CapoError> {
        Ok(Arc::new(ScriptDelegate::new("TestDelegate", "testDgt", config)?))
    }

    fn role(name: &str, purpose: &str) -> Role {
        Role::new(name, purpose).variant("defaultV1", Strategy::new(test_factory))
    }

    #[test]
    fn test_registration_checks_definition() {
        let mut map = RoleMap::new();
        assert!(map.register(Role::new("empty", "emp")).is_err());
        assert!(map.register(role("long", "aVeryLongPurposeNameX")).is_err());
        assert!(map.register(role("dash", "mint-dgt")).is_err());
        map.register(role("mintDelegate", "mintDgt")).unwrap();
        assert!(map.register(role("mintDelegate", "mintDgt")).is_err());
    }

    #[test]
    fn test_purpose_bound_fits_token_name() {
        let purpose = "p".repeat(MAX_PURPOSE_LEN);
        let mut map = RoleMap::new();
        map.register(role("widest", &purpose)).unwrap();
        let seed = capo_core::id::SeedReference::new(capo_core::objects::TxId::new([1; 32]), 0);
        assert!(capo_core::id::UniqueTokenName::derive(&purpose, &seed).is_ok());
    }

    #[test]
    fn test_extend_overrides_by_name() {
        let base = RoleMap::new()
            .with_role(role("mintDelegate", "mintDgt"))
            .unwrap()
            .with_role(role("spendDelegate", "spendDgt"))
            .unwrap();
        let overrides = RoleMap::new()
            .with_role(
                Role::new("mintDelegate", "mintDgt")
                    .variant("defaultV1", Strategy::new(test_factory))
                    .variant("customV2", Strategy::new(test_factory)),
            )
            .unwrap()
            .with_role(role("noteKeeper", "notes"))
            .unwrap();

        let map = base.extend(overrides);
        assert_eq!(map.role_names().len(), 3);
        assert_eq!(
            map.role("mintDelegate").unwrap().strategy_names(),
            vec!["customV2".to_string(), "defaultV1".to_string()]
        );
        assert_eq!(map.purpose_aliases()["noteKeeper"], "notes");
    }
}
