pub mod activity;
pub mod capo;
pub mod charter;
pub mod config;
pub mod delegates;
pub mod verifier;

// Re-export the main types for convenience
pub use activity::{CapoMinterActivity, CapoSpendActivity};
pub use capo::{Capo, BOOTSTRAPPED_CONFIG, REPLACED_DELEGATE, RETIRED_DELEGATE, UPDATED_CHARTER};
pub use charter::{CapoScripts, CharterDatum, SettingsDatum, CHARTER_TOKEN, CHARTER_VERSION};
pub use config::{BootstrappedConfig, CapoState, CharterArgs, DelegateChoice, ReplaceOptions};
pub use delegates::base_roles;
pub use verifier::CharterVerifier;
