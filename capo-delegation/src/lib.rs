pub mod activity;
pub mod authority;
pub mod config;
pub mod delegate;
pub mod link;
pub mod resolver;
pub mod role;

// Re-export the main types for convenience
pub use activity::{ActivityKind, DelegateActivity};
pub use authority::{
    authority_token_output, find_authority_token, grant_authority, AuthorityTokenDatum,
    GrantOptions, TokenLifecycle,
};
pub use config::{contextual_defaults, DelegateConfig};
pub use delegate::{Delegate, ScriptDelegate, WalletDelegate};
pub use link::{ConfiguredDelegate, DelegateLink};
pub use role::{ConfigValidator, DelegateFactory, Role, RoleMap, Strategy, MAX_PURPOSE_LEN};
