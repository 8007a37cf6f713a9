use std::collections::BTreeMap;
use std::io;
use thiserror::Error;

/// Field name to the list of problems found with that field
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Raised when a delegate can't be resolved from the supplied role, strategy or config.
///
/// Exactly one of the optional parts is normally populated, telling the caller
/// what to supply instead: valid role names, valid strategy names for the
/// role, or the per-field problems reported by the strategy's validator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Default)]
#[error(
    "{message}{}",
    config_hints(.field_errors, .available_role_names, .available_strategy_names)
)]
pub struct DelegateConfigNeeded {
    /// Human-readable summary
    pub message: String,

    /// Problems reported by the strategy's validator, keyed by config field
    pub field_errors: Option<FieldErrors>,

    /// Every role name the role map knows about
    pub available_role_names: Option<Vec<String>>,

    /// Every strategy name defined for the requested role
    pub available_strategy_names: Option<Vec<String>>,
}

impl DelegateConfigNeeded {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_field_errors(mut self, errors: FieldErrors) -> Self {
        self.field_errors = Some(errors);
        self
    }

    pub fn with_role_names(mut self, names: Vec<String>) -> Self {
        self.available_role_names = Some(names);
        self
    }

    pub fn with_strategy_names(mut self, names: Vec<String>) -> Self {
        self.available_strategy_names = Some(names);
        self
    }
}

fn config_hints(
    field_errors: &Option<FieldErrors>,
    roles: &Option<Vec<String>>,
    strategies: &Option<Vec<String>>,
) -> String {
    let mut hints = String::new();
    if let Some(errors) = field_errors {
        for (field, problems) in errors {
            hints.push_str(&format!("\n  {}: {}", field, problems.join("; ")));
        }
    }
    if let Some(roles) = roles {
        hints.push_str(&format!(" (available roles: {})", roles.join(", ")));
    }
    if let Some(strategies) = strategies {
        hints.push_str(&format!(" (available strategies: {})", strategies.join(", ")));
    }
    hints
}

/// Represents all possible errors that can occur while composing, submitting
/// or verifying Capo transactions
#[derive(Error, Debug)]
pub enum CapoError {
    /// A derived token name exceeds the ledger's asset-name bound
    #[error("token name '{name}' is {len} bytes; the limit is {max}")]
    NameTooLong { name: String, len: usize, max: usize },

    /// Role/strategy lookup or config validation failed
    #[error("delegate config needed: {0}")]
    DelegateConfigNeeded(#[from] DelegateConfigNeeded),

    /// The transaction builder rejected an element; carries a dump of the context
    #[error("transaction assembly failed: {message}\n  while adding: {element}\n  context: {dump}")]
    TransactionAssembly {
        message: String,
        element: String,
        dump: String,
    },

    /// The (external) on-chain verifier or ledger rejected a submitted transaction
    #[error("on-chain rejection: {0}")]
    OnchainRejection(String),

    /// A signer or other actor was required but not configured
    #[error("missing actor: {0}")]
    MissingActor(String),

    /// A named additional transaction was queued twice on the same context
    #[error("additional transaction conflict: {0}")]
    AddlTxnConflict(String),

    /// A charter update would break one of the charter's invariants
    #[error("charter invariant violated: {0}")]
    CharterInvariant(String),

    /// An operation was attempted in the wrong lifecycle state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Errors related to missing ledger data
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors that occur when reading/writing files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Anyhow error wrapper for error context
    #[error(transparent)]
    Context(#[from] anyhow::Error),
}

impl CapoError {
    /// Shorthand for assembly failures that aren't tied to a context dump
    pub fn assembly(message: impl Into<String>, element: impl Into<String>) -> Self {
        CapoError::TransactionAssembly {
            message: message.into(),
            element: element.into(),
            dump: String::new(),
        }
    }

    /// Whether the error came from ledger-side verification
    pub fn is_onchain_rejection(&self) -> bool {
        matches!(self, CapoError::OnchainRejection(_))
    }
}

impl From<bincode::Error> for CapoError {
    fn from(err: bincode::Error) -> Self {
        CapoError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for CapoError {
    fn from(err: serde_json::Error) -> Self {
        CapoError::Serialization(err.to_string())
    }
}

impl From<String> for CapoError {
    fn from(err: String) -> Self {
        CapoError::InvalidState(err)
    }
}

impl From<&str> for CapoError {
    fn from(err: &str) -> Self {
        CapoError::InvalidState(err.to_string())
    }
}
