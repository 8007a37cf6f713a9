use log::debug;
use serde::{Deserialize, Serialize};

use capo_core::error::CapoError;
use capo_core::id::TokenName;
use capo_core::ledger::LedgerQuery;
use capo_core::objects::{Address, Datum, PolicyId, TxOutput, Utxo, Value};
use capo_transaction::TxContext;

use crate::activity::{ActivityKind, DelegateActivity};
use crate::delegate::Delegate;
use crate::link::ConfiguredDelegate;

/// Datum carried by every authority token, proving which contract issued it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityTokenDatum {
    pub capo_addr: Address,
    pub mph: PolicyId,
    pub token_name: TokenName,
}

/// Where an authority token is in its life.
///
/// `observe` reads the settled states off the ledger; `Retiring` and a
/// fresh `Replaced` are what a composed transaction moves a token into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenLifecycle {
    Unminted,
    Active,
    Retiring,
    Retired,
    /// Superseded by a new token; a forced replacement leaves the old one on the ledger
    Replaced { dangling: bool },
}

impl TokenLifecycle {
    fn transition(self, to: TokenLifecycle, allowed: bool) -> Result<TokenLifecycle, CapoError> {
        if allowed {
            Ok(to)
        } else {
            Err(CapoError::InvalidState(format!(
                "authority token can't go from {:?} to {:?}",
                self, to
            )))
        }
    }

    pub fn minted(self) -> Result<TokenLifecycle, CapoError> {
        self.transition(TokenLifecycle::Active, self == TokenLifecycle::Unminted)
    }

    pub fn begin_retirement(self) -> Result<TokenLifecycle, CapoError> {
        self.transition(TokenLifecycle::Retiring, self == TokenLifecycle::Active)
    }

    pub fn retired(self) -> Result<TokenLifecycle, CapoError> {
        self.transition(TokenLifecycle::Retired, self == TokenLifecycle::Retiring)
    }

    /// Cooperative replacement burns the old token; forced replacement leaves it
    /// dangling, and may also supersede a token that is already gone
    pub fn replaced(self, forced: bool) -> Result<TokenLifecycle, CapoError> {
        let allowed = self == TokenLifecycle::Active || (forced && self == TokenLifecycle::Unminted);
        self.transition(TokenLifecycle::Replaced { dangling: forced }, allowed)
    }

    /// The state of `delegate`'s token on the ledger.
    ///
    /// `named` says whether the charter still links the delegate. A token
    /// that is gone and no longer linked reads as `Retired`, however it was
    /// burned.
    pub fn observe(
        ledger: &dyn LedgerQuery,
        delegate: &ConfiguredDelegate,
        mph: &PolicyId,
        named: bool,
    ) -> Result<TokenLifecycle, CapoError> {
        let held = find_authority_token(ledger, delegate, mph)?.is_some();
        Ok(match (held, named) {
            (true, true) => TokenLifecycle::Active,
            (true, false) => TokenLifecycle::Replaced { dangling: true },
            (false, true) => TokenLifecycle::Unminted,
            (false, false) => TokenLifecycle::Retired,
        })
    }

    /// Whether the token can still authorize anything
    pub fn is_live(&self) -> bool {
        matches!(self, TokenLifecycle::Active | TokenLifecycle::Retiring)
    }
}

/// Options for `grant_authority`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrantOptions {
    /// Don't return the token: it's consumed for good in this transaction
    pub skip_return: bool,
}

/// The output that creates a delegate's authority token
pub fn authority_token_output(
    delegate: &dyn Delegate,
    token_name: &TokenName,
    capo_addr: &Address,
    mph: &PolicyId,
    coins_per_utxo_byte: u64,
) -> Result<TxOutput, CapoError> {
    let datum = AuthorityTokenDatum {
        capo_addr: *capo_addr,
        mph: *mph,
        token_name: token_name.clone(),
    };
    Ok(TxOutput::new(delegate.address(), Value::token(*mph, token_name.clone(), 1))
        .with_datum(Datum::encode(&datum)?)
        .with_min_deposit(coins_per_utxo_byte))
}

/// Exercise a delegate's authority in `tcx` by spending its token.
///
/// The token goes back to the delegate unchanged unless `skip_return` is set.
/// The activity must say what is being authorized; the generic
/// `Authorizing` is refused.
pub fn grant_authority(
    tcx: &mut TxContext,
    delegate: &ConfiguredDelegate,
    token_utxo: Utxo,
    activity: DelegateActivity,
    options: GrantOptions,
) -> Result<(), CapoError> {
    if activity.is_generic() {
        return Err(CapoError::assembly(
            format!(
                "role '{}' needs a specific activity to grant authority, not '{}'",
                delegate.role_name,
                activity.label()
            ),
            format!("{:?}", token_utxo),
        ));
    }
    let datum: AuthorityTokenDatum = token_utxo.output.decode_datum()?;
    if !token_utxo.has_token(&datum.mph, &datum.token_name) {
        return Err(CapoError::assembly(
            format!("utxo {} doesn't hold authority token {}", token_utxo.id, datum.token_name),
            format!("{:?}", token_utxo),
        ));
    }
    debug!(
        "granting authority of {} ({}) with {}",
        datum.token_name,
        delegate.role_name,
        activity.label()
    );

    let returned = token_utxo.output.clone();
    match returned.address {
        Address::Script(_) => {
            if let Some(script) = delegate.delegate.script() {
                tcx.add_script_program(script.clone());
            }
            tcx.add_input(token_utxo, Some(activity.to_activity()?))?;
        }
        Address::PubKey(holder) => {
            tcx.add_signer(holder);
            tcx.add_input(token_utxo, None)?;
        }
    }
    if !options.skip_return {
        tcx.add_output(returned)?;
    }
    Ok(())
}

/// Find the utxo currently holding a delegate's authority token
pub fn find_authority_token(
    ledger: &dyn LedgerQuery,
    delegate: &ConfiguredDelegate,
    mph: &PolicyId,
) -> Result<Option<Utxo>, CapoError> {
    let name = delegate.uut()?;
    let found = ledger
        .spendable_utxos(&delegate.address())?
        .into_iter()
        .find(|u| u.has_token(mph, name));
    Ok(found)
}
