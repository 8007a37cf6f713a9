use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

use capo_core::config::NetworkParams;
use capo_core::error::{CapoError, DelegateConfigNeeded, FieldErrors};
use capo_core::id::{SeedReference, TokenName, UniqueTokenName, UutGenerator};
use capo_core::ledger::LedgerQuery;
use capo_core::objects::{Address, Datum, Script, TxOutput, TxOutputId, Utxo, Value};
use capo_delegation::config::TOKEN_NAME;
use capo_delegation::{
    authority_token_output, contextual_defaults, find_authority_token, grant_authority,
    ActivityKind, ConfiguredDelegate, DelegateActivity, DelegateLink, GrantOptions, RoleMap,
    TokenLifecycle,
};
use capo_transaction::{TxContext, TxDescription};

use crate::activity::{CapoMinterActivity, CapoSpendActivity};
use crate::charter::{CapoScripts, CharterDatum, SettingsDatum, CHARTER_TOKEN, CHARTER_VERSION, SETTINGS_PURPOSE};
use crate::config::{BootstrappedConfig, CapoState, CharterArgs, DelegateChoice, ReplaceOptions, CAPO_REV};
use crate::delegates::{self, GOV_AUTHORITY, MINT_DELEGATE, MINT_INVARIANT, SPEND_DELEGATE, SPEND_INVARIANT};

/// TCX state key holding the `BootstrappedConfig` of a fresh charter
pub const BOOTSTRAPPED_CONFIG: &str = "bootstrappedConfig";
/// TCX state key holding the charter datum a transaction writes
pub const UPDATED_CHARTER: &str = "updatedCharter";
/// TCX state key holding the lifecycle of a replaced delegate's token
pub const REPLACED_DELEGATE: &str = "replacedDelegate";
/// TCX state key holding the lifecycle of a retiring delegate's token
pub const RETIRED_DELEGATE: &str = "retiredDelegate";

/// The two delegate slots of a charter that can be replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DelegateSlot {
    Mint,
    Spend,
}

impl DelegateSlot {
    fn role_name(self) -> &'static str {
        match self {
            DelegateSlot::Mint => MINT_DELEGATE,
            DelegateSlot::Spend => SPEND_DELEGATE,
        }
    }

    fn link(self, charter: &CharterDatum) -> &DelegateLink {
        match self {
            DelegateSlot::Mint => &charter.mint_delegate_link,
            DelegateSlot::Spend => &charter.spend_delegate_link,
        }
    }

    fn link_mut(self, charter: &mut CharterDatum) -> &mut DelegateLink {
        match self {
            DelegateSlot::Mint => &mut charter.mint_delegate_link,
            DelegateSlot::Spend => &mut charter.spend_delegate_link,
        }
    }

    fn activity(self, seed: SeedReference, replacing: &TokenName, forced: bool) -> CapoMinterActivity {
        match (self, forced) {
            (DelegateSlot::Mint, false) => CapoMinterActivity::ReplacingMintDelegate { seed },
            (DelegateSlot::Mint, true) => CapoMinterActivity::ForcingNewMintDelegate { seed },
            (DelegateSlot::Spend, false) => CapoMinterActivity::CreatingNewSpendDelegate {
                seed,
                replacing: Some(replacing.clone()),
            },
            (DelegateSlot::Spend, true) => {
                CapoMinterActivity::CreatingNewSpendDelegate { seed, replacing: None }
            }
        }
    }
}

fn charter_token() -> Result<TokenName, CapoError> {
    TokenName::new(CHARTER_TOKEN)
}

fn spend_seed(tcx: &mut TxContext, seed_utxo: Utxo) -> Result<SeedReference, CapoError> {
    let seed = SeedReference::from_utxo(&seed_utxo);
    tcx.add_input(seed_utxo, None)?;
    Ok(seed)
}

/// A delegation contract: one minting policy, one address holding the charter,
/// and the roles it hands authority to.
///
/// The `mk_txn_*` methods only compose transactions; submitting them (and
/// their queued follow-ups) is up to the caller.
#[derive(Debug, Clone)]
pub struct Capo {
    params: NetworkParams,
    roles: RoleMap,
    state: CapoState,
}

impl Capo {
    pub fn new(params: NetworkParams, roles: RoleMap) -> Self {
        Self {
            params,
            roles,
            state: CapoState::Uninitialized,
        }
    }

    /// The roles every capo defines
    pub fn base_roles() -> Result<RoleMap, CapoError> {
        delegates::base_roles()
    }

    /// Reattach to a capo bootstrapped earlier.
    ///
    /// The policy id and address are recomputed from the seed; a config that
    /// doesn't match them is rejected.
    pub fn from_config(
        params: NetworkParams,
        roles: RoleMap,
        config: BootstrappedConfig,
    ) -> Result<Self, CapoError> {
        let scripts = CapoScripts::for_seed(&config.seed)?;
        if scripts.mph() != config.mph {
            return Err(CapoError::Config(format!(
                "seed {} yields minting policy {}, but the config says {}",
                config.seed,
                scripts.mph(),
                config.mph
            )));
        }
        if scripts.address() != config.capo_addr {
            return Err(CapoError::Config(format!(
                "seed {} yields capo address {}, but the config says {}",
                config.seed,
                scripts.address(),
                config.capo_addr
            )));
        }
        Ok(Self {
            params,
            roles,
            state: CapoState::Chartered(config),
        })
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn roles(&self) -> &RoleMap {
        &self.roles
    }

    pub fn state(&self) -> &CapoState {
        &self.state
    }

    pub fn config(&self) -> Result<&BootstrappedConfig, CapoError> {
        match &self.state {
            CapoState::Bootstrapping(config) | CapoState::Chartered(config) => Ok(config),
            CapoState::Uninitialized => Err(CapoError::InvalidState(
                "capo has no charter yet".to_string(),
            )),
        }
    }

    pub fn scripts(&self) -> Result<CapoScripts, CapoError> {
        CapoScripts::for_seed(&self.config()?.seed)
    }

    /// Move to `Chartered` once the charter composed with `config` is on the ledger.
    ///
    /// Composing a charter leaves the capo untouched, so an abandoned
    /// bootstrap can simply be composed again.
    pub fn confirm_charter(
        &mut self,
        ledger: &dyn LedgerQuery,
        config: &BootstrappedConfig,
    ) -> Result<(), CapoError> {
        if let CapoState::Chartered(existing) = &self.state {
            if existing == config {
                return Ok(());
            }
            return Err(CapoError::InvalidState(format!(
                "capo is already chartered under {}",
                existing.mph
            )));
        }
        let previous = std::mem::replace(&mut self.state, CapoState::Bootstrapping(config.clone()));
        match self.find_charter_utxo(ledger) {
            Ok(charter) => {
                info!("capo {} chartered at {}", config.mph, charter.id);
                self.state = CapoState::Chartered(config.clone());
                Ok(())
            }
            Err(err) => {
                self.state = previous;
                Err(err)
            }
        }
    }

    /// A spare wallet output to serve as a seed: the smallest lovelace-only one outside `reserved`
    pub fn find_seed_utxo(
        ledger: &dyn LedgerQuery,
        wallet: &Address,
        reserved: &BTreeSet<TxOutputId>,
    ) -> Result<Utxo, CapoError> {
        ledger
            .spendable_utxos(wallet)?
            .into_iter()
            .filter(|u| !u.value().has_tokens() && !reserved.contains(&u.id))
            .min_by_key(|u| u.value().lovelace)
            .ok_or_else(|| CapoError::NotFound(format!("no spare wallet output at {} for a seed", wallet)))
    }

    fn role_purpose(&self, role_name: &str) -> Result<String, CapoError> {
        self.roles
            .role(role_name)
            .map(|role| role.uut_purpose().to_string())
            .ok_or_else(|| {
                DelegateConfigNeeded::new(format!("no role named '{}'", role_name))
                    .with_role_names(self.roles.role_names())
                    .into()
            })
    }

    /// Resolve a new delegate for `role_name`, named from `seed`, and emit its authority token
    fn install_delegate(
        &self,
        config: &BootstrappedConfig,
        tcx: &mut TxContext,
        role_name: &str,
        choice: &DelegateChoice,
        seed: &SeedReference,
    ) -> Result<ConfiguredDelegate, CapoError> {
        let uut = UniqueTokenName::derive(&self.role_purpose(role_name)?, seed)?;
        let contextual =
            contextual_defaults(&config.capo_addr, &config.mph, Some(uut.name()), config.rev)?;
        let delegate = self
            .roles
            .resolve(role_name, &choice.strategy, &choice.config, &contextual)?;
        if delegate.link.uut_name.as_ref() != Some(uut.name()) {
            let mut errors = FieldErrors::new();
            errors.insert(
                TOKEN_NAME.to_string(),
                vec![format!("is assigned by the capo ({})", uut.name())],
            );
            return Err(DelegateConfigNeeded::new(format!(
                "role '{}' can't choose its own token name",
                role_name
            ))
            .with_field_errors(errors)
            .into());
        }

        tcx.add_uut(&uut, &[role_name]);
        tcx.add_output(authority_token_output(
            delegate.delegate.as_ref(),
            uut.name(),
            &config.capo_addr,
            &config.mph,
            self.params.coins_per_utxo_byte,
        )?)?;
        Ok(delegate)
    }

    /// Compose the bootstrap transaction: spend the seed, mint the charter and
    /// the initial authority tokens, and queue the follow-up transactions
    /// that store reference scripts and write the initial settings.
    pub fn mk_txn_mint_charter_token(
        &self,
        args: &CharterArgs,
        seed_utxo: Utxo,
        tcx: &mut TxContext,
    ) -> Result<BootstrappedConfig, CapoError> {
        if let CapoState::Chartered(existing) = &self.state {
            return Err(CapoError::InvalidState(format!(
                "capo already has a charter under {}",
                existing.mph
            )));
        }
        let seed = spend_seed(tcx, seed_utxo)?;
        let scripts = CapoScripts::for_seed(&seed)?;
        let config = BootstrappedConfig {
            seed,
            mph: scripts.mph(),
            capo_addr: scripts.address(),
            rev: CAPO_REV,
        };
        let coins = self.params.coins_per_utxo_byte;

        let gov = self.install_delegate(&config, tcx, GOV_AUTHORITY, &args.gov_authority, &seed)?;
        let mint = self.install_delegate(&config, tcx, MINT_DELEGATE, &args.mint_delegate, &seed)?;
        let spend = self.install_delegate(&config, tcx, SPEND_DELEGATE, &args.spend_delegate, &seed)?;
        let settings = UniqueTokenName::derive(SETTINGS_PURPOSE, &seed)?;
        tcx.add_uut(&settings, &[]);

        let charter = CharterDatum {
            version: CHARTER_VERSION,
            gov_authority_link: gov.link.clone(),
            mint_delegate_link: mint.link.clone(),
            spend_delegate_link: spend.link.clone(),
            mint_invariants: Vec::new(),
            spend_invariants: Vec::new(),
            named_delegates: BTreeMap::new(),
            settings_ref: settings.name().clone(),
        };
        let charter_token = charter_token()?;
        tcx.add_output(
            TxOutput::new(config.capo_addr, Value::token(config.mph, charter_token.clone(), 1))
                .with_datum(Datum::encode(&charter)?)
                .with_min_deposit(coins),
        )?;
        tcx.add_output(
            TxOutput::new(config.capo_addr, Value::token(config.mph, settings.name().clone(), 1))
                .with_datum(Datum::encode(&SettingsDatum::default())?)
                .with_min_deposit(coins),
        )?;

        tcx.add_script_program(scripts.minter.clone());
        let mut entries = vec![(charter_token, 1), (settings.name().clone(), 1)];
        for delegate in [&gov, &mint, &spend] {
            entries.push((delegate.uut()?.clone(), 1));
        }
        tcx.mint_tokens(
            config.mph,
            entries,
            CapoMinterActivity::MintingCharter { seed }.to_activity()?,
        )?;

        let mut ref_scripts = vec![scripts.minter.clone(), scripts.capo.clone()];
        for delegate in [&gov, &mint, &spend] {
            if let Some(script) = delegate.delegate.script() {
                ref_scripts.push(script.clone());
            }
        }
        for script in ref_scripts {
            let mut holder = TxContext::new(&self.params);
            holder.add_output(
                TxOutput::new(config.capo_addr, Value::lovelace(0))
                    .with_ref_script(script.clone())
                    .with_min_deposit(coins),
            )?;
            tcx.include_addl_txn(
                &format!("refScript-{}", script.program),
                TxDescription::ready(
                    format!("store the {} script for reference", script.program),
                    holder,
                )
                .with_more_info("saves embedding the script in later transactions"),
            )?;
        }

        let mut bootstrapped = self.clone();
        bootstrapped.state = CapoState::Bootstrapping(config.clone());
        let values = args.initial_settings.clone();
        tcx.include_addl_txn(
            "initialSettings",
            TxDescription::deferred("write the initial settings", move |ledger| {
                let mut next = TxContext::new(bootstrapped.params());
                bootstrapped.mk_txn_updating_settings(ledger, values, &mut next)?;
                Ok(next)
            }),
        )?;

        tcx.add_state(BOOTSTRAPPED_CONFIG, &config)?;
        info!(
            "composed charter for capo {} at {} from seed {}",
            config.mph, config.capo_addr, seed
        );
        Ok(config)
    }

    /// The one output holding the charter token
    pub fn find_charter_utxo(&self, ledger: &dyn LedgerQuery) -> Result<Utxo, CapoError> {
        let config = self.config()?;
        let charter = charter_token()?;
        let mut found: Vec<Utxo> = ledger
            .spendable_utxos(&config.capo_addr)?
            .into_iter()
            .filter(|u| u.has_token(&config.mph, &charter))
            .collect();
        match found.len() {
            0 => Err(CapoError::NotFound(format!(
                "charter of capo {} at {}",
                config.mph, config.capo_addr
            ))),
            1 => Ok(found.remove(0)),
            n => Err(CapoError::InvalidState(format!(
                "{} outputs hold the charter of capo {}",
                n, config.mph
            ))),
        }
    }

    pub fn find_charter_data(
        &self,
        ledger: &dyn LedgerQuery,
    ) -> Result<(Utxo, CharterDatum), CapoError> {
        let utxo = self.find_charter_utxo(ledger)?;
        let datum = utxo.output.decode_datum()?;
        Ok((utxo, datum))
    }

    /// Reference a stored copy of `script` if there is one, then make the script available
    fn use_script(
        &self,
        ledger: &dyn LedgerQuery,
        tcx: &mut TxContext,
        script: &Script,
    ) -> Result<(), CapoError> {
        let capo_addr = self.config()?.capo_addr;
        let hash = script.hash();
        let stored = ledger.spendable_utxos(&capo_addr)?.into_iter().find(|u| {
            u.output
                .ref_script
                .as_ref()
                .map_or(false, |s| s.purpose == script.purpose && s.hash() == hash)
        });
        match stored {
            Some(utxo) => tcx.add_ref_input(utxo),
            None => debug!("no stored copy of {}; embedding it", script.program),
        }
        tcx.add_script_program(script.clone());
        Ok(())
    }

    fn grant(
        &self,
        ledger: &dyn LedgerQuery,
        tcx: &mut TxContext,
        delegate: &ConfiguredDelegate,
        activity: DelegateActivity,
        options: GrantOptions,
    ) -> Result<(), CapoError> {
        let mph = self.config()?.mph;
        let token = find_authority_token(ledger, delegate, &mph)?.ok_or_else(|| {
            CapoError::NotFound(format!(
                "authority token of {} at {}",
                delegate.role_name,
                delegate.address()
            ))
        })?;
        if let Some(script) = delegate.delegate.script() {
            self.use_script(ledger, tcx, script)?;
        }
        grant_authority(tcx, delegate, token, activity, options)
    }

    fn txn_mint(
        &self,
        ledger: &dyn LedgerQuery,
        tcx: &mut TxContext,
        entries: Vec<(TokenName, i64)>,
        activity: CapoMinterActivity,
    ) -> Result<(), CapoError> {
        let scripts = self.scripts()?;
        self.use_script(ledger, tcx, &scripts.minter)?;
        tcx.mint_tokens(scripts.mph(), entries, activity.to_activity()?)
    }

    /// Exercise the governance authority named in `charter`
    pub fn txn_add_gov_authority(
        &self,
        ledger: &dyn LedgerQuery,
        charter: &CharterDatum,
        tcx: &mut TxContext,
    ) -> Result<(), CapoError> {
        let gov = self.roles.relink(GOV_AUTHORITY, &charter.gov_authority_link)?;
        self.grant(
            ledger,
            tcx,
            &gov,
            DelegateActivity::ApprovingCharterChange,
            GrantOptions::default(),
        )
    }

    fn txn_update_charter_utxo(
        &self,
        ledger: &dyn LedgerQuery,
        charter_utxo: Utxo,
        current: &CharterDatum,
        next: CharterDatum,
        tcx: &mut TxContext,
    ) -> Result<(), CapoError> {
        current.check_update(&next)?;
        self.txn_add_gov_authority(ledger, current, tcx)?;
        self.use_script(ledger, tcx, &self.scripts()?.capo)?;

        let updated = TxOutput::new(charter_utxo.output.address, charter_utxo.output.value.clone())
            .with_datum(Datum::encode(&next)?)
            .with_min_deposit(self.params.coins_per_utxo_byte);
        tcx.add_input(
            charter_utxo,
            Some(CapoSpendActivity::UpdatingCharter.to_activity()?),
        )?;
        tcx.add_output(updated)?;
        tcx.add_state(UPDATED_CHARTER, &next)
    }

    /// Replace the charter's datum with `next`, under governance authority.
    ///
    /// `next` must keep the settings reference and may only append invariants.
    pub fn mk_txn_update_charter(
        &self,
        ledger: &dyn LedgerQuery,
        next: CharterDatum,
        tcx: &mut TxContext,
    ) -> Result<(), CapoError> {
        let (utxo, current) = self.find_charter_data(ledger)?;
        self.txn_update_charter_utxo(ledger, utxo, &current, next, tcx)
    }

    fn txn_replacing_delegate(
        &self,
        ledger: &dyn LedgerQuery,
        slot: DelegateSlot,
        choice: &DelegateChoice,
        seed_utxo: Utxo,
        options: ReplaceOptions,
        tcx: &mut TxContext,
    ) -> Result<ConfiguredDelegate, CapoError> {
        let config = self.config()?.clone();
        let (charter_utxo, current) = self.find_charter_data(ledger)?;
        let role_name = slot.role_name();
        let old = self.roles.relink(role_name, slot.link(&current))?;
        let old_name = old.uut()?.clone();
        let replaced =
            TokenLifecycle::observe(ledger, &old, &config.mph, true)?.replaced(options.forced)?;

        let seed = spend_seed(tcx, seed_utxo)?;
        let new = self.install_delegate(&config, tcx, role_name, choice, &seed)?;
        let mut entries = vec![(new.uut()?.clone(), 1)];
        if options.forced {
            warn!(
                "forcing a new {}; its old token {} stays on the ledger",
                role_name, old_name
            );
        } else {
            self.grant(
                ledger,
                tcx,
                &old,
                DelegateActivity::ReplacingMe {
                    seed,
                    purpose: self.role_purpose(role_name)?,
                },
                GrantOptions { skip_return: true },
            )?;
            entries.push((old_name.clone(), -1));
        }
        self.txn_mint(ledger, tcx, entries, slot.activity(seed, &old_name, options.forced))?;

        let mut next = current.clone();
        *slot.link_mut(&mut next) = new.link.clone();
        self.txn_update_charter_utxo(ledger, charter_utxo, &current, next, tcx)?;
        tcx.add_state(REPLACED_DELEGATE, &replaced)?;
        info!(
            "composed {} replacement: {} -> {}{}",
            role_name,
            old_name,
            new.uut()?,
            if options.forced { " (forced)" } else { "" }
        );
        Ok(new)
    }

    /// Install a new mint delegate.
    ///
    /// Cooperatively, the old delegate approves and its token is burned;
    /// `forced` skips the old delegate and leaves its token dangling.
    pub fn mk_txn_updating_mint_delegate(
        &self,
        ledger: &dyn LedgerQuery,
        choice: &DelegateChoice,
        seed_utxo: Utxo,
        options: ReplaceOptions,
        tcx: &mut TxContext,
    ) -> Result<ConfiguredDelegate, CapoError> {
        self.txn_replacing_delegate(ledger, DelegateSlot::Mint, choice, seed_utxo, options, tcx)
    }

    /// Install a new spend delegate; see `mk_txn_updating_mint_delegate`
    pub fn mk_txn_updating_spend_delegate(
        &self,
        ledger: &dyn LedgerQuery,
        choice: &DelegateChoice,
        seed_utxo: Utxo,
        options: ReplaceOptions,
        tcx: &mut TxContext,
    ) -> Result<ConfiguredDelegate, CapoError> {
        self.txn_replacing_delegate(ledger, DelegateSlot::Spend, choice, seed_utxo, options, tcx)
    }

    /// Mint a token for one new delegate and record its link in the charter
    fn txn_adding_delegate<A, P>(
        &self,
        ledger: &dyn LedgerQuery,
        role_name: &str,
        choice: &DelegateChoice,
        seed_utxo: Utxo,
        tcx: &mut TxContext,
        activity: A,
        place: P,
    ) -> Result<ConfiguredDelegate, CapoError>
    where
        A: FnOnce(SeedReference) -> CapoMinterActivity,
        P: FnOnce(&mut CharterDatum, DelegateLink) -> Result<(), CapoError>,
    {
        let config = self.config()?.clone();
        let (charter_utxo, current) = self.find_charter_data(ledger)?;
        let mut next = current.clone();

        let seed = spend_seed(tcx, seed_utxo)?;
        let delegate = self.install_delegate(&config, tcx, role_name, choice, &seed)?;
        place(&mut next, delegate.link.clone())?;
        self.txn_mint(ledger, tcx, vec![(delegate.uut()?.clone(), 1)], activity(seed))?;
        self.txn_update_charter_utxo(ledger, charter_utxo, &current, next, tcx)?;
        Ok(delegate)
    }

    /// Add a delegate under `name` to the charter's named delegates
    pub fn mk_txn_installing_named_delegate(
        &self,
        ledger: &dyn LedgerQuery,
        name: &str,
        role_name: &str,
        choice: &DelegateChoice,
        seed_utxo: Utxo,
        tcx: &mut TxContext,
    ) -> Result<ConfiguredDelegate, CapoError> {
        let installed_name = name.to_string();
        self.txn_adding_delegate(
            ledger,
            role_name,
            choice,
            seed_utxo,
            tcx,
            |seed| CapoMinterActivity::InstallingNamedDelegate {
                seed,
                name: name.to_string(),
            },
            move |charter, link| {
                if charter.named_delegates.contains_key(&installed_name) {
                    return Err(CapoError::InvalidState(format!(
                        "a delegate named '{}' is already installed",
                        installed_name
                    )));
                }
                charter.named_delegates.insert(installed_name, link);
                Ok(())
            },
        )
    }

    /// Remove the delegate `name` from the charter and burn its token.
    ///
    /// The delegate approves its own retirement; `role_name` is the role it
    /// was installed under.
    pub fn mk_txn_retiring_named_delegate(
        &self,
        ledger: &dyn LedgerQuery,
        name: &str,
        role_name: &str,
        tcx: &mut TxContext,
    ) -> Result<TokenLifecycle, CapoError> {
        let mph = self.config()?.mph;
        let (charter_utxo, current) = self.find_charter_data(ledger)?;
        let link = current
            .named_delegates
            .get(name)
            .ok_or_else(|| CapoError::NotFound(format!("named delegate '{}'", name)))?;
        let delegate = self.roles.relink(role_name, link)?;
        let retiring = TokenLifecycle::observe(ledger, &delegate, &mph, true)?.begin_retirement()?;

        self.grant(
            ledger,
            tcx,
            &delegate,
            DelegateActivity::Retiring,
            GrantOptions { skip_return: true },
        )?;
        self.txn_mint(
            ledger,
            tcx,
            vec![(delegate.uut()?.clone(), -1)],
            CapoMinterActivity::RetiringNamedDelegate {
                name: name.to_string(),
            },
        )?;
        let mut next = current.clone();
        next.named_delegates.remove(name);
        self.txn_update_charter_utxo(ledger, charter_utxo, &current, next, tcx)?;
        tcx.add_state(RETIRED_DELEGATE, &retiring)?;
        info!("composed retirement of '{}' ({})", name, delegate.uut()?);
        Ok(retiring)
    }

    /// The lifecycle state of `link`'s authority token, judged from the ledger and the current charter
    pub fn delegate_token_state(
        &self,
        ledger: &dyn LedgerQuery,
        role_name: &str,
        link: &DelegateLink,
    ) -> Result<TokenLifecycle, CapoError> {
        let mph = self.config()?.mph;
        let charter = self.find_charter_data(ledger)?.1;
        let named = [
            &charter.gov_authority_link,
            &charter.mint_delegate_link,
            &charter.spend_delegate_link,
        ]
        .into_iter()
        .chain(&charter.mint_invariants)
        .chain(&charter.spend_invariants)
        .chain(charter.named_delegates.values())
        .any(|l| l == link);
        let delegate = self.roles.relink(role_name, link)?;
        TokenLifecycle::observe(ledger, &delegate, &mph, named)
    }

    pub fn mk_txn_adding_mint_invariant(
        &self,
        ledger: &dyn LedgerQuery,
        choice: &DelegateChoice,
        seed_utxo: Utxo,
        tcx: &mut TxContext,
    ) -> Result<ConfiguredDelegate, CapoError> {
        self.txn_adding_delegate(
            ledger,
            MINT_INVARIANT,
            choice,
            seed_utxo,
            tcx,
            |seed| CapoMinterActivity::AddingMintInvariant { seed },
            |charter, link| {
                charter.mint_invariants.push(link);
                Ok(())
            },
        )
    }

    pub fn mk_txn_adding_spend_invariant(
        &self,
        ledger: &dyn LedgerQuery,
        choice: &DelegateChoice,
        seed_utxo: Utxo,
        tcx: &mut TxContext,
    ) -> Result<ConfiguredDelegate, CapoError> {
        self.txn_adding_delegate(
            ledger,
            SPEND_INVARIANT,
            choice,
            seed_utxo,
            tcx,
            |seed| CapoMinterActivity::AddingSpendInvariant { seed },
            |charter, link| {
                charter.spend_invariants.push(link);
                Ok(())
            },
        )
    }

    /// Replace the settings record, with governance and mint-delegate approval
    pub fn mk_txn_updating_settings(
        &self,
        ledger: &dyn LedgerQuery,
        values: BTreeMap<String, serde_json::Value>,
        tcx: &mut TxContext,
    ) -> Result<(), CapoError> {
        let config = self.config()?.clone();
        let (charter_utxo, charter) = self.find_charter_data(ledger)?;
        tcx.add_ref_input(charter_utxo);
        self.txn_add_gov_authority(ledger, &charter, tcx)?;
        let mint_delegate = self.roles.relink(MINT_DELEGATE, &charter.mint_delegate_link)?;
        self.grant(
            ledger,
            tcx,
            &mint_delegate,
            DelegateActivity::ValidatingSettings,
            GrantOptions::default(),
        )?;

        let settings_utxo = ledger
            .spendable_utxos(&config.capo_addr)?
            .into_iter()
            .find(|u| u.has_token(&config.mph, &charter.settings_ref))
            .ok_or_else(|| CapoError::NotFound(format!("settings record {}", charter.settings_ref)))?;
        self.use_script(ledger, tcx, &self.scripts()?.capo)?;
        let updated = TxOutput::new(config.capo_addr, settings_utxo.output.value.clone())
            .with_datum(Datum::encode(&SettingsDatum { values })?)
            .with_min_deposit(self.params.coins_per_utxo_byte);
        tcx.add_input(
            settings_utxo,
            Some(CapoSpendActivity::UpdatingSettings.to_activity()?),
        )?;
        tcx.add_output(updated)
    }

    /// Mint one unique token per purpose with the current mint delegate's authority.
    ///
    /// The tokens go to the wallet with the change.
    pub fn mk_txn_minting_uuts<S: AsRef<str>>(
        &self,
        ledger: &dyn LedgerQuery,
        purposes: &[S],
        seed_utxo: Utxo,
        tcx: &mut TxContext,
    ) -> Result<BTreeMap<String, UniqueTokenName>, CapoError> {
        let (_, charter) = self.find_charter_data(ledger)?;
        let delegate = self.roles.relink(MINT_DELEGATE, &charter.mint_delegate_link)?;
        self.txn_minting_uuts_via(ledger, &delegate, purposes, seed_utxo, tcx)
    }

    /// Like `mk_txn_minting_uuts`, with an explicitly chosen mint delegate
    pub fn txn_minting_uuts_via<S: AsRef<str>>(
        &self,
        ledger: &dyn LedgerQuery,
        delegate: &ConfiguredDelegate,
        purposes: &[S],
        seed_utxo: Utxo,
        tcx: &mut TxContext,
    ) -> Result<BTreeMap<String, UniqueTokenName>, CapoError> {
        tcx.add_ref_input(self.find_charter_utxo(ledger)?);
        let seed = spend_seed(tcx, seed_utxo)?;
        let uuts = UutGenerator::generate(purposes, &seed)?;
        for uut in uuts.values() {
            tcx.add_uut(uut, &[]);
        }

        self.grant(
            ledger,
            tcx,
            delegate,
            DelegateActivity::MintingUuts {
                seed,
                purposes: purposes.iter().map(|p| p.as_ref().to_string()).collect(),
            },
            GrantOptions::default(),
        )?;
        let entries = uuts.values().map(|uut| (uut.name().clone(), 1)).collect();
        self.txn_mint(ledger, tcx, entries, CapoMinterActivity::MintWithDelegateAuthorizing)?;
        Ok(uuts)
    }
}
