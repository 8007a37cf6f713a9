//! Stand-in for the capo's on-chain scripts, for use with an in-memory ledger.

use capo_core::error::CapoError;
use capo_core::id::TokenName;
use capo_core::ledger::{ResolvedTx, Verifier};
use capo_core::objects::{Address, PolicyId, TxOutput, Utxo};
use capo_core::transaction::{MintInstruction, Transaction};
use capo_delegation::{ActivityKind, DelegateActivity, DelegateLink};

use crate::activity::{CapoMinterActivity, CapoSpendActivity};
use crate::charter::{CharterDatum, CHARTER_TOKEN};
use crate::config::BootstrappedConfig;

fn reason(err: CapoError) -> String {
    err.to_string()
}

fn minted(mint: Option<&MintInstruction>, name: &TokenName) -> i64 {
    mint.and_then(|m| m.entries.get(name)).copied().unwrap_or(0)
}

/// Checks the rules the capo's minting policy and spending script enforce.
///
/// Transactions that neither mint under the capo's policy nor spend
/// anything at its address or holding its tokens are left alone.
#[derive(Debug, Clone)]
pub struct CharterVerifier {
    mph: PolicyId,
    capo_addr: Address,
    charter: TokenName,
}

impl CharterVerifier {
    pub fn new(config: &BootstrappedConfig) -> Result<Self, CapoError> {
        Ok(Self {
            mph: config.mph,
            capo_addr: config.capo_addr,
            charter: TokenName::new(CHARTER_TOKEN)?,
        })
    }

    fn touches(&self, tx: &Transaction) -> bool {
        tx.mint_for(&self.mph).is_some()
            || tx.inputs.iter().any(|i| {
                i.utxo.output.address == self.capo_addr
                    || i.utxo.output.value.tokens_of(&self.mph).next().is_some()
            })
    }

    fn holds_charter(&self, output: &TxOutput) -> bool {
        output.value.quantity_of(&self.mph, &self.charter) != 0
    }

    /// The single charter output of `tx`, which must sit at the capo address
    fn charter_output(&self, tx: &Transaction) -> Result<CharterDatum, String> {
        let holders: Vec<&TxOutput> = tx.outputs.iter().filter(|o| self.holds_charter(o)).collect();
        if holders.len() != 1 {
            return Err(format!(
                "charter must be held by exactly one output, found {}",
                holders.len()
            ));
        }
        let output = holders[0];
        if output.address != self.capo_addr {
            return Err(format!(
                "charter must stay at {}, found it at {}",
                self.capo_addr, output.address
            ));
        }
        if output.value.quantity_of(&self.mph, &self.charter) != 1 {
            return Err("charter output must hold exactly one charter token".to_string());
        }
        output.decode_datum().map_err(reason)
    }

    /// The charter as referenced (or spent) by `tx`
    fn current_charter(&self, tx: &Transaction) -> Result<CharterDatum, String> {
        let spent = tx.inputs.iter().map(|i| &i.utxo);
        let found: Option<&Utxo> = tx
            .ref_inputs
            .iter()
            .chain(spent)
            .find(|u| self.holds_charter(&u.output));
        match found {
            Some(utxo) => utxo.output.decode_datum().map_err(reason),
            None => Err("the charter is neither referenced nor spent".to_string()),
        }
    }

    fn spends_token(&self, tx: &Transaction, name: &TokenName) -> bool {
        tx.inputs.iter().any(|i| i.utxo.has_token(&self.mph, name))
    }

    fn require_gov(&self, tx: &Transaction, charter: &CharterDatum) -> Result<(), String> {
        let gov = charter.gov_authority_link.uut().map_err(reason)?;
        if !self.spends_token(tx, gov) {
            return Err(format!("governance token {} is not spent", gov));
        }
        Ok(())
    }

    fn check_minting(&self, tx: &Transaction) -> Result<(), String> {
        let Some(mint) = tx.mint_for(&self.mph) else {
            return Ok(());
        };
        let activity = CapoMinterActivity::from_activity(&mint.activity).map_err(reason)?;
        let charter_minted = minted(Some(mint), &self.charter);

        if let CapoMinterActivity::MintingCharter { .. } = activity {
            if charter_minted != 1 {
                return Err("bootstrap must mint exactly one charter token".to_string());
            }
            self.charter_output(tx)?;
        } else if charter_minted != 0 {
            return Err(format!("{} can't mint or burn the charter", activity.label()));
        }

        if let Some(seed) = activity.seed() {
            if !tx.spends(&seed.output_id()) {
                return Err(format!("seed {} is not spent", seed));
            }
            let suffix = seed.uut_suffix();
            for (name, quantity) in &mint.entries {
                if *quantity > 0 && *name != self.charter && !name.as_str().ends_with(&suffix) {
                    return Err(format!("minted {} doesn't carry the seed suffix {}", name, suffix));
                }
            }
        }

        match &activity {
            CapoMinterActivity::MintingCharter { .. } => Ok(()),
            CapoMinterActivity::MintWithDelegateAuthorizing => self.check_mint_delegate(tx),
            other => {
                let charter_spent = tx.inputs.iter().any(|i| self.holds_charter(&i.utxo.output));
                if !charter_spent {
                    return Err(format!("{} needs a charter update", other.label()));
                }
                match other {
                    CapoMinterActivity::RetiringNamedDelegate { name } => {
                        self.check_retirement(tx, mint, name)
                    }
                    _ => Ok(()),
                }
            }
        }
    }

    /// Retiring a named delegate burns its token, and only that, and drops it from the charter
    fn check_retirement(
        &self,
        tx: &Transaction,
        mint: &MintInstruction,
        name: &str,
    ) -> Result<(), String> {
        let charter = self.current_charter(tx)?;
        let link = charter
            .named_delegates
            .get(name)
            .ok_or_else(|| format!("no named delegate '{}' to retire", name))?;
        let token = link.uut().map_err(reason)?;
        if !self.spends_token(tx, token) {
            return Err(format!("retiring delegate token {} is not spent", token));
        }
        if mint.entries.len() != 1 || minted(Some(mint), token) != -1 {
            return Err(format!("retiring '{}' must burn exactly its token {}", name, token));
        }
        if self.charter_output(tx)?.named_delegates.contains_key(name) {
            return Err(format!("retired delegate '{}' is still named in the charter", name));
        }
        Ok(())
    }

    /// The mint delegate exercised by `tx` must be the one the charter names
    fn check_mint_delegate(&self, tx: &Transaction) -> Result<(), String> {
        let charter = self.current_charter(tx)?;
        let expected = charter.mint_delegate_link.uut().map_err(reason)?;
        let purpose = expected.purpose().unwrap_or_default();

        let mut found = None;
        for input in &tx.inputs {
            for (name, _) in input.utxo.output.value.tokens_of(&self.mph) {
                if found.is_none() && name.purpose() == Some(purpose) {
                    found = Some(name);
                }
            }
        }
        match found {
            Some(name) if name == expected => Ok(()),
            Some(name) => Err(format!(
                "mint delegate token mismatch: expected {}, found {}",
                expected, name
            )),
            None => Err(format!(
                "mint delegate token mismatch: expected {}, found none",
                expected
            )),
        }
    }

    fn check_capo_spends(&self, tx: &Transaction) -> Result<(), String> {
        for input in tx.inputs.iter().filter(|i| i.utxo.output.address == self.capo_addr) {
            let activity = input
                .activity
                .as_ref()
                .ok_or_else(|| format!("capo input {} has no activity", input.utxo.id))?;
            let activity = CapoSpendActivity::from_activity(activity).map_err(reason)?;

            if self.holds_charter(&input.utxo.output) {
                if activity != CapoSpendActivity::UpdatingCharter {
                    return Err(format!("the charter can't be spent for {}", activity.label()));
                }
                let current: CharterDatum = input.utxo.output.decode_datum().map_err(reason)?;
                let next = self.charter_output(tx)?;
                current.check_update(&next).map_err(reason)?;
                self.require_gov(tx, &current)?;
                self.check_delegate_changes(tx, &current, &next)?;
            } else if input.utxo.output.value.tokens_of(&self.mph).next().is_some() {
                if activity != CapoSpendActivity::UpdatingSettings {
                    return Err(format!("settings can't be spent for {}", activity.label()));
                }
                let charter = self.current_charter(tx)?;
                if !input.utxo.has_token(&self.mph, &charter.settings_ref) {
                    return Err(format!(
                        "only the settings record {} can be updated",
                        charter.settings_ref
                    ));
                }
                self.require_gov(tx, &charter)?;
                let returned = tx.outputs.iter().any(|o| {
                    o.address == self.capo_addr && o.has_token(&self.mph, &charter.settings_ref)
                });
                if !returned {
                    return Err("settings must stay at the capo address".to_string());
                }
            } else {
                return Err(format!(
                    "only the charter and settings can be spent from {}",
                    self.capo_addr
                ));
            }
        }
        Ok(())
    }

    /// A replaced delegate's new token must be minted; a cooperative replacement burns the old one
    fn check_delegate_changes(
        &self,
        tx: &Transaction,
        current: &CharterDatum,
        next: &CharterDatum,
    ) -> Result<(), String> {
        let mint = tx.mint_for(&self.mph);
        let activity = match mint {
            Some(m) => Some(CapoMinterActivity::from_activity(&m.activity).map_err(reason)?),
            None => None,
        };
        let changes: [(&DelegateLink, &DelegateLink, &str); 2] = [
            (&current.mint_delegate_link, &next.mint_delegate_link, "mint delegate"),
            (&current.spend_delegate_link, &next.spend_delegate_link, "spend delegate"),
        ];
        for (old, new, role) in changes {
            if old == new {
                continue;
            }
            let new_name = new.uut().map_err(reason)?;
            if minted(mint, new_name) != 1 {
                return Err(format!("new {} token {} is not minted", role, new_name));
            }
            let old_name = old.uut().map_err(reason)?;
            let cooperative = matches!(
                activity,
                Some(CapoMinterActivity::ReplacingMintDelegate { .. })
                    | Some(CapoMinterActivity::CreatingNewSpendDelegate {
                        replacing: Some(_),
                        ..
                    })
            );
            if cooperative && minted(mint, old_name) != -1 {
                return Err(format!("replaced {} token {} is not burned", role, old_name));
            }
        }
        Ok(())
    }

    /// Delegate tokens are spent with a specific delegate activity
    fn check_delegate_spends(&self, tx: &Transaction) -> Result<(), String> {
        for input in &tx.inputs {
            let address = &input.utxo.output.address;
            if !address.is_script()
                || *address == self.capo_addr
                || input.utxo.output.value.tokens_of(&self.mph).next().is_none()
            {
                continue;
            }
            let activity = input
                .activity
                .as_ref()
                .ok_or_else(|| format!("delegate input {} has no activity", input.utxo.id))?;
            let activity = DelegateActivity::from_activity(activity).map_err(reason)?;
            if activity.is_generic() {
                return Err(format!(
                    "delegate input {} is spent for the generic {}",
                    input.utxo.id,
                    activity.label()
                ));
            }
            if let DelegateActivity::MintingUuts { seed, .. } = activity {
                if !tx.spends(&seed.output_id()) {
                    return Err(format!("seed {} is not spent", seed));
                }
            }
        }
        Ok(())
    }
}

impl Verifier for CharterVerifier {
    fn name(&self) -> &str {
        "charter"
    }

    fn verify(&self, resolved: ResolvedTx<'_>) -> Result<(), String> {
        let tx = resolved.tx;
        if !self.touches(tx) {
            return Ok(());
        }
        self.check_minting(tx)?;
        self.check_capo_spends(tx)?;
        self.check_delegate_spends(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charter::{CapoScripts, CHARTER_VERSION};
    use crate::config::CAPO_REV;
    use capo_core::id::{SeedReference, UniqueTokenName};
    use capo_core::objects::{Datum, PubKeyHash, ScriptHash, TxId, TxOutputId, Value};
    use capo_core::transaction::TxInput;
    use capo_delegation::DelegateConfig;
    use std::collections::{BTreeMap, BTreeSet};

    fn config() -> BootstrappedConfig {
        let seed = SeedReference::new(TxId::new([1; 32]), 0);
        let scripts = CapoScripts::for_seed(&seed).unwrap();
        BootstrappedConfig {
            seed,
            mph: scripts.mph(),
            capo_addr: scripts.address(),
            rev: CAPO_REV,
        }
    }

    fn token(name: &str) -> TokenName {
        TokenName::new(name).unwrap()
    }

    fn link(name: &str) -> DelegateLink {
        DelegateLink {
            uut_name: Some(token(name)),
            strategy_name: "defaultV1".to_string(),
            config: DelegateConfig::new(),
            delegate_validator_hash: None,
        }
    }

    fn charter() -> CharterDatum {
        let mut named_delegates = BTreeMap::new();
        named_delegates.insert("notes".to_string(), link("notes-1"));
        CharterDatum {
            version: CHARTER_VERSION,
            gov_authority_link: link("capoGov-1"),
            mint_delegate_link: link("mintDgt-1"),
            spend_delegate_link: link("spendDgt-1"),
            mint_invariants: Vec::new(),
            spend_invariants: Vec::new(),
            named_delegates,
            settings_ref: token("set-1"),
        }
    }

    fn wallet() -> Address {
        Address::PubKey(PubKeyHash::new([5; 32]))
    }

    fn utxo(n: u8, output: TxOutput) -> Utxo {
        Utxo::new(TxOutputId::new(TxId::new([n; 32]), 0), output)
    }

    fn holding(address: Address, name: &str) -> TxOutput {
        TxOutput::new(address, Value::token(config().mph, token(name), 1).with_lovelace(2_000_000))
    }

    fn charter_at(address: Address, datum: &CharterDatum) -> TxOutput {
        holding(address, CHARTER_TOKEN).with_datum(Datum::encode(datum).unwrap())
    }

    fn spend(utxo: Utxo, activity: Option<capo_core::objects::Activity>) -> TxInput {
        TxInput { utxo, activity }
    }

    fn charter_input() -> TxInput {
        spend(
            utxo(10, charter_at(config().capo_addr, &charter())),
            Some(CapoSpendActivity::UpdatingCharter.to_activity().unwrap()),
        )
    }

    fn gov_input() -> TxInput {
        spend(utxo(11, holding(wallet(), "capoGov-1")), None)
    }

    fn mint(entries: Vec<(TokenName, i64)>, activity: CapoMinterActivity) -> MintInstruction {
        MintInstruction {
            policy: config().mph,
            entries: entries.into_iter().collect(),
            activity: activity.to_activity().unwrap(),
        }
    }

    fn tx(
        inputs: Vec<TxInput>,
        ref_inputs: Vec<Utxo>,
        outputs: Vec<TxOutput>,
        mints: Vec<MintInstruction>,
    ) -> Transaction {
        Transaction {
            id: TxId::default(),
            inputs,
            ref_inputs,
            outputs,
            collateral: None,
            mints,
            scripts: Vec::new(),
            required_signers: BTreeSet::new(),
            valid_from: None,
            valid_to: None,
            fee: 0,
        }
    }

    fn verify(tx: &Transaction) -> Result<(), String> {
        CharterVerifier::new(&config())
            .unwrap()
            .verify(ResolvedTx { tx, signatures: &[] })
    }

    fn rejection(tx: &Transaction) -> String {
        verify(tx).unwrap_err()
    }

    #[test]
    fn test_unrelated_transactions_pass() {
        let payment = tx(
            vec![spend(utxo(1, TxOutput::new(wallet(), Value::lovelace(9_000_000))), None)],
            Vec::new(),
            vec![TxOutput::new(wallet(), Value::lovelace(8_000_000))],
            Vec::new(),
        );
        assert_eq!(verify(&payment), Ok(()));
    }

    #[test]
    fn test_charter_update_under_governance() {
        let update = tx(
            vec![charter_input(), gov_input()],
            Vec::new(),
            vec![charter_at(config().capo_addr, &charter())],
            Vec::new(),
        );
        assert_eq!(verify(&update), Ok(()));
    }

    #[test]
    fn test_charter_must_stay_at_capo_address() {
        let moved = tx(
            vec![charter_input(), gov_input()],
            Vec::new(),
            vec![charter_at(wallet(), &charter())],
            Vec::new(),
        );
        assert!(rejection(&moved).contains("charter must stay at"));
    }

    #[test]
    fn test_charter_held_by_one_output() {
        let doubled = tx(
            vec![charter_input(), gov_input()],
            Vec::new(),
            vec![
                charter_at(config().capo_addr, &charter()),
                charter_at(config().capo_addr, &charter()),
            ],
            Vec::new(),
        );
        assert_eq!(
            rejection(&doubled),
            "charter must be held by exactly one output, found 2"
        );
    }

    #[test]
    fn test_charter_update_needs_gov_token() {
        let ungoverned = tx(
            vec![charter_input()],
            Vec::new(),
            vec![charter_at(config().capo_addr, &charter())],
            Vec::new(),
        );
        assert_eq!(rejection(&ungoverned), "governance token capoGov-1 is not spent");
    }

    #[test]
    fn test_cooperative_replacement_burns_old_token() {
        let seed_utxo = utxo(12, TxOutput::new(wallet(), Value::lovelace(7_000_000)));
        let seed = SeedReference::from_utxo(&seed_utxo);
        let fresh = UniqueTokenName::derive("mintDgt", &seed).unwrap();
        let mut next = charter();
        next.mint_delegate_link = link(fresh.name().as_str());
        let replacing = |burn: bool, activity: CapoMinterActivity| {
            let mut entries = vec![(fresh.name().clone(), 1)];
            if burn {
                entries.push((token("mintDgt-1"), -1));
            }
            tx(
                vec![charter_input(), gov_input(), spend(seed_utxo.clone(), None)],
                Vec::new(),
                vec![charter_at(config().capo_addr, &next)],
                vec![mint(entries, activity)],
            )
        };

        let kept = replacing(false, CapoMinterActivity::ReplacingMintDelegate { seed });
        assert_eq!(
            rejection(&kept),
            "replaced mint delegate token mintDgt-1 is not burned"
        );
        let burned = replacing(true, CapoMinterActivity::ReplacingMintDelegate { seed });
        assert_eq!(verify(&burned), Ok(()));
        let forced = replacing(false, CapoMinterActivity::ForcingNewMintDelegate { seed });
        assert_eq!(verify(&forced), Ok(()));
    }

    #[test]
    fn test_settings_must_be_returned() {
        let cfg = config();
        let settings = spend(
            utxo(13, holding(cfg.capo_addr, "set-1")),
            Some(CapoSpendActivity::UpdatingSettings.to_activity().unwrap()),
        );
        let charter_ref = utxo(10, charter_at(cfg.capo_addr, &charter()));
        let updating = |to: Address| {
            tx(
                vec![settings.clone(), gov_input()],
                vec![charter_ref.clone()],
                vec![holding(to, "set-1")],
                Vec::new(),
            )
        };

        assert_eq!(
            rejection(&updating(wallet())),
            "settings must stay at the capo address"
        );
        assert_eq!(verify(&updating(cfg.capo_addr)), Ok(()));
    }

    #[test]
    fn test_retirement_burns_exactly_the_named_token() {
        let notes = spend(
            utxo(14, holding(Address::Script(ScriptHash::new([6; 32])), "notes-1")),
            Some(DelegateActivity::Retiring.to_activity().unwrap()),
        );
        let mut next = charter();
        next.named_delegates.clear();
        let retiring = |burned: &str, next: &CharterDatum| {
            tx(
                vec![charter_input(), gov_input(), notes.clone()],
                Vec::new(),
                vec![charter_at(config().capo_addr, next)],
                vec![mint(
                    vec![(token(burned), -1)],
                    CapoMinterActivity::RetiringNamedDelegate {
                        name: "notes".to_string(),
                    },
                )],
            )
        };

        assert_eq!(verify(&retiring("notes-1", &next)), Ok(()));
        assert_eq!(
            rejection(&retiring("spendDgt-1", &next)),
            "retiring 'notes' must burn exactly its token notes-1"
        );
        assert_eq!(
            rejection(&retiring("notes-1", &charter())),
            "retired delegate 'notes' is still named in the charter"
        );
    }
}
