use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use capo_core::config::NetworkParams;
use capo_core::error::CapoError;
use capo_core::id::{TokenName, UniqueTokenName};
use capo_core::objects::{Activity, PolicyId, PubKeyHash, Script, TxOutput, TxOutputId, Utxo};
use capo_core::transaction::{MintInstruction, Transaction, TxBuilder};

use crate::addl::TxDescription;
use crate::validity::ValidityWindow;

/// Accumulates one ledger transaction plus the follow-up transactions that depend on it.
///
/// Every element goes through the underlying `TxBuilder`; when the builder
/// rejects something, the error is annotated with a dump of this context
/// and the offending element before being returned.
pub struct TxContext {
    params: NetworkParams,
    builder: TxBuilder,
    uuts: BTreeMap<String, UniqueTokenName>,
    state: BTreeMap<String, serde_json::Value>,
    addl_txns: Vec<(String, TxDescription)>,
    validity: ValidityWindow,
}

impl TxContext {
    pub fn new(params: &NetworkParams) -> Self {
        Self {
            params: params.clone(),
            builder: TxBuilder::new(params.coins_per_utxo_byte),
            uuts: BTreeMap::new(),
            state: BTreeMap::new(),
            addl_txns: Vec::new(),
            validity: ValidityWindow::default(),
        }
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn builder(&self) -> &TxBuilder {
        &self.builder
    }

    /// Spend `utxo`. Script inputs need an activity naming why they're spent.
    pub fn add_input(&mut self, utxo: Utxo, activity: Option<Activity>) -> Result<(), CapoError> {
        if let Some(activity) = &activity {
            if activity.is_empty() {
                return Err(self.annotate(CapoError::assembly(
                    format!("empty activity supplied for input {}", utxo.id),
                    format!("{:?}", utxo),
                )));
            }
        }
        let result = self.builder.add_input(utxo, activity);
        result.map_err(|e| self.annotate(e))
    }

    pub fn add_output(&mut self, output: TxOutput) -> Result<(), CapoError> {
        let result = self.builder.add_output(output);
        result.map_err(|e| self.annotate(e))
    }

    pub fn add_outputs(&mut self, outputs: Vec<TxOutput>) -> Result<(), CapoError> {
        for output in outputs {
            self.add_output(output)?;
        }
        Ok(())
    }

    /// Use `utxo` as collateral; it must hold only lovelace
    pub fn add_collateral(&mut self, utxo: Utxo) -> Result<(), CapoError> {
        let result = self.builder.set_collateral(utxo);
        result.map_err(|e| self.annotate(e))
    }

    /// Reference `utxo` without spending it. Adding the same reference twice is a no-op.
    pub fn add_ref_input(&mut self, utxo: Utxo) {
        if self.builder.has_ref_input(&utxo.id) {
            warn!("reference input {} is already present; not adding it again", utxo.id);
            return;
        }
        self.builder.add_ref_input(utxo);
    }

    /// Embed a script, unless a reference input already provides the same one
    pub fn add_script_program(&mut self, script: Script) {
        let hash = script.hash();
        let referenced = self.builder.ref_inputs().iter().any(|u| {
            u.output
                .ref_script
                .as_ref()
                .map_or(false, |s| s.purpose == script.purpose && s.hash() == hash)
        });
        if referenced {
            debug!(
                "script {} ({}) already available as a reference script; not embedding",
                script.program, hash
            );
            return;
        }
        self.builder.attach_script(script);
    }

    /// Mint (positive) or burn (negative) tokens under `policy`.
    ///
    /// Several calls for one policy are merged into a single mint instruction
    /// when the transaction is built; they must share the same activity.
    pub fn mint_tokens<I>(
        &mut self,
        policy: PolicyId,
        entries: I,
        activity: Activity,
    ) -> Result<(), CapoError>
    where
        I: IntoIterator<Item = (TokenName, i64)>,
    {
        let mut merged = BTreeMap::new();
        for (name, quantity) in entries {
            *merged.entry(name).or_insert(0) += quantity;
        }
        let result = self.builder.add_mint(MintInstruction {
            policy,
            entries: merged,
            activity,
        });
        result.map_err(|e| self.annotate(e))
    }

    pub fn add_signer(&mut self, signer: PubKeyHash) {
        self.builder.add_signer(signer);
    }

    pub fn set_fee(&mut self, fee: u64) {
        self.builder.set_fee(fee);
    }

    /// Record a unique token name under its purpose and any extra keys
    pub fn add_uut(&mut self, uut: &UniqueTokenName, aliases: &[&str]) {
        self.uuts.insert(uut.purpose().to_string(), uut.clone());
        for alias in aliases {
            self.uuts.insert((*alias).to_string(), uut.clone());
        }
    }

    pub fn uut(&self, key: &str) -> Option<&UniqueTokenName> {
        self.uuts.get(key)
    }

    pub fn uuts(&self) -> &BTreeMap<String, UniqueTokenName> {
        &self.uuts
    }

    /// Store a typed value in the context's state bag
    pub fn add_state<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), CapoError> {
        self.state.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn state<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CapoError> {
        match self.state.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Queue a transaction to run after this one is confirmed
    pub fn include_addl_txn(&mut self, name: &str, txn: TxDescription) -> Result<(), CapoError> {
        if self.addl_txns.iter().any(|(existing, _)| existing == name) {
            return Err(CapoError::AddlTxnConflict(format!(
                "transaction '{}' is already pending on this context",
                name
            )));
        }
        self.addl_txns.push((name.to_string(), txn));
        Ok(())
    }

    /// Names of the queued transactions, in execution order
    pub fn addl_txn_names(&self) -> Vec<&str> {
        self.addl_txns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn addl_txn(&self, name: &str) -> Option<&TxDescription> {
        self.addl_txns.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    /// Remove and return the queued transactions, in execution order
    pub fn take_addl_txns(&mut self) -> Vec<(String, TxDescription)> {
        std::mem::take(&mut self.addl_txns)
    }

    /// Start the validity window at `date`; must precede `valid_for`
    pub fn future_date(&mut self, date: DateTime<Utc>) -> Result<(), CapoError> {
        self.validity.set_future_date(date)
    }

    /// End the validity window `duration_ms` after its start
    pub fn valid_for(&mut self, duration_ms: u64) -> Result<(), CapoError> {
        self.validity.set_valid_for(duration_ms)
    }

    pub fn txn_time(&self) -> Option<DateTime<Utc>> {
        self.validity.txn_time()
    }

    /// Inputs this context has claimed: spent inputs and collateral
    pub fn reserved_utxos(&self) -> BTreeSet<TxOutputId> {
        let mut reserved: BTreeSet<TxOutputId> =
            self.builder.inputs().iter().map(|i| i.utxo.id).collect();
        if let Some(collateral) = self.builder.collateral() {
            reserved.insert(collateral.id);
        }
        reserved
    }

    /// Assemble the transaction as it stands
    pub fn build(&self) -> Result<Transaction, CapoError> {
        let (from, to) = self
            .validity
            .to_slots(&self.params.slot_config, Utc::now())?;
        let mut builder = self.builder.clone();
        builder.set_validity(from, to);
        let tx = builder.build().map_err(|e| self.annotate(e))?;
        if tx.size() > self.params.max_tx_size {
            return Err(self.annotate(CapoError::assembly(
                format!(
                    "transaction is {} bytes; the limit is {}",
                    tx.size(),
                    self.params.max_tx_size
                ),
                format!("transaction {}", tx.id),
            )));
        }
        Ok(tx)
    }

    /// A readable description of everything accumulated so far
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "inputs:");
        for input in self.builder.inputs() {
            let _ = writeln!(
                out,
                "  {} @ {} {:?} activity={}",
                input.utxo.id,
                input.utxo.output.address,
                input.utxo.output.value,
                input
                    .activity
                    .as_ref()
                    .map_or("-".to_string(), |a| a.to_string())
            );
        }
        let _ = writeln!(out, "ref inputs:");
        for utxo in self.builder.ref_inputs() {
            let _ = writeln!(out, "  {} @ {}", utxo.id, utxo.output.address);
        }
        let _ = writeln!(out, "outputs:");
        for output in self.builder.outputs() {
            let _ = writeln!(out, "  {} {:?}", output.address, output.value);
        }
        if let Some(collateral) = self.builder.collateral() {
            let _ = writeln!(out, "collateral: {}", collateral.id);
        }
        let _ = writeln!(out, "mints:");
        for mint in self.builder.mints() {
            let _ = writeln!(out, "  {} {:?} ({})", mint.policy, mint.entries, mint.activity);
        }
        let _ = writeln!(
            out,
            "uuts: {:?}",
            self.uuts.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>()
        );
        let _ = writeln!(out, "state keys: {:?}", self.state.keys().collect::<Vec<_>>());
        let _ = write!(out, "addl txns: {:?}", self.addl_txn_names());
        out
    }

    fn annotate(&self, err: CapoError) -> CapoError {
        match err {
            CapoError::TransactionAssembly {
                message, element, ..
            } => {
                let dump = self.dump();
                error!("transaction assembly failed: {} ({})\n{}", message, element, dump);
                CapoError::TransactionAssembly {
                    message,
                    element,
                    dump,
                }
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for TxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext")
            .field("inputs", &self.builder.inputs().len())
            .field("outputs", &self.builder.outputs().len())
            .field("mints", &self.builder.mints().len())
            .field("uuts", &self.uuts.keys().collect::<Vec<_>>())
            .field("addl_txns", &self.addl_txn_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capo_core::objects::{Address, ScriptHash, ScriptPurpose, TxId, Value};

    fn params() -> NetworkParams {
        NetworkParams::emulator()
    }

    fn wallet() -> Address {
        Address::PubKey(PubKeyHash::new([1; 32]))
    }

    fn utxo(byte: u8, index: u32, address: Address) -> Utxo {
        Utxo::new(
            TxOutputId::new(TxId::new([byte; 32]), index),
            TxOutput::new(address, Value::lovelace(5_000_000)),
        )
    }

    fn name(text: &str) -> TokenName {
        TokenName::new(text).unwrap()
    }

    #[test]
    fn test_empty_activity_fails_fast() {
        let mut tcx = TxContext::new(&params());
        let script_utxo = utxo(2, 0, Address::Script(ScriptHash::new([3; 32])));
        let err = tcx
            .add_input(script_utxo, Some(Activity::new("")))
            .unwrap_err();
        match err {
            CapoError::TransactionAssembly { message, .. } => {
                assert!(message.contains("empty activity"))
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(tcx.builder().inputs().is_empty());
    }

    #[test]
    fn test_builder_rejection_carries_dump() {
        let mut tcx = TxContext::new(&params());
        tcx.add_input(utxo(1, 0, wallet()), None).unwrap();
        let err = tcx.add_input(utxo(1, 0, wallet()), None).unwrap_err();
        match err {
            CapoError::TransactionAssembly { dump, element, .. } => {
                assert!(dump.contains("inputs:"));
                assert!(dump.contains(&TxOutputId::new(TxId::new([1; 32]), 0).to_string()));
                assert!(element.contains("Utxo"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_ref_input_is_idempotent() {
        let mut tcx = TxContext::new(&params());
        let reference = utxo(4, 1, wallet());
        tcx.add_ref_input(reference.clone());
        tcx.add_ref_input(reference);
        assert_eq!(tcx.builder().ref_inputs().len(), 1);
        assert_eq!(tcx.build().unwrap().ref_inputs.len(), 1);
    }

    #[test]
    fn test_script_not_embedded_when_referenced() {
        let script = Script::parameterized("mintDgt", ScriptPurpose::Spending, &7u8).unwrap();
        let other = Script::parameterized("mintDgt", ScriptPurpose::Minting, &7u8).unwrap();

        let mut holder = utxo(5, 0, wallet());
        holder.output = holder.output.with_ref_script(script.clone());

        let mut tcx = TxContext::new(&params());
        tcx.add_ref_input(holder);
        tcx.add_script_program(script);
        assert!(tcx.builder().scripts().is_empty());

        // same bytes, different purpose: still embedded
        tcx.add_script_program(other);
        assert_eq!(tcx.builder().scripts().len(), 1);
    }

    #[test]
    fn test_collateral_with_tokens_rejected() {
        let mut tcx = TxContext::new(&params());
        let mut collateral = utxo(6, 0, wallet());
        collateral
            .output
            .value
            .add_token(ScriptHash::new([9; 32]), name("nft"), 1);
        assert!(tcx.add_collateral(collateral).is_err());
        assert!(tcx.reserved_utxos().is_empty());
    }

    #[test]
    fn test_mints_merge_into_one_instruction() {
        let policy = ScriptHash::new([7; 32]);
        let activity = Activity::new("MintingUuts");
        let mut tcx = TxContext::new(&params());
        tcx.mint_tokens(policy, vec![(name("a"), 1)], activity.clone()).unwrap();
        tcx.mint_tokens(policy, vec![(name("b"), 1)], activity).unwrap();
        let tx = tcx.build().unwrap();
        assert_eq!(tx.mints.len(), 1);
        assert_eq!(tx.mints[0].entries.len(), 2);
    }

    #[test]
    fn test_duplicate_addl_txn_rejected() {
        let mut tcx = TxContext::new(&params());
        tcx.include_addl_txn(
            "refScript-capo",
            TxDescription::ready("deposit capo script", TxContext::new(&params())),
        )
        .unwrap();
        let err = tcx
            .include_addl_txn(
                "refScript-capo",
                TxDescription::ready("again", TxContext::new(&params())),
            )
            .unwrap_err();
        assert!(matches!(err, CapoError::AddlTxnConflict(_)));
        assert_eq!(tcx.addl_txn_names(), vec!["refScript-capo"]);
    }

    #[test]
    fn test_addl_txns_keep_declared_order() {
        let mut tcx = TxContext::new(&params());
        for name in ["b", "a", "c"] {
            tcx.include_addl_txn(name, TxDescription::ready(name, TxContext::new(&params())))
                .unwrap();
        }
        let taken: Vec<String> = tcx.take_addl_txns().into_iter().map(|(n, _)| n).collect();
        assert_eq!(taken, vec!["b", "a", "c"]);
        assert!(tcx.addl_txn_names().is_empty());
    }

    #[test]
    fn test_state_bag_round_trip() {
        let mut tcx = TxContext::new(&params());
        tcx.add_state("revision", &3u32).unwrap();
        assert_eq!(tcx.state::<u32>("revision").unwrap(), Some(3));
        assert_eq!(tcx.state::<u32>("missing").unwrap(), None);
        assert!(tcx.state::<String>("revision").is_err());
    }

    #[test]
    fn test_uut_aliases() {
        let seed = capo_core::id::SeedReference::new(TxId::new([1; 32]), 0);
        let uut = UniqueTokenName::derive("mintDgt", &seed).unwrap();
        let mut tcx = TxContext::new(&params());
        tcx.add_uut(&uut, &["mintDelegate"]);
        assert_eq!(tcx.uut("mintDgt"), Some(&uut));
        assert_eq!(tcx.uut("mintDelegate"), Some(&uut));
    }

    #[test]
    fn test_validity_reaches_transaction() {
        let params = params();
        let start = params.slot_config.time_at(10_000).unwrap();
        let mut tcx = TxContext::new(&params);
        tcx.future_date(start).unwrap();
        tcx.valid_for(60_000).unwrap();
        let tx = tcx.build().unwrap();
        assert_eq!(tx.valid_from, Some(10_000));
        assert_eq!(tx.valid_to, Some(10_060));
        assert!(tcx.future_date(start).is_err());
    }

    #[test]
    fn test_reserved_includes_collateral() {
        let mut tcx = TxContext::new(&params());
        tcx.add_input(utxo(1, 0, wallet()), None).unwrap();
        tcx.add_collateral(utxo(1, 1, wallet())).unwrap();
        assert_eq!(tcx.reserved_utxos().len(), 2);
    }
}
