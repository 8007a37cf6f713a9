use chrono::Utc;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};

use capo_core::config::{Network, NetworkParams};
use capo_core::error::CapoError;
use capo_core::ledger::{LedgerProvider, LedgerQuery, ResolvedTx, Verifier};
use capo_core::objects::{Address, ScriptPurpose, TxId, TxOutput, TxOutputId, Utxo, Value};
use capo_core::transaction::{SignedTransaction, Transaction, TxReceipt};

use crate::signer::dev_signature;

/// In-memory ledger for testing purposes.
///
/// Applies the ledger's structural rules (inputs exist and are unspent,
/// value is preserved, deposits and fees are paid, signatures and redeemers
/// are present) and then runs every registered `Verifier`, standing in for
/// on-chain validation. The ledger follows wall-clock time; `set_slot` moves
/// it ahead.
pub struct MockLedger {
    params: NetworkParams,
    /// Unspent outputs
    utxos: BTreeMap<TxOutputId, TxOutput>,
    /// Confirmed transactions by id
    transactions: HashMap<TxId, Transaction>,
    /// Receipts of every submission, including rejected ones
    receipts: HashMap<TxId, TxReceipt>,
    /// Slot of the last confirmed transaction, or the slot set by a test
    current_slot: u64,
    verifiers: Vec<Box<dyn Verifier>>,
    /// Counter for synthetic funding outputs
    genesis_count: u32,
}

impl MockLedger {
    pub fn new(params: NetworkParams) -> Self {
        let current_slot = params.slot_config.slot_at(Utc::now()).unwrap_or(0);
        Self {
            params,
            utxos: BTreeMap::new(),
            transactions: HashMap::new(),
            receipts: HashMap::new(),
            current_slot,
            verifiers: Vec::new(),
            genesis_count: 0,
        }
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// Register on-chain validation logic run against every submission
    pub fn add_verifier(&mut self, verifier: Box<dyn Verifier>) {
        debug!("registered verifier {}", verifier.name());
        self.verifiers.push(verifier);
    }

    /// Put an arbitrary output on the ledger
    pub fn add_utxo(&mut self, utxo: Utxo) {
        self.utxos.insert(utxo.id, utxo.output);
    }

    /// Create a lovelace-only output at `address` out of thin air
    pub fn fund(&mut self, address: Address, lovelace: u64) -> Utxo {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"genesis");
        hasher.update(&self.genesis_count.to_le_bytes());
        self.genesis_count += 1;
        let utxo = Utxo::new(
            TxOutputId::new(TxId::new(*hasher.finalize().as_bytes()), 0),
            TxOutput::new(address, Value::lovelace(lovelace)),
        );
        self.add_utxo(utxo.clone());
        utxo
    }

    /// Set the current slot for testing purposes
    pub fn set_slot(&mut self, slot: u64) {
        self.current_slot = slot;
    }

    pub fn transaction(&self, id: &TxId) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    pub fn receipt(&self, id: &TxId) -> Option<&TxReceipt> {
        self.receipts.get(id)
    }

    /// Every unspent output, across all addresses
    pub fn all_utxos(&self) -> Vec<Utxo> {
        self.utxos
            .iter()
            .map(|(id, output)| Utxo::new(*id, output.clone()))
            .collect()
    }

    fn tip(&self) -> u64 {
        let now = self.params.slot_config.slot_at(Utc::now()).unwrap_or(0);
        self.current_slot.max(now)
    }

    fn is_unspent(&self, utxo: &Utxo) -> bool {
        self.utxos.get(&utxo.id) == Some(&utxo.output)
    }

    /// Apply the ledger rules; the error is the rejection message
    fn check(&self, signed: &SignedTransaction) -> Result<(), String> {
        let tx = &signed.tx;
        if self.transactions.contains_key(&tx.id) {
            return Err(format!("transaction {} was already confirmed", tx.id));
        }
        if tx.inputs.is_empty() {
            return Err("transaction spends no inputs".to_string());
        }
        for input in &tx.inputs {
            if !self.is_unspent(&input.utxo) {
                return Err(format!("input {} is missing or already spent", input.utxo.id));
            }
        }
        for utxo in &tx.ref_inputs {
            if !self.is_unspent(utxo) {
                return Err(format!("reference input {} is missing or already spent", utxo.id));
            }
        }

        let tip = self.tip();
        if let Some(from) = tx.valid_from {
            if tip < from {
                return Err(format!("transaction not valid until slot {} (now {})", from, tip));
            }
        }
        if let Some(to) = tx.valid_to {
            if tip >= to {
                return Err(format!("transaction expired at slot {} (now {})", to, tip));
            }
        }

        self.check_value(tx)?;
        self.check_witnesses(signed)?;

        for verifier in &self.verifiers {
            verifier.verify(ResolvedTx {
                tx,
                signatures: &signed.signatures,
            })?;
        }
        Ok(())
    }

    fn check_value(&self, tx: &Transaction) -> Result<(), String> {
        for output in &tx.outputs {
            if !output.value.is_non_negative() {
                return Err(format!("output to {} holds a negative quantity", output.address));
            }
            let needed = output.min_deposit(self.params.coins_per_utxo_byte);
            if output.value.lovelace < needed {
                return Err(format!(
                    "output to {} holds {} lovelace; minimum deposit is {}",
                    output.address, output.value.lovelace, needed
                ));
            }
        }

        let mut available = tx.input_value();
        available.merge(&tx.minted());
        let produced = tx.output_value();
        if !available.same_assets(&produced) {
            return Err(format!(
                "tokens not preserved: inputs and mints provide {:?}, outputs hold {:?}",
                available.assets, produced.assets
            ));
        }
        if available.lovelace != produced.lovelace + tx.fee {
            return Err(format!(
                "lovelace not preserved: {} in, {} out, fee {}",
                available.lovelace, produced.lovelace, tx.fee
            ));
        }
        let min_fee = self.params.fee_for_size(tx.size());
        if tx.fee < min_fee {
            return Err(format!("fee {} is below the minimum {}", tx.fee, min_fee));
        }
        if tx.size() > self.params.max_tx_size {
            return Err(format!("transaction is {} bytes; limit is {}", tx.size(), self.params.max_tx_size));
        }
        Ok(())
    }

    fn check_witnesses(&self, signed: &SignedTransaction) -> Result<(), String> {
        let tx = &signed.tx;
        for signature in &signed.signatures {
            if signature.bytes != dev_signature(&signature.signer, &tx.id) {
                return Err(format!("signature by {} doesn't verify", signature.signer));
            }
        }
        let key_inputs = tx
            .inputs
            .iter()
            .filter_map(|i| i.utxo.output.address.pub_key_hash().copied());
        for key in key_inputs.chain(tx.required_signers.iter().copied()) {
            if !signed.is_signed_by(&key) {
                return Err(format!("missing signature by {}", key));
            }
        }

        let mut runs_scripts = false;
        for input in &tx.inputs {
            if let Some(hash) = input.utxo.output.address.script_hash() {
                runs_scripts = true;
                if input.activity.as_ref().map_or(true, |a| a.is_empty()) {
                    return Err(format!("script input {} has no activity", input.utxo.id));
                }
                if !tx.provides_script(ScriptPurpose::Spending, hash) {
                    return Err(format!("no script provided for input {} at {}", input.utxo.id, hash));
                }
            }
        }
        for mint in &tx.mints {
            runs_scripts = true;
            if !tx.provides_script(ScriptPurpose::Minting, &mint.policy) {
                return Err(format!("no minting policy provided for {}", mint.policy));
            }
        }
        if runs_scripts {
            match &tx.collateral {
                None => return Err("scripts run but no collateral is provided".to_string()),
                Some(collateral) => {
                    if !self.utxos.contains_key(&collateral.id) || collateral.output.value.has_tokens() {
                        return Err(format!("collateral {} is unusable", collateral.id));
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, tx: &Transaction, slot: u64) -> TxReceipt {
        for input in &tx.inputs {
            self.utxos.remove(&input.utxo.id);
        }
        let mut receipt = TxReceipt::new(tx.id, slot, true, Utc::now());
        for utxo in tx.output_utxos() {
            receipt.created.push(utxo.id);
            self.utxos.insert(utxo.id, utxo.output);
        }
        receipt.commit();
        self.transactions.insert(tx.id, tx.clone());
        self.receipts.insert(tx.id, receipt.clone());
        self.current_slot = slot + 1;
        receipt
    }
}

impl LedgerQuery for MockLedger {
    fn spendable_utxos(&self, address: &Address) -> Result<Vec<Utxo>, CapoError> {
        Ok(self
            .utxos
            .iter()
            .filter(|(_, output)| output.address == *address)
            .map(|(id, output)| Utxo::new(*id, output.clone()))
            .collect())
    }

    fn utxo(&self, id: &TxOutputId) -> Result<Option<Utxo>, CapoError> {
        Ok(self.utxos.get(id).map(|output| Utxo::new(*id, output.clone())))
    }

    fn network(&self) -> Network {
        self.params.network
    }

    fn current_slot(&self) -> u64 {
        self.tip()
    }
}

impl LedgerProvider for MockLedger {
    fn submit(&mut self, signed: SignedTransaction) -> Result<TxReceipt, CapoError> {
        let slot = self.tip();
        if let Err(message) = self.check(&signed) {
            warn!("rejected transaction {}: {}", signed.tx.id, message);
            let mut receipt = TxReceipt::new(signed.tx.id, slot, false, Utc::now());
            receipt.set_error(message.clone());
            self.receipts.insert(signed.tx.id, receipt);
            return Err(CapoError::OnchainRejection(message));
        }
        let receipt = self.apply(&signed.tx, slot);
        info!(
            "confirmed transaction {} in slot {} ({} outputs)",
            signed.tx.id,
            slot,
            receipt.created.len()
        );
        Ok(receipt)
    }
}
