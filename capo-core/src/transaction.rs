use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::CapoError;
use crate::objects::{
    Activity, PolicyId, PubKeyHash, Script, ScriptHash, ScriptPurpose, TokenMap, TxId, TxOutput,
    TxOutputId, Utxo, Value,
};

/// An input being spent, with the activity that justifies the spend (script inputs only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub utxo: Utxo,
    pub activity: Option<Activity>,
}

/// A request to mint (positive) or burn (negative) tokens under one policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintInstruction {
    pub policy: PolicyId,
    pub entries: TokenMap,
    pub activity: Activity,
}

impl MintInstruction {
    pub fn value(&self) -> Value {
        let mut value = Value::default();
        for (name, quantity) in &self.entries {
            value.add_token(self.policy, name.clone(), *quantity);
        }
        value
    }
}

/// Accumulates the parts of a transaction and rejects malformed elements.
///
/// This is the low-level builder; callers normally go through a transaction
/// context, which annotates rejections with its own state.
#[derive(Debug, Clone, Default)]
pub struct TxBuilder {
    coins_per_utxo_byte: u64,
    inputs: Vec<TxInput>,
    ref_inputs: Vec<Utxo>,
    outputs: Vec<TxOutput>,
    collateral: Option<Utxo>,
    mints: Vec<MintInstruction>,
    scripts: Vec<Script>,
    signers: BTreeSet<PubKeyHash>,
    valid_from: Option<u64>,
    valid_to: Option<u64>,
    fee: u64,
}

impl TxBuilder {
    pub fn new(coins_per_utxo_byte: u64) -> Self {
        Self {
            coins_per_utxo_byte,
            ..Default::default()
        }
    }

    pub fn add_input(&mut self, utxo: Utxo, activity: Option<Activity>) -> Result<(), CapoError> {
        if self.spends(&utxo.id) {
            return Err(CapoError::assembly(
                format!("input {} is already spent by this transaction", utxo.id),
                format!("{:?}", utxo),
            ));
        }
        if utxo.output.address.is_script() && activity.is_none() {
            return Err(CapoError::assembly(
                format!("script input {} needs an activity", utxo.id),
                format!("{:?}", utxo),
            ));
        }
        self.inputs.push(TxInput { utxo, activity });
        Ok(())
    }

    pub fn add_ref_input(&mut self, utxo: Utxo) {
        self.ref_inputs.push(utxo);
    }

    pub fn has_ref_input(&self, id: &TxOutputId) -> bool {
        self.ref_inputs.iter().any(|u| u.id == *id)
    }

    pub fn add_output(&mut self, output: TxOutput) -> Result<(), CapoError> {
        if !output.value.is_non_negative() {
            return Err(CapoError::assembly(
                "output holds a negative token quantity",
                format!("{:?}", output),
            ));
        }
        let needed = output.min_deposit(self.coins_per_utxo_byte);
        if output.value.lovelace < needed {
            return Err(CapoError::assembly(
                format!(
                    "output holds {} lovelace; at least {} is required",
                    output.value.lovelace, needed
                ),
                format!("{:?}", output),
            ));
        }
        self.outputs.push(output);
        Ok(())
    }

    pub fn set_collateral(&mut self, utxo: Utxo) -> Result<(), CapoError> {
        if utxo.output.value.has_tokens() {
            return Err(CapoError::assembly(
                "collateral must hold only lovelace",
                format!("{:?}", utxo),
            ));
        }
        self.collateral = Some(utxo);
        Ok(())
    }

    pub fn add_mint(&mut self, mint: MintInstruction) -> Result<(), CapoError> {
        if mint.activity.is_empty() {
            return Err(CapoError::assembly(
                format!("minting under {} needs an activity", mint.policy),
                format!("{:?}", mint),
            ));
        }
        if mint.entries.values().any(|q| *q == 0) {
            return Err(CapoError::assembly(
                "mint entries must have a non-zero quantity",
                format!("{:?}", mint),
            ));
        }
        self.mints.push(mint);
        Ok(())
    }

    pub fn attach_script(&mut self, script: Script) {
        if !self.scripts.iter().any(|s| s.hash() == script.hash()) {
            self.scripts.push(script);
        }
    }

    pub fn add_signer(&mut self, signer: PubKeyHash) {
        self.signers.insert(signer);
    }

    pub fn set_validity(&mut self, from: Option<u64>, to: Option<u64>) {
        self.valid_from = from;
        self.valid_to = to;
    }

    pub fn set_fee(&mut self, fee: u64) {
        self.fee = fee;
    }

    pub fn spends(&self, id: &TxOutputId) -> bool {
        self.inputs.iter().any(|i| i.utxo.id == *id)
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn ref_inputs(&self) -> &[Utxo] {
        &self.ref_inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn collateral(&self) -> Option<&Utxo> {
        self.collateral.as_ref()
    }

    pub fn mints(&self) -> &[MintInstruction] {
        &self.mints
    }

    pub fn scripts(&self) -> &[Script] {
        &self.scripts
    }

    pub fn signers(&self) -> &BTreeSet<PubKeyHash> {
        &self.signers
    }

    pub fn validity(&self) -> (Option<u64>, Option<u64>) {
        (self.valid_from, self.valid_to)
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    /// Whether any script must run to validate this transaction
    pub fn runs_scripts(&self) -> bool {
        !self.mints.is_empty() || self.inputs.iter().any(|i| i.utxo.output.address.is_script())
    }

    /// Merge the mint instructions into exactly one per policy.
    ///
    /// Entries for the same token are summed and zero results dropped. All
    /// instructions for one policy must carry the same activity.
    pub fn consolidated_mints(&self) -> Result<Vec<MintInstruction>, CapoError> {
        let mut merged: Vec<MintInstruction> = Vec::new();
        for mint in &self.mints {
            match merged.iter_mut().find(|m| m.policy == mint.policy) {
                Some(existing) => {
                    if existing.activity != mint.activity {
                        return Err(CapoError::assembly(
                            format!(
                                "conflicting activities for policy {}: '{}' vs '{}'",
                                mint.policy, existing.activity, mint.activity
                            ),
                            format!("{:?}", mint),
                        ));
                    }
                    for (name, quantity) in &mint.entries {
                        *existing.entries.entry(name.clone()).or_insert(0) += quantity;
                    }
                }
                None => merged.push(mint.clone()),
            }
        }
        for mint in &mut merged {
            mint.entries.retain(|_, q| *q != 0);
        }
        merged.retain(|m| !m.entries.is_empty());
        Ok(merged)
    }

    /// Produce the immutable transaction
    pub fn build(&self) -> Result<Transaction, CapoError> {
        let mut tx = Transaction {
            id: TxId::default(),
            inputs: self.inputs.clone(),
            ref_inputs: self.ref_inputs.clone(),
            outputs: self.outputs.clone(),
            collateral: self.collateral.clone(),
            mints: self.consolidated_mints()?,
            scripts: self.scripts.clone(),
            required_signers: self.signers.clone(),
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            fee: self.fee,
        };
        tx.id = tx.compute_id()?;
        Ok(tx)
    }
}

/// A fully assembled transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Content hash of everything below
    pub id: TxId,
    pub inputs: Vec<TxInput>,
    pub ref_inputs: Vec<Utxo>,
    pub outputs: Vec<TxOutput>,
    pub collateral: Option<Utxo>,
    pub mints: Vec<MintInstruction>,
    pub scripts: Vec<Script>,
    pub required_signers: BTreeSet<PubKeyHash>,
    pub valid_from: Option<u64>,
    pub valid_to: Option<u64>,
    pub fee: u64,
}

impl Transaction {
    fn compute_id(&self) -> Result<TxId, CapoError> {
        let mut body = self.clone();
        body.id = TxId::default();
        let encoded = bincode::serialize(&body)?;
        Ok(TxId::new(*blake3::hash(&encoded).as_bytes()))
    }

    /// Encoded size in bytes, used for fee and limit checks
    pub fn size(&self) -> usize {
        bincode::serialized_size(self).unwrap_or(0) as usize
    }

    /// The utxos this transaction creates once confirmed
    pub fn output_utxos(&self) -> Vec<Utxo> {
        self.outputs
            .iter()
            .enumerate()
            .map(|(index, output)| Utxo::new(TxOutputId::new(self.id, index as u32), output.clone()))
            .collect()
    }

    /// Net value minted (and burned) by this transaction
    pub fn minted(&self) -> Value {
        let mut value = Value::default();
        for mint in &self.mints {
            value.merge(&mint.value());
        }
        value
    }

    pub fn mint_for(&self, policy: &PolicyId) -> Option<&MintInstruction> {
        self.mints.iter().find(|m| m.policy == *policy)
    }

    pub fn input_value(&self) -> Value {
        let mut value = Value::default();
        for input in &self.inputs {
            value.merge(&input.utxo.output.value);
        }
        value
    }

    pub fn output_value(&self) -> Value {
        let mut value = Value::default();
        for output in &self.outputs {
            value.merge(&output.value);
        }
        value
    }

    pub fn spends(&self, id: &TxOutputId) -> bool {
        self.inputs.iter().any(|i| i.utxo.id == *id)
    }

    /// Whether a script with this hash is available, either attached or via a reference input
    pub fn provides_script(&self, purpose: ScriptPurpose, hash: &ScriptHash) -> bool {
        self.scripts.iter().any(|s| s.purpose == purpose && s.hash() == *hash)
            || self.ref_inputs.iter().any(|u| {
                u.output
                    .ref_script
                    .as_ref()
                    .map_or(false, |s| s.purpose == purpose && s.hash() == *hash)
            })
    }
}

/// A signature over a transaction id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub signer: PubKeyHash,
    pub bytes: Vec<u8>,
}

/// A transaction ready for submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub signatures: Vec<Signature>,
}

impl SignedTransaction {
    pub fn new(tx: Transaction) -> Self {
        Self {
            tx,
            signatures: Vec::new(),
        }
    }

    pub fn add_signature(&mut self, signature: Signature) {
        self.signatures.push(signature);
    }

    pub fn is_signed_by(&self, signer: &PubKeyHash) -> bool {
        self.signatures.iter().any(|s| s.signer == *signer)
    }
}

/// Represents the commitment level of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CommitmentLevel {
    /// Transaction is submitted but not yet confirmed
    #[default]
    Processing,
    /// Transaction has been confirmed by the ledger
    Committed,
    /// Transaction was rejected and cannot be executed again
    Failed,
}

/// A receipt of a submitted transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxReceipt {
    /// The id of the transaction that was submitted
    pub tx_id: TxId,

    /// The slot in which this transaction was processed
    pub slot: u64,

    /// Whether the transaction was confirmed
    pub success: bool,

    /// When the transaction was processed
    pub timestamp: DateTime<Utc>,

    /// The commitment level of this transaction
    pub commitment_level: CommitmentLevel,

    /// Any error message from the ledger (if not successful)
    pub error_message: Option<String>,

    /// Outputs created by the transaction
    pub created: Vec<TxOutputId>,
}

impl TxReceipt {
    pub fn new(tx_id: TxId, slot: u64, success: bool, timestamp: DateTime<Utc>) -> Self {
        Self {
            tx_id,
            slot,
            success,
            timestamp,
            commitment_level: if success {
                CommitmentLevel::Committed
            } else {
                CommitmentLevel::Failed
            },
            error_message: None,
            created: Vec::new(),
        }
    }

    /// Set an error message (used when transaction fails)
    pub fn set_error(&mut self, error: String) {
        self.success = false;
        self.commitment_level = CommitmentLevel::Failed;
        self.error_message = Some(error);
    }

    /// Mark the transaction as committed
    pub fn commit(&mut self) {
        self.commitment_level = CommitmentLevel::Committed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TokenName;
    use crate::objects::Address;

    const COINS: u64 = 4310;

    fn wallet_utxo(byte: u8, lovelace: u64) -> Utxo {
        Utxo::new(
            TxOutputId::new(TxId::new([byte; 32]), 0),
            TxOutput::new(Address::PubKey(PubKeyHash::new([1; 32])), Value::lovelace(lovelace)),
        )
    }

    fn name(text: &str) -> TokenName {
        TokenName::new(text).unwrap()
    }

    fn mint(policy: PolicyId, entries: &[(&str, i64)], label: &str) -> MintInstruction {
        MintInstruction {
            policy,
            entries: entries.iter().map(|(n, q)| (name(n), *q)).collect(),
            activity: Activity::new(label),
        }
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let mut builder = TxBuilder::new(COINS);
        builder.add_input(wallet_utxo(1, 5_000_000), None).unwrap();
        let err = builder.add_input(wallet_utxo(1, 5_000_000), None).unwrap_err();
        assert!(err.to_string().contains("already spent"));
    }

    #[test]
    fn test_script_input_needs_activity() {
        let mut builder = TxBuilder::new(COINS);
        let utxo = Utxo::new(
            TxOutputId::new(TxId::new([2; 32]), 1),
            TxOutput::new(Address::Script(ScriptHash::new([3; 32])), Value::lovelace(2_000_000)),
        );
        assert!(builder.add_input(utxo.clone(), None).is_err());
        assert!(builder.add_input(utxo, Some(Activity::new("Spending"))).is_ok());
    }

    #[test]
    fn test_output_below_min_deposit_rejected() {
        let mut builder = TxBuilder::new(COINS);
        let output = TxOutput::new(Address::PubKey(PubKeyHash::new([1; 32])), Value::lovelace(1));
        assert!(builder.add_output(output.clone()).is_err());
        assert!(builder.add_output(output.with_min_deposit(COINS)).is_ok());
    }

    #[test]
    fn test_collateral_rejects_tokens() {
        let mut builder = TxBuilder::new(COINS);
        let mut utxo = wallet_utxo(4, 5_000_000);
        utxo.output.value.add_token(ScriptHash::new([9; 32]), name("nft"), 1);
        assert!(builder.set_collateral(utxo).is_err());
        assert!(builder.set_collateral(wallet_utxo(5, 5_000_000)).is_ok());
    }

    #[test]
    fn test_mints_consolidate_per_policy() {
        let policy = ScriptHash::new([7; 32]);
        let other = ScriptHash::new([8; 32]);
        let mut builder = TxBuilder::new(COINS);
        builder.add_mint(mint(policy, &[("mintDgt-new", 1)], "Replacing")).unwrap();
        builder.add_mint(mint(other, &[("x", 1)], "Other")).unwrap();
        builder.add_mint(mint(policy, &[("mintDgt-old", -1)], "Replacing")).unwrap();
        builder.add_mint(mint(policy, &[("tmp", 1)], "Replacing")).unwrap();
        builder.add_mint(mint(policy, &[("tmp", -1)], "Replacing")).unwrap();

        let merged = builder.consolidated_mints().unwrap();
        assert_eq!(merged.len(), 2);
        let ours = merged.iter().find(|m| m.policy == policy).unwrap();
        assert_eq!(ours.entries.len(), 2);
        assert_eq!(ours.entries[&name("mintDgt-new")], 1);
        assert_eq!(ours.entries[&name("mintDgt-old")], -1);
    }

    #[test]
    fn test_conflicting_mint_activities_rejected() {
        let policy = ScriptHash::new([7; 32]);
        let mut builder = TxBuilder::new(COINS);
        builder.add_mint(mint(policy, &[("a", 1)], "One")).unwrap();
        builder.add_mint(mint(policy, &[("b", 1)], "Two")).unwrap();
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_tx_id_is_content_derived() {
        let mut a = TxBuilder::new(COINS);
        a.add_input(wallet_utxo(1, 5_000_000), None).unwrap();
        let mut b = a.clone();
        let tx_a = a.build().unwrap();
        assert_eq!(tx_a.id, a.build().unwrap().id);

        b.set_fee(200_000);
        assert_ne!(tx_a.id, b.build().unwrap().id);

        let utxos = tx_a.output_utxos();
        assert!(utxos.is_empty());
    }

    #[test]
    fn test_receipt_commitment() {
        let mut receipt = TxReceipt::new(TxId::new([1; 32]), 10, true, Utc::now());
        assert_eq!(receipt.commitment_level, CommitmentLevel::Committed);
        receipt.set_error("boom".to_string());
        assert!(!receipt.success);
        assert_eq!(receipt.commitment_level, CommitmentLevel::Failed);
    }
}
