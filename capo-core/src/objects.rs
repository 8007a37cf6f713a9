use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::CapoError;
use crate::id::TokenName;

/// Fixed per-output overhead counted by the minimum-deposit rule, in bytes
pub const OUTPUT_OVERHEAD_BYTES: u64 = 160;

macro_rules! hash_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name([u8; 32]);

        impl $name {
            pub fn new(bytes: [u8; 32]) -> Self {
                $name(bytes)
            }

            /// Get a reference to the internal bytes
            pub fn bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn from_hex(text: &str) -> Result<Self, CapoError> {
                let raw = hex::decode(text).map_err(|e| {
                    CapoError::Serialization(format!("{}: {}", stringify!($name), e))
                })?;
                let bytes: [u8; 32] = raw.try_into().map_err(|_| {
                    CapoError::Serialization(format!("{}: expected 32 bytes", stringify!($name)))
                })?;
                Ok($name(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // First 6 bytes are enough to tell values apart in dumps
                write!(f, "{}({})", stringify!($name), hex::encode(&self.0[0..6]))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                $name::from_hex(&text).map_err(serde::de::Error::custom)
            }
        }
    };
}

hash_type!(
    /// Identifies a confirmed (or built) transaction
    TxId
);
hash_type!(
    /// Hash of a script's purpose and bytes
    ScriptHash
);
hash_type!(
    /// Hash of a wallet's verification key
    PubKeyHash
);

/// Minting policies are identified by their script hash
pub type PolicyId = ScriptHash;

/// Reference to one output of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxOutputId {
    pub tx_id: TxId,
    pub index: u32,
}

impl TxOutputId {
    pub fn new(tx_id: TxId, index: u32) -> Self {
        Self { tx_id, index }
    }
}

impl fmt::Display for TxOutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

/// Where an output lives: under a script's control or a wallet key's
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Address {
    Script(ScriptHash),
    PubKey(PubKeyHash),
}

impl Address {
    pub fn is_script(&self) -> bool {
        matches!(self, Address::Script(_))
    }

    pub fn script_hash(&self) -> Option<&ScriptHash> {
        match self {
            Address::Script(hash) => Some(hash),
            Address::PubKey(_) => None,
        }
    }

    pub fn pub_key_hash(&self) -> Option<&PubKeyHash> {
        match self {
            Address::PubKey(hash) => Some(hash),
            Address::Script(_) => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Script(hash) => write!(f, "script:{}", hash),
            Address::PubKey(hash) => write!(f, "addr:{}", hash),
        }
    }
}

/// Token quantities under one policy
pub type TokenMap = BTreeMap<TokenName, i64>;

/// Lovelace plus any number of native tokens.
///
/// Token quantities are signed so the same type can describe mint and burn
/// deltas; values held by outputs must be non-negative.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Value {
    pub lovelace: u64,
    pub assets: BTreeMap<PolicyId, TokenMap>,
}

impl Value {
    pub fn lovelace(amount: u64) -> Self {
        Self {
            lovelace: amount,
            assets: BTreeMap::new(),
        }
    }

    /// A value holding `quantity` of a single token
    pub fn token(policy: PolicyId, name: TokenName, quantity: i64) -> Self {
        let mut value = Value::default();
        value.add_token(policy, name, quantity);
        value
    }

    pub fn add_token(&mut self, policy: PolicyId, name: TokenName, quantity: i64) {
        let tokens = self.assets.entry(policy).or_default();
        let entry = tokens.entry(name).or_insert(0);
        *entry += quantity;
        if *entry == 0 {
            tokens.retain(|_, q| *q != 0);
        }
        if tokens.is_empty() {
            self.assets.remove(&policy);
        }
    }

    /// Add another value's lovelace and tokens into this one
    pub fn merge(&mut self, other: &Value) {
        self.lovelace = self.lovelace.saturating_add(other.lovelace);
        for (policy, tokens) in &other.assets {
            for (name, quantity) in tokens {
                self.add_token(*policy, name.clone(), *quantity);
            }
        }
    }

    pub fn quantity_of(&self, policy: &PolicyId, name: &TokenName) -> i64 {
        self.assets
            .get(policy)
            .and_then(|tokens| tokens.get(name))
            .copied()
            .unwrap_or(0)
    }

    /// Tokens held under one policy
    pub fn tokens_of(&self, policy: &PolicyId) -> impl Iterator<Item = (&TokenName, &i64)> {
        self.assets.get(policy).into_iter().flat_map(|tokens| tokens.iter())
    }

    /// Whether this value carries anything other than lovelace
    pub fn has_tokens(&self) -> bool {
        self.assets.values().any(|tokens| tokens.values().any(|q| *q != 0))
    }

    pub fn is_non_negative(&self) -> bool {
        self.assets.values().all(|tokens| tokens.values().all(|q| *q >= 0))
    }

    /// Compare only the token part of two values
    pub fn same_assets(&self, other: &Value) -> bool {
        self.assets == other.assets
    }

    pub fn with_lovelace(mut self, amount: u64) -> Self {
        self.lovelace = amount;
        self
    }
}

/// Structured data attached to an output, stored as encoded bytes
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datum(Vec<u8>);

impl Datum {
    pub fn encode<T: Serialize>(data: &T) -> Result<Self, CapoError> {
        Ok(Datum(serde_json::to_vec(data)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CapoError> {
        Ok(serde_json::from_slice(&self.0)?)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) => write!(f, "Datum({})", text),
            Err(_) => write!(f, "Datum(0x{})", hex::encode(&self.0)),
        }
    }
}

/// What a script is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptPurpose {
    /// Controls creation and destruction of tokens under its hash
    Minting,
    /// Controls spending of outputs at its address
    Spending,
}

/// An opaque on-chain program.
///
/// Compilation happens elsewhere; here a script is identified by its program
/// name and the encoded parameters it was specialised with, which makes its
/// hash and address deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub purpose: ScriptPurpose,
    pub program: String,
    pub bytes: Vec<u8>,
}

impl Script {
    /// Specialise `program` with `params`
    pub fn parameterized<P: Serialize>(
        program: &str,
        purpose: ScriptPurpose,
        params: &P,
    ) -> Result<Self, CapoError> {
        let mut bytes = program.as_bytes().to_vec();
        bytes.push(0);
        bytes.extend(bincode::serialize(params)?);
        Ok(Self {
            purpose,
            program: program.to_string(),
            bytes,
        })
    }

    pub fn hash(&self) -> ScriptHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(match self.purpose {
            ScriptPurpose::Minting => b"mint",
            ScriptPurpose::Spending => b"spnd",
        });
        hasher.update(&self.bytes);
        ScriptHash::new(*hasher.finalize().as_bytes())
    }

    /// The address of outputs guarded by this script
    pub fn address(&self) -> Address {
        Address::Script(self.hash())
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// An output of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub value: Value,
    pub datum: Option<Datum>,
    pub ref_script: Option<Script>,
}

impl TxOutput {
    pub fn new(address: Address, value: Value) -> Self {
        Self {
            address,
            value,
            datum: None,
            ref_script: None,
        }
    }

    pub fn with_datum(mut self, datum: Datum) -> Self {
        self.datum = Some(datum);
        self
    }

    pub fn with_ref_script(mut self, script: Script) -> Self {
        self.ref_script = Some(script);
        self
    }

    /// Smallest lovelace amount this output must hold to be accepted by the ledger
    pub fn min_deposit(&self, coins_per_utxo_byte: u64) -> u64 {
        let size = bincode::serialized_size(self).unwrap_or(0);
        (OUTPUT_OVERHEAD_BYTES + size) * coins_per_utxo_byte
    }

    /// Raise the lovelace amount to the minimum deposit when it falls short
    pub fn with_min_deposit(mut self, coins_per_utxo_byte: u64) -> Self {
        // The deposit is part of the output, so its own size may move the minimum
        for _ in 0..2 {
            let needed = self.min_deposit(coins_per_utxo_byte);
            if self.value.lovelace >= needed {
                break;
            }
            self.value.lovelace = needed;
        }
        self
    }

    pub fn has_token(&self, policy: &PolicyId, name: &TokenName) -> bool {
        self.value.quantity_of(policy, name) > 0
    }

    pub fn decode_datum<T: DeserializeOwned>(&self) -> Result<T, CapoError> {
        self.datum
            .as_ref()
            .ok_or_else(|| CapoError::NotFound(format!("datum on output at {}", self.address)))?
            .decode()
    }
}

/// An unspent output together with its ledger reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub id: TxOutputId,
    pub output: TxOutput,
}

impl Utxo {
    pub fn new(id: TxOutputId, output: TxOutput) -> Self {
        Self { id, output }
    }

    pub fn address(&self) -> &Address {
        &self.output.address
    }

    pub fn value(&self) -> &Value {
        &self.output.value
    }

    pub fn has_token(&self, policy: &PolicyId, name: &TokenName) -> bool {
        self.output.has_token(policy, name)
    }
}

/// A redeemer: tells the verifier *why* an input is spent or a policy is minting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub label: String,
    pub payload: Vec<u8>,
}

impl Activity {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: Vec::new(),
        }
    }

    /// An activity whose details are encoded from `data`
    pub fn with_payload<T: Serialize>(label: impl Into<String>, data: &T) -> Result<Self, CapoError> {
        Ok(Self {
            label: label.into(),
            payload: serde_json::to_vec(data)?,
        })
    }

    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, CapoError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    pub fn is_empty(&self) -> bool {
        self.label.trim().is_empty()
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
