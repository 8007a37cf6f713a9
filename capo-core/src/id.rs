use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use crate::error::CapoError;
use crate::objects::{TxId, TxOutputId, Utxo};

/// Longest asset name the ledger accepts, in bytes
pub const MAX_TOKEN_NAME_LEN: usize = 32;

/// Number of hash bytes kept for the shared unique suffix (12 hex chars)
pub const UUT_SUFFIX_BYTES: usize = 6;

/// Separates the source transaction id from the output index when hashing a seed
const SEED_SEPARATOR: u8 = b'@';

// TokenName is an asset name on the ledger. It can only be constructed
// through `TokenName::new`, which enforces the length bound.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenName(String);

impl TokenName {
    pub fn new(name: impl Into<String>) -> Result<Self, CapoError> {
        let name = name.into();
        if name.len() > MAX_TOKEN_NAME_LEN {
            return Err(CapoError::NameTooLong {
                len: name.len(),
                name,
                max: MAX_TOKEN_NAME_LEN,
            });
        }
        Ok(TokenName(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The purpose prefix of a `purpose-suffix` name, if it has one
    pub fn purpose(&self) -> Option<&str> {
        self.0.rsplit_once('-').map(|(purpose, _)| purpose)
    }
}

impl TryFrom<String> for TokenName {
    type Error = CapoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TokenName::new(value)
    }
}

impl From<TokenName> for String {
    fn from(name: TokenName) -> Self {
        name.0
    }
}

impl Deref for TokenName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for TokenName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A ledger input consumed exactly once, used purely as a uniqueness source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeedReference {
    pub source_id: TxId,
    pub index: u32,
}

impl SeedReference {
    pub fn new(source_id: TxId, index: u32) -> Self {
        Self { source_id, index }
    }

    /// The seed formed by a spendable utxo
    pub fn from_utxo(utxo: &Utxo) -> Self {
        Self::from(utxo.id)
    }

    /// The ledger reference this seed consumes
    pub fn output_id(&self) -> TxOutputId {
        TxOutputId::new(self.source_id, self.index)
    }

    /// Hex suffix shared by every unique token derived from this seed
    pub fn uut_suffix(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_id.bytes());
        hasher.update([SEED_SEPARATOR]);
        hasher.update(self.index.to_string().as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..UUT_SUFFIX_BYTES])
    }
}

impl From<TxOutputId> for SeedReference {
    fn from(id: TxOutputId) -> Self {
        Self::new(id.tx_id, id.index)
    }
}

impl fmt::Display for SeedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source_id, self.index)
    }
}

/// A unique utility token name: `{purpose}-{suffix}`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawUniqueTokenName")]
pub struct UniqueTokenName {
    purpose: String,
    name: TokenName,
}

#[derive(Deserialize)]
struct RawUniqueTokenName {
    purpose: String,
    name: TokenName,
}

impl TryFrom<RawUniqueTokenName> for UniqueTokenName {
    type Error = CapoError;

    fn try_from(raw: RawUniqueTokenName) -> Result<Self, Self::Error> {
        let suffix = raw
            .name
            .as_str()
            .strip_prefix(raw.purpose.as_str())
            .and_then(|rest| rest.strip_prefix('-'));
        match suffix {
            Some(suffix) if !suffix.is_empty() => Ok(Self {
                purpose: raw.purpose,
                name: raw.name,
            }),
            _ => Err(CapoError::Serialization(format!(
                "token name '{}' is not of the form '{}-<suffix>'",
                raw.name, raw.purpose
            ))),
        }
    }
}

impl UniqueTokenName {
    /// Derive the name for one purpose from a seed
    pub fn derive(purpose: &str, seed: &SeedReference) -> Result<Self, CapoError> {
        let name = TokenName::new(format!("{}-{}", purpose, seed.uut_suffix()))?;
        Ok(Self {
            purpose: purpose.to_string(),
            name,
        })
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    pub fn name(&self) -> &TokenName {
        &self.name
    }

    /// The derived suffix shared by the seed's whole minting group
    pub fn suffix(&self) -> &str {
        self.name
            .as_str()
            .get(self.purpose.len() + 1..)
            .unwrap_or_default()
    }
}

impl fmt::Display for UniqueTokenName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

/// Derives unique token names from a seed
pub struct UutGenerator;

impl UutGenerator {
    /// Generate one unique token name per purpose.
    ///
    /// All names produced from one seed share the same suffix, so an observer
    /// can tell they came from a single minting event.
    pub fn generate<S: AsRef<str>>(
        purposes: &[S],
        seed: &SeedReference,
    ) -> Result<BTreeMap<String, UniqueTokenName>, CapoError> {
        let mut names = BTreeMap::new();
        for purpose in purposes {
            let purpose = purpose.as_ref();
            names.insert(purpose.to_string(), UniqueTokenName::derive(purpose, seed)?);
        }
        Ok(names)
    }

    /// Like `generate`, additionally addressing each name by every role that uses its purpose
    ///
    /// # Parameters
    /// * `aliases` - role name to purpose; roles whose purpose isn't among `purposes` are ignored
    pub fn generate_with_aliases<S: AsRef<str>>(
        purposes: &[S],
        seed: &SeedReference,
        aliases: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, UniqueTokenName>, CapoError> {
        let mut names = Self::generate(purposes, seed)?;
        for (role, purpose) in aliases {
            if let Some(uut) = names.get(purpose).cloned() {
                names.insert(role.clone(), uut);
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub fn seed(byte: u8, index: u32) -> SeedReference {
        SeedReference::new(TxId::new([byte; 32]), index)
    }

    #[test]
    fn test_token_name_bound() {
        assert!(TokenName::new("a".repeat(MAX_TOKEN_NAME_LEN)).is_ok());
        let err = TokenName::new("a".repeat(MAX_TOKEN_NAME_LEN + 1)).unwrap_err();
        assert!(matches!(err, CapoError::NameTooLong { len: 33, max: 32, .. }));
    }

    #[test]
    fn test_token_name_rejected_on_deserialize() {
        let json = format!("\"{}\"", "x".repeat(40));
        assert!(serde_json::from_str::<TokenName>(&json).is_err());
        let ok: TokenName = serde_json::from_str("\"charter\"").unwrap();
        assert_eq!(ok.as_str(), "charter");
    }

    #[test]
    fn test_unique_name_checked_on_deserialize() {
        let uut = UniqueTokenName::derive("mintDgt", &seed(0xab, 0)).unwrap();
        let json = serde_json::to_string(&uut).unwrap();
        let back: UniqueTokenName = serde_json::from_str(&json).unwrap();
        assert_eq!(back.suffix(), uut.suffix());

        for bad in [
            r#"{"purpose":"mintDgt","name":"spendDgt-0123456789ab"}"#,
            r#"{"purpose":"mintDgt","name":"mintDgt"}"#,
            r#"{"purpose":"mintDgt","name":"mintDgt-"}"#,
            r#"{"purpose":"averyveryverylongpurposename","name":"x"}"#,
        ] {
            assert!(serde_json::from_str::<UniqueTokenName>(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_generate_is_deterministic() {
        let s = seed(0xab, 0);
        let first = UutGenerator::generate(&["capoGov"], &s).unwrap();
        let second = UutGenerator::generate(&["capoGov"], &s).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_seeds_give_distinct_names() {
        let a = UutGenerator::generate(&["mintDgt"], &seed(0xab, 0)).unwrap();
        let b = UutGenerator::generate(&["mintDgt"], &seed(0xab, 1)).unwrap();
        let c = UutGenerator::generate(&["mintDgt"], &seed(0xac, 0)).unwrap();
        assert_ne!(a["mintDgt"].name(), b["mintDgt"].name());
        assert_ne!(a["mintDgt"].name(), c["mintDgt"].name());
    }

    #[test]
    fn test_purposes_share_suffix() {
        let names = UutGenerator::generate(&["capoGov", "mintDgt"], &seed(0xab, 0)).unwrap();
        let gov = &names["capoGov"];
        let mint = &names["mintDgt"];

        assert!(gov.name().starts_with("capoGov-"));
        assert!(mint.name().starts_with("mintDgt-"));
        assert_eq!(gov.suffix(), mint.suffix());
        assert_eq!(gov.suffix().len(), UUT_SUFFIX_BYTES * 2);
        assert!(gov.suffix().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(gov.name().len() <= MAX_TOKEN_NAME_LEN);
        assert!(mint.name().len() <= MAX_TOKEN_NAME_LEN);
    }

    #[test]
    fn test_purpose_too_long() {
        let purpose = "averyveryverylongpurposename";
        let err = UutGenerator::generate(&[purpose], &seed(1, 0)).unwrap_err();
        assert!(matches!(err, CapoError::NameTooLong { .. }));
    }

    #[test]
    fn test_aliases_address_same_name() {
        let mut aliases = BTreeMap::new();
        aliases.insert("mintDelegate".to_string(), "mintDgt".to_string());
        aliases.insert("unrelated".to_string(), "nope".to_string());

        let names =
            UutGenerator::generate_with_aliases(&["mintDgt"], &seed(7, 3), &aliases).unwrap();
        assert_eq!(names["mintDelegate"], names["mintDgt"]);
        assert!(!names.contains_key("unrelated"));
    }

    #[test]
    fn test_token_name_purpose() {
        let uut = UniqueTokenName::derive("spendDgt", &seed(9, 9)).unwrap();
        assert_eq!(uut.name().purpose(), Some("spendDgt"));
        assert_eq!(TokenName::new("charter").unwrap().purpose(), None);
    }
}
