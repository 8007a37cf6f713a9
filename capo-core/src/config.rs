use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::CapoError;

/// Which ledger a session talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Preprod,
    Preview,
    /// Local in-memory ledger used by tests
    Emulator,
}

/// Conversion between wall-clock time and positions in ledger history (slots)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Unix time in milliseconds at which `zero_slot` began
    pub zero_time_ms: i64,
    pub zero_slot: u64,
    pub slot_length_ms: u64,
}

impl SlotConfig {
    /// The slot in progress at `time`
    pub fn slot_at(&self, time: DateTime<Utc>) -> Result<u64, CapoError> {
        let elapsed = time.timestamp_millis() - self.zero_time_ms;
        if elapsed < 0 {
            return Err(CapoError::Config(format!(
                "time {} precedes the network's slot zero",
                time
            )));
        }
        (elapsed as u64)
            .checked_div(self.slot_length_ms)
            .and_then(|slots| slots.checked_add(self.zero_slot))
            .ok_or_else(|| CapoError::Config(format!("time {} has no slot", time)))
    }

    /// When `slot` began
    pub fn time_at(&self, slot: u64) -> Result<DateTime<Utc>, CapoError> {
        let out_of_range = || CapoError::Config(format!("slot {} is out of range", slot));
        let offset = slot
            .saturating_sub(self.zero_slot)
            .checked_mul(self.slot_length_ms)
            .and_then(|ms| i64::try_from(ms).ok())
            .ok_or_else(out_of_range)?;
        let millis = self.zero_time_ms.checked_add(offset).ok_or_else(out_of_range)?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(out_of_range)
    }
}

/// Protocol parameters needed to assemble transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub network: Network,
    pub coins_per_utxo_byte: u64,
    /// Fee per transaction byte
    pub min_fee_a: u64,
    /// Fixed fee per transaction
    pub min_fee_b: u64,
    pub max_tx_size: usize,
    pub slot_config: SlotConfig,
}

impl NetworkParams {
    pub fn preview() -> Self {
        Self {
            network: Network::Preview,
            coins_per_utxo_byte: 4310,
            min_fee_a: 44,
            min_fee_b: 155_381,
            max_tx_size: 16_384,
            slot_config: SlotConfig {
                zero_time_ms: 1_666_656_000_000,
                zero_slot: 0,
                slot_length_ms: 1000,
            },
        }
    }

    /// Preview-like parameters for the in-memory ledger, with a generous size limit
    pub fn emulator() -> Self {
        Self {
            network: Network::Emulator,
            max_tx_size: 65_536,
            ..Self::preview()
        }
    }

    /// Load parameters from a JSON file and check them
    pub fn from_json_file(path: &Path) -> Result<Self, CapoError> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading network params from {}", path.display()))?;
        let params: NetworkParams = serde_json::from_str(&text)
            .with_context(|| format!("parsing network params in {}", path.display()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), CapoError> {
        if self.slot_config.slot_length_ms == 0 {
            return Err(CapoError::Config("slot length must be positive".to_string()));
        }
        if self.coins_per_utxo_byte == 0 {
            return Err(CapoError::Config(
                "coins_per_utxo_byte must be positive".to_string(),
            ));
        }
        if self.max_tx_size == 0 {
            return Err(CapoError::Config("max_tx_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Linear fee for a transaction of `size` bytes
    pub fn fee_for_size(&self, size: usize) -> u64 {
        self.min_fee_a * size as u64 + self.min_fee_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_slot_time_conversion() {
        let config = NetworkParams::preview().slot_config;
        let start = config.time_at(1_000).unwrap();
        assert_eq!(config.slot_at(start).unwrap(), 1_000);

        let later = start + chrono::Duration::milliseconds(2_500);
        assert_eq!(config.slot_at(later).unwrap(), 1_002);

        let before_zero = Utc.timestamp_millis_opt(0).single().unwrap();
        assert!(config.slot_at(before_zero).is_err());
    }

    #[test]
    fn test_far_slots_are_errors() {
        let config = NetworkParams::preview().slot_config;
        for slot in [u64::MAX, u64::MAX / 2] {
            assert!(matches!(config.time_at(slot).unwrap_err(), CapoError::Config(_)));
        }
        let stalled = SlotConfig {
            slot_length_ms: 0,
            ..config
        };
        assert!(stalled.slot_at(Utc::now()).is_err());
    }

    #[test]
    fn test_params_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&NetworkParams::emulator()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = NetworkParams::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, NetworkParams::emulator());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = NetworkParams::preview();
        params.slot_config.slot_length_ms = 0;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&params).unwrap().as_bytes())
            .unwrap();
        assert!(matches!(
            NetworkParams::from_json_file(file.path()),
            Err(CapoError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_carries_context() {
        let err = NetworkParams::from_json_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("reading network params"));
    }
}
