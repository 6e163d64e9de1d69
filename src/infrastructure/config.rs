//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. FARE_ENGINE_CONFIG environment variable
//! 3. Built-in defaults

use crate::error::{FareError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "FARE_ENGINE_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Upper bound of any card balance.
    pub max_balance: Decimal,
    /// Floor a card must hold to pass an entry gate.
    pub min_entry_balance: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_balance: dec!(10000),
            min_entry_balance: dec!(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RechargeConfig {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
}

impl Default for RechargeConfig {
    fn default() -> Self {
        Self {
            min_amount: dec!(10),
            max_amount: dec!(10000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    pub max_validity_hours: u32,
    /// Used by callers that do not pick a validity themselves.
    pub default_validity_hours: u32,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            max_validity_hours: 72,
            default_validity_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// RocksDB directory. In-memory storage when unset.
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub recharge: RechargeConfig,
    pub booking: BookingConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            FareError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolves the config source in precedence order: explicit path, then
    /// the environment variable, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.is_empty() => Self::from_file(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ledger = &self.ledger;
        if ledger.max_balance <= Decimal::ZERO {
            return Err(FareError::ConfigError(
                "ledger.max_balance must be positive".to_string(),
            ));
        }
        if ledger.min_entry_balance < Decimal::ZERO || ledger.min_entry_balance > ledger.max_balance {
            return Err(FareError::ConfigError(
                "ledger.min_entry_balance must lie within [0, max_balance]".to_string(),
            ));
        }
        let recharge = &self.recharge;
        if recharge.min_amount <= Decimal::ZERO || recharge.min_amount > recharge.max_amount {
            return Err(FareError::ConfigError(
                "recharge.min_amount must be positive and not above recharge.max_amount".to_string(),
            ));
        }
        let booking = &self.booking;
        if booking.max_validity_hours == 0
            || booking.default_validity_hours == 0
            || booking.default_validity_hours > booking.max_validity_hours
        {
            return Err(FareError::ConfigError(
                "booking validity hours must satisfy 0 < default <= max".to_string(),
            ));
        }
        Ok(())
    }
}
