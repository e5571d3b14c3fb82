// In crates/app-config/src/types.rs

use crate::{Error, Result};
use core_types::StrategyConfig;
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    pub account: AccountSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    pub strategy: StrategySettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    pub log_level: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AccountSettings {
    /// Starting balance of the virtual account (quote currency).
    pub initial_balance: f64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct EngineSettings {
    #[serde(default = "default_revaluation_period_ms")]
    pub revaluation_period_ms: u64,
    /// Capacity of the book owner's command queue.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            revaluation_period_ms: default_revaluation_period_ms(),
            command_buffer: default_command_buffer(),
            max_redeliveries: default_max_redeliveries(),
        }
    }
}

/// The named strategy tiers and the one in use.
#[derive(Deserialize, Debug, Clone)]
pub struct StrategySettings {
    pub active_tier: String,
    pub tiers: HashMap<String, StrategyConfig>,
}

/// Parameters of the bundled price and signal simulators.
#[derive(Deserialize, Debug, Clone)]
pub struct SimulationSettings {
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_signal_interval_ms")]
    pub signal_interval_ms: u64,
    /// Standard step of the random walk, in basis points.
    #[serde(default = "default_volatility_bps")]
    pub volatility_bps: f64,
    /// Chance that a poll of the signal source yields a signal.
    #[serde(default = "default_signal_probability")]
    pub signal_probability: f64,
    #[serde(default)]
    pub symbols: Vec<SymbolSeed>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            signal_interval_ms: default_signal_interval_ms(),
            volatility_bps: default_volatility_bps(),
            signal_probability: default_signal_probability(),
            symbols: Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct SymbolSeed {
    pub symbol: String,
    pub start_price: f64,
}

/// Helper functions for serde defaults
fn default_revaluation_period_ms() -> u64 { 3_000 }
fn default_command_buffer() -> usize { 256 }
fn default_max_redeliveries() -> u32 { 3 }
fn default_signal_interval_ms() -> u64 { 5_000 }
fn default_volatility_bps() -> f64 { 25.0 }
fn default_signal_probability() -> f64 { 0.3 }

impl Settings {
    /// Resolves the active tier, stamped with its name and validated.
    pub fn active_strategy(&self) -> Result<StrategyConfig> {
        self.strategy_tier(&self.strategy.active_tier)
    }

    pub fn strategy_tier(&self, name: &str) -> Result<StrategyConfig> {
        let mut tier = self
            .strategy
            .tiers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTier(name.to_string()))?;
        tier.name = name.to_string();
        tier.validate()?;
        Ok(tier)
    }

    pub fn initial_balance(&self) -> Result<Decimal> {
        Decimal::from_f64(self.account.initial_balance)
            .filter(|b| *b > Decimal::ZERO)
            .ok_or_else(|| {
                Error::InvalidSetting(format!(
                    "account.initial_balance must be a positive number, got {}",
                    self.account.initial_balance
                ))
            })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.initial_balance()?;
        self.active_strategy()?;
        if self.engine.revaluation_period_ms == 0 {
            return Err(Error::InvalidSetting("engine.revaluation_period_ms must be positive".into()));
        }
        if self.engine.command_buffer == 0 {
            return Err(Error::InvalidSetting("engine.command_buffer must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.simulation.signal_probability) {
            return Err(Error::InvalidSetting(
                "simulation.signal_probability must be within 0..=1".into(),
            ));
        }
        for seed in &self.simulation.symbols {
            if !(seed.start_price > 0.0) {
                return Err(Error::InvalidSetting(format!(
                    "simulation start price for {} must be positive",
                    seed.symbol
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, settings_from_toml};
    use rust_decimal_macros::dec;

    const BASE: &str = r#"
        [app]
        environment = "test"
        log_level = "info"

        [account]
        initial_balance = 100000.0

        [strategy]
        active_tier = "balanced"

        [strategy.tiers.conservative]
        min_confidence = 95.0
        max_open_positions = 3
        risk_per_trade_percent = 1.0

        [strategy.tiers.balanced]
        min_confidence = 85.0
        max_open_positions = 5
        risk_per_trade_percent = 2.0
        directions_enabled = { long = true, short = false }

        [[simulation.symbols]]
        symbol = "BTCUSDT"
        start_price = 43000.0
    "#;

    #[test]
    fn test_parse_and_resolve_tier() {
        let settings = settings_from_toml(BASE).unwrap();
        let tier = settings.active_strategy().unwrap();

        assert_eq!(tier.name, "balanced");
        assert_eq!(tier.max_open_positions, 5);
        assert!(!tier.directions_enabled.short);
        assert!(!tier.protective_exits);
        assert_eq!(settings.initial_balance().unwrap(), dec!(100000));
        assert_eq!(settings.engine.revaluation_period_ms, 3_000);
        assert_eq!(settings.simulation.symbols[0].symbol, "BTCUSDT");

        let conservative = settings.strategy_tier("conservative").unwrap();
        assert!(conservative.directions_enabled.long && conservative.directions_enabled.short);
    }

    #[test]
    fn test_unknown_tier_is_rejected() {
        let document = BASE.replace(r#"active_tier = "balanced""#, r#"active_tier = "yolo""#);
        assert!(matches!(settings_from_toml(&document), Err(Error::UnknownTier(t)) if t == "yolo"));
    }

    #[test]
    fn test_out_of_range_tier_is_rejected() {
        let document = BASE.replace("risk_per_trade_percent = 2.0", "risk_per_trade_percent = 150.0");
        assert!(matches!(settings_from_toml(&document), Err(Error::InvalidStrategy(_))));
    }

    #[test]
    fn test_non_positive_balance_is_rejected() {
        let document = BASE.replace("initial_balance = 100000.0", "initial_balance = 0.0");
        assert!(matches!(settings_from_toml(&document), Err(Error::InvalidSetting(_))));
    }
}
