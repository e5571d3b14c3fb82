use crate::{Error, Result, Side};
use serde::{Deserialize, Serialize};

/// A named strategy tier (e.g. "conservative", "aggressive") as read from
/// the `[strategy.tiers.*]` tables.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    #[serde(default)]
    pub name: String,
    /// Signals scoring below this confidence are dropped at intake.
    pub min_confidence: f64,
    pub max_open_positions: usize,
    /// Share of the free balance committed as margin per trade, in percent.
    pub risk_per_trade_percent: f64,
    #[serde(default)]
    pub directions_enabled: DirectionsEnabled,
    // Close on stop-loss / final take-profit during revaluation.
    #[serde(default)]
    pub protective_exits: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct DirectionsEnabled {
    #[serde(default = "default_enabled")]
    pub long: bool,
    #[serde(default = "default_enabled")]
    pub short: bool,
}

impl Default for DirectionsEnabled {
    fn default() -> Self {
        Self { long: true, short: true }
    }
}

fn default_enabled() -> bool {
    true
}

impl StrategyConfig {
    pub fn allows(&self, side: Side) -> bool {
        match side {
            Side::Long => self.directions_enabled.long,
            Side::Short => self.directions_enabled.short,
        }
    }

    /// Checks the tier parameters against their documented ranges.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| Error::InvalidStrategy {
            tier: self.name.clone(),
            reason: reason.to_string(),
        };
        if !(0.0..=100.0).contains(&self.min_confidence) {
            return Err(fail("min_confidence must be within 0..=100"));
        }
        if self.max_open_positions == 0 {
            return Err(fail("max_open_positions must be greater than zero"));
        }
        if !(self.risk_per_trade_percent > 0.0 && self.risk_per_trade_percent <= 100.0) {
            return Err(fail("risk_per_trade_percent must be within (0, 100]"));
        }
        if !self.directions_enabled.long && !self.directions_enabled.short {
            return Err(fail("at least one direction must be enabled"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier() -> StrategyConfig {
        StrategyConfig {
            name: "balanced".into(),
            min_confidence: 85.0,
            max_open_positions: 5,
            risk_per_trade_percent: 2.0,
            directions_enabled: DirectionsEnabled::default(),
            protective_exits: false,
        }
    }

    #[test]
    fn test_validate_ranges() {
        assert!(tier().validate().is_ok());

        let mut bad = tier();
        bad.min_confidence = 120.0;
        assert!(bad.validate().is_err());

        let mut bad = tier();
        bad.max_open_positions = 0;
        assert!(bad.validate().is_err());

        let mut bad = tier();
        bad.risk_per_trade_percent = 150.0;
        assert!(matches!(bad.validate(), Err(Error::InvalidStrategy { tier, .. }) if tier == "balanced"));
    }

    #[test]
    fn test_direction_switches() {
        let mut cfg = tier();
        cfg.directions_enabled.short = false;
        assert!(cfg.allows(Side::Long));
        assert!(!cfg.allows(Side::Short));
    }
}
