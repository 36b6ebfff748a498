//! Trading configuration: risk budget, sizing, trailing stops, signal rules.

use std::collections::HashMap;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Configuration for risk management and position sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Fraction of equity risked per trade (0.01 = 1%)
    pub risk_per_trade: f64,

    /// ATR considered "normal" volatility; lower ATR scales risk up
    pub baseline_atr: f64,

    /// Lower clamp of the volatility risk multiplier
    pub min_risk_multiplier: f64,

    /// Upper clamp of the volatility risk multiplier
    pub max_risk_multiplier: f64,

    /// Stop-loss distance in ATRs
    pub stop_loss_multiplier: f64,

    /// Take-profit distance as a multiple of the stop distance (reward:risk)
    pub reward_factor: f64,

    /// Smallest order the broker accepts, in units
    pub min_units: f64,

    /// Largest order the bot will send, in units
    pub max_units: f64,

    /// Notional cap as a multiple of equity
    pub max_leverage: f64,

    /// New trades allowed per UTC day
    pub max_trades_per_day: u32,

    /// Consecutive losing closures before new trades stop for the day
    pub max_consecutive_losses: u32,

    /// Daily drawdown (percent of start-of-day equity) that halts new trades
    /// and triggers the unrealized-loss kill-switch
    pub daily_drawdown_limit_pct: f64,

    /// Trailing distance behind the favorable extreme, in pips
    pub trailing_stop_pips: f64,

    /// Share of the target distance a BUY must gain before trailing starts
    pub buy_trailing_activation: f64,

    /// Share of the target distance a SELL must gain before trailing starts
    pub sell_trailing_activation: f64,

    /// Price-to-account-currency conversion for P&L
    pub pip_value: f64,

    /// Per-instrument overrides of `pip_value`
    pub pip_value_overrides: HashMap<String, f64>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.01,          // 1% per trade
            baseline_atr: 0.0010,
            min_risk_multiplier: 0.5,
            max_risk_multiplier: 1.5,
            stop_loss_multiplier: 1.5,
            reward_factor: 2.0,            // 2:1 reward to risk
            min_units: 1.0,
            max_units: 1_000_000.0,
            max_leverage: 20.0,
            max_trades_per_day: 5,
            max_consecutive_losses: 3,
            daily_drawdown_limit_pct: 7.5,
            trailing_stop_pips: 17.0,
            buy_trailing_activation: 0.35,
            sell_trailing_activation: 0.5,
            pip_value: 1.0,
            pip_value_overrides: HashMap::new(),
        }
    }
}

impl TradingConfig {
    /// P&L conversion constant for an instrument.
    pub fn pip_value_for(&self, instrument: &str) -> f64 {
        self.pip_value_overrides
            .get(instrument)
            .copied()
            .unwrap_or(self.pip_value)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.risk_per_trade > 0.0 && self.risk_per_trade < 1.0,
            "risk_per_trade must be in (0, 1), got {}",
            self.risk_per_trade
        );
        ensure!(self.baseline_atr > 0.0, "baseline_atr must be positive");
        ensure!(
            self.min_risk_multiplier > 0.0 && self.min_risk_multiplier <= self.max_risk_multiplier,
            "risk multiplier bounds are inverted or non-positive"
        );
        ensure!(self.stop_loss_multiplier > 0.0, "stop_loss_multiplier must be positive");
        ensure!(
            self.reward_factor >= 1.0,
            "reward_factor must be at least 1, got {}",
            self.reward_factor
        );
        ensure!(
            self.min_units >= 1.0 && self.min_units <= self.max_units,
            "unit bounds are inverted"
        );
        ensure!(self.max_leverage > 0.0, "max_leverage must be positive");
        ensure!(
            self.daily_drawdown_limit_pct > 0.0 && self.daily_drawdown_limit_pct <= 100.0,
            "daily_drawdown_limit_pct must be in (0, 100]"
        );
        ensure!(self.trailing_stop_pips > 0.0, "trailing_stop_pips must be positive");
        for (name, value) in [
            ("buy_trailing_activation", self.buy_trailing_activation),
            ("sell_trailing_activation", self.sell_trailing_activation),
        ] {
            ensure!(value >= 0.0, "{} must not be negative", name);
        }
        ensure!(self.pip_value > 0.0, "pip_value must be positive");
        Ok(())
    }
}

/// Thresholds turning an indicator row into a base-timeframe signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalRules {
    /// ADX below this is a ranging market: no signal
    pub min_adx: f64,

    pub buy_rsi_min: f64,
    pub buy_rsi_max: f64,
    pub sell_rsi_min: f64,
    pub sell_rsi_max: f64,

    /// Refuse buys above the upper band and sells below the lower band
    pub respect_bollinger: bool,

    /// Only buy when the signal bar is a bullish engulfing or hammer
    pub require_bullish_pattern: bool,
}

impl Default for SignalRules {
    fn default() -> Self {
        Self {
            min_adx: 25.0,
            buy_rsi_min: 50.0,
            buy_rsi_max: 70.0,
            sell_rsi_min: 30.0,
            sell_rsi_max: 50.0,
            respect_bollinger: true,
            require_bullish_pattern: false,
        }
    }
}

impl SignalRules {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.buy_rsi_min <= self.buy_rsi_max,
            "buy RSI band is inverted: {} > {}",
            self.buy_rsi_min,
            self.buy_rsi_max
        );
        ensure!(
            self.sell_rsi_min <= self.sell_rsi_max,
            "sell RSI band is inverted: {} > {}",
            self.sell_rsi_min,
            self.sell_rsi_max
        );
        Ok(())
    }
}

/// Moving-average crossover used to classify a higher timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendRules {
    pub fast_period: usize,
    pub slow_period: usize,
    /// Relative gap between the averages below which the trend is flat
    pub flat_tolerance: f64,
}

impl Default for TrendRules {
    fn default() -> Self {
        Self {
            fast_period: 10,
            slow_period: 30,
            flat_tolerance: 0.0,
        }
    }
}

impl TrendRules {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.fast_period >= 1 && self.fast_period < self.slow_period,
            "trend fast_period must be at least 1 and below slow_period"
        );
        ensure!(self.flat_tolerance >= 0.0, "flat_tolerance must not be negative");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        TradingConfig::default().validate().unwrap();
        SignalRules::default().validate().unwrap();
        TrendRules::default().validate().unwrap();
    }

    #[test]
    fn test_reward_factor_below_one_rejected() {
        let config = TradingConfig {
            reward_factor: 0.8,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pip_value_override() {
        let mut config = TradingConfig::default();
        config.pip_value_overrides.insert("USD_JPY".to_string(), 0.0067);
        assert_eq!(config.pip_value_for("USD_JPY"), 0.0067);
        assert_eq!(config.pip_value_for("EUR_USD"), 1.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TradingConfig = serde_json::from_str(r#"{"risk_per_trade": 0.02}"#).unwrap();
        assert_eq!(config.risk_per_trade, 0.02);
        assert_eq!(config.max_trades_per_day, 5);
    }
}
