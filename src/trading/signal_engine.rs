//! Signal generation and multi-timeframe confirmation.
//!
//! The base timeframe produces a BUY/SELL/FLAT signal from its latest fully
//! warmed-up indicator row. Two higher timeframes are classified into a trend
//! independently, and a signal only stands when both agree with it.

use serde::Serialize;
use tracing::debug;

use crate::indicators::{sma, IndicatorRow};
use crate::models::{Series, Signal, Trend};

use super::{SignalRules, TrendRules};

/// Outcome of one confirmation round for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    pub signal: Signal,
    pub medium_trend: Trend,
    pub fast_trend: Trend,
    pub confirmed: Signal,
}

/// Signal engine.
pub struct SignalEngine {
    rules: SignalRules,
    trend_rules: TrendRules,
}

impl SignalEngine {
    pub fn new(rules: SignalRules, trend_rules: TrendRules) -> Self {
        Self { rules, trend_rules }
    }

    /// Base-timeframe signal from one fully warmed-up indicator row.
    pub fn generate_signal(&self, row: &IndicatorRow) -> Signal {
        let rules = &self.rules;

        if row.adx < rules.min_adx {
            debug!(adx = row.adx, min = rules.min_adx, "Ranging market, no signal");
            return Signal::Flat;
        }

        let in_buy_band = (rules.buy_rsi_min..=rules.buy_rsi_max).contains(&row.rsi);
        let stretched_up = rules.respect_bollinger && row.close > row.bb_upper;
        let pattern_ok = !rules.require_bullish_pattern || row.pattern.is_bullish();

        if row.macd_histogram > 0.0 && in_buy_band && !stretched_up && pattern_ok {
            return Signal::Buy;
        }

        let in_sell_band = (rules.sell_rsi_min..=rules.sell_rsi_max).contains(&row.rsi);
        let stretched_down = rules.respect_bollinger && row.close < row.bb_lower;

        if row.macd_histogram < 0.0 && in_sell_band && !stretched_down {
            return Signal::Sell;
        }

        Signal::Flat
    }

    /// Direction of a higher-timeframe series from a fast/slow SMA comparison.
    ///
    /// Too little history is classified as flat.
    pub fn trend(&self, series: &Series) -> Trend {
        let rules = &self.trend_rules;
        let closes = series.closes();
        if closes.len() < rules.slow_period {
            return Trend::Flat;
        }

        let fast = sma(&closes, rules.fast_period);
        let slow = sma(&closes, rules.slow_period);
        let (Some(&fast), Some(&slow)) = (fast.last(), slow.last()) else {
            return Trend::Flat;
        };

        if fast > slow * (1.0 + rules.flat_tolerance) {
            Trend::Up
        } else if fast < slow * (1.0 - rules.flat_tolerance) {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    /// A BUY needs both trends up, a SELL both down; anything else is FLAT.
    pub fn confirm(signal: Signal, medium: Trend, fast: Trend) -> Signal {
        match (signal, medium, fast) {
            (Signal::Buy, Trend::Up, Trend::Up) => Signal::Buy,
            (Signal::Sell, Trend::Down, Trend::Down) => Signal::Sell,
            _ => Signal::Flat,
        }
    }

    /// Signal, both trends, and the confirmed result.
    pub fn decide(&self, row: &IndicatorRow, medium: &Series, fast: &Series) -> Decision {
        let signal = self.generate_signal(row);
        let medium_trend = self.trend(medium);
        let fast_trend = self.trend(fast);

        Decision {
            signal,
            medium_trend,
            fast_trend,
            confirmed: Self::confirm(signal, medium_trend, fast_trend),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::CandlePattern;
    use crate::models::{Bar, Granularity};
    use chrono::{Duration, TimeZone, Utc};

    fn engine() -> SignalEngine {
        SignalEngine::new(SignalRules::default(), TrendRules::default())
    }

    fn row(rsi: f64, histogram: f64, adx: f64) -> IndicatorRow {
        IndicatorRow {
            close: 1.1000,
            rsi,
            macd: histogram,
            macd_signal: 0.0,
            macd_histogram: histogram,
            atr: 0.0010,
            bb_upper: 1.1050,
            bb_mid: 1.1000,
            bb_lower: 1.0950,
            adx,
            pattern: CandlePattern::default(),
        }
    }

    fn trending(step: f64) -> Series {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap();
        let bars = (0..50)
            .map(|i| {
                let c = 1.1 + step * i as f64;
                Bar::new(start + Duration::minutes(15 * i), c, c + 0.0003, c - 0.0003, c)
            })
            .collect();
        Series::new("EUR_USD", Granularity::M15, bars)
    }

    #[test]
    fn test_buy_and_sell_rules() {
        let engine = engine();
        assert_eq!(engine.generate_signal(&row(60.0, 0.0002, 30.0)), Signal::Buy);
        assert_eq!(engine.generate_signal(&row(40.0, -0.0002, 30.0)), Signal::Sell);
        // histogram and RSI disagree
        assert_eq!(engine.generate_signal(&row(40.0, 0.0002, 30.0)), Signal::Flat);
    }

    #[test]
    fn test_low_adx_is_flat() {
        assert_eq!(engine().generate_signal(&row(60.0, 0.0002, 18.0)), Signal::Flat);
    }

    #[test]
    fn test_bollinger_guard() {
        let mut r = row(60.0, 0.0002, 30.0);
        r.close = 1.1060;
        assert_eq!(engine().generate_signal(&r), Signal::Flat);

        let relaxed = SignalEngine::new(
            SignalRules {
                respect_bollinger: false,
                ..Default::default()
            },
            TrendRules::default(),
        );
        assert_eq!(relaxed.generate_signal(&r), Signal::Buy);
    }

    #[test]
    fn test_pattern_requirement() {
        let strict = SignalEngine::new(
            SignalRules {
                require_bullish_pattern: true,
                ..Default::default()
            },
            TrendRules::default(),
        );
        let mut r = row(60.0, 0.0002, 30.0);
        assert_eq!(strict.generate_signal(&r), Signal::Flat);

        r.pattern.hammer = true;
        assert_eq!(strict.generate_signal(&r), Signal::Buy);
    }

    #[test]
    fn test_trend_direction() {
        let engine = engine();
        assert_eq!(engine.trend(&trending(0.0002)), Trend::Up);
        assert_eq!(engine.trend(&trending(-0.0002)), Trend::Down);
        assert_eq!(engine.trend(&Series::empty("EUR_USD", Granularity::M5)), Trend::Flat);

        let tolerant = SignalEngine::new(
            SignalRules::default(),
            TrendRules {
                flat_tolerance: 1e-6,
                ..Default::default()
            },
        );
        assert_eq!(tolerant.trend(&trending(0.0)), Trend::Flat);
        assert_eq!(tolerant.trend(&trending(0.0002)), Trend::Up);
    }

    #[test]
    fn test_confirmation_gate() {
        assert_eq!(SignalEngine::confirm(Signal::Buy, Trend::Up, Trend::Up), Signal::Buy);
        assert_eq!(SignalEngine::confirm(Signal::Buy, Trend::Up, Trend::Down), Signal::Flat);
        assert_eq!(SignalEngine::confirm(Signal::Sell, Trend::Down, Trend::Down), Signal::Sell);
        assert_eq!(SignalEngine::confirm(Signal::Sell, Trend::Down, Trend::Flat), Signal::Flat);
        assert_eq!(SignalEngine::confirm(Signal::Flat, Trend::Up, Trend::Up), Signal::Flat);
    }

    #[test]
    fn test_decide_blocks_disagreeing_trend() {
        let engine = engine();
        let decision = engine.decide(&row(60.0, 0.0002, 30.0), &trending(0.0002), &trending(-0.0002));
        assert_eq!(decision.signal, Signal::Buy);
        assert_eq!(decision.medium_trend, Trend::Up);
        assert_eq!(decision.fast_trend, Trend::Down);
        assert_eq!(decision.confirmed, Signal::Flat);
    }
}
