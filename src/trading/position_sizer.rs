//! Volatility-scaled position sizing with ATR-based stop and target placement.

use thiserror::Error;

use crate::models::Side;

use super::TradingConfig;

/// Inputs the sizer refuses to work with. The caller skips the trade.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SizingError {
    #[error("equity must be positive, got {0}")]
    NonPositiveEquity(f64),
    #[error("ATR must be positive, got {0}")]
    NonPositiveAtr(f64),
    #[error("price must be positive, got {0}")]
    NonPositivePrice(f64),
    #[error("risk fraction must be positive, got {0}")]
    NonPositiveRisk(f64),
}

/// Order quantity with its protective levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionPlan {
    pub side: Side,
    pub entry_price: f64,
    /// Units to trade
    pub quantity: f64,
    pub stop_distance: f64,
    pub target_distance: f64,
    pub stop_price: f64,
    pub target_price: f64,
    /// Account currency put at risk after the volatility multiplier
    pub risk_amount: f64,
}

/// Calculator for position sizes.
pub struct PositionSizer {
    config: TradingConfig,
}

impl PositionSizer {
    pub fn new(config: TradingConfig) -> Self {
        Self { config }
    }

    /// Size a trade.
    ///
    /// risk amount = equity × risk_fraction × clamp(baseline_atr / atr);
    /// quantity = risk amount / (atr × stop multiplier), floored to whole
    /// units and clipped to the unit bounds and the leverage cap.
    pub fn size(
        &self,
        side: Side,
        equity: f64,
        risk_fraction: f64,
        atr: f64,
        price: f64,
    ) -> Result<PositionPlan, SizingError> {
        // `!(x > 0.0)` also rejects NaN
        if !(equity > 0.0) || !equity.is_finite() {
            return Err(SizingError::NonPositiveEquity(equity));
        }
        if !(atr > 0.0) || !atr.is_finite() {
            return Err(SizingError::NonPositiveAtr(atr));
        }
        if !(price > 0.0) || !price.is_finite() {
            return Err(SizingError::NonPositivePrice(price));
        }
        if !(risk_fraction > 0.0) || !risk_fraction.is_finite() {
            return Err(SizingError::NonPositiveRisk(risk_fraction));
        }

        let risk_amount = equity * risk_fraction * self.volatility_multiplier(atr);
        let (stop_distance, target_distance) = self.distances(atr);

        let raw_units = (risk_amount / stop_distance).floor();
        let leverage_cap = (equity * self.config.max_leverage / price).floor();
        let quantity = raw_units
            .min(leverage_cap)
            .min(self.config.max_units)
            .max(self.config.min_units);

        let (stop_price, target_price) = match side {
            Side::Buy => (price - stop_distance, price + target_distance),
            Side::Sell => (price + stop_distance, price - target_distance),
        };

        Ok(PositionPlan {
            side,
            entry_price: price,
            quantity,
            stop_distance,
            target_distance,
            stop_price,
            target_price,
            risk_amount,
        })
    }

    /// Stop-loss and take-profit distances in price units.
    pub fn distances(&self, atr: f64) -> (f64, f64) {
        let stop = atr * self.config.stop_loss_multiplier;
        (stop, stop * self.config.reward_factor)
    }

    /// Scale risk up in quiet markets and down in volatile ones.
    fn volatility_multiplier(&self, atr: f64) -> f64 {
        (self.config.baseline_atr / atr)
            .clamp(self.config.min_risk_multiplier, self.config.max_risk_multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizer() -> PositionSizer {
        PositionSizer::new(TradingConfig::default())
    }

    #[test]
    fn test_buy_stop_and_target() {
        let plan = sizer().size(Side::Buy, 10_000.0, 0.01, 0.0010, 1.1000).unwrap();
        assert!((plan.stop_distance - 0.0015).abs() < 1e-12);
        assert!((plan.target_distance - 0.0030).abs() < 1e-12);
        assert!((plan.stop_price - 1.0985).abs() < 1e-12);
        assert!((plan.target_price - 1.1030).abs() < 1e-12);
    }

    #[test]
    fn test_sell_levels_are_mirrored() {
        let plan = sizer().size(Side::Sell, 10_000.0, 0.01, 0.0010, 1.1000).unwrap();
        assert!((plan.stop_price - 1.1015).abs() < 1e-12);
        assert!((plan.target_price - 1.0970).abs() < 1e-12);
    }

    #[test]
    fn test_quantity_at_baseline_volatility() {
        // risk 100, per-unit risk 0.0015 => 66_666 units
        let plan = sizer().size(Side::Buy, 10_000.0, 0.01, 0.0010, 1.1000).unwrap();
        assert_eq!(plan.quantity, 66_666.0);
        assert!((plan.risk_amount - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        let s = sizer();
        assert_eq!(
            s.size(Side::Buy, 0.0, 0.01, 0.001, 1.1),
            Err(SizingError::NonPositiveEquity(0.0))
        );
        assert_eq!(
            s.size(Side::Buy, 1000.0, 0.01, -0.001, 1.1),
            Err(SizingError::NonPositiveAtr(-0.001))
        );
        assert_eq!(
            s.size(Side::Buy, 1000.0, 0.01, 0.001, 0.0),
            Err(SizingError::NonPositivePrice(0.0))
        );
        assert!(s.size(Side::Buy, 1000.0, 0.01, f64::NAN, 1.1).is_err());
        assert!(s.size(Side::Buy, 1000.0, 0.0, 0.001, 1.1).is_err());
    }

    #[test]
    fn test_monotonic_in_inputs() {
        let s = sizer();
        let qty = |equity: f64, risk: f64, atr: f64| {
            s.size(Side::Buy, equity, risk, atr, 1.1).unwrap().quantity
        };

        let equities = [500.0, 1_000.0, 5_000.0, 10_000.0, 50_000.0];
        for w in equities.windows(2) {
            assert!(qty(w[0], 0.01, 0.001) <= qty(w[1], 0.01, 0.001));
        }

        let risks = [0.001, 0.005, 0.01, 0.02, 0.05];
        for w in risks.windows(2) {
            assert!(qty(10_000.0, w[0], 0.001) <= qty(10_000.0, w[1], 0.001));
        }

        let atrs = [0.0002, 0.0005, 0.001, 0.002, 0.005];
        for w in atrs.windows(2) {
            assert!(qty(10_000.0, 0.01, w[0]) >= qty(10_000.0, 0.01, w[1]));
        }
    }

    #[test]
    fn test_clipped_to_unit_bounds() {
        let config = TradingConfig {
            max_units: 1_000.0,
            ..Default::default()
        };
        let plan = PositionSizer::new(config).size(Side::Buy, 10_000.0, 0.01, 0.001, 1.1).unwrap();
        assert_eq!(plan.quantity, 1_000.0);

        let tiny = sizer().size(Side::Buy, 0.01, 0.01, 0.001, 1.1).unwrap();
        assert_eq!(tiny.quantity, 1.0);
    }

    #[test]
    fn test_leverage_cap() {
        // very low ATR hits the 20x notional cap: 1000 * 20 / 1.25 = 16_000
        let plan = sizer().size(Side::Buy, 1_000.0, 0.05, 0.00001, 1.25).unwrap();
        assert_eq!(plan.quantity, 16_000.0);
    }
}
