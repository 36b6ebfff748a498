//! Open and closed trades held by the bot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Side;

/// Broker-assigned trade identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeId(pub String);

impl TradeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trailing-stop lifecycle of a single trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrailingState {
    /// Not enough favorable movement yet
    Inactive,
    /// Trailing level follows the favorable extreme
    Active,
    /// Level crossed; close requested and pending confirmation
    Closed,
}

/// A position opened by the bot and still held at the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTrade {
    /// Broker trade identifier
    pub id: TradeId,

    /// Instrument, e.g. "EUR_USD"
    pub instrument: String,

    pub side: Side,

    /// Price at which the signal was acted on
    pub entry_price: f64,

    /// Units traded (always positive; direction is `side`)
    pub quantity: f64,

    /// Stop-loss attached to the order at the broker
    pub stop_loss_price: f64,

    /// Take-profit attached to the order at the broker
    pub take_profit_price: f64,

    /// Best price seen since entry: max for BUY, min for SELL
    pub favorable_extreme: f64,

    pub trailing: TrailingState,

    /// Price that fired the trailing stop, kept for closes retried without a quote
    pub trigger_price: Option<f64>,

    pub opened_at: DateTime<Utc>,
}

impl OpenTrade {
    /// Create a trade right after the broker confirmed the order.
    pub fn new(
        id: TradeId,
        instrument: impl Into<String>,
        side: Side,
        entry_price: f64,
        quantity: f64,
        stop_loss_price: f64,
        take_profit_price: f64,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            instrument: instrument.into(),
            side,
            entry_price,
            quantity,
            stop_loss_price,
            take_profit_price,
            favorable_extreme: entry_price,
            trailing: TrailingState::Inactive,
            trigger_price: None,
            opened_at,
        }
    }

    /// Price movement in the trade's favor (negative when against it).
    pub fn favorable_move(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.side.sign()
    }

    /// Planned distance from entry to the take-profit target.
    pub fn target_distance(&self) -> f64 {
        (self.take_profit_price - self.entry_price).abs()
    }

    /// Unrealized P&L in account currency at `price`.
    pub fn unrealized_pnl(&self, price: f64, pip_value: f64) -> f64 {
        self.favorable_move(price) * self.quantity * pip_value
    }

    /// Move the favorable extreme; it never retreats.
    pub fn observe_extreme(&mut self, price: f64) {
        self.favorable_extreme = match self.side {
            Side::Buy => self.favorable_extreme.max(price),
            Side::Sell => self.favorable_extreme.min(price),
        };
    }
}

/// Why a trade left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    TrailingStop,
    KillSwitch,
    /// Closed at the broker (stop-loss, take-profit, manual)
    External,
}

/// A trade removed from the book after a confirmed closure.
#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub trade: OpenTrade,
    pub reason: CloseReason,
    /// Latest quote at closure, else the trailing-stop trigger price
    pub exit_price: Option<f64>,
    /// P&L at `exit_price`; zero when unknown
    pub pnl: f64,
}

impl ClosedTrade {
    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trade(side: Side) -> OpenTrade {
        OpenTrade::new(
            TradeId::new("42"),
            "EUR_USD",
            side,
            1.1000,
            10_000.0,
            1.0985,
            1.1030,
            Utc::now(),
        )
    }

    #[test]
    fn test_pnl_sign_follows_side() {
        let long = trade(Side::Buy);
        assert!(long.unrealized_pnl(1.1010, 1.0) > 0.0);
        assert!(long.unrealized_pnl(1.0990, 1.0) < 0.0);

        let short = trade(Side::Sell);
        assert!(short.unrealized_pnl(1.0990, 1.0) > 0.0);
        assert!((short.unrealized_pnl(1.1010, 1.0) + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_extreme_never_retreats() {
        let mut long = trade(Side::Buy);
        long.observe_extreme(1.1020);
        long.observe_extreme(1.1005);
        assert_eq!(long.favorable_extreme, 1.1020);

        let mut short = trade(Side::Sell);
        short.observe_extreme(1.0980);
        short.observe_extreme(1.0995);
        assert_eq!(short.favorable_extreme, 1.0980);
    }
}
