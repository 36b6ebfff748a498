//! Per-UTC-day counters and the daily drawdown gate.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::models::ClosedTrade;

use super::TradingConfig;

/// Why new trades are refused for the rest of the iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TradeBlock {
    DailyTradeCap { count: u32 },
    ConsecutiveLosses { count: u32 },
}

#[derive(Debug, Clone, Serialize)]
pub struct DayState {
    pub date: Option<NaiveDate>,
    pub trades_today: u32,
    pub consecutive_losses: u32,
    pub start_equity: f64,
}

impl DayState {
    pub fn new() -> Self {
        Self {
            date: None,
            trades_today: 0,
            consecutive_losses: 0,
            start_equity: 0.0,
        }
    }

    /// Reset counters and snapshot equity on a new UTC date.
    /// Returns true when a reset happened.
    pub fn roll(&mut self, today: NaiveDate, equity: f64) -> bool {
        if self.date == Some(today) {
            return false;
        }
        self.date = Some(today);
        self.trades_today = 0;
        self.consecutive_losses = 0;
        self.start_equity = equity;
        info!(date = %today, equity = equity, "New trading day");
        true
    }

    /// Whether `roll` must be called before using the counters.
    pub fn needs_roll(&self, today: NaiveDate) -> bool {
        self.date != Some(today)
    }

    /// Equity change since the start of the day, in percent.
    pub fn drawdown_pct(&self, equity: f64) -> f64 {
        if self.start_equity <= 0.0 {
            return 0.0;
        }
        (equity - self.start_equity) / self.start_equity * 100.0
    }

    /// Daily drawdown gate: true when new trades must not be opened.
    pub fn drawdown_exceeded(&self, equity: f64, limit_pct: f64) -> bool {
        self.drawdown_pct(equity) <= -limit_pct
    }

    /// Per-day caps that block a new trade.
    pub fn check_caps(&self, config: &TradingConfig) -> Option<TradeBlock> {
        if self.trades_today >= config.max_trades_per_day {
            return Some(TradeBlock::DailyTradeCap {
                count: self.trades_today,
            });
        }
        if self.consecutive_losses >= config.max_consecutive_losses {
            return Some(TradeBlock::ConsecutiveLosses {
                count: self.consecutive_losses,
            });
        }
        None
    }

    pub fn record_open(&mut self) {
        self.trades_today += 1;
    }

    /// A losing closure extends the streak, anything else ends it.
    pub fn record_close(&mut self, closed: &ClosedTrade) {
        if closed.is_loss() {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
    }
}

impl Default for DayState {
    fn default() -> Self {
        Self::new()
    }
}
