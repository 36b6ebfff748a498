//! Narrow broker capability used by the controller and position manager.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Granularity, Series, Side, TradeId};

/// A market order with protective levels attached on fill.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub instrument: String,
    pub side: Side,
    /// Units, always positive
    pub quantity: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Latest `count` complete candles, oldest first.
    async fn fetch_bars(&self, instrument: &str, granularity: Granularity, count: usize) -> Result<Series>;

    /// Account equity (net asset value).
    async fn get_balance(&self) -> Result<f64>;

    /// Submit a market order. `Ok(None)` means the broker rejected it.
    async fn place_order(&self, order: &OrderRequest) -> Result<Option<TradeId>>;

    /// Close trades; returns the ids that could not be closed.
    async fn close_trades(&self, ids: &[TradeId]) -> Vec<TradeId>;

    /// Trades the broker currently reports as open.
    async fn open_trade_ids(&self) -> Result<Vec<TradeId>>;
}
