//! Book of open trades: trailing stops, loss kill-switch, reconciliation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info, warn};

use crate::api::Broker;
use crate::models::{pip_size, ClosedTrade, CloseReason, OpenTrade, Side, TradeId, TrailingState};

use super::TradingConfig;

/// Latest known price per instrument.
pub type PriceMap = HashMap<String, f64>;

/// Advance one trade's trailing stop with a new price observation.
///
/// The favorable extreme moves first. An inactive stop arms once the move from
/// entry exceeds `activation` of the target distance; an armed stop fires when
/// price crosses `distance` behind the extreme. Closed is terminal.
pub fn advance_trailing(trade: &mut OpenTrade, price: f64, activation: f64, distance: f64) -> TrailingState {
    if trade.trailing == TrailingState::Closed {
        return TrailingState::Closed;
    }

    trade.observe_extreme(price);

    if trade.trailing == TrailingState::Inactive
        && trade.favorable_move(price) > activation * trade.target_distance()
    {
        trade.trailing = TrailingState::Active;
    }

    if trade.trailing == TrailingState::Active {
        let crossed = match trade.side {
            Side::Buy => price < trade.favorable_extreme - distance,
            Side::Sell => price > trade.favorable_extreme + distance,
        };
        if crossed {
            trade.trailing = TrailingState::Closed;
            trade.trigger_price = Some(price);
        }
    }

    trade.trailing
}

/// Whether an aggregate unrealized loss reaches the daily limit.
///
/// `total_loss` is the (non-positive) sum of losing trades' P&L. An unknown
/// start-of-day equity never trips the switch.
pub fn kill_switch_triggered(total_loss: f64, start_equity: f64, limit_pct: f64) -> bool {
    if start_equity <= 0.0 {
        return false;
    }
    total_loss.abs() >= start_equity * limit_pct / 100.0
}

/// Owner of every trade the bot opened and has not yet seen closed.
pub struct PositionManager {
    config: TradingConfig,
    trades: BTreeMap<TradeId, OpenTrade>,
}

impl PositionManager {
    pub fn new(config: TradingConfig) -> Self {
        Self {
            config,
            trades: BTreeMap::new(),
        }
    }

    pub fn open(&mut self, trade: OpenTrade) {
        info!(
            id = %trade.id,
            instrument = %trade.instrument,
            side = %trade.side,
            quantity = trade.quantity,
            entry = trade.entry_price,
            "Tracking new trade"
        );
        self.trades.insert(trade.id.clone(), trade);
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpenTrade> {
        self.trades.values()
    }

    /// Instruments with at least one open trade.
    pub fn instruments(&self) -> BTreeSet<String> {
        self.trades.values().map(|t| t.instrument.clone()).collect()
    }

    /// Drop trades the broker no longer reports as open.
    pub fn reconcile(&mut self, open_ids: &[TradeId], prices: &PriceMap) -> Vec<ClosedTrade> {
        let still_open: BTreeSet<&TradeId> = open_ids.iter().collect();
        let gone: Vec<TradeId> = self
            .trades
            .keys()
            .filter(|id| !still_open.contains(id))
            .cloned()
            .collect();

        let mut closed = Vec::with_capacity(gone.len());
        for id in gone {
            if let Some(trade) = self.trades.remove(&id) {
                info!(id = %trade.id, instrument = %trade.instrument, "Trade closed at broker");
                closed.push(self.closed(trade, CloseReason::External, prices));
            }
        }
        closed
    }

    /// Sum of P&L over losing trades with a known price.
    pub fn unrealized_loss(&self, prices: &PriceMap) -> f64 {
        self.trades
            .values()
            .filter_map(|t| {
                let price = prices.get(&t.instrument)?;
                Some(t.unrealized_pnl(*price, self.config.pip_value_for(&t.instrument)))
            })
            .filter(|pnl| *pnl < 0.0)
            .sum()
    }

    /// Update every trailing stop and return the trades waiting to be closed,
    /// including ones whose previous close attempt failed.
    pub fn update_trailing(&mut self, prices: &PriceMap) -> Vec<TradeId> {
        let mut pending = Vec::new();

        for trade in self.trades.values_mut() {
            if trade.trailing != TrailingState::Closed {
                let Some(&price) = prices.get(&trade.instrument) else {
                    debug!(id = %trade.id, instrument = %trade.instrument, "No price for trade");
                    continue;
                };

                let activation = match trade.side {
                    Side::Buy => self.config.buy_trailing_activation,
                    Side::Sell => self.config.sell_trailing_activation,
                };
                let distance = self.config.trailing_stop_pips * pip_size(&trade.instrument);
                let before = trade.trailing;
                let state = advance_trailing(trade, price, activation, distance);

                match (before, state) {
                    (TrailingState::Inactive, TrailingState::Inactive) => {
                        debug!(id = %trade.id, price = price, "Trailing stop not yet eligible");
                    }
                    (_, TrailingState::Closed) => {
                        warn!(
                            id = %trade.id,
                            instrument = %trade.instrument,
                            price = price,
                            extreme = trade.favorable_extreme,
                            "Trailing stop hit"
                        );
                    }
                    (_, TrailingState::Active) => {
                        debug!(
                            id = %trade.id,
                            price = price,
                            extreme = trade.favorable_extreme,
                            "Trailing stop active"
                        );
                    }
                    _ => {}
                }
            }

            if trade.trailing == TrailingState::Closed {
                pending.push(trade.id.clone());
            }
        }

        pending
    }

    /// Close trades whose trailing stop fired. Failed closures stay in the book
    /// and are retried on the next call.
    pub async fn run_trailing_stops(&mut self, broker: &dyn Broker, prices: &PriceMap) -> Vec<ClosedTrade> {
        let pending = self.update_trailing(prices);
        if pending.is_empty() {
            return Vec::new();
        }
        self.close(broker, &pending, CloseReason::TrailingStop, prices).await
    }

    /// Close everything when the aggregate unrealized loss reaches the daily
    /// limit. Returns the closures the broker confirmed.
    pub async fn run_kill_switch(
        &mut self,
        broker: &dyn Broker,
        prices: &PriceMap,
        start_equity: f64,
    ) -> Vec<ClosedTrade> {
        if self.trades.is_empty() {
            return Vec::new();
        }

        let total_loss = self.unrealized_loss(prices);
        let limit_pct = self.config.daily_drawdown_limit_pct;
        if !kill_switch_triggered(total_loss, start_equity, limit_pct) {
            return Vec::new();
        }

        warn!(
            loss = total_loss.abs(),
            limit = start_equity * limit_pct / 100.0,
            trades = self.trades.len(),
            "Unrealized loss reached daily limit, closing all trades"
        );
        let ids: Vec<TradeId> = self.trades.keys().cloned().collect();
        self.close(broker, &ids, CloseReason::KillSwitch, prices).await
    }

    async fn close(
        &mut self,
        broker: &dyn Broker,
        ids: &[TradeId],
        reason: CloseReason,
        prices: &PriceMap,
    ) -> Vec<ClosedTrade> {
        let failed: BTreeSet<TradeId> = broker.close_trades(ids).await.into_iter().collect();
        for id in &failed {
            warn!(id = %id, reason = ?reason, "Close failed, will retry");
        }

        let mut closed = Vec::new();
        for id in ids.iter().filter(|id| !failed.contains(*id)) {
            if let Some(trade) = self.trades.remove(id) {
                closed.push(self.closed(trade, reason, prices));
            }
        }
        closed
    }

    fn closed(&self, trade: OpenTrade, reason: CloseReason, prices: &PriceMap) -> ClosedTrade {
        let exit_price = prices.get(&trade.instrument).copied().or(trade.trigger_price);
        let pnl = exit_price
            .map(|p| trade.unrealized_pnl(p, self.config.pip_value_for(&trade.instrument)))
            .unwrap_or(0.0);
        ClosedTrade {
            trade,
            reason,
            exit_price,
            pnl,
        }
    }
}
