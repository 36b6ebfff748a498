//! Dry-run broker: real market data, simulated execution.

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::models::{Granularity, Series, TradeId};

use super::{Broker, OrderRequest};

/// Wraps a data source; every order fills with a synthetic id and every close
/// succeeds. Equity stays at the configured paper value.
pub struct PaperBroker<B> {
    data: B,
    equity: f64,
    open: RwLock<BTreeSet<TradeId>>,
}

impl<B: Broker> PaperBroker<B> {
    pub fn new(data: B, equity: f64) -> Self {
        Self {
            data,
            equity,
            open: RwLock::new(BTreeSet::new()),
        }
    }
}

#[async_trait]
impl<B: Broker> Broker for PaperBroker<B> {
    async fn fetch_bars(&self, instrument: &str, granularity: Granularity, count: usize) -> Result<Series> {
        self.data.fetch_bars(instrument, granularity, count).await
    }

    async fn get_balance(&self) -> Result<f64> {
        Ok(self.equity)
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<Option<TradeId>> {
        let id = TradeId::new(format!("paper-{}", Uuid::new_v4()));
        info!(
            instrument = %order.instrument,
            side = %order.side,
            quantity = order.quantity,
            trade_id = %id,
            "[DRY RUN] Order filled"
        );
        self.open.write().await.insert(id.clone());
        Ok(Some(id))
    }

    async fn close_trades(&self, ids: &[TradeId]) -> Vec<TradeId> {
        let mut open = self.open.write().await;
        for id in ids {
            open.remove(id);
            info!(trade_id = %id, "[DRY RUN] Trade closed");
        }
        Vec::new()
    }

    async fn open_trade_ids(&self) -> Result<Vec<TradeId>> {
        Ok(self.open.read().await.iter().cloned().collect())
    }
}
