//! Request and response bodies of the OANDA v20 REST API.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Bar;

/// Response from /v3/instruments/{instrument}/candles.
#[derive(Debug, Clone, Deserialize)]
pub struct CandlesResponse {
    #[serde(default)]
    pub candles: Vec<Candle>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub complete: bool,
    /// Midpoint prices; present when requested with `price=M`
    pub mid: Option<CandlePrices>,
}

/// OHLC prices, sent by the API as decimal strings.
#[derive(Debug, Clone, Deserialize)]
pub struct CandlePrices {
    pub o: Decimal,
    pub h: Decimal,
    pub l: Decimal,
    pub c: Decimal,
}

impl Candle {
    /// Convert a complete candle with midpoint prices into a bar.
    pub fn to_bar(&self) -> Option<Bar> {
        if !self.complete {
            return None;
        }
        let mid = self.mid.as_ref()?;
        Some(Bar::new(
            self.time,
            mid.o.to_f64()?,
            mid.h.to_f64()?,
            mid.l.to_f64()?,
            mid.c.to_f64()?,
        ))
    }
}

/// Response from /v3/accounts/{id}/summary.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSummaryResponse {
    pub account: AccountSummary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountSummary {
    #[serde(rename = "NAV")]
    pub nav: Option<Decimal>,
    pub balance: Option<Decimal>,
    #[serde(default)]
    pub currency: String,
    #[serde(rename = "unrealizedPL")]
    pub unrealized_pl: Option<Decimal>,
    #[serde(rename = "openTradeCount", default)]
    pub open_trade_count: u32,
}

impl AccountSummary {
    /// Net asset value, or the cash balance when NAV is missing.
    pub fn equity(&self) -> Option<f64> {
        self.nav.or(self.balance)?.to_f64()
    }
}

/// Body of POST /v3/accounts/{id}/orders.
#[derive(Debug, Clone, Serialize)]
pub struct OrderBody {
    pub order: MarketOrder,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOrder {
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub instrument: String,
    /// Signed units: positive buys, negative sells
    pub units: String,
    pub time_in_force: &'static str,
    pub position_fill: &'static str,
    pub stop_loss_on_fill: PriceDetails,
    pub take_profit_on_fill: PriceDetails,
    pub client_extensions: ClientExtensions,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceDetails {
    pub price: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientExtensions {
    pub id: String,
    pub tag: String,
}

/// Response from order creation, successful or rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreateResponse {
    pub order_fill_transaction: Option<OrderFillTransaction>,
    pub order_cancel_transaction: Option<OrderCancelTransaction>,
    pub order_reject_transaction: Option<OrderRejectTransaction>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFillTransaction {
    pub price: Option<Decimal>,
    pub trade_opened: Option<TradeOpened>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOpened {
    #[serde(rename = "tradeID")]
    pub trade_id: String,
    pub units: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderCancelTransaction {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRejectTransaction {
    #[serde(default)]
    pub reject_reason: String,
}

impl OrderCreateResponse {
    /// Opened trade id, if the order filled.
    pub fn opened_trade_id(&self) -> Option<&str> {
        self.order_fill_transaction
            .as_ref()?
            .trade_opened
            .as_ref()
            .map(|t| t.trade_id.as_str())
    }

    /// Human-readable reason when the order did not open a trade.
    pub fn failure_reason(&self) -> String {
        if let Some(cancel) = &self.order_cancel_transaction {
            return cancel.reason.clone();
        }
        if let Some(reject) = &self.order_reject_transaction {
            return reject.reject_reason.clone();
        }
        self.error_message
            .clone()
            .unwrap_or_else(|| "no trade opened".to_string())
    }
}

/// Body of PUT /v3/accounts/{id}/trades/{tradeSpecifier}/close.
#[derive(Debug, Clone, Serialize)]
pub struct CloseTradeBody {
    pub units: &'static str,
}

/// Response from /v3/accounts/{id}/openTrades.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenTradesResponse {
    #[serde(default)]
    pub trades: Vec<TradeSummary>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSummary {
    pub id: String,
}
