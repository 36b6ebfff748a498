//! OANDA v20 REST client for candles, account equity, and trade execution.
//!
//! Read-only requests are retried with exponential backoff on transport
//! errors and 5xx responses. Order placement is never retried: a market order
//! that times out may still have filled.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{price_precision, Granularity, Series, Side, TradeId};

use super::types::*;
use super::{Broker, OrderRequest};

pub const PRACTICE_URL: &str = "https://api-fxpractice.oanda.com";
pub const LIVE_URL: &str = "https://api-fxtrade.oanda.com";

/// Largest candle count the API serves per request.
const MAX_CANDLES: usize = 5000;
const RETRY_WINDOW: Duration = Duration::from_secs(20);
const CLIENT_TAG: &str = "fxtrend";

/// Which OANDA environment to trade against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Practice,
    Live,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Practice => PRACTICE_URL,
            Environment::Live => LIVE_URL,
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "practice" | "demo" => Ok(Environment::Practice),
            "live" | "trade" => Ok(Environment::Live),
            other => Err(anyhow!("Unknown OANDA environment: {}", other)),
        }
    }
}

/// Client for the OANDA v20 REST API.
pub struct OandaClient {
    http: Client,
    base_url: String,
    account_id: String,
}

impl OandaClient {
    /// Create a client for `environment`.
    pub fn new(api_key: &str, account_id: &str, environment: Environment, timeout: Duration) -> Result<Self> {
        Self::with_base_url(api_key, account_id, environment.base_url(), timeout)
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(api_key: &str, account_id: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .context("API key is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_id: account_id.to_string(),
        })
    }

    fn account_url(&self, path: &str) -> String {
        format!("{}/v3/accounts/{}/{}", self.base_url, self.account_id, path)
    }

    /// GET and decode JSON, retrying transient failures.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_elapsed_time(Some(RETRY_WINDOW))
            .build();
        let http = &self.http;

        backoff::future::retry_notify(
            policy,
            move || async move {
                let response = http
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("Failed to fetch {}", what))
                    .map_err(backoff::Error::transient)?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    let err = anyhow!("{} request failed: {} - {}", what, status, body);
                    return Err(if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    });
                }

                response
                    .json::<T>()
                    .await
                    .with_context(|| format!("Failed to parse {} response", what))
                    .map_err(backoff::Error::permanent)
            },
            |err: anyhow::Error, wait: Duration| {
                warn!(error = %err, retry_in_ms = wait.as_millis() as u64, "Retrying request");
            },
        )
        .await
    }

    async fn close_trade(&self, id: &TradeId) -> Result<()> {
        let url = self.account_url(&format!("trades/{}/close", id));
        let response = self
            .http
            .put(&url)
            .json(&CloseTradeBody { units: "ALL" })
            .send()
            .await
            .with_context(|| format!("Failed to close trade {}", id))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Close trade {} failed: {} - {}", id, status, body);
        }
        Ok(())
    }
}

/// Format a price at the instrument's precision.
pub fn format_price(price: f64, instrument: &str) -> Result<String> {
    let decimal = Decimal::from_f64(price).ok_or_else(|| anyhow!("Price {} is not representable", price))?;
    Ok(decimal
        .round_dp_with_strategy(price_precision(instrument), RoundingStrategy::MidpointAwayFromZero)
        .to_string())
}

/// Signed whole units: positive buys, negative sells.
pub fn format_units(quantity: f64, side: Side) -> String {
    let units = quantity.floor() as i64;
    match side {
        Side::Buy => units.to_string(),
        Side::Sell => (-units).to_string(),
    }
}

#[async_trait]
impl Broker for OandaClient {
    async fn fetch_bars(&self, instrument: &str, granularity: Granularity, count: usize) -> Result<Series> {
        let url = format!(
            "{}/v3/instruments/{}/candles?count={}&granularity={}&price=M",
            self.base_url,
            instrument,
            count.min(MAX_CANDLES),
            granularity
        );
        debug!(url = %url, "Fetching candles");

        let response: CandlesResponse = self.get_json(&url, "candles").await?;
        let bars = response.candles.iter().filter_map(Candle::to_bar).collect();
        let series = Series::new(instrument, granularity, bars);
        if series.is_empty() {
            warn!(instrument = %instrument, granularity = %granularity, "No complete candles returned");
        }
        Ok(series)
    }

    async fn get_balance(&self) -> Result<f64> {
        let url = self.account_url("summary");
        let response: AccountSummaryResponse = self.get_json(&url, "account summary").await?;
        let account = response.account;
        debug!(
            currency = %account.currency,
            unrealized_pl = ?account.unrealized_pl,
            open_trades = account.open_trade_count,
            "Account summary"
        );
        account.equity().context("Account summary has neither NAV nor balance")
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<Option<TradeId>> {
        let body = OrderBody {
            order: MarketOrder {
                order_type: "MARKET",
                instrument: order.instrument.clone(),
                units: format_units(order.quantity, order.side),
                time_in_force: "FOK",
                position_fill: "DEFAULT",
                stop_loss_on_fill: PriceDetails {
                    price: format_price(order.stop_loss_price, &order.instrument)?,
                },
                take_profit_on_fill: PriceDetails {
                    price: format_price(order.take_profit_price, &order.instrument)?,
                },
                client_extensions: ClientExtensions {
                    id: Uuid::new_v4().to_string(),
                    tag: CLIENT_TAG.to_string(),
                },
            },
        };

        info!(
            instrument = %order.instrument,
            units = %body.order.units,
            stop_loss = %body.order.stop_loss_on_fill.price,
            take_profit = %body.order.take_profit_on_fill.price,
            "Placing market order"
        );

        let response = self
            .http
            .post(self.account_url("orders"))
            .json(&body)
            .send()
            .await
            .context("Failed to submit order")?;

        let status = response.status();
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            bail!("Order request failed: {} - {}", status, text);
        }

        // 201 on fill or cancel; 400/404 carry a reject transaction
        let text = response.text().await.context("Failed to read order response")?;
        let parsed: OrderCreateResponse = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse order response ({}): {}", status, text))?;

        match parsed.opened_trade_id() {
            Some(id) => {
                let fill = parsed.order_fill_transaction.as_ref();
                info!(
                    instrument = %order.instrument,
                    trade_id = %id,
                    price = ?fill.and_then(|f| f.price),
                    units = ?fill.and_then(|f| f.trade_opened.as_ref()).and_then(|t| t.units),
                    "Order filled"
                );
                Ok(Some(TradeId::new(id)))
            }
            None => {
                warn!(
                    instrument = %order.instrument,
                    status = %status,
                    reason = %parsed.failure_reason(),
                    "Order rejected"
                );
                Ok(None)
            }
        }
    }

    async fn close_trades(&self, ids: &[TradeId]) -> Vec<TradeId> {
        let results = join_all(ids.iter().map(|id| self.close_trade(id))).await;

        ids.iter()
            .zip(results)
            .filter_map(|(id, result)| match result {
                Ok(()) => {
                    info!(trade_id = %id, "Trade closed");
                    None
                }
                Err(e) => {
                    warn!(trade_id = %id, error = %e, "Failed to close trade");
                    Some(id.clone())
                }
            })
            .collect()
    }

    async fn open_trade_ids(&self) -> Result<Vec<TradeId>> {
        let url = self.account_url("openTrades");
        let response: OpenTradesResponse = self.get_json(&url, "open trades").await?;
        Ok(response.trades.into_iter().map(|t| TradeId::new(t.id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price_precision() {
        assert_eq!(format_price(1.098512345, "EUR_USD").unwrap(), "1.09851");
        assert_eq!(format_price(151.23456, "USD_JPY").unwrap(), "151.235");
        assert!(format_price(f64::NAN, "EUR_USD").is_err());
    }

    #[test]
    fn test_format_units_sign() {
        assert_eq!(format_units(66_666.0, Side::Buy), "66666");
        assert_eq!(format_units(1_200.7, Side::Sell), "-1200");
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("practice".parse::<Environment>().unwrap(), Environment::Practice);
        assert_eq!("LIVE".parse::<Environment>().unwrap(), Environment::Live);
        assert!("paper".parse::<Environment>().is_err());
        assert_eq!(Environment::Live.base_url(), LIVE_URL);
    }

    #[test]
    fn test_account_url() {
        let client =
            OandaClient::with_base_url("token", "101-004-1234567-001", "http://localhost:8080/", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            client.account_url("summary"),
            "http://localhost:8080/v3/accounts/101-004-1234567-001/summary"
        );
    }
}
