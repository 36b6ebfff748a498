//! Operator notifications: log lines always, webhook alerts when configured.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::models::{CloseReason, Side, TradeId};

/// Something the operator should hear about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    TradeOpened {
        trade_id: TradeId,
        instrument: String,
        side: Side,
        quantity: f64,
        entry_price: f64,
        stop_loss_price: f64,
        take_profit_price: f64,
    },
    TradeClosed {
        trade_id: TradeId,
        instrument: String,
        reason: CloseReason,
        exit_price: Option<f64>,
        pnl: f64,
    },
    DrawdownLimit {
        drawdown_pct: f64,
        limit_pct: f64,
    },
    KillSwitch {
        loss: f64,
        limit: f64,
        closed: usize,
        failed: usize,
    },
    LoopError {
        message: String,
    },
}

impl Event {
    /// Short subject line.
    pub fn title(&self) -> &'static str {
        match self {
            Event::TradeOpened { .. } => "Trade opened",
            Event::TradeClosed { .. } => "Trade closed",
            Event::DrawdownLimit { .. } => "Daily drawdown limit reached",
            Event::KillSwitch { .. } => "Daily loss limit exceeded",
            Event::LoopError { .. } => "Trading bot error",
        }
    }

    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            Event::DrawdownLimit { .. } | Event::KillSwitch { .. } | Event::LoopError { .. }
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::TradeOpened {
                trade_id,
                instrument,
                side,
                quantity,
                entry_price,
                stop_loss_price,
                take_profit_price,
            } => write!(
                f,
                "{} {} {} units @ {:.5} (SL {:.5}, TP {:.5}) [trade {}]",
                side, quantity, instrument, entry_price, stop_loss_price, take_profit_price, trade_id
            ),
            Event::TradeClosed {
                trade_id,
                instrument,
                reason,
                exit_price,
                pnl,
            } => {
                write!(f, "{} trade {} closed ({:?})", instrument, trade_id, reason)?;
                if let Some(price) = exit_price {
                    write!(f, " @ {:.5}", price)?;
                }
                write!(f, ", P&L {:.2}", pnl)
            }
            Event::DrawdownLimit {
                drawdown_pct,
                limit_pct,
            } => write!(
                f,
                "Drawdown {:.2}% breached limit of -{:.2}%; no new trades",
                drawdown_pct, limit_pct
            ),
            Event::KillSwitch {
                loss,
                limit,
                closed,
                failed,
            } => write!(
                f,
                "Unrealized loss {:.2} reached limit {:.2}; closed {} trades, {} failed",
                loss, limit, closed, failed
            ),
            Event::LoopError { message } => write!(f, "Unexpected error: {}", message),
        }
    }
}

/// Delivery of operator events. Never blocks and never fails from the caller's view.
pub trait Notifier: Send + Sync {
    fn send(&self, event: Event);
}

/// Writes events to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, event: Event) {
        if event.is_alert() {
            warn!(title = event.title(), "{}", event);
        } else {
            info!(title = event.title(), "{}", event);
        }
    }
}

/// Logs every event and posts alerts (or everything, if configured) to a
/// chat-style webhook as `{"text": ..., "event": ...}`.
pub struct WebhookNotifier {
    http: Client,
    url: Arc<str>,
    alerts_only: bool,
}

impl WebhookNotifier {
    pub fn new(url: &str, alerts_only: bool) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            url: Arc::from(url),
            alerts_only,
        })
    }

    fn payload(event: &Event) -> serde_json::Value {
        serde_json::json!({
            "text": format!("{}: {}", event.title(), event),
            "event": event,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn send(&self, event: Event) {
        LogNotifier.send(event.clone());

        if self.alerts_only && !event.is_alert() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, webhook notification dropped");
            return;
        };

        let http = self.http.clone();
        let url = Arc::clone(&self.url);
        let body = Self::payload(&event);
        runtime.spawn(async move {
            match http.post(url.as_ref()).json(&body).send().await {
                Ok(resp) if !resp.status().is_success() => {
                    warn!(status = %resp.status(), "Webhook notification rejected");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Webhook notification failed"),
            }
        });
    }
}
