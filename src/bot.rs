//! Bot runner: the trading loop and everything it owns.
//!
//! Each iteration:
//! - Skips outside the trading session and at weekends
//! - Resets day counters on a new UTC date and checks the drawdown gate
//! - Fetches every instrument's timeframes concurrently
//! - Turns confirmed signals into sized orders
//! - Reconciles, trails, and kill-switches the open trades

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::api::{Broker, OrderRequest};
use crate::indicators::{IndicatorParams, IndicatorRow, IndicatorSet};
use crate::models::{ClosedTrade, Granularity, OpenTrade, Series, TradeId};
use crate::notify::{Event, Notifier};
use crate::trading::{
    kill_switch_triggered, DayState, Decision, PositionManager, PositionSizer, PriceMap, SignalEngine, SignalRules,
    TradingConfig, TrendRules,
};

/// Bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Instruments scanned for entries
    pub instruments: Vec<String>,

    /// Timeframe signals are generated on
    pub base_granularity: Granularity,
    pub base_count: usize,

    /// Higher timeframes that must confirm the signal
    pub medium_granularity: Granularity,
    pub medium_count: usize,
    pub fast_granularity: Granularity,
    pub fast_count: usize,

    /// Base bars required before an instrument is evaluated
    pub min_bars: usize,

    /// Trading session in UTC hours, both ends inclusive
    pub trading_start_hour: u32,
    pub trading_end_hour: u32,

    /// Pause between iterations (seconds)
    pub poll_interval_secs: u64,

    /// Pause when outside the session (seconds)
    pub session_sleep_secs: u64,

    /// Pause at weekends (seconds)
    pub weekend_sleep_secs: u64,

    /// Pause after a failed iteration (seconds)
    pub error_backoff_secs: u64,

    /// Broker HTTP timeout (seconds)
    pub request_timeout_secs: u64,

    /// Whether orders go to the broker or to the paper book
    pub dry_run: bool,

    pub trading: TradingConfig,
    pub signals: SignalRules,
    pub trend: TrendRules,
    pub indicators: IndicatorParams,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            instruments: ["EUR_USD", "GBP_USD", "AUD_USD", "USD_CHF", "NZD_USD", "USD_CAD"]
                .into_iter()
                .map(String::from)
                .collect(),
            base_granularity: Granularity::M1,
            base_count: 200,
            medium_granularity: Granularity::M15,
            medium_count: 50,
            fast_granularity: Granularity::M5,
            fast_count: 50,
            min_bars: 50,
            trading_start_hour: 6,
            trading_end_hour: 18,
            poll_interval_secs: 60,
            session_sleep_secs: 300,
            weekend_sleep_secs: 3600,
            error_backoff_secs: 60,
            request_timeout_secs: 30,
            dry_run: false,
            trading: TradingConfig::default(),
            signals: SignalRules::default(),
            trend: TrendRules::default(),
            indicators: IndicatorParams::default(),
        }
    }
}

impl BotConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.instruments.is_empty(), "at least one instrument is required");
        ensure!(
            self.trading_start_hour <= self.trading_end_hour && self.trading_end_hour <= 23,
            "trading hours must satisfy start <= end <= 23, got {}..={}",
            self.trading_start_hour,
            self.trading_end_hour
        );
        ensure!(self.poll_interval_secs > 0, "poll_interval_secs must be positive");
        ensure!(self.request_timeout_secs > 0, "request_timeout_secs must be positive");
        ensure!(
            self.min_bars >= self.indicators.warmup_bars(),
            "min_bars ({}) is shorter than the indicator warm-up ({})",
            self.min_bars,
            self.indicators.warmup_bars()
        );
        ensure!(
            self.base_count >= self.min_bars,
            "base_count ({}) must cover min_bars ({})",
            self.base_count,
            self.min_bars
        );
        ensure!(
            self.medium_count >= self.trend.slow_period && self.fast_count >= self.trend.slow_period,
            "higher-timeframe counts must cover the trend slow period ({})",
            self.trend.slow_period
        );

        self.trading.validate()?;
        self.signals.validate()?;
        self.trend.validate()?;
        self.indicators.validate()?;
        Ok(())
    }
}

/// Where the clock stands relative to the trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    Open,
    Closed,
    Weekend,
}

/// Price history of one instrument for one iteration.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub instrument: String,
    pub base: Series,
    pub medium: Series,
    pub fast: Series,
}

/// Indicator row and signal decision for one instrument.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub row: IndicatorRow,
    pub decision: Decision,
}

/// What one in-session iteration did.
#[derive(Debug, Clone, Default)]
pub struct IterationReport {
    pub equity: f64,
    pub drawdown_pct: f64,
    pub drawdown_blocked: bool,
    pub opened: Vec<TradeId>,
    pub closed: Vec<ClosedTrade>,
    pub skipped: Vec<String>,
}

/// Result of one iteration.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    OutsideSession(Session),
    Traded(IterationReport),
}

/// Main bot runner.
pub struct Bot {
    config: BotConfig,
    broker: Arc<dyn Broker>,
    notifier: Arc<dyn Notifier>,
    engine: SignalEngine,
    sizer: PositionSizer,
    book: PositionManager,
    day: DayState,
    stats: BotStats,

    // Shutdown signal
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl Bot {
    /// Create a new bot instance.
    pub fn new(config: BotConfig, broker: Arc<dyn Broker>, notifier: Arc<dyn Notifier>) -> Result<Self> {
        config.validate().context("Invalid bot configuration")?;

        Ok(Self {
            engine: SignalEngine::new(config.signals.clone(), config.trend.clone()),
            sizer: PositionSizer::new(config.trading.clone()),
            book: PositionManager::new(config.trading.clone()),
            day: DayState::new(),
            stats: BotStats {
                dry_run: config.dry_run,
                ..Default::default()
            },
            config,
            broker,
            notifier,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        })
    }

    pub fn book(&self) -> &PositionManager {
        &self.book
    }

    /// Run until Ctrl-C. Iteration failures are logged, notified, and
    /// followed by a back-off; they never end the loop.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            dry_run = self.config.dry_run,
            instruments = ?self.config.instruments,
            poll_interval = self.config.poll_interval_secs,
            "Starting bot run loop"
        );

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        let wake = self.wake.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
            wake.notify_one();
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            let pause = self.iterate(Utc::now()).await;
            debug!(secs = pause.as_secs(), "Sleeping");

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = self.wake.notified() => {}
            }
        }

        info!(open_trades = self.book.len(), "Bot stopped");
        info!("\n{}", self.stats());
        Ok(())
    }

    /// One guarded iteration; returns how long to sleep afterwards.
    pub async fn iterate(&mut self, now: DateTime<Utc>) -> Duration {
        self.stats.iterations += 1;

        match self.tick(now).await {
            Ok(TickOutcome::OutsideSession(Session::Weekend)) => {
                info!("Weekend, market closed");
                Duration::from_secs(self.config.weekend_sleep_secs)
            }
            Ok(TickOutcome::OutsideSession(_)) => {
                info!(hour = now.hour(), "Outside trading hours");
                Duration::from_secs(self.config.session_sleep_secs)
            }
            Ok(TickOutcome::Traded(report)) => {
                debug!(
                    equity = report.equity,
                    drawdown_pct = report.drawdown_pct,
                    opened = report.opened.len(),
                    closed = report.closed.len(),
                    skipped = report.skipped.len(),
                    "Iteration complete"
                );
                Duration::from_secs(self.config.poll_interval_secs)
            }
            Err(e) => {
                self.stats.errors += 1;
                error!(error = %e, "Error in bot tick");
                self.notifier.send(Event::LoopError {
                    message: format!("{:#}", e),
                });
                Duration::from_secs(self.config.error_backoff_secs)
            }
        }
    }

    pub fn session(&self, now: DateTime<Utc>) -> Session {
        if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            return Session::Weekend;
        }
        let hour = now.hour();
        if hour < self.config.trading_start_hour || hour > self.config.trading_end_hour {
            return Session::Closed;
        }
        Session::Open
    }

    /// One iteration of the trading loop.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickOutcome> {
        let session = self.session(now);
        if session != Session::Open {
            return Ok(TickOutcome::OutsideSession(session));
        }

        let equity = self.broker.get_balance().await.context("Failed to fetch account equity")?;
        self.stats.last_equity = equity;

        let today = now.date_naive();
        if self.day.needs_roll(today) {
            self.day.roll(today, equity);
        }

        let mut report = IterationReport {
            equity,
            drawdown_pct: self.day.drawdown_pct(equity),
            ..Default::default()
        };

        let limit_pct = self.config.trading.daily_drawdown_limit_pct;
        if self.day.drawdown_exceeded(equity, limit_pct) {
            report.drawdown_blocked = true;
            warn!(
                drawdown_pct = report.drawdown_pct,
                limit_pct = limit_pct,
                "Daily drawdown limit reached, no new trades"
            );
            self.notifier.send(Event::DrawdownLimit {
                drawdown_pct: report.drawdown_pct,
                limit_pct,
            });
        }

        let snapshots = self.fetch_snapshots().await;
        let mut prices: PriceMap = snapshots
            .iter()
            .filter_map(|s| Some((s.instrument.clone(), s.base.last_close()?)))
            .collect();

        if !report.drawdown_blocked {
            for snapshot in &snapshots {
                self.consider_entry(snapshot, equity, &mut report).await;
            }
        }

        self.manage_positions(&mut prices, &mut report).await;

        Ok(TickOutcome::Traded(report))
    }

    /// Instruments to fetch: the configured ones plus any with open trades.
    fn watched_instruments(&self) -> Vec<String> {
        let mut all: BTreeSet<String> = self.config.instruments.iter().cloned().collect();
        all.extend(self.book.instruments());
        all.into_iter().collect()
    }

    async fn fetch_snapshots(&self) -> Vec<MarketSnapshot> {
        let instruments = self.watched_instruments();
        join_all(instruments.iter().map(|i| self.fetch_snapshot(i))).await
    }

    /// Fetch the three timeframes of one instrument concurrently. A failed
    /// fetch yields an empty series.
    pub async fn fetch_snapshot(&self, instrument: &str) -> MarketSnapshot {
        let c = &self.config;
        let (base, medium, fast) = tokio::join!(
            self.fetch_or_empty(instrument, c.base_granularity, c.base_count),
            self.fetch_or_empty(instrument, c.medium_granularity, c.medium_count),
            self.fetch_or_empty(instrument, c.fast_granularity, c.fast_count),
        );

        MarketSnapshot {
            instrument: instrument.to_string(),
            base,
            medium,
            fast,
        }
    }

    async fn fetch_or_empty(&self, instrument: &str, granularity: Granularity, count: usize) -> Series {
        match self.broker.fetch_bars(instrument, granularity, count).await {
            Ok(series) => {
                debug!(
                    instrument = series.instrument(),
                    granularity = %series.granularity(),
                    bars = series.len(),
                    "Fetched candles"
                );
                series
            }
            Err(e) => {
                warn!(
                    instrument = %instrument,
                    granularity = %granularity,
                    error = %e,
                    "Failed to fetch candles"
                );
                Series::empty(instrument, granularity)
            }
        }
    }

    /// Indicators and signal decision for a snapshot, if it has enough history.
    pub fn analyze(&self, snapshot: &MarketSnapshot) -> Option<Analysis> {
        if snapshot.base.len() < self.config.min_bars {
            debug!(
                instrument = %snapshot.instrument,
                bars = snapshot.base.len(),
                min = self.config.min_bars,
                "Not enough data"
            );
            return None;
        }

        let row = IndicatorSet::compute(&snapshot.base, &self.config.indicators).latest()?;
        let decision = self.engine.decide(&row, &snapshot.medium, &snapshot.fast);
        Some(Analysis { row, decision })
    }

    async fn consider_entry(&mut self, snapshot: &MarketSnapshot, equity: f64, report: &mut IterationReport) {
        let instrument = &snapshot.instrument;
        if !self.config.instruments.contains(instrument) {
            return;
        }

        let Some(analysis) = self.analyze(snapshot) else {
            report.skipped.push(instrument.clone());
            return;
        };
        let (row, decision) = (analysis.row, analysis.decision);

        info!(
            instrument = %instrument,
            signal = %decision.signal,
            medium = %decision.medium_trend,
            fast = %decision.fast_trend,
            confirmed = %decision.confirmed,
            rsi = row.rsi,
            adx = row.adx,
            "Signal evaluated"
        );

        let Some(side) = decision.confirmed.side() else {
            return;
        };

        if let Some(block) = self.day.check_caps(&self.config.trading) {
            info!(instrument = %instrument, block = ?block, "Trade limit reached, skipping");
            return;
        }

        let plan = match self.sizer.size(side, equity, self.config.trading.risk_per_trade, row.atr, row.close) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "Position sizing rejected");
                report.skipped.push(instrument.clone());
                return;
            }
        };

        let order = OrderRequest {
            instrument: instrument.clone(),
            side,
            quantity: plan.quantity,
            stop_loss_price: plan.stop_price,
            take_profit_price: plan.target_price,
        };

        let trade_id = match self.broker.place_order(&order).await {
            Ok(Some(id)) => id,
            Ok(None) => return,
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "Order placement failed");
                return;
            }
        };

        self.day.record_open();
        self.stats.trades_opened += 1;
        self.book.open(OpenTrade::new(
            trade_id.clone(),
            instrument.clone(),
            side,
            row.close,
            plan.quantity,
            plan.stop_price,
            plan.target_price,
            Utc::now(),
        ));
        self.notifier.send(Event::TradeOpened {
            trade_id: trade_id.clone(),
            instrument: instrument.clone(),
            side,
            quantity: plan.quantity,
            entry_price: row.close,
            stop_loss_price: plan.stop_price,
            take_profit_price: plan.target_price,
        });
        report.opened.push(trade_id);
    }

    async fn manage_positions(&mut self, prices: &mut PriceMap, report: &mut IterationReport) {
        if self.book.is_empty() {
            return;
        }

        match self.broker.open_trade_ids().await {
            Ok(open_ids) => {
                for closed in self.book.reconcile(&open_ids, prices) {
                    self.record_closed(closed, report);
                }
            }
            Err(e) => warn!(error = %e, "Failed to list open trades, skipping reconciliation"),
        }

        for instrument in self.book.instruments() {
            if prices.contains_key(&instrument) {
                continue;
            }
            match self.broker.fetch_bars(&instrument, self.config.base_granularity, 1).await {
                Ok(series) => {
                    if let Some(price) = series.last_close() {
                        prices.insert(instrument, price);
                    }
                }
                Err(e) => warn!(instrument = %instrument, error = %e, "Failed to fetch latest price"),
            }
        }

        for closed in self.book.run_trailing_stops(self.broker.as_ref(), prices).await {
            self.day.record_close(&closed);
            self.record_closed(closed, report);
        }

        let loss = self.book.unrealized_loss(prices);
        let start_equity = self.day.start_equity;
        let limit_pct = self.config.trading.daily_drawdown_limit_pct;
        if !self.book.is_empty() && kill_switch_triggered(loss, start_equity, limit_pct) {
            let before = self.book.len();
            let closed = self.book.run_kill_switch(self.broker.as_ref(), prices, start_equity).await;
            self.notifier.send(Event::KillSwitch {
                loss: loss.abs(),
                limit: start_equity * limit_pct / 100.0,
                closed: closed.len(),
                failed: before - closed.len(),
            });
            for trade in closed {
                self.record_closed(trade, report);
            }
        }
    }

    fn record_closed(&mut self, closed: ClosedTrade, report: &mut IterationReport) {
        self.stats.trades_closed += 1;
        self.stats.realized_pnl += closed.pnl;
        self.notifier.send(Event::TradeClosed {
            trade_id: closed.trade.id.clone(),
            instrument: closed.trade.instrument.clone(),
            reason: closed.reason,
            exit_price: closed.exit_price,
            pnl: closed.pnl,
        });
        report.closed.push(closed);
    }

    /// Current statistics.
    pub fn stats(&self) -> BotStats {
        BotStats {
            open_trades: self.book.len(),
            trades_today: self.day.trades_today,
            consecutive_losses: self.day.consecutive_losses,
            start_equity: self.day.start_equity,
            is_running: !self.shutdown.load(Ordering::SeqCst),
            ..self.stats.clone()
        }
    }
}

/// Bot statistics.
#[derive(Debug, Clone, Default)]
pub struct BotStats {
    pub iterations: u64,
    pub errors: u64,
    pub trades_opened: u64,
    pub trades_closed: u64,
    /// Sum of estimated P&L of closed trades
    pub realized_pnl: f64,
    pub open_trades: usize,
    pub trades_today: u32,
    pub consecutive_losses: u32,
    pub start_equity: f64,
    pub last_equity: f64,
    pub is_running: bool,
    pub dry_run: bool,
}

impl std::fmt::Display for BotStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Bot Statistics ===")?;
        writeln!(f, "Equity:          {:.2} (day start {:.2})", self.last_equity, self.start_equity)?;
        writeln!(f, "Estimated P&L:   {:.2}", self.realized_pnl)?;
        writeln!(f, "Open Trades:     {}", self.open_trades)?;
        writeln!(f, "Trades:          {} opened, {} closed", self.trades_opened, self.trades_closed)?;
        writeln!(f, "Today:           {} trades, {} consecutive losses",
            self.trades_today, self.consecutive_losses)?;
        writeln!(f, "Iterations:      {} ({} failed)", self.iterations, self.errors)?;
        writeln!(f, "Status:          {} {}",
            if self.is_running { "Running" } else { "Stopped" },
            if self.dry_run { "(Dry Run)" } else { "" })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bar, CloseReason};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Bars in the longest history the mock serves; every fetch ends on the same bar.
    const HISTORY: usize = 200;

    /// Serves accelerating uptrends for every instrument except "BAD_PAIR".
    struct MockBroker {
        equity: Mutex<f64>,
        fail_balance: AtomicBool,
        /// Fail every multi-bar fetch; single-bar quotes still succeed
        fail_history: AtomicBool,
        /// Added to every price
        shift: Mutex<f64>,
        fetches: Mutex<Vec<(String, usize)>>,
        orders: Mutex<Vec<OrderRequest>>,
        open: Mutex<Vec<TradeId>>,
        next_id: AtomicUsize,
    }

    impl MockBroker {
        fn new(equity: f64) -> Arc<Self> {
            Arc::new(Self {
                equity: Mutex::new(equity),
                fail_balance: AtomicBool::new(false),
                fail_history: AtomicBool::new(false),
                shift: Mutex::new(0.0),
                fetches: Mutex::new(Vec::new()),
                orders: Mutex::new(Vec::new()),
                open: Mutex::new(Vec::new()),
                next_id: AtomicUsize::new(1),
            })
        }

        fn order_count(&self) -> usize {
            self.orders.lock().unwrap().len()
        }

        fn set_shift(&self, shift: f64) {
            *self.shift.lock().unwrap() = shift;
        }
    }

    fn uptrend(instrument: &str, granularity: Granularity, count: usize, shift: f64) -> Series {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let offset = HISTORY.saturating_sub(count);
        let bars = (0..count)
            .map(|i| {
                let j = offset + i;
                let c = 1.1 + 1e-6 * (j * j) as f64 + shift;
                let t = start + chrono::Duration::minutes(j as i64);
                Bar::new(t, c - 0.0001, c + 0.0002, c - 0.0002, c)
            })
            .collect();
        Series::new(instrument, granularity, bars)
    }

    #[async_trait]
    impl Broker for MockBroker {
        async fn fetch_bars(&self, instrument: &str, granularity: Granularity, count: usize) -> Result<Series> {
            self.fetches.lock().unwrap().push((instrument.to_string(), count));
            if instrument == "BAD_PAIR" || (count > 1 && self.fail_history.load(Ordering::SeqCst)) {
                anyhow::bail!("connection reset");
            }
            Ok(uptrend(instrument, granularity, count, *self.shift.lock().unwrap()))
        }

        async fn get_balance(&self) -> Result<f64> {
            if self.fail_balance.load(Ordering::SeqCst) {
                anyhow::bail!("summary request failed: 503");
            }
            Ok(*self.equity.lock().unwrap())
        }

        async fn place_order(&self, order: &OrderRequest) -> Result<Option<TradeId>> {
            self.orders.lock().unwrap().push(order.clone());
            let id = TradeId::new(self.next_id.fetch_add(1, Ordering::SeqCst).to_string());
            self.open.lock().unwrap().push(id.clone());
            Ok(Some(id))
        }

        async fn close_trades(&self, ids: &[TradeId]) -> Vec<TradeId> {
            self.open.lock().unwrap().retain(|id| !ids.contains(id));
            Vec::new()
        }

        async fn open_trade_ids(&self) -> Result<Vec<TradeId>> {
            Ok(self.open.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<Event>>,
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl RecordingNotifier {
        fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
            self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
        }
    }

    /// Rules loose enough that a rising market always confirms a BUY.
    fn config(instruments: &[&str]) -> BotConfig {
        BotConfig {
            instruments: instruments.iter().map(|s| s.to_string()).collect(),
            signals: SignalRules {
                min_adx: 0.0,
                buy_rsi_min: 0.0,
                buy_rsi_max: 100.0,
                respect_bollinger: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn bot(config: BotConfig, broker: &Arc<MockBroker>, notifier: &Arc<RecordingNotifier>) -> Bot {
        Bot::new(config, broker.clone(), notifier.clone()).unwrap()
    }

    fn tuesday(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        BotConfig::default().validate().unwrap();
        let bad = BotConfig {
            min_bars: 10,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_session_gate() {
        let broker = MockBroker::new(10_000.0);
        let notifier = Arc::new(RecordingNotifier::default());
        let bot = bot(BotConfig::default(), &broker, &notifier);

        assert_eq!(bot.session(tuesday(6)), Session::Open);
        assert_eq!(bot.session(tuesday(18)), Session::Open);
        assert_eq!(bot.session(tuesday(5)), Session::Closed);
        assert_eq!(bot.session(tuesday(19)), Session::Closed);
        let saturday = Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap();
        assert_eq!(bot.session(saturday), Session::Weekend);
    }

    #[tokio::test]
    async fn test_outside_session_sleeps_without_broker_calls() {
        let broker = MockBroker::new(10_000.0);
        broker.fail_balance.store(true, Ordering::SeqCst);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(config(&["EUR_USD"]), &broker, &notifier);

        assert_eq!(bot.iterate(tuesday(3)).await, Duration::from_secs(300));
        let sunday = Utc.with_ymd_and_hms(2024, 1, 7, 12, 0, 0).unwrap();
        assert_eq!(bot.iterate(sunday).await, Duration::from_secs(3600));
        assert_eq!(notifier.count(|_| true), 0);
    }

    #[tokio::test]
    async fn test_confirmed_signal_opens_trade() {
        let broker = MockBroker::new(10_000.0);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(config(&["EUR_USD"]), &broker, &notifier);

        let TickOutcome::Traded(report) = bot.tick(tuesday(10)).await.unwrap() else {
            panic!("expected an in-session iteration");
        };

        assert_eq!(report.opened.len(), 1);
        assert_eq!(broker.order_count(), 1);
        assert_eq!(bot.book().len(), 1);
        assert_eq!(bot.stats().trades_today, 1);
        assert_eq!(bot.stats().start_equity, 10_000.0);

        let order = broker.orders.lock().unwrap()[0].clone();
        assert_eq!(order.side, crate::models::Side::Buy);
        assert!(order.quantity >= 1.0);
        assert!(order.stop_loss_price < order.take_profit_price);
        assert_eq!(notifier.count(|e| matches!(e, Event::TradeOpened { .. })), 1);
    }

    #[tokio::test]
    async fn test_daily_trade_cap() {
        let broker = MockBroker::new(10_000.0);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut cfg = config(&["EUR_USD", "GBP_USD", "AUD_USD"]);
        cfg.trading.max_trades_per_day = 2;
        let mut bot = bot(cfg, &broker, &notifier);

        bot.tick(tuesday(10)).await.unwrap();
        bot.tick(tuesday(11)).await.unwrap();
        assert_eq!(broker.order_count(), 2);
    }

    #[tokio::test]
    async fn test_drawdown_gate_blocks_new_trades() {
        let broker = MockBroker::new(10_000.0);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(config(&["EUR_USD"]), &broker, &notifier);

        bot.tick(tuesday(10)).await.unwrap();
        assert_eq!(broker.order_count(), 1);

        *broker.equity.lock().unwrap() = 9_200.0;
        let TickOutcome::Traded(report) = bot.tick(tuesday(11)).await.unwrap() else {
            panic!("expected an in-session iteration");
        };

        assert!(report.drawdown_blocked);
        assert!((report.drawdown_pct + 8.0).abs() < 1e-9);
        assert_eq!(broker.order_count(), 1);
        assert_eq!(notifier.count(|e| matches!(e, Event::DrawdownLimit { .. })), 1);
        // existing trade is still managed
        assert_eq!(bot.book().len(), 1);
    }

    #[tokio::test]
    async fn test_new_day_resets_counters() {
        let broker = MockBroker::new(10_000.0);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut cfg = config(&["EUR_USD"]);
        cfg.trading.max_trades_per_day = 1;
        let mut bot = bot(cfg, &broker, &notifier);

        bot.tick(tuesday(10)).await.unwrap();
        bot.tick(tuesday(11)).await.unwrap();
        assert_eq!(broker.order_count(), 1);

        *broker.equity.lock().unwrap() = 10_500.0;
        let wednesday = Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap();
        bot.tick(wednesday).await.unwrap();
        assert_eq!(broker.order_count(), 2);
        assert_eq!(bot.stats().start_equity, 10_500.0);
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_instrument() {
        let broker = MockBroker::new(10_000.0);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(config(&["BAD_PAIR", "EUR_USD"]), &broker, &notifier);

        let TickOutcome::Traded(report) = bot.tick(tuesday(10)).await.unwrap() else {
            panic!("expected an in-session iteration");
        };
        assert_eq!(report.skipped, vec!["BAD_PAIR".to_string()]);
        assert_eq!(report.opened.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_iteration_backs_off_and_alerts() {
        let broker = MockBroker::new(10_000.0);
        broker.fail_balance.store(true, Ordering::SeqCst);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(config(&["EUR_USD"]), &broker, &notifier);

        assert_eq!(bot.iterate(tuesday(10)).await, Duration::from_secs(60));
        assert_eq!(notifier.count(|e| matches!(e, Event::LoopError { .. })), 1);
        assert_eq!(bot.stats().errors, 1);

        broker.fail_balance.store(false, Ordering::SeqCst);
        assert_eq!(bot.iterate(tuesday(10)).await, Duration::from_secs(60));
        assert_eq!(broker.order_count(), 1);
    }

    #[tokio::test]
    async fn test_external_close_is_reconciled() {
        let broker = MockBroker::new(10_000.0);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut cfg = config(&["EUR_USD"]);
        cfg.trading.max_trades_per_day = 1;
        let mut bot = bot(cfg, &broker, &notifier);

        bot.tick(tuesday(10)).await.unwrap();
        broker.open.lock().unwrap().clear();

        let TickOutcome::Traded(report) = bot.tick(tuesday(11)).await.unwrap() else {
            panic!("expected an in-session iteration");
        };
        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].reason, CloseReason::External);
        assert!(bot.book().is_empty());
        assert_eq!(bot.stats().trades_closed, 1);
    }

    /// Opens one EUR_USD trade at 10:00 and returns its entry price.
    async fn open_one(bot: &mut Bot) -> f64 {
        bot.tick(tuesday(10)).await.unwrap();
        assert_eq!(bot.book().len(), 1);
        bot.book().iter().map(|t| t.entry_price).next().unwrap()
    }

    #[tokio::test]
    async fn test_losing_trailing_exit_extends_loss_streak() {
        let broker = MockBroker::new(10_000.0);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut cfg = config(&["EUR_USD"]);
        cfg.trading.max_trades_per_day = 1;
        let mut bot = bot(cfg, &broker, &notifier);
        let entry = open_one(&mut bot).await;

        // arms the stop: +20 pips against a target well under that
        broker.set_shift(0.0020);
        let TickOutcome::Traded(report) = bot.tick(tuesday(11)).await.unwrap() else {
            panic!("expected an in-session iteration");
        };
        assert!(report.closed.is_empty());

        // 17 pips behind the extreme and below entry
        broker.set_shift(-0.0005);
        let TickOutcome::Traded(report) = bot.tick(tuesday(12)).await.unwrap() else {
            panic!("expected an in-session iteration");
        };

        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].reason, CloseReason::TrailingStop);
        assert!((report.closed[0].exit_price.unwrap() - (entry - 0.0005)).abs() < 1e-9);
        assert!(report.closed[0].is_loss());
        assert!(bot.book().is_empty());
        assert_eq!(bot.stats().consecutive_losses, 1);
        assert_eq!(notifier.count(|e| matches!(e, Event::TradeClosed { .. })), 1);
        assert_eq!(notifier.count(|e| matches!(e, Event::KillSwitch { .. })), 0);
    }

    #[tokio::test]
    async fn test_kill_switch_closes_everything() {
        let broker = MockBroker::new(10_000.0);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut cfg = config(&["EUR_USD"]);
        cfg.trading.max_trades_per_day = 1;
        let mut bot = bot(cfg, &broker, &notifier);
        open_one(&mut bot).await;

        // 100 pips against a position of over 10k units breaches 7.5% of 10k
        broker.set_shift(-0.0100);
        let TickOutcome::Traded(report) = bot.tick(tuesday(11)).await.unwrap() else {
            panic!("expected an in-session iteration");
        };

        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].reason, CloseReason::KillSwitch);
        assert!(bot.book().is_empty());
        assert!(broker.open.lock().unwrap().is_empty());
        assert_eq!(notifier.count(|e| matches!(e, Event::KillSwitch { closed: 1, failed: 0, .. })), 1);
        // only trailing exits feed the loss streak
        assert_eq!(bot.stats().consecutive_losses, 0);
    }

    #[tokio::test]
    async fn test_missing_price_is_refetched() {
        let broker = MockBroker::new(10_000.0);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut cfg = config(&["EUR_USD"]);
        cfg.trading.max_trades_per_day = 1;
        let mut bot = bot(cfg, &broker, &notifier);
        let entry = open_one(&mut bot).await;

        broker.fail_history.store(true, Ordering::SeqCst);
        broker.fetches.lock().unwrap().clear();
        broker.set_shift(-0.0100);
        let TickOutcome::Traded(report) = bot.tick(tuesday(11)).await.unwrap() else {
            panic!("expected an in-session iteration");
        };

        assert_eq!(report.skipped, vec!["EUR_USD".to_string()]);
        assert!(broker
            .fetches
            .lock()
            .unwrap()
            .contains(&("EUR_USD".to_string(), 1)));
        // the single-bar quote is what the kill-switch acted on
        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].reason, CloseReason::KillSwitch);
        assert!((report.closed[0].exit_price.unwrap() - (entry - 0.0100)).abs() < 1e-9);
    }
}
