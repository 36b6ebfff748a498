//! Intraday FX Trading Bot
//!
//! Trades currency pairs on the OANDA v20 API: indicator signals on the
//! one-minute chart, confirmed by higher-timeframe trends, sized by ATR, and
//! managed with trailing stops and daily loss limits.

mod api;
mod bot;
mod indicators;
mod models;
mod notify;
mod trading;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{Broker, Environment, OandaClient, PaperBroker};
use crate::bot::{Bot, BotConfig};
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};

/// Intraday FX trading bot CLI.
#[derive(Parser)]
#[command(name = "fxtrend")]
#[command(about = "Multi-timeframe FX trend trading on OANDA", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// JSON configuration file; missing fields use defaults
    #[arg(short, long, env = "FXTREND_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// OANDA API token
    #[arg(long, env = "OANDA_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// OANDA account ID
    #[arg(long, env = "OANDA_ACCOUNT_ID", global = true)]
    account_id: Option<String>,

    /// OANDA environment (practice or live)
    #[arg(long, env = "OANDA_ENV", default_value = "practice", global = true)]
    oanda_env: String,

    /// Webhook receiving alerts as JSON
    #[arg(long, env = "ALERT_WEBHOOK_URL", hide_env_values = true, global = true)]
    webhook_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trading loop
    Run {
        /// Dry run (real prices, simulated orders)
        #[arg(long)]
        dry_run: bool,

        /// Polling interval in seconds
        #[arg(short, long)]
        interval: Option<u64>,

        /// Account equity assumed in dry-run mode
        #[arg(long, default_value = "10000")]
        paper_equity: f64,
    },

    /// Evaluate the current signal for one instrument
    Signal {
        /// Instrument, e.g. EUR_USD
        #[arg(short, long)]
        instrument: String,
    },

    /// Show account equity and open trades
    Balance,

    /// Show current configuration
    Config,
}

impl Cli {
    fn load_config(&self) -> Result<BotConfig> {
        let config = match &self.config {
            Some(path) => BotConfig::from_file(path)?,
            None => BotConfig::default(),
        };
        config.validate().context("Invalid bot configuration")?;
        Ok(config)
    }

    fn oanda_client(&self, config: &BotConfig) -> Result<OandaClient> {
        let api_key = self.api_key.as_deref().context("OANDA_API_KEY not set")?;
        let account_id = self.account_id.as_deref().context("OANDA_ACCOUNT_ID not set")?;
        let environment: Environment = self.oanda_env.parse().context("Invalid OANDA_ENV")?;

        OandaClient::new(
            api_key,
            account_id,
            environment,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn notifier(&self) -> Result<Arc<dyn Notifier>> {
        Ok(match self.webhook_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Arc::new(WebhookNotifier::new(url, false)?),
            _ => Arc::new(LogNotifier),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may live in a .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = cli.load_config()?;

    match &cli.command {
        Commands::Run {
            dry_run,
            interval,
            paper_equity,
        } => {
            config.dry_run |= *dry_run;
            if let Some(secs) = interval {
                config.poll_interval_secs = *secs;
            }

            info!(
                instruments = ?config.instruments,
                interval = config.poll_interval_secs,
                dry_run = config.dry_run,
                "Starting trading bot"
            );

            let client = cli.oanda_client(&config)?;
            let broker: Arc<dyn Broker> = if config.dry_run {
                Arc::new(PaperBroker::new(client, *paper_equity))
            } else {
                Arc::new(client)
            };

            let mut bot = Bot::new(config.clone(), broker, cli.notifier()?)?;

            println!("\n=== FX Trend Bot ===");
            println!("Instruments: {}", config.instruments.join(", "));
            println!(
                "Session: {:02}:00-{:02}:59 UTC, Mon-Fri",
                config.trading_start_hour, config.trading_end_hour
            );
            println!("Polling interval: {}s", config.poll_interval_secs);
            println!(
                "Mode: {}",
                if config.dry_run { "DRY RUN (no real trades)" } else { "LIVE TRADING" }
            );
            println!("\nPress Ctrl+C to stop.\n");

            // Run the bot
            if let Err(e) = bot.run().await {
                tracing::error!(error = %e, "Bot error");
            }

            // Show final stats
            println!("\n{}", bot.stats());
            for trade in bot.book().iter() {
                println!(
                    "  still open: {} {} {} {} @ {:.5}",
                    trade.id, trade.side, trade.quantity, trade.instrument, trade.entry_price
                );
            }
        }

        Commands::Signal { instrument } => {
            let client = cli.oanda_client(&config)?;
            let bot = Bot::new(config.clone(), Arc::new(client), Arc::new(LogNotifier))?;

            let snapshot = bot.fetch_snapshot(instrument).await;
            println!("\n=== {} ===", instrument);
            println!(
                "Bars: {} {} / {} {} / {} {}",
                snapshot.base.len(),
                config.base_granularity,
                snapshot.medium.len(),
                config.medium_granularity,
                snapshot.fast.len(),
                config.fast_granularity
            );

            let Some(analysis) = bot.analyze(&snapshot) else {
                println!("Not enough data to evaluate (need {} base bars)", config.min_bars);
                return Ok(());
            };

            let row = analysis.row;
            let decision = analysis.decision;
            println!("\nIndicators:");
            println!("  Close:                {:.5}", row.close);
            println!("  RSI:                  {:.1}", row.rsi);
            println!("  MACD / Signal / Hist: {:.6} / {:.6} / {:.6}", row.macd, row.macd_signal, row.macd_histogram);
            println!("  ATR:                  {:.5}", row.atr);
            println!("  Bollinger:            {:.5} / {:.5} / {:.5}", row.bb_lower, row.bb_mid, row.bb_upper);
            println!("  ADX:                  {:.1}", row.adx);
            println!(
                "  Patterns:             engulfing={} hammer={}",
                row.pattern.bullish_engulfing, row.pattern.hammer
            );

            println!("\nDecision:");
            println!("  Base signal:          {}", decision.signal);
            println!("  {} trend:            {}", config.medium_granularity, decision.medium_trend);
            println!("  {} trend:             {}", config.fast_granularity, decision.fast_trend);
            println!("  Confirmed:            {}", decision.confirmed);
        }

        Commands::Balance => {
            let client = cli.oanda_client(&config)?;
            let equity = client.get_balance().await?;
            let open = client.open_trade_ids().await?;

            println!("\n=== Account ===");
            println!("Equity (NAV):  {:.2}", equity);
            println!("Open trades:   {}", open.len());
            for id in open {
                println!("  {}", id);
            }
        }

        Commands::Config => {
            println!("\n=== Bot Configuration ===\n");
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
