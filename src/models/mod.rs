//! Data models for bars, signals, trades, and instrument conventions.

mod bar;
mod instrument;
mod signal;
mod trade;

pub use bar::{Bar, Granularity, Series};
pub use instrument::{pip_size, price_precision};
pub use signal::{Side, Signal, Trend};
pub use trade::{ClosedTrade, CloseReason, OpenTrade, TradeId, TrailingState};
