//! Trading logic: signals, position sizing, position management, day state.

mod config;
mod day_state;
mod position_manager;
mod position_sizer;
mod signal_engine;

pub use config::{SignalRules, TradingConfig, TrendRules};
pub use day_state::DayState;
pub use position_manager::{kill_switch_triggered, PositionManager, PriceMap};
pub use position_sizer::PositionSizer;
pub use signal_engine::{Decision, SignalEngine};
