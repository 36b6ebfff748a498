//! Technical indicators computed over a price series.
//!
//! Every function returns values aligned 1:1 with its input. Indices inside
//! an indicator's warm-up window hold `NaN` and must be excluded before use;
//! [`IndicatorSet::row`] only yields rows where every value is defined.

mod adx;
mod atr;
mod bollinger;
mod macd;
mod moving_average;
mod patterns;
mod rsi;

pub use adx::adx;
pub use atr::atr;
pub use bollinger::{bollinger, Bollinger};
pub use macd::{macd, Macd};
pub use moving_average::sma;
pub use patterns::{candle_patterns, CandlePattern};
pub use rsi::rsi;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::models::Series;

/// Indicator periods.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub atr_period: usize,
    pub bollinger_period: usize,
    /// Band width in standard deviations
    pub bollinger_k: f64,
    pub adx_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            atr_period: 14,
            bollinger_period: 20,
            bollinger_k: 2.0,
            adx_period: 14,
        }
    }
}

impl IndicatorParams {
    /// Bars needed before every indicator is defined.
    pub fn warmup_bars(&self) -> usize {
        [
            self.rsi_period + 1,
            self.macd_slow + self.macd_signal - 1,
            self.atr_period,
            self.bollinger_period,
            2 * self.adx_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, period) in [
            ("rsi_period", self.rsi_period),
            ("macd_fast", self.macd_fast),
            ("macd_signal", self.macd_signal),
            ("atr_period", self.atr_period),
            ("bollinger_period", self.bollinger_period),
            ("adx_period", self.adx_period),
        ] {
            ensure!(period >= 1, "{} must be at least 1", name);
        }
        ensure!(
            self.macd_fast < self.macd_slow,
            "macd_fast ({}) must be below macd_slow ({})",
            self.macd_fast,
            self.macd_slow
        );
        ensure!(self.bollinger_k > 0.0, "bollinger_k must be positive");
        Ok(())
    }
}

/// Latest values of every indicator for one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorRow {
    pub close: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub atr: f64,
    pub bb_upper: f64,
    pub bb_mid: f64,
    pub bb_lower: f64,
    pub adx: f64,
    pub pattern: CandlePattern,
}

/// All indicators for a series, aligned with its bars.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    pub close: Vec<f64>,
    pub rsi: Vec<f64>,
    pub macd: Macd,
    pub atr: Vec<f64>,
    pub bollinger: Bollinger,
    pub adx: Vec<f64>,
    pub patterns: Vec<CandlePattern>,
}

impl IndicatorSet {
    pub fn compute(series: &Series, params: &IndicatorParams) -> Self {
        let bars = series.bars();
        let close = series.closes();

        Self {
            rsi: rsi(&close, params.rsi_period),
            macd: macd(&close, params.macd_fast, params.macd_slow, params.macd_signal),
            atr: atr(bars, params.atr_period),
            bollinger: bollinger(&close, params.bollinger_period, params.bollinger_k),
            adx: adx(bars, params.adx_period),
            patterns: candle_patterns(bars).collect(),
            close,
        }
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Row `i`, or `None` if any value there is still warming up.
    pub fn row(&self, i: usize) -> Option<IndicatorRow> {
        if i >= self.len() {
            return None;
        }

        let row = IndicatorRow {
            close: self.close[i],
            rsi: self.rsi[i],
            macd: self.macd.line[i],
            macd_signal: self.macd.signal[i],
            macd_histogram: self.macd.histogram[i],
            atr: self.atr[i],
            bb_upper: self.bollinger.upper[i],
            bb_mid: self.bollinger.mid[i],
            bb_lower: self.bollinger.lower[i],
            adx: self.adx[i],
            pattern: self.patterns[i],
        };

        let values = [
            row.close,
            row.rsi,
            row.macd,
            row.macd_signal,
            row.macd_histogram,
            row.atr,
            row.bb_upper,
            row.bb_mid,
            row.bb_lower,
            row.adx,
        ];
        values.iter().all(|v| v.is_finite()).then_some(row)
    }

    /// The most recent row, if it is fully warmed up.
    pub fn latest(&self) -> Option<IndicatorRow> {
        if self.is_empty() {
            return None;
        }
        self.row(self.len() - 1)
    }
}
