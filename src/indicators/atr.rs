//! Average True Range.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|), with the
//! first bar falling back to high-low. ATR is the simple trailing mean of TR.

use crate::models::Bar;

use super::moving_average::sma;

/// True range per bar.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let Some(first) = bars.first() else {
        return Vec::new();
    };

    std::iter::once(first.range())
        .chain(bars.windows(2).map(|w| {
            let (prev, cur) = (&w[0], &w[1]);
            cur.range()
                .max((cur.high - prev.close).abs())
                .max((cur.low - prev.close).abs())
        }))
        .collect()
}

/// ATR aligned with `bars`; defined from index `period - 1`.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    sma(&true_range(bars), period)
}
