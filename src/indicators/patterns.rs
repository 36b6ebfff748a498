//! Candlestick pattern detection over consecutive bar pairs.

use crate::models::Bar;

/// Body may be at most this share of the high-low range for a hammer.
const HAMMER_MAX_BODY_RATIO: f64 = 0.3;
/// Lower shadow must be at least this multiple of the body for a hammer.
const HAMMER_MIN_SHADOW_RATIO: f64 = 2.0;

/// Pattern flags for one bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandlePattern {
    pub bullish_engulfing: bool,
    pub hammer: bool,
}

impl CandlePattern {
    /// Flags for `current` given the bar before it.
    pub fn detect(previous: &Bar, current: &Bar) -> Self {
        Self {
            bullish_engulfing: is_bullish_engulfing(previous, current),
            hammer: is_hammer(current),
        }
    }

    pub fn is_bullish(&self) -> bool {
        self.bullish_engulfing || self.hammer
    }
}

/// Bearish bar followed by a bullish bar whose body brackets the previous body.
pub fn is_bullish_engulfing(previous: &Bar, current: &Bar) -> bool {
    previous.is_bearish()
        && current.is_bullish()
        && current.close > previous.open
        && current.open < previous.close
}

/// Small body with a long lower shadow.
pub fn is_hammer(bar: &Bar) -> bool {
    let body = bar.body();
    body <= HAMMER_MAX_BODY_RATIO * bar.range() && bar.lower_shadow() >= HAMMER_MIN_SHADOW_RATIO * body
}

/// Pattern flags aligned 1:1 with `bars`.
///
/// The first bar has no predecessor and carries no flags. The iterator holds
/// no state beyond its position, so cloning it restarts the scan.
pub fn candle_patterns(bars: &[Bar]) -> impl Iterator<Item = CandlePattern> + Clone + '_ {
    bars.first()
        .map(|_| CandlePattern::default())
        .into_iter()
        .chain(bars.windows(2).map(|w| CandlePattern::detect(&w[0], &w[1])))
}
