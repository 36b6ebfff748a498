//! Relative Strength Index.
//!
//! Average gain and loss are simple means over the trailing `period`
//! close-to-close deltas. A zero average loss is replaced by a small epsilon
//! so the ratio stays finite.

const ZERO_LOSS_EPSILON: f64 = 1e-10;

/// RSI aligned with `closes`; `NaN` for indices below `period`.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return out;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    // deltas[i - 1] is the change into bar i
    for i in period..n {
        let window = &deltas[i - period..i];
        let avg_gain = window.iter().map(|d| d.max(0.0)).sum::<f64>() / period as f64;
        let avg_loss = window.iter().map(|d| (-d).max(0.0)).sum::<f64>() / period as f64;

        let avg_loss = if avg_loss == 0.0 {
            ZERO_LOSS_EPSILON
        } else {
            avg_loss
        };
        let rs = avg_gain / avg_loss;
        out[i] = 100.0 - 100.0 / (1.0 + rs);
    }
    out
}
