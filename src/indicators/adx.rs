//! Average Directional Index using Wilder smoothing.
//!
//! +DM / -DM are mutually exclusive: only the larger of the up-move and
//! down-move counts, and only when positive. A zero +DI + -DI sum yields
//! DX = 0.

use crate::models::Bar;

use super::atr::true_range;
use super::moving_average::wilder;

/// ADX aligned with `bars`; reported from index `2 * period - 1`.
pub fn adx(bars: &[Bar], period: usize) -> Vec<f64> {
    let n = bars.len();
    if n == 0 || period == 0 {
        return vec![f64::NAN; n];
    }

    let (plus_dm, minus_dm) = directional_movement(bars);
    let tr_smooth = wilder(&true_range(bars), period);
    let plus_smooth = wilder(&plus_dm, period);
    let minus_smooth = wilder(&minus_dm, period);

    let dx: Vec<f64> = (0..n)
        .map(|i| {
            let plus_di = directional_index(plus_smooth[i], tr_smooth[i]);
            let minus_di = directional_index(minus_smooth[i], tr_smooth[i]);
            let sum = plus_di + minus_di;
            if sum == 0.0 {
                0.0
            } else {
                100.0 * (plus_di - minus_di).abs() / sum
            }
        })
        .collect();

    let mut out = wilder(&dx, period);
    let warmup = (2 * period - 1).min(n);
    out[..warmup].iter_mut().for_each(|v| *v = f64::NAN);
    out
}

fn directional_movement(bars: &[Bar]) -> (Vec<f64>, Vec<f64>) {
    let mut plus = vec![0.0; bars.len()];
    let mut minus = vec![0.0; bars.len()];

    for i in 1..bars.len() {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        if up > down && up > 0.0 {
            plus[i] = up;
        } else if down > up && down > 0.0 {
            minus[i] = down;
        }
    }
    (plus, minus)
}

fn directional_index(smoothed_dm: f64, smoothed_tr: f64) -> f64 {
    if smoothed_tr > 0.0 {
        100.0 * smoothed_dm / smoothed_tr
    } else {
        0.0
    }
}
