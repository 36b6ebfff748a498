//! Bollinger Bands: SMA of close ± k population standard deviations.

use statrs::statistics::Statistics;

use super::moving_average::sma;

#[derive(Debug, Clone)]
pub struct Bollinger {
    pub upper: Vec<f64>,
    pub mid: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bands aligned with `closes`; defined from index `period - 1`.
pub fn bollinger(closes: &[f64], period: usize, k: f64) -> Bollinger {
    let n = closes.len();
    let mid = sma(closes, period);
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];

    if period > 0 && n >= period {
        for i in (period - 1)..n {
            let std_dev = closes[i + 1 - period..=i].iter().population_std_dev();
            upper[i] = mid[i] + k * std_dev;
            lower[i] = mid[i] - k * std_dev;
        }
    }

    Bollinger { upper, mid, lower }
}
