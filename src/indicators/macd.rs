//! Moving Average Convergence Divergence.

use super::moving_average::ema;

/// MACD line, signal line, and histogram aligned with the input closes.
#[derive(Debug, Clone)]
pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD over `closes`.
///
/// The line is reported from index `slow - 1`; signal and histogram from
/// `slow + signal - 2`. Earlier values are `NaN`.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let ema_fast = ema(closes, fast);
    let ema_slow = ema(closes, slow);

    let mut line: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();
    let mut signal_line = ema(&line, signal);
    let mut histogram: Vec<f64> = line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();

    let line_warmup = slow.saturating_sub(1);
    let signal_warmup = (slow + signal).saturating_sub(2);
    mask(&mut line, line_warmup);
    mask(&mut signal_line, signal_warmup);
    mask(&mut histogram, signal_warmup);

    Macd {
        line,
        signal: signal_line,
        histogram,
    }
}

fn mask(values: &mut [f64], warmup: usize) {
    let end = warmup.min(values.len());
    values[..end].iter_mut().for_each(|v| *v = f64::NAN);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closes(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 1.2 + 0.002 * (i as f64 * 0.3).sin() + 0.0001 * i as f64)
            .collect()
    }

    #[test]
    fn test_histogram_is_line_minus_signal() {
        let out = macd(&closes(120), 12, 26, 9);
        for i in 0..120 {
            if out.histogram[i].is_nan() {
                continue;
            }
            let expected = out.line[i] - out.signal[i];
            assert!((out.histogram[i] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_warmup_masking() {
        let out = macd(&closes(60), 12, 26, 9);
        assert!(out.line[24].is_nan());
        assert!(out.line[25].is_finite());
        assert!(out.signal[32].is_nan());
        assert!(out.signal[33].is_finite());
        assert!(out.histogram[33].is_finite());
    }

    #[test]
    fn test_constant_series_has_zero_macd() {
        let out = macd(&[1.5; 50], 12, 26, 9);
        assert!(out.line[49].abs() < 1e-12);
        assert!(out.histogram[49].abs() < 1e-12);
    }
}
