//! Instrument conventions for currency pairs named like "EUR_USD".

/// Price of one pip: 0.01 for JPY-quoted pairs, 0.0001 otherwise.
pub fn pip_size(instrument: &str) -> f64 {
    if is_jpy_quoted(instrument) {
        0.01
    } else {
        0.0001
    }
}

/// Decimal places the broker accepts on order prices.
pub fn price_precision(instrument: &str) -> u32 {
    if is_jpy_quoted(instrument) {
        3
    } else {
        5
    }
}

fn is_jpy_quoted(instrument: &str) -> bool {
    instrument
        .rsplit('_')
        .next()
        .is_some_and(|quote| quote.eq_ignore_ascii_case("JPY"))
}
