use super::moving_average::ema_series;

/// MACD line, signal line and histogram at one point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD for every point of the series
///
/// The MACD line is `EMA(fast) - EMA(slow)`, the signal line is the EMA of
/// the MACD line over `signal_period`. Entries stay `None` until both the
/// line and its signal are defined.
pub fn macd_series(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Vec<Option<MacdValue>> {
    let fast_ema = ema_series(prices, fast);
    let slow_ema = ema_series(prices, slow);

    let line: Vec<(usize, f64)> = fast_ema
        .iter()
        .zip(&slow_ema)
        .enumerate()
        .filter_map(|(i, (f, s))| Some((i, (*f)? - (*s)?)))
        .collect();

    let line_values: Vec<f64> = line.iter().map(|(_, v)| *v).collect();
    let signal = ema_series(&line_values, signal_period);

    let mut out = vec![None; prices.len()];
    for ((i, macd), signal) in line.into_iter().zip(signal) {
        if let Some(signal) = signal {
            out[i] = Some(MacdValue {
                macd,
                signal,
                histogram: macd - signal,
            });
        }
    }
    out
}
