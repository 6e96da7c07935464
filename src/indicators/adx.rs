/// Average Directional Index (ADX) - Measures trend strength
///
/// ADX ranges from 0 to 100:
/// - ADX > 25: Strong trend (bull or bear)
/// - ADX 20-25: Moderate trend
/// - ADX < 20: Weak trend / choppy / ranging market
///
/// Also returns +DI and -DI to determine trend direction:
/// - +DI > -DI: Uptrend
/// - -DI > +DI: Downtrend

use crate::models::Candle;

/// Calculate ADX, +DI, and -DI for trend strength and direction
///
/// ADX is the Wilder-smoothed DX once `2 * period` candles are available.
/// With fewer candles the latest DX stands in for it.
///
/// Returns (adx, plus_di, minus_di) or None if insufficient data
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<(f64, f64, f64)> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    // True Range and Directional Movement for each consecutive pair
    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    let mut plus_dms = Vec::with_capacity(candles.len() - 1);
    let mut minus_dms = Vec::with_capacity(candles.len() - 1);

    for pair in candles.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);

        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
        true_ranges.push(tr);

        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;
        plus_dms.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus_dms.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });
    }

    let smoothed_tr = wilder_series(&true_ranges, period);
    let smoothed_plus = wilder_series(&plus_dms, period);
    let smoothed_minus = wilder_series(&minus_dms, period);

    let mut dx_values = Vec::with_capacity(smoothed_tr.len());
    let mut last_di = (0.0, 0.0);
    for ((tr, plus), minus) in smoothed_tr.iter().zip(&smoothed_plus).zip(&smoothed_minus) {
        let (plus_di, minus_di) = if *tr > 0.0 {
            (plus / tr * 100.0, minus / tr * 100.0)
        } else {
            (0.0, 0.0)
        };
        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            (plus_di - minus_di).abs() / di_sum * 100.0
        } else {
            0.0
        };
        dx_values.push(dx);
        last_di = (plus_di, minus_di);
    }

    let latest_dx = *dx_values.last()?;
    let adx = wilder_series(&dx_values, period)
        .last()
        .copied()
        .unwrap_or(latest_dx);

    Some((adx, last_di.0, last_di.1))
}

/// Wilder's running smoothing, one value per input from index `period - 1`
fn wilder_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.len() < period {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut smoothed = values[..period].iter().sum::<f64>() / period as f64;
    out.push(smoothed);

    for value in &values[period..] {
        smoothed = (smoothed * (period as f64 - 1.0) + value) / period as f64;
        out.push(smoothed);
    }

    out
}
