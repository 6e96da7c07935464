/// Calculate Simple Moving Average (SMA) of the last `period` values
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Exponential Moving Average for every point of the series
///
/// Entry `i` is `None` until `period` values are available; the first
/// value is seeded with the SMA of the first `period` prices.
pub fn ema_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = prices[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(ema);

    for (i, price) in prices.iter().enumerate().skip(period) {
        ema = (price - ema) * multiplier + ema;
        out[i] = Some(ema);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        assert_eq!(calculate_sma(&prices, 5), Some(104.0));
        assert_eq!(calculate_sma(&prices, 2), Some(107.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        assert!(calculate_sma(&prices, 5).is_none());
    }

    #[test]
    fn test_ema() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let ema = ema_series(&prices, 5).last().copied().flatten().unwrap();
        assert!(ema > 104.0); // above the seed SMA in a rising series
        assert!(ema < 110.0);
    }

    #[test]
    fn test_ema_series_alignment() {
        let prices = vec![1.0, 2.0, 3.0, 4.0];
        let series = ema_series(&prices, 3);
        assert_eq!(series.len(), 4);
        assert!(series[0].is_none());
        assert!(series[1].is_none());
        assert_eq!(series[2], Some(2.0));
        assert_eq!(series[3], Some(3.0)); // (4 - 2) * 0.5 + 2
    }
}
