/// Rolling volatility: sample standard deviation of the last `period`
/// close-to-close returns, in percent
pub fn calculate_volatility(prices: &[f64], period: usize) -> Option<f64> {
    if period < 2 || prices.len() < period + 1 {
        return None;
    }

    let window = &prices[prices.len() - period - 1..];
    let returns: Vec<f64> = window
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .collect();
    if returns.len() < 2 {
        return None;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() as f64 - 1.0);
    Some(variance.sqrt() * 100.0)
}

/// Latest volume relative to the mean of the last `period` volumes
pub fn calculate_volume_ratio(volumes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || volumes.len() < period {
        return None;
    }
    let avg = volumes.iter().rev().take(period).sum::<f64>() / period as f64;
    if avg <= 0.0 {
        return None;
    }
    volumes.last().map(|v| v / avg)
}
