use super::moving_average::calculate_sma;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger Bands over the last `period` prices
///
/// Middle band is the SMA, outer bands sit `std_devs` sample standard
/// deviations away from it.
pub fn calculate_bollinger(prices: &[f64], period: usize, std_devs: f64) -> Option<BollingerBands> {
    if period < 2 {
        return None;
    }
    let middle = calculate_sma(prices, period)?;
    let window = &prices[prices.len() - period..];
    let variance =
        window.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / (period as f64 - 1.0);
    let width = variance.sqrt() * std_devs;

    Some(BollingerBands {
        upper: middle + width,
        middle,
        lower: middle - width,
    })
}
