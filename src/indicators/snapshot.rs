use super::{
    adx::calculate_adx,
    bollinger::calculate_bollinger,
    macd::macd_series,
    moving_average::{calculate_sma, ema_series},
    rsi::calculate_rsi,
    volatility::{calculate_volatility, calculate_volume_ratio},
};
use crate::error::TradingError;
use crate::models::{Candle, IndicatorSnapshot};
use serde::Deserialize;

/// Indicator windows used to build snapshots
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_std_devs: f64,
    pub adx_period: usize,
    pub volatility_period: usize,
    pub volume_period: usize,
    pub min_candles: usize, // below this the provider reports insufficient history
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_std_devs: 2.0,
            adx_period: 14,
            volatility_period: 20,
            volume_period: 20,
            min_candles: 60,
        }
    }
}

/// Build the last `window` indicator snapshots for a closed-candle series
///
/// Snapshots are returned oldest first. Any value the math cannot produce
/// (division by zero, NaN) is replaced by a neutral default so downstream
/// scoring never sees NaN.
pub fn build_snapshots(
    candles: &[Candle],
    window: usize,
    params: &IndicatorParams,
) -> Result<Vec<IndicatorSnapshot>, TradingError> {
    let need = params.min_candles.max(window);
    if candles.len() < need {
        return Err(TradingError::InsufficientHistory {
            have: candles.len(),
            need,
        });
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    let ema_9 = ema_series(&closes, 9);
    let ema_21 = ema_series(&closes, 21);
    let macd = macd_series(&closes, params.macd_fast, params.macd_slow, params.macd_signal);

    let start = candles.len() - window;
    let snapshots = (start..candles.len())
        .map(|i| {
            let candle = &candles[i];
            let close = candle.close;
            let prices = &closes[..=i];

            let bands = calculate_bollinger(prices, params.bb_period, params.bb_std_devs);
            let adx = calculate_adx(&candles[..=i], params.adx_period);
            let macd = macd[i];

            IndicatorSnapshot {
                timestamp: candle.timestamp,
                close,
                volume: finite_or(Some(candle.volume), 0.0),
                rsi: finite_or(calculate_rsi(prices, params.rsi_period), 50.0),
                macd: finite_or(macd.map(|m| m.macd), 0.0),
                macd_signal: finite_or(macd.map(|m| m.signal), 0.0),
                macd_histogram: finite_or(macd.map(|m| m.histogram), 0.0),
                bb_upper: finite_or(bands.map(|b| b.upper), close),
                bb_middle: finite_or(bands.map(|b| b.middle), close),
                bb_lower: finite_or(bands.map(|b| b.lower), close),
                adx: finite_or(adx.map(|a| a.0), 0.0),
                plus_di: finite_or(adx.map(|a| a.1), 0.0),
                minus_di: finite_or(adx.map(|a| a.2), 0.0),
                sma_20: finite_or(calculate_sma(prices, 20), close),
                sma_50: finite_or(calculate_sma(prices, 50), close),
                ema_9: finite_or(ema_9[i], close),
                ema_21: finite_or(ema_21[i], close),
                volatility: finite_or(calculate_volatility(prices, params.volatility_period), 0.0),
                volume_ratio: finite_or(
                    calculate_volume_ratio(&volumes[..=i], params.volume_period),
                    1.0,
                ),
            }
        })
        .collect();

    Ok(snapshots)
}

fn finite_or(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        Some(v) => {
            tracing::debug!("Non-finite indicator value {} replaced by {}", v, default);
            default
        }
        None => default,
    }
}
