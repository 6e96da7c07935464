use crate::models::{normalize_instrument, Candle, Timeframe};
use chrono::{DateTime, DurationRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::str::FromStr;

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise (+0.3% per candle on average)
    Uptrend,
    /// Steady downtrend with noise (-0.3% per candle on average)
    Downtrend,
    /// Choppy range around the base price
    Sideways,
    /// Quiet base, sharp pump, then a slower bleed below the start
    PumpAndDump,
    /// Large swings (±4% per candle)
    Volatile,
}

impl MarketScenario {
    pub const ALL: [MarketScenario; 5] = [
        MarketScenario::Uptrend,
        MarketScenario::Downtrend,
        MarketScenario::Sideways,
        MarketScenario::PumpAndDump,
        MarketScenario::Volatile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketScenario::Uptrend => "uptrend",
            MarketScenario::Downtrend => "downtrend",
            MarketScenario::Sideways => "sideways",
            MarketScenario::PumpAndDump => "pump-and-dump",
            MarketScenario::Volatile => "volatile",
        }
    }
}

impl FromStr for MarketScenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MarketScenario::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("Unknown scenario: {}", s))
    }
}

/// Generates seeded candle series for tests and replays
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
    end_time: Option<DateTime<Utc>>,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 100.0,
            base_volume: 1_000_000.0,
            end_time: None,
        }
    }

    pub fn with_base_price(mut self, price: f64) -> Self {
        self.base_price = price;
        self
    }

    /// Open time of the last candle (defaults to the last closed interval)
    pub fn ending_at(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// Generate closed candles for a scenario, oldest first
    pub fn generate(
        &mut self,
        instrument: &str,
        scenario: MarketScenario,
        num_candles: usize,
        timeframe: Timeframe,
    ) -> Vec<Candle> {
        let interval = timeframe.as_chrono();
        let last_open = match self.end_time {
            Some(end) => end,
            None => {
                let now = Utc::now();
                now.duration_trunc(interval).unwrap_or(now) - interval
            }
        };
        let start_time = last_open - interval * (num_candles.saturating_sub(1) as i32);
        let instrument = normalize_instrument(instrument);

        let mut candles = Vec::with_capacity(num_candles);
        let mut price = self.base_price;

        for i in 0..num_candles {
            let timestamp = start_time + interval * (i as i32);
            let (change, volume_factor) = self.step(scenario, i, num_candles, price);
            price = (price * (1.0 + change)).max(self.base_price * 0.01);
            candles.push(self.create_candle(&instrument, price, timestamp, volume_factor));
        }

        candles
    }

    /// Fractional price change and volume multiplier for candle `i`
    fn step(&mut self, scenario: MarketScenario, i: usize, n: usize, price: f64) -> (f64, f64) {
        match scenario {
            MarketScenario::Uptrend => (0.003 + self.rng.gen_range(-0.006..0.006), 1.0),
            MarketScenario::Downtrend => (-0.003 + self.rng.gen_range(-0.006..0.006), 1.0),
            MarketScenario::Sideways => {
                // Pull back toward the base price keeps the series in a range
                let pull = (self.base_price - price) / self.base_price * 0.1;
                (pull + self.rng.gen_range(-0.008..0.008), 1.0)
            }
            MarketScenario::PumpAndDump => {
                let pump_start = n / 2;
                let pump_end = pump_start + (n / 20).max(3);
                if i < pump_start {
                    (self.rng.gen_range(-0.004..0.004), 1.0)
                } else if i < pump_end {
                    (0.05 + self.rng.gen_range(-0.01..0.02), 3.0)
                } else {
                    (-0.012 + self.rng.gen_range(-0.01..0.008), 1.6)
                }
            }
            MarketScenario::Volatile => (self.rng.gen_range(-0.04..0.04), 1.4),
        }
    }

    fn create_candle(
        &mut self,
        instrument: &str,
        price: f64,
        timestamp: DateTime<Utc>,
        volume_factor: f64,
    ) -> Candle {
        let noise_pct = 0.004; // intrabar movement

        let high = price * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = price * (1.0 - self.rng.gen_range(0.0..noise_pct));
        let open = (price * (1.0 + self.rng.gen_range(-noise_pct..noise_pct))).clamp(low, high);
        let volume = self.base_volume * volume_factor * self.rng.gen_range(0.7..1.3);

        Candle {
            instrument: instrument.to_string(),
            timestamp,
            open,
            high,
            low,
            close: price,
            volume,
        }
    }
}

/// Convenience for tests: series ending at a fixed time
pub fn fixed_series(
    seed: u64,
    instrument: &str,
    scenario: MarketScenario,
    num_candles: usize,
    timeframe: Timeframe,
    end_time: DateTime<Utc>,
) -> Vec<Candle> {
    SyntheticDataGenerator::new(seed)
        .ending_at(end_time)
        .generate(instrument, scenario, num_candles, timeframe)
}
