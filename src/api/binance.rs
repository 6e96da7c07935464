use super::provider::CandleSource;
use crate::error::TradingError;
use crate::models::{exchange_symbol, normalize_instrument, Candle, Timeframe};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;

const BINANCE_API_BASE: &str = "https://api.binance.com";
const RATE_LIMIT_RPM: u32 = 600; // well under the 1200 weight/minute IP limit
const MAX_RETRIES: u32 = 3;
const MAX_KLINES: usize = 1000;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance spot market data client (public endpoints only)
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
    backoff_unit_ms: u64,
}

impl BinanceClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BINANCE_API_BASE)
    }

    /// Client against a different host, e.g. a mock server
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let rpm = NonZeroU32::new(RATE_LIMIT_RPM).context("rate limit must be non-zero")?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter,
            backoff_unit_ms: 1000,
        })
    }

    /// Scale retry backoff (1000 = whole seconds)
    pub fn with_backoff_unit_ms(mut self, unit_ms: u64) -> Self {
        self.backoff_unit_ms = unit_ms;
        self
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.backoff_unit_ms * 2u64.pow(attempt);
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }

    /// Make a rate-limited GET with retry on 429, 5xx and network errors
    async fn make_request(&self, url: &str) -> Result<reqwest::Response> {
        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if (status.as_u16() == 429 || status.is_server_error()) && attempt < MAX_RETRIES
                    {
                        tracing::warn!(
                            "Binance returned {}, backing off (attempt {}/{})",
                            status,
                            attempt,
                            MAX_RETRIES
                        );
                        self.backoff(attempt).await;
                        continue;
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    anyhow::bail!("Binance API error ({}): {}", status, error_text);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "Network error: {}, retrying (attempt {}/{})",
                        e,
                        attempt,
                        MAX_RETRIES
                    );
                    self.backoff(attempt).await;
                }
                Err(e) => anyhow::bail!("Network error after {} retries: {}", MAX_RETRIES, e),
            }
        }

        anyhow::bail!("Failed after {} retries", MAX_RETRIES)
    }

    /// Fetch closed candles, oldest first
    ///
    /// The still-forming last kline is dropped, so the newest candle returned
    /// is always a completed interval.
    pub async fn get_klines(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let instrument = normalize_instrument(instrument);
        // One extra to make up for the open kline we discard
        let limit = (limit + 1).min(MAX_KLINES);
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            exchange_symbol(&instrument),
            timeframe.binance_interval(),
            limit
        );

        let response = self.make_request(&url).await?;
        let rows: Vec<Vec<Value>> = response
            .json()
            .await
            .context("Failed to parse klines response")?;

        let now = Utc::now();
        let mut candles = Vec::with_capacity(rows.len());
        for row in &rows {
            let close_time = millis(row.get(6)).context("kline missing close time")?;
            if close_time > now {
                continue;
            }
            candles.push(parse_kline(&instrument, row)?);
        }

        tracing::debug!(
            "Fetched {} closed {} candles for {}",
            candles.len(),
            timeframe,
            instrument
        );

        Ok(candles)
    }
}

fn millis(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_i64)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

/// Binance sends prices and volumes as decimal strings
fn decimal_field(row: &[Value], index: usize, name: &str) -> Result<f64> {
    let value = row
        .get(index)
        .with_context(|| format!("kline missing {}", name))?;
    match value {
        Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("invalid {} '{}'", name, s)),
        Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("invalid {} {}", name, n)),
        other => anyhow::bail!("unexpected {} value {}", name, other),
    }
}

fn parse_kline(instrument: &str, row: &[Value]) -> Result<Candle> {
    Ok(Candle {
        instrument: instrument.to_string(),
        timestamp: millis(row.first()).context("kline missing open time")?,
        open: decimal_field(row, 1, "open")?,
        high: decimal_field(row, 2, "high")?,
        low: decimal_field(row, 3, "low")?,
        close: decimal_field(row, 4, "close")?,
        volume: decimal_field(row, 5, "volume")?,
    })
}

#[async_trait]
impl CandleSource for BinanceClient {
    async fn candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, TradingError> {
        self.get_klines(instrument, timeframe, limit)
            .await
            .map_err(|e| TradingError::DataUnavailable {
                instrument: instrument.to_string(),
                reason: format!("{:#}", e),
            })
    }
}
