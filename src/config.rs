//! Layered configuration: optional TOML file under `CRYPTOTRADER_*` env vars
//!
//! Nested keys use `__`, e.g. `CRYPTOTRADER_TELEGRAM__BOT_TOKEN`. Every
//! section has defaults, so an empty configuration is valid.

use crate::adaptive::AdaptiveConfig;
use crate::error::TradingError;
use crate::execution::PositionConfig;
use crate::indicators::IndicatorParams;
use crate::models::{normalize_instrument, Timeframe};
use crate::strategy::SignalConfig;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "cryptotrader.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub trading: TradingConfig,
    pub market: MarketConfig,
    pub indicators: IndicatorParams,
    pub signals: SignalConfig,
    pub position: PositionConfig,
    pub adaptive: AdaptiveConfig,
    pub ledger: LedgerConfig,
    pub telegram: TelegramConfig,
    pub categories: CategoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Instruments started at launch
    pub instruments: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub poll_interval_secs: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            instruments: Vec::new(),
            timeframes: vec![Timeframe::H1],
            poll_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub base_url: String,
    pub history_candles: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            history_candles: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBackend {
    #[default]
    Jsonl,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    pub dir: String,
    pub book: String,
    pub database_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Jsonl,
            dir: "trading_results".to_string(),
            book: "trades".to_string(),
            database_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    /// Send a performance summary every N closed trades (0 disables)
    pub summary_every: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            summary_every: 10,
        }
    }
}

impl TelegramConfig {
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.bot_token, &self.chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token.clone(), chat.clone()))
            }
            _ => None,
        }
    }
}

/// Named groups of recommended instruments
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct CategoryConfig(pub BTreeMap<String, Vec<String>>);

impl Default for CategoryConfig {
    fn default() -> Self {
        let groups: [(&str, &[&str]); 5] = [
            ("major", &["BTC/USDT", "ETH/USDT", "BNB/USDT", "XRP/USDT"]),
            ("defi", &["UNI/USDT", "AAVE/USDT", "LINK/USDT", "MKR/USDT"]),
            ("layer1", &["SOL/USDT", "ADA/USDT", "AVAX/USDT", "DOT/USDT"]),
            ("layer2", &["ARB/USDT", "OP/USDT", "POL/USDT"]),
            ("meme", &["DOGE/USDT", "SHIB/USDT", "PEPE/USDT"]),
        ];
        Self(
            groups
                .iter()
                .map(|(name, coins)| {
                    (
                        name.to_string(),
                        coins.iter().map(|c| c.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }
}

impl CategoryConfig {
    /// Instruments in a category, normalised; None for unknown names
    pub fn instruments(&self, category: &str) -> Option<Vec<String>> {
        self.0
            .get(&category.to_ascii_lowercase())
            .map(|coins| coins.iter().map(|c| normalize_instrument(c)).collect())
    }

    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

impl AppConfig {
    /// Load from an optional file plus the environment
    ///
    /// A missing default file is fine; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, TradingError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("CRYPTOTRADER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("trading.instruments")
                    .with_list_parse_key("trading.timeframes"),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TradingError> {
        if self.trading.poll_interval_secs == 0 {
            return Err(TradingError::Config(
                "trading.poll_interval_secs must be positive".to_string(),
            ));
        }
        let tps = &self.position.take_profit_pcts;
        if tps.is_empty() || tps.windows(2).any(|w| w[0] >= w[1]) || tps[0] <= 0.0 {
            return Err(TradingError::Config(
                "position.take_profit_pcts must be positive and ascending".to_string(),
            ));
        }
        if self.position.stop_loss_pct <= 0.0 {
            return Err(TradingError::Config(
                "position.stop_loss_pct must be positive".to_string(),
            ));
        }
        if self.ledger.backend == LedgerBackend::Postgres && self.ledger.database_url.is_none() {
            return Err(TradingError::Config(
                "ledger.database_url is required for the postgres backend".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trading.poll_interval_secs, 60);
        assert_eq!(config.trading.timeframes, vec![Timeframe::H1]);
        assert_eq!(config.ledger.dir, "trading_results");
        assert_eq!(config.ledger.book, "trades");
        assert_eq!(config.telegram.summary_every, 10);
        assert!(config.telegram.credentials().is_none());
        assert_eq!(config.position.min_confidence, 70.0);
    }

    #[test]
    fn test_categories() {
        let categories = CategoryConfig::default();
        assert_eq!(
            categories.names(),
            vec!["defi", "layer1", "layer2", "major", "meme"]
        );
        let major = categories.instruments("MAJOR").unwrap();
        assert!(major.contains(&"BTC/USDT".to_string()));
        assert!(categories.instruments("nft").is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
            [trading]
            instruments = ["btcusdt", "ETH/USDT"]
            timeframes = ["15m", "4h"]

            [position]
            strict_mode = true

            [adaptive]
            boost_mode = "multiplicative"

            [categories]
            ai = ["FET/USDT"]
        "#;
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.trading.instruments.len(), 2);
        assert_eq!(config.trading.timeframes, vec![Timeframe::M15, Timeframe::H4]);
        assert_eq!(config.trading.poll_interval_secs, 60);
        assert_eq!(config.position.required_confidence(), 80.0);
        assert_eq!(
            config.adaptive.boost_mode,
            crate::adaptive::BoostMode::Multiplicative
        );
        assert_eq!(config.categories.instruments("ai").unwrap(), vec!["FET/USDT"]);
    }

    #[test]
    fn test_validation_rejects_bad_targets() {
        let mut config = AppConfig::default();
        config.position.take_profit_pcts = vec![4.0, 2.0];
        assert!(matches!(config.validate(), Err(TradingError::Config(_))));

        let mut config = AppConfig::default();
        config.ledger.backend = LedgerBackend::Postgres;
        assert!(config.validate().is_err());
    }
}
