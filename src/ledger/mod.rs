// Trade ledger: durable history of closed trades and aggregate statistics
pub mod store;

pub use store::{JsonlTradeStore, TradeStore};

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::config::{LedgerBackend, LedgerConfig};
use crate::db::PostgresTradeStore;
use crate::error::TradingError;
use crate::models::ClosedTrade;

/// Aggregate performance over a set of closed trades
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerStatistics {
    pub total_trades: usize,
    pub success_rate: f64, // percent of trades with positive P/L
    pub avg_profit: f64,
    pub max_profit: f64,
    pub max_loss: f64, // lowest P/L seen
}

impl LedgerStatistics {
    pub fn from_trades<'a>(trades: impl IntoIterator<Item = &'a ClosedTrade>) -> Self {
        let pnls: Vec<f64> = trades.into_iter().map(|t| t.profit_loss_pct).collect();
        if pnls.is_empty() {
            return Self::default();
        }

        let n = pnls.len() as f64;
        let wins = pnls.iter().filter(|p| **p > 0.0).count() as f64;
        Self {
            total_trades: pnls.len(),
            success_rate: wins / n * 100.0,
            avg_profit: pnls.iter().sum::<f64>() / n,
            max_profit: pnls.iter().copied().fold(f64::MIN, f64::max),
            max_loss: pnls.iter().copied().fold(f64::MAX, f64::min),
        }
    }
}

const ALL_INSTRUMENTS: &str = "*";

/// Open the configured trade store
pub async fn open_store(config: &LedgerConfig) -> Result<Arc<dyn TradeStore>, TradingError> {
    match config.backend {
        LedgerBackend::Jsonl => Ok(Arc::new(JsonlTradeStore::new(&config.dir, &config.book))),
        LedgerBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                TradingError::Config("ledger.database_url is not set".to_string())
            })?;
            Ok(Arc::new(PostgresTradeStore::connect(url, &config.book).await?))
        }
    }
}

/// In-memory trade history backed by a durable store
///
/// Appends keep the record in memory even when the store fails; failed
/// writes are queued and retried ahead of the next append.
pub struct TradeLedger {
    store: Arc<dyn TradeStore>,
    trades: Vec<ClosedTrade>,
    unpersisted: VecDeque<ClosedTrade>,
    stats_cache: HashMap<String, LedgerStatistics>,
}

impl TradeLedger {
    /// Load the full history from the store
    pub async fn open(store: Arc<dyn TradeStore>) -> Result<Self, TradingError> {
        let trades = store.load_all().await?;
        Ok(Self {
            store,
            trades,
            unpersisted: VecDeque::new(),
            stats_cache: HashMap::new(),
        })
    }

    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Trades held in memory that the store has not accepted yet
    pub fn pending_writes(&self) -> usize {
        self.unpersisted.len()
    }

    pub fn store_description(&self) -> String {
        self.store.describe()
    }

    /// Record a closed trade
    ///
    /// The trade is in memory (and in statistics) as soon as this is called.
    /// Each write is retried once; if it still fails the error is returned
    /// for the operator and the trade stays queued for the next append.
    pub async fn append(&mut self, trade: ClosedTrade) -> Result<(), TradingError> {
        self.trades.push(trade.clone());
        self.stats_cache.clear();
        self.unpersisted.push_back(trade);

        while let Some(next) = self.unpersisted.front() {
            if let Err(e) = self.write_with_retry(next).await {
                tracing::error!(
                    "💾 Ledger write failed for trade {} ({} pending): {}",
                    next.id,
                    self.unpersisted.len(),
                    e
                );
                return Err(TradingError::Persistence(format!(
                    "trade {} kept in memory, {} write(s) pending: {}",
                    next.id,
                    self.unpersisted.len(),
                    e
                )));
            }
            self.unpersisted.pop_front();
        }
        Ok(())
    }

    async fn write_with_retry(&self, trade: &ClosedTrade) -> Result<(), TradingError> {
        match self.store.append(trade).await {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::warn!("Ledger write failed, retrying once: {}", first);
                self.store.append(trade).await
            }
        }
    }

    /// Statistics for one instrument, cached until the next append
    pub fn statistics(&mut self, instrument: &str) -> LedgerStatistics {
        if let Some(stats) = self.stats_cache.get(instrument) {
            return stats.clone();
        }
        let stats =
            LedgerStatistics::from_trades(self.trades.iter().filter(|t| t.instrument == instrument));
        self.stats_cache.insert(instrument.to_string(), stats.clone());
        stats
    }

    /// Statistics across every instrument
    pub fn overall_statistics(&mut self) -> LedgerStatistics {
        if let Some(stats) = self.stats_cache.get(ALL_INSTRUMENTS) {
            return stats.clone();
        }
        let stats = LedgerStatistics::from_trades(&self.trades);
        self.stats_cache
            .insert(ALL_INSTRUMENTS.to_string(), stats.clone());
        stats
    }
}
