use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::TradingError;
use crate::models::ClosedTrade;

/// Durable, append-only storage for closed trades
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn append(&self, trade: &ClosedTrade) -> Result<(), TradingError>;

    /// Every stored trade, oldest first
    async fn load_all(&self) -> Result<Vec<ClosedTrade>, TradingError>;

    fn describe(&self) -> String;
}

/// One rolling JSON-lines file per book: `{dir}/{book}.jsonl`
pub struct JsonlTradeStore {
    path: PathBuf,
}

impl JsonlTradeStore {
    pub fn new(dir: impl AsRef<Path>, book: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.jsonl", book)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TradeStore for JsonlTradeStore {
    async fn append(&self, trade: &ClosedTrade) -> Result<(), TradingError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let record = serde_json::to_string(trade)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        // Terminate a torn tail first so this record starts on its own line
        let mut line = String::with_capacity(record.len() + 2);
        let len = file.metadata().await?.len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(std::io::SeekFrom::Start(len - 1)).await?;
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                tracing::warn!(
                    "Ledger {} ends with a partial line, starting a new one",
                    self.path.display()
                );
                line.push('\n');
            }
        }
        line.push_str(&record);
        line.push('\n');

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!("Appended trade {} to {}", trade.id, self.path.display());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ClosedTrade>, TradingError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut trades = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ClosedTrade>(line) {
                Ok(trade) => trades.push(trade),
                // A torn final line after a crash should not hide the rest
                Err(e) => tracing::warn!(
                    "Skipping unreadable ledger line {} in {}: {}",
                    i + 1,
                    self.path.display(),
                    e
                ),
            }
        }

        tracing::info!("Loaded {} trades from {}", trades.len(), self.path.display());
        Ok(trades)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExitReason, Side, Timeframe};
    use crate::strategy::classify_trend;
    use crate::test_support::{base_time, snapshot_at};
    use uuid::Uuid;

    fn trade(pnl: f64) -> ClosedTrade {
        let snapshot = snapshot_at(100.0, 0);
        ClosedTrade {
            id: Uuid::new_v4(),
            instrument: "BTC/USDT".to_string(),
            timeframe: Timeframe::H1,
            side: Side::Long,
            entry_price: 100.0,
            exit_price: 100.0 + pnl,
            entry_time: base_time(),
            exit_time: base_time() + chrono::Duration::hours(2),
            profit_loss_pct: pnl,
            exit_reason: ExitReason::TakeProfit,
            entry_confidence: 80.0,
            entry_trend: classify_trend(&snapshot),
            entry_price_change: 0.0,
            entry_volume_change: 0.0,
            entry_snapshot: snapshot,
        }
    }

    fn temp_store() -> (PathBuf, JsonlTradeStore) {
        let dir = std::env::temp_dir().join(format!("cryptotrader-store-{}", Uuid::new_v4()));
        let store = JsonlTradeStore::new(&dir, "trades");
        (dir, store)
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let (_dir, store) = temp_store();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_after_torn_line_survives_reload() {
        let (dir, store) = temp_store();
        let first = trade(2.0);
        store.append(&first).await.unwrap();

        // Crash halfway through a later write
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(store.path())
            .await
            .unwrap();
        file.write_all(b"{\"id\":\"0000").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        let second = trade(-1.0);
        store.append(&second).await.unwrap();

        let ids: Vec<_> = store.load_all().await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        let _ = std::fs::remove_dir_all(dir);
    }
}
