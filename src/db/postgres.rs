use crate::error::TradingError;
use crate::ledger::TradeStore;
use crate::models::{
    ClosedTrade, ExitReason, IndicatorSnapshot, Side, Timeframe, TrendClassification,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

/// Closed trades stored in the `closed_trades` table, scoped to one book
pub struct PostgresTradeStore {
    pool: PgPool,
    book: String,
}

/// Entry-time market context, stored as a JSON column
#[derive(Debug, Serialize, Deserialize)]
struct EntryContext {
    trend: TrendClassification,
    price_change: f64,
    volume_change: f64,
    snapshot: IndicatorSnapshot,
}

impl PostgresTradeStore {
    /// Connect to Postgres and run migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    /// * `book` - Ledger name; several books can share one database
    pub async fn connect(database_url: &str, book: &str) -> Result<Self, TradingError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| TradingError::Persistence(format!("migration failed: {}", e)))?;

        tracing::info!("Connected to Postgres trade ledger (book: {})", book);

        Ok(Self {
            pool,
            book: book.to_string(),
        })
    }
}

#[async_trait]
impl TradeStore for PostgresTradeStore {
    async fn append(&self, trade: &ClosedTrade) -> Result<(), TradingError> {
        let context = serde_json::to_string(&EntryContext {
            trend: trade.entry_trend,
            price_change: trade.entry_price_change,
            volume_change: trade.entry_volume_change,
            snapshot: trade.entry_snapshot.clone(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO closed_trades (
                id, book, instrument, timeframe, side, entry_price, exit_price,
                entry_time, exit_time, profit_loss_pct, exit_reason,
                entry_confidence, entry_context
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(trade.id)
        .bind(&self.book)
        .bind(&trade.instrument)
        .bind(trade.timeframe.as_str())
        .bind(side_code(trade.side))
        .bind(to_decimal(trade.entry_price)?)
        .bind(to_decimal(trade.exit_price)?)
        .bind(trade.entry_time)
        .bind(trade.exit_time)
        .bind(to_decimal(trade.profit_loss_pct)?)
        .bind(exit_reason_code(trade.exit_reason))
        .bind(to_decimal(trade.entry_confidence)?)
        .bind(context)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Saved trade {} for {} to Postgres",
            trade.id,
            trade.instrument
        );

        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ClosedTrade>, TradingError> {
        let rows = sqlx::query(
            r#"
            SELECT id, instrument, timeframe, side, entry_price, exit_price,
                   entry_time, exit_time, profit_loss_pct, exit_reason,
                   entry_confidence, entry_context
            FROM closed_trades
            WHERE book = $1
            ORDER BY exit_time ASC
            "#,
        )
        .bind(&self.book)
        .fetch_all(&self.pool)
        .await?;

        let mut trades = Vec::with_capacity(rows.len());

        for row in rows {
            let id: Uuid = row.get("id");
            let timeframe_str: String = row.get("timeframe");
            let side_str: String = row.get("side");
            let exit_reason_str: String = row.get("exit_reason");
            let entry_time: DateTime<Utc> = row.get("entry_time");
            let exit_time: DateTime<Utc> = row.get("exit_time");
            let context_json: String = row.get("entry_context");

            let timeframe: Timeframe = timeframe_str
                .parse()
                .map_err(|e: String| TradingError::Persistence(e))?;
            let context: EntryContext = serde_json::from_str(&context_json)?;

            trades.push(ClosedTrade {
                id,
                instrument: row.get("instrument"),
                timeframe,
                side: parse_side(&side_str)?,
                entry_price: from_decimal(row.get("entry_price")),
                exit_price: from_decimal(row.get("exit_price")),
                entry_time,
                exit_time,
                profit_loss_pct: from_decimal(row.get("profit_loss_pct")),
                exit_reason: parse_exit_reason(&exit_reason_str)?,
                entry_confidence: from_decimal(row.get("entry_confidence")),
                entry_trend: context.trend,
                entry_price_change: context.price_change,
                entry_volume_change: context.volume_change,
                entry_snapshot: context.snapshot,
            });
        }

        tracing::info!(
            "Loaded {} trades from Postgres (book: {})",
            trades.len(),
            self.book
        );

        Ok(trades)
    }

    fn describe(&self) -> String {
        format!("postgres:closed_trades/{}", self.book)
    }
}

fn to_decimal(value: f64) -> Result<Decimal, TradingError> {
    Decimal::from_f64(value)
        .ok_or_else(|| TradingError::Persistence(format!("value {} does not fit NUMERIC", value)))
}

fn from_decimal(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn side_code(side: Side) -> &'static str {
    match side {
        Side::Long => "Long",
        Side::Short => "Short",
    }
}

fn parse_side(code: &str) -> Result<Side, TradingError> {
    match code {
        "Long" => Ok(Side::Long),
        "Short" => Ok(Side::Short),
        other => Err(TradingError::Persistence(format!("invalid side: {}", other))),
    }
}

fn exit_reason_code(reason: ExitReason) -> &'static str {
    match reason {
        ExitReason::StopLoss => "StopLoss",
        ExitReason::TrailingStop => "TrailingStop",
        ExitReason::TakeProfit => "TakeProfit",
        ExitReason::TrendWeakening => "TrendWeakening",
        ExitReason::TrendReversal => "TrendReversal",
    }
}

fn parse_exit_reason(code: &str) -> Result<ExitReason, TradingError> {
    match code {
        "StopLoss" => Ok(ExitReason::StopLoss),
        "TrailingStop" => Ok(ExitReason::TrailingStop),
        "TakeProfit" => Ok(ExitReason::TakeProfit),
        "TrendWeakening" => Ok(ExitReason::TrendWeakening),
        "TrendReversal" => Ok(ExitReason::TrendReversal),
        other => Err(TradingError::Persistence(format!(
            "invalid exit reason: {}",
            other
        ))),
    }
}
