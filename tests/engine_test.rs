mod common;

use async_trait::async_trait;
use common::*;
use cryptotrader::adaptive::PatternKey;
use cryptotrader::error::TradingError;
use cryptotrader::execution::EntrySkip;
use cryptotrader::ledger::{TradeLedger, TradeStore};
use cryptotrader::models::{
    ClosedTrade, Direction, ExitReason, Side, Timeframe, TrendClassification,
};
use cryptotrader::monitor::{EngineConfig, EvaluationOutcome, SkipReason};
use cryptotrader::strategy::classify_trend;
use std::sync::Arc;
use uuid::Uuid;

const BTC: &str = "BTC/USDT";

#[tokio::test]
async fn test_strong_bounce_opens_long() {
    let provider = Arc::new(ScriptedProvider::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let dir = temp_dir();
    let engine = engine_with(
        provider.clone(),
        notifier.clone(),
        jsonl_ledger(&dir).await,
        EngineConfig::default(),
    )
    .await;

    let (prev, snap) = oversold_bounce(100.0, 0);
    provider.push(BTC, [prev, snap]);

    let outcome = engine.evaluate(BTC, Timeframe::H1).await.unwrap();
    let EvaluationOutcome::Opened { signal, position } = outcome else {
        panic!("expected an entry, got {:?}", outcome);
    };
    assert_eq!(signal.direction, Direction::Buy);
    assert!(signal.base_confidence >= 95.0);
    assert!(signal.adjusted_confidence <= 98.0);
    assert_eq!(position.side, Side::Long);
    assert!((position.stop_loss - 98.0).abs() < 1e-9);

    assert_eq!(notifier.count_containing("BUY BTC/USDT"), 1);
    assert_eq!(engine.latest_signal("btcusdt").await.unwrap().direction, Direction::Buy);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_stop_loss_close_reaches_ledger() {
    let provider = Arc::new(ScriptedProvider::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let dir = temp_dir();
    let engine = engine_with(
        provider.clone(),
        notifier.clone(),
        jsonl_ledger(&dir).await,
        EngineConfig::default(),
    )
    .await;

    let (prev, snap) = oversold_bounce(100.0, 0);
    provider.push(BTC, [prev, snap]);
    engine.evaluate(BTC, Timeframe::H1).await.unwrap();

    provider.push(BTC, [snapshot_at(97.9, 1)]);
    let outcome = engine.evaluate(BTC, Timeframe::H1).await.unwrap();
    let EvaluationOutcome::Closed { trade, .. } = outcome else {
        panic!("expected a stop-loss exit, got {:?}", outcome);
    };
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert!((trade.profit_loss_pct + 2.1).abs() < 1e-9);
    assert!(engine.open_position(BTC).await.is_none());

    let stats = engine.statistics(Some(BTC)).await;
    assert_eq!(stats.total_trades, 1);
    assert_eq!(stats.success_rate, 0.0);
    assert_eq!(notifier.count_containing("Reason: stop-loss"), 1);

    // The trade survives a restart
    let reopened = jsonl_ledger(&dir).await;
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.trades()[0].id, trade.id);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_trend_weakening_exit_in_profit() {
    let provider = Arc::new(ScriptedProvider::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let dir = temp_dir();
    let engine = engine_with(
        provider.clone(),
        notifier.clone(),
        jsonl_ledger(&dir).await,
        EngineConfig::default(),
    )
    .await;

    let (prev, snap) = oversold_bounce(100.0, 0);
    provider.push(BTC, [prev, snap]);
    assert!(matches!(
        engine.evaluate(BTC, Timeframe::H1).await.unwrap(),
        EvaluationOutcome::Opened { .. }
    ));

    // Five candles land before the next poll: +6% but fading
    let closes = [107.0, 106.5, 106.2, 106.4, 106.0];
    let mut candles: Vec<_> = closes
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let mut s = snapshot_at(*c, i as i64 + 1);
            s.rsi = 75.0;
            s.adx = 24.0;
            s.macd_histogram = 0.3;
            s.plus_di = 25.0;
            s.minus_di = 18.0;
            s
        })
        .collect();
    let last = candles.last_mut().unwrap();
    last.rsi = 72.0;
    last.adx = 20.0;
    last.macd_histogram = -0.1;
    provider.push(BTC, candles);

    let outcome = engine.evaluate(BTC, Timeframe::H1).await.unwrap();
    let EvaluationOutcome::Closed { trade, .. } = outcome else {
        panic!("expected a weakness exit, got {:?}", outcome);
    };
    assert_eq!(trade.exit_reason, ExitReason::TrendWeakening);
    assert!((trade.profit_loss_pct - 6.0).abs() < 1e-9);
    assert!(trade.is_win());

    let _ = std::fs::remove_dir_all(dir);
}

fn history_trade(snapshot: &cryptotrader::models::IndicatorSnapshot, pnl: f64, i: i64) -> ClosedTrade {
    ClosedTrade {
        id: Uuid::new_v4(),
        instrument: BTC.to_string(),
        timeframe: Timeframe::H1,
        side: Side::Long,
        entry_price: 100.0,
        exit_price: 100.0 + pnl,
        entry_time: snapshot.timestamp - chrono::Duration::days(30) + chrono::Duration::hours(i * 6),
        exit_time: snapshot.timestamp - chrono::Duration::days(30) + chrono::Duration::hours(i * 6 + 3),
        profit_loss_pct: pnl,
        exit_reason: if pnl > 0.0 {
            ExitReason::TakeProfit
        } else {
            ExitReason::StopLoss
        },
        entry_confidence: 85.0,
        entry_trend: classify_trend(snapshot),
        entry_price_change: 0.005,
        entry_volume_change: 0.0,
        entry_snapshot: snapshot.clone(),
    }
}

#[tokio::test]
async fn test_successful_history_boosts_confidence() {
    let (prev, snap) = moderate_bounce(100.0, 0);
    assert_eq!(classify_trend(&snap), TrendClassification::Up);

    // 60 prior trades on this pattern, 45 of them profitable
    let dir = temp_dir();
    let mut ledger = jsonl_ledger(&dir).await;
    for i in 0..60 {
        let pnl = if i % 4 == 0 { -1.5 } else { 3.0 };
        ledger.append(history_trade(&snap, pnl, i)).await.unwrap();
    }
    drop(ledger);

    let provider = Arc::new(ScriptedProvider::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine_with(
        provider.clone(),
        notifier.clone(),
        jsonl_ledger(&dir).await,
        EngineConfig::default(),
    )
    .await;

    {
        let model = engine.model().read().unwrap();
        assert!(model.is_active());
        let key = PatternKey::from_snapshot(&snap, TrendClassification::Up);
        assert_eq!(model.pattern_success_rate(&key), 0.75);
    }

    provider.push(BTC, [prev, snap]);
    let outcome = engine.evaluate(BTC, Timeframe::H1).await.unwrap();
    let EvaluationOutcome::Opened { signal, .. } = outcome else {
        panic!("expected an entry, got {:?}", outcome);
    };
    assert_eq!(signal.base_confidence, 90.0);
    assert!(signal.adjusted_confidence > signal.base_confidence);
    assert!(notifier.count_containing("History: pattern 75%") == 1);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_overlapping_evaluations_open_one_position() {
    let provider = Arc::new(ScriptedProvider::with_delay(
        std::time::Duration::from_millis(50),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let dir = temp_dir();
    let engine = Arc::new(
        engine_with(
            provider.clone(),
            notifier.clone(),
            jsonl_ledger(&dir).await,
            EngineConfig::default(),
        )
        .await,
    );

    let (prev, snap) = oversold_bounce(100.0, 0);
    provider.push(BTC, [prev, snap]);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.evaluate(BTC, Timeframe::H1).await })
        })
        .collect();

    let mut opened = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            EvaluationOutcome::Opened { .. } => opened += 1,
            EvaluationOutcome::Skipped(SkipReason::Overlap)
            | EvaluationOutcome::Skipped(SkipReason::NoNewData) => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert_eq!(opened, 1);
    assert_eq!(notifier.count_containing("BUY BTC/USDT"), 1);

    // A fresh buy on the next candle manages the open position instead
    let first_id = engine.open_position(BTC).await.unwrap().id;
    let (_, again) = oversold_bounce(100.5, 1);
    provider.push(BTC, [again]);
    let outcome = engine.evaluate(BTC, Timeframe::H1).await.unwrap();
    assert!(matches!(outcome, EvaluationOutcome::Held { .. }));
    assert_eq!(engine.open_position(BTC).await.unwrap().id, first_id);

    // Other timeframes cannot open a second position either
    let (_, later) = oversold_bounce(100.5, 2);
    provider.push(BTC, [later]);
    let outcome = engine.evaluate(BTC, Timeframe::H4).await.unwrap();
    assert!(matches!(
        outcome,
        EvaluationOutcome::NoEntry { reason: EntrySkip::AlreadyOpen, .. }
    ));

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_instruments_are_isolated() {
    let provider = Arc::new(ScriptedProvider::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let dir = temp_dir();
    let engine = engine_with(
        provider.clone(),
        notifier.clone(),
        jsonl_ledger(&dir).await,
        EngineConfig::default(),
    )
    .await;

    let (prev, snap) = oversold_bounce(50.0, 0);
    provider.push("ETH/USDT", [prev, snap]);

    let missing = engine.evaluate("DOGE/USDT", Timeframe::H1).await.unwrap();
    assert!(matches!(
        missing,
        EvaluationOutcome::Skipped(SkipReason::DataUnavailable(_))
    ));

    let eth = engine.evaluate("ETH/USDT", Timeframe::H1).await.unwrap();
    assert!(matches!(eth, EvaluationOutcome::Opened { .. }));

    // Same window again is not re-evaluated
    let again = engine.evaluate("ETH/USDT", Timeframe::H1).await.unwrap();
    assert!(matches!(again, EvaluationOutcome::Skipped(SkipReason::NoNewData)));

    let _ = std::fs::remove_dir_all(dir);
}

/// Store whose writes always fail
struct BrokenStore;

#[async_trait]
impl TradeStore for BrokenStore {
    async fn append(&self, _trade: &ClosedTrade) -> Result<(), TradingError> {
        Err(TradingError::Persistence("read-only filesystem".to_string()))
    }

    async fn load_all(&self) -> Result<Vec<ClosedTrade>, TradingError> {
        Ok(Vec::new())
    }

    fn describe(&self) -> String {
        "broken".to_string()
    }
}

#[tokio::test]
async fn test_failed_ledger_write_alerts_operator() {
    let provider = Arc::new(ScriptedProvider::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let ledger = TradeLedger::open(Arc::new(BrokenStore)).await.unwrap();
    let config = EngineConfig {
        summary_every: 1,
        ..EngineConfig::default()
    };
    let engine = engine_with(provider.clone(), notifier.clone(), ledger, config).await;

    let (prev, snap) = oversold_bounce(100.0, 0);
    provider.push(BTC, [prev, snap]);
    engine.evaluate(BTC, Timeframe::H1).await.unwrap();
    provider.push(BTC, [snapshot_at(97.0, 1)]);

    let outcome = engine.evaluate(BTC, Timeframe::H1).await.unwrap();
    assert!(matches!(outcome, EvaluationOutcome::Closed { .. }));

    // Kept in memory and counted, but flagged as unpersisted
    assert_eq!(engine.pending_ledger_writes().await, 1);
    assert_eq!(engine.statistics(None).await.total_trades, 1);
    assert_eq!(engine.model().read().unwrap().total_recorded(), 1);
    assert_eq!(notifier.count_containing("Operator alert"), 1);
    assert_eq!(notifier.count_containing("Performance summary"), 1);
}

#[tokio::test]
async fn test_control_surface_drives_scheduler() {
    use cryptotrader::config::CategoryConfig;
    use cryptotrader::monitor::{ControlSurface, ResponseStatus, Scheduler};
    use std::time::Duration;

    let provider = Arc::new(ScriptedProvider::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let dir = temp_dir();
    let engine = Arc::new(
        engine_with(
            provider.clone(),
            notifier.clone(),
            jsonl_ledger(&dir).await,
            EngineConfig::default(),
        )
        .await,
    );
    let (prev, snap) = oversold_bounce(100.0, 0);
    provider.push(BTC, [prev, snap]);

    let scheduler = Arc::new(Scheduler::new(engine, Duration::from_millis(20)));
    let control = ControlSurface::new(
        Arc::clone(&scheduler),
        CategoryConfig::default(),
        vec![Timeframe::H1],
    );

    assert_eq!(control.start_instrument("btcusdt", &[]).status, ResponseStatus::Success);
    assert_eq!(control.start_instrument("BTC/USDT", &[]).status, ResponseStatus::Warning);
    assert_eq!(control.start_category("nonsense", &[]).status, ResponseStatus::Error);
    assert!(scheduler.is_active(BTC));

    tokio::time::sleep(Duration::from_millis(150)).await;
    let latest = control.latest_signal(BTC).await;
    assert_eq!(latest.status, ResponseStatus::Success);
    assert!(latest.message.contains("BUY"));
    assert_eq!(notifier.count_containing("BUY BTC/USDT"), 1);

    let active = control.active_instruments();
    assert_eq!(active.data.unwrap().as_array().unwrap().len(), 1);

    assert_eq!(control.test_notification().await.status, ResponseStatus::Success);
    assert_eq!(control.stop_all().status, ResponseStatus::Success);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(scheduler.active().is_empty());
    assert_eq!(control.stop_instrument(BTC).status, ResponseStatus::Warning);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_catch_up_poll_sees_every_missed_candle() {
    let provider = Arc::new(ScriptedProvider::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let dir = temp_dir();
    let engine = engine_with(
        provider.clone(),
        notifier.clone(),
        jsonl_ledger(&dir).await,
        EngineConfig::default(),
    )
    .await;

    let (prev, snap) = oversold_bounce(100.0, 0);
    provider.push(BTC, [prev, snap]);
    engine.evaluate(BTC, Timeframe::H1).await.unwrap();

    // Two candles close before the next poll; the first breaches the stop
    provider.push(BTC, [snapshot_at(95.0, 1), snapshot_at(100.5, 2)]);
    let outcome = engine.evaluate(BTC, Timeframe::H1).await.unwrap();
    let EvaluationOutcome::Closed { trade, .. } = outcome else {
        panic!("expected the missed stop to close, got {:?}", outcome);
    };
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.exit_price, 95.0);
    assert_eq!(trade.exit_time, base_time() + chrono::Duration::hours(1));
    assert!(engine.open_position(BTC).await.is_none());

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_catch_up_poll_applies_tiers_in_order() {
    let provider = Arc::new(ScriptedProvider::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let dir = temp_dir();
    let engine = engine_with(
        provider.clone(),
        notifier.clone(),
        jsonl_ledger(&dir).await,
        EngineConfig::default(),
    )
    .await;

    let (prev, snap) = oversold_bounce(100.0, 0);
    provider.push(BTC, [prev, snap]);
    engine.evaluate(BTC, Timeframe::H1).await.unwrap();

    // Spike through the first target, then fall back below entry
    provider.push(BTC, [snapshot_at(103.5, 1), snapshot_at(99.9, 2)]);
    let outcome = engine.evaluate(BTC, Timeframe::H1).await.unwrap();
    let EvaluationOutcome::Closed { trade, .. } = outcome else {
        panic!("expected the ratcheted stop to close, got {:?}", outcome);
    };
    assert!(matches!(
        trade.exit_reason,
        ExitReason::StopLoss | ExitReason::TrailingStop
    ));
    assert_eq!(trade.exit_price, 99.9);
    assert_eq!(notifier.count_containing("target 1 reached"), 1);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_timeframes_of_one_instrument_do_not_drop_each_other() {
    let provider = Arc::new(ScriptedProvider::with_delay(
        std::time::Duration::from_millis(50),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let dir = temp_dir();
    let engine = Arc::new(
        engine_with(
            provider.clone(),
            notifier.clone(),
            jsonl_ledger(&dir).await,
            EngineConfig::default(),
        )
        .await,
    );

    let (prev, snap) = oversold_bounce(100.0, 0);
    provider.push(BTC, [prev, snap]);

    let quarter = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.evaluate(BTC, Timeframe::M15).await })
    };
    let hourly = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.evaluate(BTC, Timeframe::H1).await })
    };
    let outcomes = [
        quarter.await.unwrap().unwrap(),
        hourly.await.unwrap().unwrap(),
    ];

    assert_eq!(provider.fetch_count(), 2);
    assert!(outcomes
        .iter()
        .all(|o| !matches!(o, EvaluationOutcome::Skipped(SkipReason::Overlap))));
    // Both ran; only one of them may own the position
    let opened = outcomes
        .iter()
        .filter(|o| matches!(o, EvaluationOutcome::Opened { .. }))
        .count();
    assert_eq!(opened, 1);
    assert!(outcomes.iter().any(|o| matches!(
        o,
        EvaluationOutcome::NoEntry { reason: EntrySkip::AlreadyOpen, .. }
    )));

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_shutdown_waits_for_running_evaluation() {
    use cryptotrader::monitor::Scheduler;
    use std::time::Duration;

    let provider = Arc::new(ScriptedProvider::with_delay(Duration::from_millis(200)));
    let notifier = Arc::new(RecordingNotifier::default());
    let dir = temp_dir();
    let engine = Arc::new(
        engine_with(
            provider.clone(),
            notifier.clone(),
            jsonl_ledger(&dir).await,
            EngineConfig::default(),
        )
        .await,
    );

    let (prev, snap) = oversold_bounce(100.0, 0);
    provider.push(BTC, [prev, snap]);
    engine.evaluate(BTC, Timeframe::H1).await.unwrap();
    provider.push(BTC, [snapshot_at(97.0, 1)]);

    let scheduler = Scheduler::new(Arc::clone(&engine), Duration::from_secs(60));
    assert!(scheduler.start(BTC, Timeframe::H1));

    // Stop while the first cycle is still inside its fetch
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scheduler.shutdown().await, 1);

    assert_eq!(engine.closed_trades().await.len(), 1);
    assert_eq!(jsonl_ledger(&dir).await.len(), 1);
    assert_eq!(engine.model().read().unwrap().total_recorded(), 1);

    let _ = std::fs::remove_dir_all(dir);
}
