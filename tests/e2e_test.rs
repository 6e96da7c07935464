mod common;

use common::{base_time, jsonl_ledger, temp_dir, RecordingNotifier};
use cryptotrader::api::{
    BinanceClient, CandleSnapshotProvider, ReplayCandleSource, SnapshotFetch, SnapshotProvider,
};
use cryptotrader::backtest::{MarketScenario, SyntheticDataGenerator};
use cryptotrader::models::{ClosedTrade, Timeframe};
use cryptotrader::monitor::{Engine, EngineConfig, EvaluationOutcome};
use std::sync::Arc;

const INSTRUMENT: &str = "SYNTH/USDT";

struct ReplayRun {
    trades: Vec<ClosedTrade>,
    evaluations: usize,
    max_adjusted: f64,
}

/// Feed a synthetic series through the engine one closed candle at a time
async fn replay(scenario: MarketScenario, seed: u64, dir: &std::path::PathBuf) -> ReplayRun {
    let candles = SyntheticDataGenerator::new(seed)
        .ending_at(base_time())
        .generate(INSTRUMENT, scenario, 400, Timeframe::H1);
    let source = Arc::new(ReplayCandleSource::new());
    source.insert(INSTRUMENT, Timeframe::H1, candles, 60);
    let provider = Arc::new(CandleSnapshotProvider::new(Arc::clone(&source)));

    let engine = Engine::new(
        provider,
        jsonl_ledger(dir).await,
        Arc::new(RecordingNotifier::default()),
        EngineConfig::default(),
    )
    .unwrap();

    let mut evaluations = 0;
    let mut max_adjusted: f64 = 0.0;
    loop {
        let outcome = engine.evaluate(INSTRUMENT, Timeframe::H1).await.unwrap();
        if !matches!(outcome, EvaluationOutcome::Skipped(_)) {
            evaluations += 1;
        }
        if let Some(signal) = engine.latest_signal(INSTRUMENT).await {
            max_adjusted = max_adjusted.max(signal.adjusted_confidence);
        }
        engine.retrain_once().await.unwrap();
        if !source.advance(INSTRUMENT, Timeframe::H1) {
            break;
        }
    }

    ReplayRun {
        trades: engine.closed_trades().await,
        evaluations,
        max_adjusted,
    }
}

#[tokio::test]
async fn test_replay_keeps_one_position_at_a_time() {
    let _ = tracing_subscriber::fmt::try_init();

    for scenario in MarketScenario::ALL {
        let dir = temp_dir();
        let run = replay(scenario, 7, &dir).await;

        assert!(run.evaluations > 300, "{} evaluated {}", scenario.as_str(), run.evaluations);
        assert!(run.max_adjusted <= 98.0);

        // Trades never overlap in time
        for pair in run.trades.windows(2) {
            assert!(pair[1].entry_time >= pair[0].exit_time);
        }
        for trade in &run.trades {
            assert!(trade.exit_time > trade.entry_time);
            assert!(trade.entry_confidence >= 70.0);
        }

        // Everything closed during the replay is on disk
        let reloaded = jsonl_ledger(&dir).await;
        assert_eq!(reloaded.len(), run.trades.len());

        let _ = std::fs::remove_dir_all(dir);
    }
}

#[tokio::test]
async fn test_replay_is_deterministic_for_a_seed() {
    let (a, b) = (temp_dir(), temp_dir());
    let first = replay(MarketScenario::Volatile, 11, &a).await;
    let second = replay(MarketScenario::Volatile, 11, &b).await;

    let summary = |run: &ReplayRun| {
        run.trades
            .iter()
            .map(|t| (t.entry_time, t.exit_reason, (t.profit_loss_pct * 1e6).round() as i64))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&first), summary(&second));

    let _ = std::fs::remove_dir_all(a);
    let _ = std::fs::remove_dir_all(b);
}

#[tokio::test]
#[ignore] // Requires network access to Binance
async fn test_live_binance_snapshot() {
    let _ = tracing_subscriber::fmt::try_init();

    let client = BinanceClient::new().unwrap();
    let provider = CandleSnapshotProvider::new(client);

    match provider.fetch("BTC/USDT", Timeframe::H1).await {
        SnapshotFetch::Available(window) => {
            let latest = window.latest();
            println!(
                "BTC/USDT close {:.2} RSI {:.1} ADX {:.1}",
                latest.close, latest.rsi, latest.adx
            );
            assert!(latest.close > 0.0);
            assert!((0.0..=100.0).contains(&latest.rsi));
            assert!(window.previous().is_some());
        }
        SnapshotFetch::Unavailable(reason) => panic!("snapshot unavailable: {}", reason),
    }
}
