use clap::Parser;
use cryptotrader::api::{CandleSnapshotProvider, ReplayCandleSource};
use cryptotrader::backtest::{MarketScenario, SyntheticDataGenerator};
use cryptotrader::ledger::{JsonlTradeStore, LedgerStatistics, TradeLedger};
use cryptotrader::models::Timeframe;
use cryptotrader::monitor::{Engine, EngineConfig, EvaluationOutcome};
use cryptotrader::notify::LogNotifier;
use cryptotrader::Result;
use std::sync::Arc;

/// Replay synthetic market scenarios through the full evaluation pipeline
#[derive(Parser)]
#[command(name = "replay")]
struct Args {
    /// Scenario names; all scenarios when omitted
    #[arg(short, long)]
    scenario: Vec<MarketScenario>,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 500)]
    candles: usize,

    #[arg(short, long, default_value = "1h")]
    timeframe: Timeframe,

    /// Use the stricter 80 confidence threshold
    #[arg(long)]
    strict: bool,
}

const INSTRUMENT: &str = "SYNTH/USDT";
const WARMUP: usize = 60;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cryptotrader=warn")),
        )
        .init();

    let args = Args::parse();
    let scenarios = if args.scenario.is_empty() {
        MarketScenario::ALL.to_vec()
    } else {
        args.scenario.clone()
    };

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║          CRYPTOTRADER SCENARIO REPLAY                 ║");
    println!("╚═══════════════════════════════════════════════════════╝");

    let mut results = Vec::new();
    for scenario in scenarios {
        let stats = replay(scenario, &args).await?;
        results.push((scenario, stats));
    }

    print_summary(&results);
    Ok(())
}

async fn replay(scenario: MarketScenario, args: &Args) -> Result<LedgerStatistics> {
    let candles = SyntheticDataGenerator::new(args.seed).generate(
        INSTRUMENT,
        scenario,
        args.candles,
        args.timeframe,
    );
    let total = candles.len();

    let source = Arc::new(ReplayCandleSource::new());
    source.insert(INSTRUMENT, args.timeframe, candles, WARMUP.min(total));
    let provider = Arc::new(CandleSnapshotProvider::new(Arc::clone(&source)));

    let dir = std::env::temp_dir().join(format!("cryptotrader-replay-{}", uuid::Uuid::new_v4()));
    let store = Arc::new(JsonlTradeStore::new(&dir, scenario.as_str()));
    let ledger = TradeLedger::open(store).await?;

    let mut config = EngineConfig::default();
    config.position.strict_mode = args.strict;
    config.summary_every = 0;
    let engine = Engine::new(provider, ledger, Arc::new(LogNotifier), config)?;

    let mut opened = 0;
    loop {
        match engine.evaluate(INSTRUMENT, args.timeframe).await {
            Ok(EvaluationOutcome::Opened { .. }) => opened += 1,
            Ok(EvaluationOutcome::Closed { trade, .. }) => println!(
                "  {:<14} {} {:>6} -> {:<8} {:+6.2}%  ({})",
                scenario.as_str(),
                trade.exit_time.format("%m-%d %H:%M"),
                format!("{:.2}", trade.entry_price),
                format!("{:.2}", trade.exit_price),
                trade.profit_loss_pct,
                trade.exit_reason
            ),
            Ok(_) => {}
            Err(e) => eprintln!("❌ {} evaluation failed: {}", scenario.as_str(), e),
        }
        engine.retrain_once().await?;
        if !source.advance(INSTRUMENT, args.timeframe) {
            break;
        }
    }

    let still_open = engine.open_position(INSTRUMENT).await.is_some();
    let stats = engine.statistics(None).await;
    println!(
        "  {:<14} {} entries, {} closed{}",
        scenario.as_str(),
        opened,
        stats.total_trades,
        if still_open { ", 1 still open" } else { "" }
    );

    let _ = std::fs::remove_dir_all(dir);
    Ok(stats)
}

fn print_summary(results: &[(MarketScenario, LedgerStatistics)]) {
    println!(
        "\n{:<16} {:>8} {:>10} {:>10} {:>10} {:>10}",
        "Scenario", "Trades", "Win%", "Avg%", "Best%", "Worst%"
    );
    println!("{}", "─".repeat(70));
    for (scenario, stats) in results {
        println!(
            "{:<16} {:>8} {:>10.1} {:>+10.2} {:>+10.2} {:>+10.2}",
            scenario.as_str(),
            stats.total_trades,
            stats.success_rate,
            stats.avg_profit,
            stats.max_profit,
            stats.max_loss
        );
    }
    println!();
}
