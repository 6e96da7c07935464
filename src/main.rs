use clap::{Parser, Subcommand};
use cryptotrader::api::{BinanceClient, CandleSnapshotProvider, SnapshotProvider};
use cryptotrader::config::AppConfig;
use cryptotrader::ledger::{self, TradeLedger};
use cryptotrader::models::Timeframe;
use cryptotrader::monitor::{ControlResponse, ControlSurface, Engine, EngineConfig, Scheduler};
use cryptotrader::notify;
use cryptotrader::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cryptotrader", about = "Adaptive crypto signal and position monitor")]
struct Cli {
    /// Configuration file (defaults to ./cryptotrader.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor instruments until Ctrl+C
    Run {
        /// Instrument to monitor, e.g. BTC/USDT (repeatable)
        #[arg(short, long)]
        instrument: Vec<String>,

        /// Category of recommended instruments, e.g. major (repeatable)
        #[arg(long)]
        category: Vec<String>,

        /// Timeframe: 15m, 1h, 4h or 1d (repeatable)
        #[arg(short, long)]
        timeframe: Vec<Timeframe>,
    },
    /// Print ledger statistics
    Stats {
        /// Limit to one instrument
        #[arg(short, long)]
        instrument: Option<String>,
    },
    /// Send a test notification
    TestNotify,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            instrument,
            category,
            timeframe,
        } => run(config, instrument, category, timeframe).await,
        Command::Stats { instrument } => stats(config, instrument).await,
        Command::TestNotify => {
            let notifier = notify::from_config(&config.telegram);
            let delivered = notifier
                .notify(&notify::messages::test_message())
                .await;
            if delivered {
                tracing::info!("✅ Test notification sent via {}", notifier.name());
                Ok(())
            } else {
                Err("test notification failed".into())
            }
        }
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cryptotrader=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn report(response: &ControlResponse) {
    match serde_json::to_string(response) {
        Ok(json) => tracing::info!("{}", json),
        Err(_) => tracing::info!("{}", response.message),
    }
}

async fn run(
    config: AppConfig,
    instruments: Vec<String>,
    categories: Vec<String>,
    timeframes: Vec<Timeframe>,
) -> Result<()> {
    tracing::info!("🚀 cryptotrader starting");

    let store = ledger::open_store(&config.ledger).await?;
    let trade_ledger = TradeLedger::open(store).await?;
    tracing::info!(
        "📒 Ledger {} holds {} closed trades",
        trade_ledger.store_description(),
        trade_ledger.len()
    );

    let client = BinanceClient::with_base_url(&config.market.base_url)?;
    let provider: Arc<dyn SnapshotProvider> = Arc::new(
        CandleSnapshotProvider::with_params(client, config.indicators.clone())
            .with_history(config.market.history_candles),
    );
    let notifier = notify::from_config(&config.telegram);

    let engine = Arc::new(Engine::new(
        provider,
        trade_ledger,
        notifier,
        EngineConfig::from(&config),
    )?);
    let retrainer =
        engine.spawn_retrainer(Duration::from_secs(config.adaptive.retrain_check_secs.max(1)));

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&engine),
        Duration::from_secs(config.trading.poll_interval_secs),
    ));
    let timeframes = if timeframes.is_empty() {
        config.trading.timeframes.clone()
    } else {
        timeframes
    };
    let control = ControlSurface::new(
        Arc::clone(&scheduler),
        config.categories.clone(),
        timeframes.clone(),
    );

    let mut requested = config.trading.instruments.clone();
    requested.extend(instruments);
    for instrument in &requested {
        report(&control.start_instrument(instrument, &timeframes));
    }
    for category in &categories {
        report(&control.start_category(category, &timeframes));
    }

    if scheduler.active().is_empty() {
        return Err("nothing to monitor: pass --instrument or --category".into());
    }

    report(&control.active_instruments());
    tracing::info!("📊 Configuration:");
    tracing::info!("  Poll interval: {}s", config.trading.poll_interval_secs);
    tracing::info!(
        "  Min confidence: {}",
        config.position.required_confidence()
    );
    tracing::info!("  Boost mode: {:?}", config.adaptive.boost_mode);
    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::signal::ctrl_c().await?;
    tracing::info!("⚠️  Received Ctrl+C, shutting down...");

    // Let running evaluations finish their ledger writes before exiting
    let stopped = scheduler.shutdown().await;
    tracing::info!("⏹️  {} monitor(s) drained", stopped);
    retrainer.abort();
    report(&control.statistics(None).await);

    let pending = engine.pending_ledger_writes().await;
    if pending > 0 {
        tracing::error!("💾 {} closed trade(s) were never persisted", pending);
    }

    tracing::info!("👋 cryptotrader stopped");
    Ok(())
}

async fn stats(config: AppConfig, instrument: Option<String>) -> Result<()> {
    let store = ledger::open_store(&config.ledger).await?;
    let mut trade_ledger = TradeLedger::open(store).await?;

    let stats = match instrument.as_deref() {
        Some(i) => trade_ledger.statistics(&cryptotrader::normalize_instrument(i)),
        None => trade_ledger.overall_statistics(),
    };

    println!("\n{}", "─".repeat(40));
    println!(
        "Ledger: {} ({})",
        trade_ledger.store_description(),
        instrument.as_deref().unwrap_or("all instruments")
    );
    println!("{}", "─".repeat(40));
    println!("{:<16} {:>12}", "Trades", stats.total_trades);
    println!("{:<16} {:>11.1}%", "Success rate", stats.success_rate);
    println!("{:<16} {:>+11.2}%", "Avg P/L", stats.avg_profit);
    println!("{:<16} {:>+11.2}%", "Best", stats.max_profit);
    println!("{:<16} {:>+11.2}%", "Worst", stats.max_loss);
    println!();

    Ok(())
}
