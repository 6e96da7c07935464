//! Notification text for trading events
//!
//! Messages use Telegram's HTML parse mode; the log notifier prints them as is.

use crate::adaptive::ConfidenceAdjustment;
use crate::execution::PositionEvent;
use crate::ledger::LedgerStatistics;
use crate::models::{ClosedTrade, Direction, Position, Signal};

fn direction_emoji(direction: Direction) -> &'static str {
    match direction {
        Direction::Buy => "🟢",
        Direction::Sell => "🔴",
        Direction::Hold => "⚪",
    }
}

fn vote(v: i8) -> &'static str {
    match v {
        1 => "▲",
        -1 => "▼",
        _ => "·",
    }
}

pub fn entry_message(
    signal: &Signal,
    position: &Position,
    adjustment: &ConfidenceAdjustment,
) -> String {
    let targets = position
        .tiers
        .iter()
        .map(|t| format!("${:.4} ({:+.2}%)", t.target_price, t.target_pct))
        .collect::<Vec<_>>()
        .join(", ");

    let subs = &signal.sub_signals;
    let mut text = format!(
        "{} <b>{} {}</b> [{}]\n\
         Price: ${:.4}\n\
         Confidence: {:.1} → {:.1}\n\
         RSI {} | MACD {} | BB {} | Trend {} ({})\n\
         RSI {:.1} | ADX {:.1} | Vol ratio {:.2}\n\
         Stop: ${:.4}\n\
         Targets: {}",
        direction_emoji(signal.direction),
        signal.direction,
        signal.instrument,
        signal.timeframe,
        position.entry_price,
        signal.base_confidence,
        signal.adjusted_confidence,
        vote(subs.rsi),
        vote(subs.macd),
        vote(subs.bollinger),
        vote(subs.trend),
        signal.trend.as_str(),
        signal.snapshot.rsi,
        signal.snapshot.adx,
        signal.snapshot.volume_ratio,
        position.stop_loss,
        targets
    );

    if adjustment.active {
        text.push_str(&format!(
            "\nHistory: pattern {:.0}% | symbol {:.0}%",
            adjustment.pattern_success * 100.0,
            adjustment.symbol_success * 100.0
        ));
    }
    text
}

pub fn position_event_message(position: &Position, event: &PositionEvent) -> Option<String> {
    match event {
        PositionEvent::TierHit {
            tier,
            price,
            new_stop,
        } => Some(format!(
            "🎯 <b>{}</b> target {} reached at ${:.4} ({:+.2}%)\nStop moved to ${:.4}",
            position.instrument,
            tier,
            price,
            position.unrealized_pct(*price),
            new_stop
        )),
        // Trailing moves are too frequent to push
        PositionEvent::TrailingUpdated { .. } => None,
    }
}

pub fn exit_message(trade: &ClosedTrade) -> String {
    let emoji = if trade.is_win() { "✅" } else { "❌" };
    let held = trade.holding_time();
    format!(
        "{} <b>Closed {} {}</b> [{}]\n\
         Reason: {}\n\
         Entry: ${:.4} → Exit: ${:.4}\n\
         P/L: {:+.2}%\n\
         Held: {}h {}m",
        emoji,
        trade.side,
        trade.instrument,
        trade.timeframe,
        trade.exit_reason,
        trade.entry_price,
        trade.exit_price,
        trade.profit_loss_pct,
        held.num_hours(),
        held.num_minutes() % 60
    )
}

pub fn performance_summary(stats: &LedgerStatistics) -> String {
    format!(
        "📊 <b>Performance summary</b>\n\
         Trades: {}\n\
         Success rate: {:.1}%\n\
         Avg P/L: {:+.2}%\n\
         Best: {:+.2}% | Worst: {:+.2}%",
        stats.total_trades,
        stats.success_rate,
        stats.avg_profit,
        stats.max_profit,
        stats.max_loss
    )
}

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Error details are free text, so both parts are escaped
pub fn operator_alert(context: &str, detail: &str) -> String {
    format!(
        "🚨 <b>Operator alert</b>: {}\n{}",
        escape_html(context),
        escape_html(detail)
    )
}

pub fn test_message() -> String {
    "🧪 Notification test from cryptotrader".to_string()
}
