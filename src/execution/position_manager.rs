use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TradingError;
use crate::models::{
    ClosedTrade, Direction, ExitReason, IndicatorSnapshot, Position, Side, Signal,
    TakeProfitTier,
};

/// Whether the entry cooldown blocks any new signal or only the same direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    #[default]
    AnyDirection,
    SameDirection,
}

/// Configuration for the position lifecycle
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub stop_loss_pct: f64,
    pub take_profit_pcts: Vec<f64>, // ascending; the last one closes the position
    pub dynamic_targets: bool,      // scale targets by trend, volatility, volume, RSI
    pub trailing_activation_pct: f64,
    pub trailing_adx_threshold: f64,
    pub trailing_adx_multiplier: f64,
    pub weakness_threshold: usize,
    pub min_hold_minutes: i64,
    pub min_confidence: f64,
    pub strict_min_confidence: f64,
    pub strict_mode: bool,
    pub cooldown_minutes: i64,
    pub cooldown_scope: CooldownScope,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: 2.0,
            take_profit_pcts: vec![2.0, 4.0, 7.0],
            dynamic_targets: true,
            trailing_activation_pct: 1.0,
            trailing_adx_threshold: 30.0,
            trailing_adx_multiplier: 1.2,
            weakness_threshold: 4,
            min_hold_minutes: 30,
            min_confidence: 70.0,
            strict_min_confidence: 80.0,
            strict_mode: false,
            cooldown_minutes: 60,
            cooldown_scope: CooldownScope::AnyDirection,
        }
    }
}

impl PositionConfig {
    pub fn required_confidence(&self) -> f64 {
        if self.strict_mode {
            self.strict_min_confidence
        } else {
            self.min_confidence
        }
    }
}

/// Position state for a single instrument: Flat (no position) or Open
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionSlot {
    instrument: String,
    position: Option<Position>,
    last_entry: Option<(Direction, DateTime<Utc>)>,
}

impl PositionSlot {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            position: None,
            last_entry: None,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn last_entry(&self) -> Option<(Direction, DateTime<Utc>)> {
        self.last_entry
    }
}

/// Why an entry was not taken
#[derive(Debug, Clone, PartialEq)]
pub enum EntrySkip {
    Hold,
    AlreadyOpen,
    BelowThreshold { confidence: f64, required: f64 },
    Cooldown { remaining_minutes: i64 },
}

impl std::fmt::Display for EntrySkip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntrySkip::Hold => write!(f, "no directional signal"),
            EntrySkip::AlreadyOpen => write!(f, "position already open"),
            EntrySkip::BelowThreshold {
                confidence,
                required,
            } => write!(f, "confidence {:.1} below {:.1}", confidence, required),
            EntrySkip::Cooldown { remaining_minutes } => {
                write!(f, "cooldown active ({}m left)", remaining_minutes)
            }
        }
    }
}

/// Something that happened to an open position without closing it
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    TierHit {
        tier: usize, // 1-based
        price: f64,
        new_stop: f64,
    },
    TrailingUpdated {
        level: f64,
    },
}

/// Outcome of evaluating one snapshot against an instrument's slot
#[derive(Debug, Clone)]
pub enum PositionUpdate {
    Flat,
    Held {
        events: Vec<PositionEvent>,
        unrealized_pct: f64,
    },
    Closed(ClosedTrade),
}

/// Components of the composite trend-weakening score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeaknessScore {
    pub rsi_reversal: bool,
    pub macd_reversal: bool,
    pub adx_decline: bool,
    pub di_flip: bool,
    pub candles_against: bool,
}

impl WeaknessScore {
    pub fn total(&self) -> usize {
        [
            self.rsi_reversal,
            self.macd_reversal,
            self.adx_decline,
            self.di_flip,
            self.candles_against,
        ]
        .iter()
        .filter(|c| **c)
        .count()
    }
}

/// Position lifecycle state machine
///
/// Holds no positions itself; each instrument's state lives in a
/// `PositionSlot` owned by the caller, so one manager serves every
/// instrument.
#[derive(Debug, Clone, Default)]
pub struct PositionManager {
    config: PositionConfig,
}

impl PositionManager {
    pub fn new(config: PositionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PositionConfig {
        &self.config
    }

    /// Check whether a signal may open a position on this slot
    pub fn entry_decision(
        &self,
        slot: &PositionSlot,
        signal: &Signal,
        now: DateTime<Utc>,
    ) -> Result<(), EntrySkip> {
        if !signal.is_actionable() {
            return Err(EntrySkip::Hold);
        }
        if slot.is_open() {
            return Err(EntrySkip::AlreadyOpen);
        }

        let required = self.config.required_confidence();
        if signal.adjusted_confidence < required {
            return Err(EntrySkip::BelowThreshold {
                confidence: signal.adjusted_confidence,
                required,
            });
        }

        if let Some((direction, at)) = slot.last_entry {
            let blocks = match self.config.cooldown_scope {
                CooldownScope::AnyDirection => true,
                CooldownScope::SameDirection => direction == signal.direction,
            };
            let window = Duration::minutes(self.config.cooldown_minutes);
            let elapsed = now - at;
            if blocks && elapsed < window {
                return Err(EntrySkip::Cooldown {
                    remaining_minutes: (window - elapsed).num_minutes().max(1),
                });
            }
        }

        Ok(())
    }

    /// Open a position from an actionable signal
    ///
    /// Rejects the attempt if the slot is already open; an existing position
    /// is never overwritten.
    pub fn open_position<'a>(
        &self,
        slot: &'a mut PositionSlot,
        signal: &Signal,
    ) -> Result<&'a Position, TradingError> {
        if slot.is_open() {
            tracing::warn!(
                "🚫 Rejected second position for {} (already open)",
                slot.instrument
            );
            return Err(TradingError::StateViolation {
                instrument: slot.instrument.clone(),
            });
        }

        let side = Side::from_direction(signal.direction).ok_or_else(|| {
            TradingError::Computation(format!("cannot open {} on a HOLD signal", signal.instrument))
        })?;

        let entry_price = signal.snapshot.close;
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return Err(TradingError::Computation(format!(
                "invalid entry price {} for {}",
                entry_price, signal.instrument
            )));
        }

        let tiers = self.take_profit_plan(side, entry_price, &signal.snapshot);
        let stop_loss = side.adverse(entry_price, self.config.stop_loss_pct);

        tracing::info!(
            "📈 Opened {} {} @ ${:.4} (stop ${:.4}, targets {})",
            side,
            signal.instrument,
            entry_price,
            stop_loss,
            tiers
                .iter()
                .map(|t| format!("${:.4}", t.target_price))
                .collect::<Vec<_>>()
                .join(" / ")
        );

        slot.last_entry = Some((signal.direction, signal.generated_at));
        Ok(slot.position.insert(Position {
            id: Uuid::new_v4(),
            instrument: signal.instrument.clone(),
            timeframe: signal.timeframe,
            side,
            entry_price,
            entry_time: signal.generated_at,
            stop_loss,
            trailing_stop: None,
            tiers,
            highest_price: entry_price,
            lowest_price: entry_price,
            signal: signal.clone(),
        }))
    }

    /// Multiplier applied to base take-profit percentages
    ///
    /// Product of trend, volatility, volume and RSI-extremity factors,
    /// clamped to [0.6, 2.5].
    pub fn target_multiplier(&self, side: Side, snapshot: &IndicatorSnapshot) -> f64 {
        if !self.config.dynamic_targets {
            return 1.0;
        }

        let trend: f64 = if snapshot.adx > 40.0 {
            1.5
        } else if snapshot.adx > 25.0 {
            1.25
        } else if snapshot.adx < 20.0 {
            0.8
        } else {
            1.0
        };

        let volatility: f64 = if snapshot.volatility > 3.0 {
            1.3
        } else if snapshot.volatility > 1.5 {
            1.15
        } else if snapshot.volatility < 0.5 {
            0.85
        } else {
            1.0
        };

        let volume: f64 = if snapshot.volume_ratio > 2.0 {
            1.2
        } else if snapshot.volume_ratio > 1.5 {
            1.1
        } else {
            1.0
        };

        let (favourable, against) = match side {
            Side::Long => (snapshot.rsi < 30.0, snapshot.rsi > 70.0),
            Side::Short => (snapshot.rsi > 70.0, snapshot.rsi < 30.0),
        };
        let rsi: f64 = if favourable {
            1.15
        } else if against {
            0.85
        } else {
            1.0
        };

        (trend * volatility * volume * rsi).clamp(0.6, 2.5)
    }

    /// Staged take-profit targets with their protective stop levels
    ///
    /// Tier 1 protects breakeven, each later tier protects the previous
    /// tier's target, and the final tier has no protect level because it
    /// closes the position.
    pub fn take_profit_plan(
        &self,
        side: Side,
        entry_price: f64,
        snapshot: &IndicatorSnapshot,
    ) -> Vec<TakeProfitTier> {
        let multiplier = self.target_multiplier(side, snapshot);
        let pcts: Vec<f64> = self
            .config
            .take_profit_pcts
            .iter()
            .map(|p| p * multiplier)
            .collect();

        let last = pcts.len().saturating_sub(1);
        pcts.iter()
            .enumerate()
            .map(|(i, pct)| {
                let protect_price = if i == last {
                    None
                } else if i == 0 {
                    Some(entry_price)
                } else {
                    Some(side.favorable(entry_price, pcts[i - 1]))
                };
                TakeProfitTier {
                    target_pct: *pct,
                    target_price: side.favorable(entry_price, *pct),
                    protect_price,
                    hit: false,
                }
            })
            .collect()
    }

    /// Trailing distance in percent for the current unrealized profit
    pub fn trailing_distance_pct(&self, profit_pct: f64, adx: f64) -> f64 {
        let base = if profit_pct < 3.0 {
            1.0
        } else if profit_pct < 5.0 {
            1.5
        } else if profit_pct < 10.0 {
            2.0
        } else {
            2.5
        };
        if adx > self.config.trailing_adx_threshold {
            base * self.config.trailing_adx_multiplier
        } else {
            base
        }
    }

    /// Composite trend-weakening score for the latest snapshot
    ///
    /// `history` is oldest first; components that need more history than is
    /// available count as not triggered.
    pub fn weakness_score(&self, side: Side, history: &[IndicatorSnapshot]) -> WeaknessScore {
        let Some((current, earlier)) = history.split_last() else {
            return WeaknessScore::default();
        };
        let Some(prev) = earlier.last() else {
            return WeaknessScore::default();
        };

        let rsi_falling = current.rsi < prev.rsi;
        let rsi_rising = current.rsi > prev.rsi;
        let hist_falling = current.macd_histogram < prev.macd_histogram;
        let hist_rising = current.macd_histogram > prev.macd_histogram;

        let (rsi_reversal, macd_reversal, di_flip) = match side {
            Side::Long => (
                current.rsi > 70.0 || (current.rsi > 65.0 && rsi_falling),
                hist_falling && current.macd_histogram <= 0.0,
                current.minus_di > current.plus_di,
            ),
            Side::Short => (
                current.rsi < 30.0 || (current.rsi < 35.0 && rsi_rising),
                hist_rising && current.macd_histogram >= 0.0,
                current.plus_di > current.minus_di,
            ),
        };

        let adx_decline = current.adx < prev.adx || current.adx < 20.0;

        // Last four close-to-close moves
        let recent = &history[history.len().saturating_sub(5)..];
        let candles_against = recent.len() == 5
            && recent
                .windows(2)
                .filter(|pair| match side {
                    Side::Long => pair[1].close < pair[0].close,
                    Side::Short => pair[1].close > pair[0].close,
                })
                .count()
                >= 3;

        WeaknessScore {
            rsi_reversal,
            macd_reversal,
            adx_decline,
            di_flip,
            candles_against,
        }
    }

    /// EMA9/EMA21 cross against the position with price beyond both
    pub fn is_trend_reversal(&self, side: Side, history: &[IndicatorSnapshot]) -> bool {
        let [.., prev, current] = history else {
            return false;
        };
        match side {
            Side::Long => {
                current.ema_9 < current.ema_21
                    && prev.ema_9 >= prev.ema_21
                    && current.close < current.ema_9
                    && current.close < current.ema_21
            }
            Side::Short => {
                current.ema_9 > current.ema_21
                    && prev.ema_9 <= prev.ema_21
                    && current.close > current.ema_9
                    && current.close > current.ema_21
            }
        }
    }

    /// Evaluate the latest snapshot of `history` against the slot's position
    ///
    /// Exit checks run in priority order: stop/trailing breach, final
    /// take-profit tier, trend weakening, trend reversal. When the position
    /// survives, newly crossed tiers ratchet the stop and the trailing level
    /// is recomputed; those levels apply from the next snapshot on.
    pub fn evaluate(
        &self,
        slot: &mut PositionSlot,
        history: &[IndicatorSnapshot],
    ) -> Result<PositionUpdate, TradingError> {
        let Some(position) = slot.position.as_mut() else {
            return Ok(PositionUpdate::Flat);
        };
        let current = history.last().ok_or_else(|| {
            TradingError::Computation(format!("empty snapshot history for {}", slot.instrument))
        })?;
        let price = current.close;
        if !(price.is_finite() && price > 0.0) {
            return Err(TradingError::Computation(format!(
                "invalid price {} for {}",
                price, slot.instrument
            )));
        }

        position.highest_price = position.highest_price.max(price);
        position.lowest_price = position.lowest_price.min(price);

        if let Some(reason) = self.exit_reason(position, history, current) {
            return self.close_position(slot, current, reason).map(PositionUpdate::Closed);
        }

        let side = position.side;
        let mut events = Vec::new();

        // Tier crossings ratchet the stop, never loosen it
        let last = position.tiers.len().saturating_sub(1);
        for (i, tier) in position.tiers.iter_mut().enumerate() {
            if i == last || tier.hit || !reached(side, price, tier.target_price) {
                continue;
            }
            tier.hit = true;
            if let Some(protect) = tier.protect_price {
                position.stop_loss = match side {
                    Side::Long => position.stop_loss.max(protect),
                    Side::Short => position.stop_loss.min(protect),
                };
            }
            tracing::info!(
                "🎯 {} tier {} reached @ ${:.4}, stop now ${:.4}",
                position.instrument,
                i + 1,
                price,
                position.stop_loss
            );
            events.push(PositionEvent::TierHit {
                tier: i + 1,
                price,
                new_stop: position.stop_loss,
            });
        }

        if position.peak_profit_pct() >= self.config.trailing_activation_pct {
            let distance = self.trailing_distance_pct(position.unrealized_pct(price), current.adx);
            let candidate = match side {
                Side::Long => position.highest_price * (1.0 - distance / 100.0),
                Side::Short => position.lowest_price * (1.0 + distance / 100.0),
            };
            let level = match (side, position.trailing_stop) {
                (Side::Long, Some(existing)) => existing.max(candidate),
                (Side::Short, Some(existing)) => existing.min(candidate),
                (_, None) => candidate,
            };
            if position.trailing_stop != Some(level) {
                position.trailing_stop = Some(level);
                events.push(PositionEvent::TrailingUpdated { level });
            }
        }

        Ok(PositionUpdate::Held {
            events,
            unrealized_pct: position.unrealized_pct(price),
        })
    }

    fn exit_reason(
        &self,
        position: &Position,
        history: &[IndicatorSnapshot],
        current: &IndicatorSnapshot,
    ) -> Option<ExitReason> {
        let side = position.side;
        let price = current.close;

        let stop = position.effective_stop();
        let breached = match side {
            Side::Long => price <= stop,
            Side::Short => price >= stop,
        };
        if breached {
            let trailing_tighter = position.trailing_stop.is_some_and(|t| match side {
                Side::Long => t > position.stop_loss,
                Side::Short => t < position.stop_loss,
            });
            return Some(if trailing_tighter {
                ExitReason::TrailingStop
            } else {
                ExitReason::StopLoss
            });
        }

        if let Some(final_tier) = position.final_tier() {
            if reached(side, price, final_tier.target_price) {
                return Some(ExitReason::TakeProfit);
            }
        }

        let profit = position.unrealized_pct(price);
        let held = current.timestamp - position.entry_time;
        if profit > 0.0 && held >= Duration::minutes(self.config.min_hold_minutes) {
            let weakness = self.weakness_score(side, history);
            if weakness.total() >= self.config.weakness_threshold {
                tracing::info!(
                    "⚠️  {} trend weakening (score {}: {:?})",
                    position.instrument,
                    weakness.total(),
                    weakness
                );
                return Some(ExitReason::TrendWeakening);
            }
        }

        if self.is_trend_reversal(side, history) {
            return Some(ExitReason::TrendReversal);
        }

        None
    }

    /// Close the slot's position at the snapshot's close price
    pub fn close_position(
        &self,
        slot: &mut PositionSlot,
        snapshot: &IndicatorSnapshot,
        reason: ExitReason,
    ) -> Result<ClosedTrade, TradingError> {
        let position = slot.position.take().ok_or_else(|| {
            TradingError::Computation(format!("no open position for {}", slot.instrument))
        })?;

        let exit_price = snapshot.close;
        let profit_loss_pct = position.side.pnl_pct(position.entry_price, exit_price);

        tracing::info!(
            "📉 Closed {} {} @ ${:.4} ({}): {:+.2}%",
            position.side,
            position.instrument,
            exit_price,
            reason,
            profit_loss_pct
        );

        Ok(ClosedTrade {
            id: position.id,
            instrument: position.instrument,
            timeframe: position.timeframe,
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            entry_time: position.entry_time,
            exit_time: snapshot.timestamp,
            profit_loss_pct,
            exit_reason: reason,
            entry_confidence: position.signal.adjusted_confidence,
            entry_trend: position.signal.trend,
            entry_price_change: position.signal.price_change,
            entry_volume_change: position.signal.volume_change,
            entry_snapshot: position.signal.snapshot,
        })
    }
}

fn reached(side: Side, price: f64, target: f64) -> bool {
    match side {
        Side::Long => price >= target,
        Side::Short => price <= target,
    }
}
