use super::engine::Engine;
use super::scheduler::Scheduler;
use crate::config::CategoryConfig;
use crate::models::{normalize_instrument, Timeframe};
use crate::notify::messages;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Warning,
    Error,
    Info,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ControlResponse {
    fn new(status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Operator commands over the scheduler and engine
pub struct ControlSurface {
    scheduler: Arc<Scheduler>,
    categories: CategoryConfig,
    default_timeframes: Vec<Timeframe>,
}

impl ControlSurface {
    pub fn new(
        scheduler: Arc<Scheduler>,
        categories: CategoryConfig,
        default_timeframes: Vec<Timeframe>,
    ) -> Self {
        let default_timeframes = if default_timeframes.is_empty() {
            vec![Timeframe::default()]
        } else {
            default_timeframes
        };
        Self {
            scheduler,
            categories,
            default_timeframes,
        }
    }

    fn engine(&self) -> &Arc<Engine> {
        self.scheduler.engine()
    }

    fn timeframes<'a>(&'a self, requested: &'a [Timeframe]) -> &'a [Timeframe] {
        if requested.is_empty() {
            &self.default_timeframes
        } else {
            requested
        }
    }

    pub fn start_instrument(&self, instrument: &str, timeframes: &[Timeframe]) -> ControlResponse {
        let instrument = normalize_instrument(instrument);
        let started: Vec<&str> = self
            .timeframes(timeframes)
            .iter()
            .filter(|tf| self.scheduler.start(&instrument, **tf))
            .map(|tf| tf.as_str())
            .collect();

        if started.is_empty() {
            ControlResponse::new(
                ResponseStatus::Warning,
                format!("{} is already being monitored", instrument),
            )
        } else {
            ControlResponse::new(
                ResponseStatus::Success,
                format!("Started monitoring {} on {}", instrument, started.join(", ")),
            )
        }
    }

    pub fn start_category(&self, category: &str, timeframes: &[Timeframe]) -> ControlResponse {
        let Some(instruments) = self.categories.instruments(category) else {
            return ControlResponse::new(
                ResponseStatus::Error,
                format!(
                    "Unknown category '{}'. Available: {}",
                    category,
                    self.categories.names().join(", ")
                ),
            );
        };

        let mut started = Vec::new();
        for instrument in &instruments {
            let any = self
                .timeframes(timeframes)
                .iter()
                .fold(false, |acc, tf| self.scheduler.start(instrument, *tf) || acc);
            if any {
                started.push(instrument.clone());
            }
        }

        let status = if started.is_empty() {
            ResponseStatus::Warning
        } else {
            ResponseStatus::Success
        };
        ControlResponse::new(
            status,
            format!(
                "Category {}: started {} of {} instruments",
                category,
                started.len(),
                instruments.len()
            ),
        )
        .with_data(json!({ "started": started }))
    }

    pub fn stop_instrument(&self, instrument: &str) -> ControlResponse {
        let instrument = normalize_instrument(instrument);
        match self.scheduler.stop_instrument(&instrument) {
            0 => ControlResponse::new(
                ResponseStatus::Warning,
                format!("{} is not being monitored", instrument),
            ),
            n => ControlResponse::new(
                ResponseStatus::Success,
                format!("Stopped {} monitor(s) for {}", n, instrument),
            ),
        }
    }

    pub fn stop_all(&self) -> ControlResponse {
        let n = self.scheduler.stop_all();
        ControlResponse::new(ResponseStatus::Success, format!("Stopped {} monitor(s)", n))
    }

    pub fn active_instruments(&self) -> ControlResponse {
        let active = self.scheduler.active();
        let data: Vec<Value> = active
            .iter()
            .map(|(i, tf)| json!({ "instrument": i, "timeframe": tf }))
            .collect();
        ControlResponse::new(
            ResponseStatus::Info,
            format!("{} active monitor(s)", active.len()),
        )
        .with_data(Value::Array(data))
    }

    pub async fn latest_signal(&self, instrument: &str) -> ControlResponse {
        let instrument = normalize_instrument(instrument);
        match self.engine().latest_signal(&instrument).await {
            Some(signal) => match serde_json::to_value(&signal) {
                Ok(data) => ControlResponse::new(
                    ResponseStatus::Success,
                    format!(
                        "{} {} ({:.1})",
                        instrument, signal.direction, signal.adjusted_confidence
                    ),
                )
                .with_data(data),
                Err(e) => ControlResponse::new(ResponseStatus::Error, e.to_string()),
            },
            None => ControlResponse::new(
                ResponseStatus::Info,
                format!("No signal yet for {}", instrument),
            ),
        }
    }

    pub async fn test_notification(&self) -> ControlResponse {
        if self.engine().notifier().notify(&messages::test_message()).await {
            ControlResponse::new(ResponseStatus::Success, "Test notification sent")
        } else {
            ControlResponse::new(ResponseStatus::Error, "Test notification failed")
        }
    }

    pub async fn statistics(&self, instrument: Option<&str>) -> ControlResponse {
        let stats = self.engine().statistics(instrument).await;
        let scope = instrument
            .map(normalize_instrument)
            .unwrap_or_else(|| "all instruments".to_string());
        let status = if stats.total_trades == 0 {
            ResponseStatus::Info
        } else {
            ResponseStatus::Success
        };
        let data = serde_json::to_value(&stats).unwrap_or(Value::Null);
        ControlResponse::new(
            status,
            format!("{}: {} closed trade(s)", scope, stats.total_trades),
        )
        .with_data(data)
    }
}
