pub mod determiner;

pub use determiner::UptimeDeterminer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::database::models::{Monitor, UptimeStatus};

/// An observed availability transition for a monitor.
#[derive(Debug, Clone, Copy)]
pub struct StatusTransition {
    pub from: UptimeStatus,
    pub to: UptimeStatus,
    pub at: DateTime<Utc>,
}

/// Sink for confirmed status transitions. Fired only after hysteresis has
/// accepted the flip, never on raw check results.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, monitor: &Monitor, transition: StatusTransition);
}

/// Default sink: a structured log line per transition.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn notify(&self, monitor: &Monitor, transition: StatusTransition) {
        match transition.to {
            UptimeStatus::Down => tracing::warn!(
                monitor = %monitor.friendly_name,
                address = %monitor.address,
                from = transition.from.as_str(),
                "monitor went down"
            ),
            UptimeStatus::Up => tracing::info!(
                monitor = %monitor.friendly_name,
                address = %monitor.address,
                from = transition.from.as_str(),
                "monitor recovered"
            ),
            UptimeStatus::Unknown => {}
        }
    }
}
