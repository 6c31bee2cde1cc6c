use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use super::checker::{CheckOutcome, CheckerSet};
use super::evaluator::evaluate;
use super::timing::{Checkpoints, PhaseDurations};
use crate::alert::UptimeDeterminer;
use crate::database::Database;
use crate::database::models::{Event, Monitor};

/// Timeout policy applied to every check: monitors without their own
/// timeout inherit the default, and nothing may exceed the transport
/// ceiling.
#[derive(Debug, Clone, Copy)]
pub struct CheckTimeouts {
    pub default_ms: u64,
    pub ceiling_ms: u64,
}

impl Default for CheckTimeouts {
    fn default() -> Self {
        Self { default_ms: 5_000, ceiling_ms: 15_000 }
    }
}

impl CheckTimeouts {
    fn effective(&self, monitor: &Monitor) -> u64 {
        let requested = if monitor.timeout_ms == 0 { self.default_ms } else { monitor.timeout_ms };
        requested.min(self.ceiling_ms).max(1)
    }
}

/// Executes checks end to end: probe, derive the timing waterfall, evaluate,
/// persist the event and feed the result into the uptime determiner.
pub struct HeartbeatExecutor {
    db: Arc<dyn Database>,
    checkers: CheckerSet,
    determiner: Arc<UptimeDeterminer>,
    timeouts: CheckTimeouts,
    /// Bounds simultaneously in-flight checks across all monitors.
    in_flight: Arc<Semaphore>,
}

impl HeartbeatExecutor {
    pub fn new(
        db: Arc<dyn Database>,
        determiner: Arc<UptimeDeterminer>,
        max_concurrent_checks: usize,
        timeouts: CheckTimeouts,
    ) -> Result<Self> {
        Ok(Self {
            db,
            checkers: CheckerSet::new()?,
            determiner,
            timeouts,
            in_flight: Arc::new(Semaphore::new(max_concurrent_checks.max(1))),
        })
    }

    /// Run one check for a monitor and persist the resulting event. Every
    /// outcome produces exactly one event row, failures included.
    pub async fn run_check(
        &self,
        monitor: &Monitor,
        triggered_at: DateTime<Utc>,
    ) -> Result<Event> {
        let monitor_id = monitor
            .id
            .ok_or_else(|| anyhow::anyhow!("monitor {} has no id", monitor.address))?;

        let mut monitor = monitor.clone();
        monitor.timeout_ms = self.timeouts.effective(&monitor);
        let monitor = &monitor;

        let checker = self.checkers.for_type(monitor.monitor_type);
        // A misconfigured monitor (bad address, missing port) is persisted
        // state and keeps getting scheduled; it fails as an event like any
        // other check, never as an error swallowed by the timer loop.
        let outcome = match checker.check(monitor).await {
            Ok(outcome) => outcome,
            Err(err) => CheckOutcome {
                checkpoints: Checkpoints::new(Utc::now().timestamp_millis()),
                error_code: Some("EINVAL".to_string()),
                error_message: Some(err.to_string()),
                ..Default::default()
            },
        };

        let mut event = Event::new(monitor_id, triggered_at);
        event.start_at = Some(Monitor::millis_to_datetime(outcome.checkpoints.start));
        event.end_at = outcome.checkpoints.end.map(Monitor::millis_to_datetime);
        event.status_code = outcome.status_code;
        event.response_body = outcome.response_body;
        event.error_message = outcome.error_message;
        event.error_code = outcome.error_code;

        match PhaseDurations::from_checkpoints(&outcome.checkpoints) {
            Ok(phases) => {
                event.dns_lookup_ms = phases.dns_lookup_ms;
                event.tcp_connection_ms = phases.tcp_connection_ms;
                event.tls_handshake_ms = phases.tls_handshake_ms;
                event.first_byte_ms = phases.first_byte_ms;
                event.content_transfer_ms = phases.content_transfer_ms;
            }
            Err(err) => {
                // Durations stay absent; the event records the corruption.
                tracing::error!(monitor = monitor_id, error = %err, "timing integrity violation");
                event.error_code = Some("INTEGRITY".to_string());
                event.error_message = Some(err.to_string());
            }
        }

        event.is_ok = evaluate(monitor, &event);

        self.db.insert_event(&event).await?;
        self.determiner.determine(monitor, event.is_ok).await?;

        Ok(event)
    }

    /// Fire-and-forget a batch of checks, each behind the concurrency cap.
    /// Used by the scheduler's cron ticks; failures are logged, never
    /// propagated into the timer loop.
    pub fn health_check(self: &Arc<Self>, monitors: Vec<Monitor>, triggered_at: DateTime<Utc>) {
        for monitor in monitors {
            let executor = Arc::clone(self);
            tokio::spawn(async move {
                let _permit = match executor.in_flight.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                if let Err(err) = executor.run_check(&monitor, triggered_at).await {
                    tracing::error!(
                        monitor = ?monitor.id,
                        address = %monitor.address,
                        error = %err,
                        "check execution failed"
                    );
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::alert::LogAlertSink;
    use crate::database::models::UptimeStatus;
    use crate::database::test_support::create_test_database;

    async fn build_executor() -> Result<(Arc<dyn Database>, Arc<HeartbeatExecutor>, tempfile::TempDir)>
    {
        let (database, dir) = create_test_database().await?;
        let db: Arc<dyn Database> = Arc::new(database);
        let determiner = Arc::new(UptimeDeterminer::new(db.clone(), vec![Arc::new(LogAlertSink)]));
        let executor =
            Arc::new(HeartbeatExecutor::new(db.clone(), determiner, 16, CheckTimeouts::default())?);
        Ok((db, executor, dir))
    }

    #[tokio::test]
    async fn successful_check_persists_event_and_adopts_status() -> Result<()> {
        let (db, executor, _dir) = build_executor().await?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                    .await;
            }
        });

        let mut monitor = Monitor::new_http("local", format!("http://{addr}/"), 1, 1, 30_000);
        monitor.timeout_ms = 2_000;
        let id = db.create_monitor(&monitor).await?;
        let monitor = db.find_monitor(id).await?.unwrap();

        let event = executor.run_check(&monitor, Utc::now()).await?;
        assert!(event.is_ok);
        assert_eq!(event.status_code, Some(200));
        assert!(event.dns_lookup_ms.is_some());
        assert!(event.tcp_connection_ms.is_some());
        assert!(event.tls_handshake_ms.is_none());

        let events = db.recent_events(id, 10).await?;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok);

        // Unknown adopted the first observation.
        let stored = db.find_monitor(id).await?.unwrap();
        assert_eq!(stored.uptime_status, UptimeStatus::Up);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_address_is_recorded_as_a_failed_event() -> Result<()> {
        let (db, executor, _dir) = build_executor().await?;

        let monitor = Monitor::new_http("broken", "not a url at all", 1, 1, 30_000);
        let id = db.create_monitor(&monitor).await?;
        let monitor = db.find_monitor(id).await?.unwrap();

        let event = executor.run_check(&monitor, Utc::now()).await?;
        assert!(!event.is_ok);
        assert_eq!(event.error_code.as_deref(), Some("EINVAL"));

        let events = db.recent_events(id, 10).await?;
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_ok);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_target_still_persists_a_failed_event() -> Result<()> {
        let (db, executor, _dir) = build_executor().await?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);

        let mut monitor = Monitor::new_http("refused", format!("http://{addr}/"), 1, 1, 30_000);
        monitor.timeout_ms = 2_000;
        let id = db.create_monitor(&monitor).await?;
        let monitor = db.find_monitor(id).await?.unwrap();

        let event = executor.run_check(&monitor, Utc::now()).await?;
        assert!(!event.is_ok);
        assert_eq!(event.error_code.as_deref(), Some("ECONNREFUSED"));
        // DNS resolved, nothing beyond it.
        assert!(event.dns_lookup_ms.is_some());
        assert!(event.tcp_connection_ms.is_none());

        let events = db.recent_events(id, 10).await?;
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_ok);

        let stored = db.find_monitor(id).await?.unwrap();
        assert_eq!(stored.uptime_status, UptimeStatus::Down);
        Ok(())
    }
}
