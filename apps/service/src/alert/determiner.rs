use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{AlertSink, StatusTransition};
use crate::database::Database;
use crate::database::models::{Monitor, UptimeStatus};

/// Applies hysteresis to raw check results before a monitor's availability
/// is allowed to change.
///
/// A monitor needs `error_tolerance` consecutive results opposite to its
/// current status before it flips (a tolerance of zero flips on the first
/// one); a single agreeing result resets the streak. The pending streak
/// itself lives in memory; only the `flip_status` marker (a flip is
/// brewing) and the final status are persisted.
pub struct UptimeDeterminer {
    db: Arc<dyn Database>,
    sinks: Vec<Arc<dyn AlertSink>>,
    streaks: Mutex<HashMap<i64, u32>>,
}

impl UptimeDeterminer {
    pub fn new(db: Arc<dyn Database>, sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self { db, sinks, streaks: Mutex::new(HashMap::new()) }
    }

    /// Feed one check result through the hysteresis. Returns the new status
    /// when it changed, `None` otherwise.
    pub async fn determine(&self, monitor: &Monitor, is_ok: bool) -> Result<Option<UptimeStatus>> {
        let monitor_id = match monitor.id {
            Some(id) => id,
            None => return Ok(None),
        };
        let observed = if is_ok { UptimeStatus::Up } else { UptimeStatus::Down };

        // A monitor that was never checked adopts the first observation
        // outright.
        if monitor.uptime_status == UptimeStatus::Unknown {
            self.streaks.lock().await.remove(&monitor_id);
            self.db.update_uptime_status(monitor_id, observed, false).await?;
            tracing::info!(
                monitor = %monitor.friendly_name,
                status = observed.as_str(),
                "initial uptime status adopted"
            );
            return Ok(Some(observed));
        }

        if observed == monitor.uptime_status {
            let had_streak = self.streaks.lock().await.remove(&monitor_id).is_some();
            if had_streak || monitor.flip_status {
                // An agreeing result cancels a brewing flip.
                self.db.update_uptime_status(monitor_id, monitor.uptime_status, false).await?;
            }
            return Ok(None);
        }

        let streak = {
            let mut streaks = self.streaks.lock().await;
            let streak = streaks.entry(monitor_id).or_insert(0);
            *streak += 1;
            *streak
        };

        if streak >= monitor.error_tolerance.max(1) {
            self.streaks.lock().await.remove(&monitor_id);
            self.db.update_uptime_status(monitor_id, observed, false).await?;

            let transition = StatusTransition {
                from: monitor.uptime_status,
                to: observed,
                at: Utc::now(),
            };
            for sink in &self.sinks {
                sink.notify(monitor, transition).await;
            }
            return Ok(Some(observed));
        }

        if !monitor.flip_status {
            self.db.update_uptime_status(monitor_id, monitor.uptime_status, true).await?;
        }
        Ok(None)
    }
}
