use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::database::models::Monitor;
use crate::error::ServiceError;

/// Everything a remote worker needs to run a monitor's checks on our behalf.
#[derive(Debug, Clone)]
pub struct CheckAssignment {
    pub monitor: Monitor,
    pub cron_expression: String,
}

/// Connection lifecycle events emitted by a channel transport.
///
/// The transport pushes these into an mpsc queue that the fleet registry
/// drains, so the registry never depends on a concrete transport.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected { uuid: Uuid, identifier: String, channel_id: String },
    Disconnected { channel_id: String },
}

/// Transport seam towards remote workers. Channel ids are per-session and
/// worthless after a disconnect.
#[async_trait]
pub trait WorkerChannel: Send + Sync {
    /// Liveness probe. `false` means the session is gone.
    async fn ping(&self, channel_id: &str) -> bool;

    /// Hand a monitor assignment to the worker behind `channel_id`.
    async fn dispatch_check(&self, channel_id: &str, assignment: CheckAssignment) -> Result<()>;

    /// Tell the worker to stop checking a monitor.
    async fn drop_assignment(&self, channel_id: &str, monitor_id: i64) -> Result<()>;
}

/// In-process channel: sessions are a set, dispatches are recorded. Serves
/// as the transport for dry runs and tests.
#[derive(Default)]
pub struct LoopbackChannel {
    sessions: Mutex<HashSet<String>>,
    dispatched: Mutex<Vec<(String, CheckAssignment)>>,
    dropped: Mutex<Vec<(String, i64)>>,
}

impl LoopbackChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open_session(&self, channel_id: &str) {
        self.sessions.lock().await.insert(channel_id.to_string());
    }

    pub async fn close_session(&self, channel_id: &str) {
        self.sessions.lock().await.remove(channel_id);
    }

    pub async fn dispatched(&self) -> Vec<(String, CheckAssignment)> {
        self.dispatched.lock().await.clone()
    }

    pub async fn dropped(&self) -> Vec<(String, i64)> {
        self.dropped.lock().await.clone()
    }
}

#[async_trait]
impl WorkerChannel for LoopbackChannel {
    async fn ping(&self, channel_id: &str) -> bool {
        self.sessions.lock().await.contains(channel_id)
    }

    async fn dispatch_check(&self, channel_id: &str, assignment: CheckAssignment) -> Result<()> {
        if !self.ping(channel_id).await {
            return Err(ServiceError::NotFound {
                what: "channel session",
                key: channel_id.to_string(),
            }
            .into());
        }
        self.dispatched.lock().await.push((channel_id.to_string(), assignment));
        Ok(())
    }

    async fn drop_assignment(&self, channel_id: &str, monitor_id: i64) -> Result<()> {
        self.dropped.lock().await.push((channel_id.to_string(), monitor_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_tracks_session_membership() {
        let channel = LoopbackChannel::new();
        assert!(!channel.ping("s1").await);

        channel.open_session("s1").await;
        assert!(channel.ping("s1").await);

        channel.close_session("s1").await;
        assert!(!channel.ping("s1").await);
    }

    #[tokio::test]
    async fn dispatch_to_a_dead_session_fails() {
        let channel = LoopbackChannel::new();
        let monitor = Monitor::new_http("api", "https://api.example.com", 1, 1, 30_000);
        let assignment =
            CheckAssignment { monitor, cron_expression: "0/30 * * * * *".to_string() };

        assert!(channel.dispatch_check("gone", assignment.clone()).await.is_err());

        channel.open_session("live").await;
        channel.dispatch_check("live", assignment).await.unwrap();
        assert_eq!(channel.dispatched().await.len(), 1);
    }
}
