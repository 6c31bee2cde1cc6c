use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::channel::{ChannelEvent, WorkerChannel};
use crate::database::Database;
use crate::database::models::{Worker, WorkerStatus};
use crate::error::ServiceError;

/// Consecutive failed liveness probes before a session is declared dead.
const MAX_MISSED_PROBES: u32 = 3;

/// A live worker session.
#[derive(Debug, Clone)]
pub struct ActiveWorkerEntry {
    pub worker: Worker,
    pub missed_probes: u32,
}

/// Tracks which workers currently hold a live channel session.
///
/// The map is keyed by channel id, which only exists for the lifetime of a
/// connection; durable worker state (identity, connected flag, last
/// check-in) lives in the database. A restart starts from an empty map and
/// workers re-register as they reconnect.
pub struct WorkerFleetRegistry {
    db: Arc<dyn Database>,
    channel: Arc<dyn WorkerChannel>,
    active: RwLock<HashMap<String, ActiveWorkerEntry>>,
}

impl WorkerFleetRegistry {
    pub fn new(db: Arc<dyn Database>, channel: Arc<dyn WorkerChannel>) -> Self {
        Self { db, channel, active: RwLock::new(HashMap::new()) }
    }

    /// Register a worker session. Unknown worker uuids are rejected; a
    /// reconnect that changes nothing (already connected, same identifier)
    /// skips the database write.
    pub async fn handle_connect(
        &self,
        uuid: Uuid,
        identifier: &str,
        channel_id: &str,
    ) -> Result<()> {
        let worker = self
            .db
            .find_worker_by_uuid(uuid)
            .await?
            .ok_or_else(|| ServiceError::worker_not_found(uuid))?;
        let worker_id = worker
            .id
            .ok_or_else(|| anyhow::anyhow!("worker {uuid} has no row id"))?;

        let unchanged = worker.connected && worker.identifier.as_deref() == Some(identifier);
        if !unchanged {
            self.db.update_worker_connection(worker_id, true, Some(identifier)).await?;
            tracing::info!(worker = %uuid, identifier, "worker connected");
        } else {
            tracing::debug!(worker = %uuid, identifier, "worker reconnected, state unchanged");
        }

        let worker = self
            .db
            .find_worker_by_uuid(uuid)
            .await?
            .ok_or_else(|| ServiceError::worker_not_found(uuid))?;

        let mut active = self.active.write().await;
        // One session per worker: a new channel id replaces any stale one.
        active.retain(|_, entry| entry.worker.uuid != uuid);
        active.insert(channel_id.to_string(), ActiveWorkerEntry { worker, missed_probes: 0 });
        Ok(())
    }

    /// Drop a session. Disconnects for unknown channel ids are ignored;
    /// workers already marked inactive keep their status untouched.
    pub async fn handle_disconnect(&self, channel_id: &str) -> Result<()> {
        let entry = self.active.write().await.remove(channel_id);
        let Some(entry) = entry else {
            return Ok(());
        };

        if entry.worker.status != WorkerStatus::Inactive {
            if let Some(worker_id) = entry.worker.id {
                self.db.update_worker_connection(worker_id, false, None).await?;
            }
        }
        tracing::info!(worker = %entry.worker.uuid, channel = channel_id, "worker disconnected");
        Ok(())
    }

    /// One liveness pass over every session. A successful probe refreshes
    /// the worker's check-in time; a failed one counts against
    /// `MAX_MISSED_PROBES` before the session is torn down. Persistence
    /// failures are logged per entry so one bad write cannot starve the
    /// bookkeeping for the rest of the fleet.
    pub async fn sweep(&self) {
        let channel_ids: Vec<String> = self.active.read().await.keys().cloned().collect();

        for channel_id in channel_ids {
            if self.channel.ping(&channel_id).await {
                let worker_id = {
                    let mut active = self.active.write().await;
                    let Some(entry) = active.get_mut(&channel_id) else { continue };
                    entry.missed_probes = 0;
                    entry.worker.id
                };
                if let Some(worker_id) = worker_id {
                    if let Err(err) = self.db.update_worker_last_check_in(worker_id).await {
                        tracing::error!(
                            channel = %channel_id,
                            error = %err,
                            "check-in update failed"
                        );
                    }
                }
            } else {
                let exhausted = {
                    let mut active = self.active.write().await;
                    let Some(entry) = active.get_mut(&channel_id) else { continue };
                    entry.missed_probes += 1;
                    entry.missed_probes >= MAX_MISSED_PROBES
                };
                if exhausted {
                    tracing::warn!(channel = %channel_id, "worker unresponsive, dropping session");
                    if let Err(err) = self.handle_disconnect(&channel_id).await {
                        tracing::error!(
                            channel = %channel_id,
                            error = %err,
                            "session teardown failed"
                        );
                    }
                }
            }
        }
    }

    pub async fn is_connected(&self, uuid: Uuid) -> bool {
        self.active.read().await.values().any(|entry| entry.worker.uuid == uuid)
    }

    pub async fn channel_for(&self, uuid: Uuid) -> Option<String> {
        self.active
            .read()
            .await
            .iter()
            .find(|(_, entry)| entry.worker.uuid == uuid)
            .map(|(channel_id, _)| channel_id.clone())
    }

    /// Pick any connected worker for an assignment.
    pub async fn any_connected(&self) -> Option<(String, Worker)> {
        self.active
            .read()
            .await
            .iter()
            .next()
            .map(|(channel_id, entry)| (channel_id.clone(), entry.worker.clone()))
    }

    pub async fn connected_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// Drain channel lifecycle events until the transport closes its sender.
    pub async fn run_event_loop(self: Arc<Self>, mut events: mpsc::Receiver<ChannelEvent>) {
        while let Some(event) = events.recv().await {
            let result = match event {
                ChannelEvent::Connected { uuid, identifier, channel_id } => {
                    self.handle_connect(uuid, &identifier, &channel_id).await
                }
                ChannelEvent::Disconnected { channel_id } => {
                    self.handle_disconnect(&channel_id).await
                }
            };
            if let Err(err) = result {
                tracing::error!(error = %err, "channel event handling failed");
            }
        }
    }
}
