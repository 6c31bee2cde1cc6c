/// Scheduler module - owns monitor assignment and check timing
///
/// In monolith mode every monitor gets an in-process timer task driven by
/// its seconds-cron expression. In distributed mode the scheduler instead
/// hands assignments to connected workers over the channel and the timers
/// run remotely.
pub mod cron;


pub use cron::{CronSchedule, generate_cron_expression};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::channel::{CheckAssignment, WorkerChannel};
use crate::config::DeploymentMode;
use crate::database::Database;
use crate::database::models::{Monitor, MonitorStatus};
use crate::error::ServiceError;
use crate::fleet::WorkerFleetRegistry;
use crate::heartbeat::HeartbeatExecutor;

/// Timer jobs are keyed by expression AND monitor id: monitors can share a
/// cron expression, and cancelling one must never stop the others.
type JobKey = (String, i64);

pub struct SchedulerCore {
    mode: DeploymentMode,
    db: Arc<dyn Database>,
    executor: Arc<HeartbeatExecutor>,
    fleet: Arc<WorkerFleetRegistry>,
    channel: Arc<dyn WorkerChannel>,
    jobs: RwLock<HashMap<JobKey, JoinHandle<()>>>,
    /// Serializes cron assignment per monitor so concurrent assigns cannot
    /// write two different expressions.
    assign_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    bootstrap_page_size: u32,
}

impl SchedulerCore {
    pub fn new(
        mode: DeploymentMode,
        db: Arc<dyn Database>,
        executor: Arc<HeartbeatExecutor>,
        fleet: Arc<WorkerFleetRegistry>,
        channel: Arc<dyn WorkerChannel>,
        bootstrap_page_size: u32,
    ) -> Self {
        Self {
            mode,
            db,
            executor,
            fleet,
            channel,
            jobs: RwLock::new(HashMap::new()),
            assign_locks: Mutex::new(HashMap::new()),
            bootstrap_page_size: bootstrap_page_size.max(1),
        }
    }

    async fn assign_lock(&self, monitor_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.assign_locks.lock().await;
        locks.entry(monitor_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Ensure a monitor has a cron expression, generating one from its
    /// interval when missing. Re-assignment reuses the stored expression so
    /// the random offset stays stable across restarts.
    pub async fn assign_cron_expression(&self, monitor_id: i64) -> Result<Monitor> {
        let lock = self.assign_lock(monitor_id).await;
        let _guard = lock.lock().await;

        let monitor = self
            .db
            .find_monitor(monitor_id)
            .await?
            .ok_or_else(|| ServiceError::monitor_not_found(monitor_id))?;

        if monitor.cron_expression.is_some() {
            return Ok(monitor);
        }

        let expression = generate_cron_expression(monitor.interval_ms);
        CronSchedule::parse(&expression)?;
        let monitor = self.db.update_monitor_cron(monitor_id, &expression).await?;
        tracing::debug!(monitor = monitor_id, cron = %expression, "cron expression assigned");
        Ok(monitor)
    }

    /// Assign a worker to a monitor and move it to `Enabled`.
    ///
    /// Monolith mode marks the monitor as locally worked and starts its
    /// timer task. Distributed mode picks a connected worker and pushes the
    /// assignment over the channel; with no workers connected the monitor
    /// stays `Waiting` and the caller gets `NoConnectedWorker`.
    pub async fn assign_worker_to_monitor(&self, monitor_id: i64) -> Result<()> {
        let monitor = self.assign_cron_expression(monitor_id).await?;
        let expression = monitor
            .cron_expression
            .clone()
            .ok_or_else(|| ServiceError::InvalidCron("missing after assignment".to_string()))?;

        match self.mode {
            DeploymentMode::Monolith => {
                self.db.update_monitor_local_worker(monitor_id, true).await?;
                self.db.update_monitor_status(monitor_id, MonitorStatus::Enabled).await?;
                self.start_job(&expression, monitor_id).await?;
            }
            DeploymentMode::Distributed => {
                let (channel_id, worker) = self
                    .fleet
                    .any_connected()
                    .await
                    .ok_or(ServiceError::NoConnectedWorker)?;

                let assignment = CheckAssignment {
                    monitor: monitor.clone(),
                    cron_expression: expression.clone(),
                };
                self.channel.dispatch_check(&channel_id, assignment).await?;

                if let Some(worker_id) = worker.id {
                    self.db.link_monitor_worker(monitor_id, worker_id).await?;
                }
                self.db.update_monitor_status(monitor_id, MonitorStatus::Enabled).await?;
                tracing::info!(monitor = monitor_id, worker = %worker.uuid, "check dispatched");
            }
        }

        Ok(())
    }

    /// Unassign a monitor and park it back in `Waiting`.
    pub async fn remove_worker_from_monitor(&self, monitor_id: i64) -> Result<()> {
        let monitor = self
            .db
            .find_monitor(monitor_id)
            .await?
            .ok_or_else(|| ServiceError::monitor_not_found(monitor_id))?;

        match self.mode {
            DeploymentMode::Monolith => {
                if let Some(expression) = monitor.cron_expression.as_deref() {
                    self.stop_job(expression, monitor_id).await;
                }
                self.db.update_monitor_local_worker(monitor_id, false).await?;
            }
            DeploymentMode::Distributed => {
                // The drop must reach the worker that actually holds the
                // assignment, so resolve it from the join table rather than
                // picking any connected session.
                for worker in self.db.find_assigned_workers(monitor_id).await? {
                    let channel_id = self
                        .fleet
                        .channel_for(worker.uuid)
                        .await
                        .ok_or(ServiceError::NoConnectedWorker)?;
                    self.channel.drop_assignment(&channel_id, monitor_id).await?;
                    if let Some(worker_id) = worker.id {
                        self.db.unlink_monitor_worker(monitor_id, worker_id).await?;
                    }
                }
            }
        }

        self.db.update_monitor_status(monitor_id, MonitorStatus::Waiting).await?;
        Ok(())
    }

    /// Tear a monitor down for good: unassign, then soft delete.
    pub async fn delete_monitor(&self, monitor_id: i64) -> Result<()> {
        self.remove_worker_from_monitor(monitor_id).await?;
        self.db.soft_delete_monitor(monitor_id).await?;
        tracing::info!(monitor = monitor_id, "monitor deleted");
        Ok(())
    }

    /// Page through every enabled-or-waiting monitor and (re)assign it.
    /// Called once at startup; assignment failures are logged and skipped so
    /// one bad monitor cannot block the rest.
    pub async fn bootstrap(&self) -> Result<()> {
        let total = self.db.count_enabled_or_waiting().await?;
        tracing::info!(total, "bootstrapping monitor schedules");

        let mut page = 1;
        loop {
            let monitors = self.db.find_enabled_or_waiting(page, self.bootstrap_page_size).await?;
            if monitors.is_empty() {
                break;
            }

            for monitor in &monitors {
                let Some(monitor_id) = monitor.id else { continue };
                match self.assign_worker_to_monitor(monitor_id).await {
                    Ok(()) => {}
                    Err(err)
                        if err.downcast_ref::<ServiceError>().is_some_and(|err| {
                            matches!(err, ServiceError::NoConnectedWorker)
                        }) =>
                    {
                        tracing::debug!(
                            monitor = monitor_id,
                            "no worker connected yet, monitor stays waiting"
                        );
                    }
                    Err(err) => {
                        tracing::error!(monitor = monitor_id, error = %err, "assignment failed");
                    }
                }
            }

            page += 1;
        }

        Ok(())
    }

    /// Spawn the periodic worker liveness sweep.
    pub fn start_liveness_sweep(self: &Arc<Self>, interval_secs: u64) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                scheduler.fleet.sweep().await;
            }
        })
    }

    pub async fn job_count(&self) -> usize {
        let mut jobs = self.jobs.write().await;
        // Timers whose monitor row vanished finish on their own; drop the
        // stale registrations before reporting.
        jobs.retain(|_, handle| !handle.is_finished());
        jobs.len()
    }

    pub async fn has_job(&self, expression: &str, monitor_id: i64) -> bool {
        let mut jobs = self.jobs.write().await;
        jobs.retain(|_, handle| !handle.is_finished());
        jobs.contains_key(&(expression.to_string(), monitor_id))
    }

    async fn start_job(&self, expression: &str, monitor_id: i64) -> Result<()> {
        let key = (expression.to_string(), monitor_id);
        let mut jobs = self.jobs.write().await;
        jobs.retain(|_, handle| !handle.is_finished());
        if jobs.contains_key(&key) {
            return Ok(());
        }

        let schedule = CronSchedule::parse(expression)?;
        let db = self.db.clone();
        let executor = self.executor.clone();

        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let fire_at = schedule.next_fire(now);
                let wait = (fire_at - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                match db.find_monitor(monitor_id).await {
                    Ok(Some(monitor)) if monitor.status == MonitorStatus::Enabled => {
                        executor.health_check(vec![monitor], fire_at);
                    }
                    // Paused monitors keep their timer; deleted ones stop it.
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(err) => {
                        tracing::error!(monitor = monitor_id, error = %err, "tick lookup failed");
                    }
                }
            }
        });

        jobs.insert(key, handle);
        Ok(())
    }

    async fn stop_job(&self, expression: &str, monitor_id: i64) {
        let key = (expression.to_string(), monitor_id);
        if let Some(handle) = self.jobs.write().await.remove(&key) {
            handle.abort();
        }
    }
}

impl Drop for SchedulerCore {
    fn drop(&mut self) {
        if let Ok(jobs) = self.jobs.try_read() {
            for handle in jobs.values() {
                handle.abort();
            }
        }
    }
}
