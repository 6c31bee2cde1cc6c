use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use libsql::{Row, params};
use uuid::Uuid;

use super::models::{
    DnsQueryType, Event, Monitor, MonitorStatus, MonitorType, UptimeStatus, Worker, WorkerStatus,
};
use crate::error::ServiceError;
use crate::pool::{LibsqlManager, LibsqlPool};

const MONITOR_COLUMNS: &str = "id, uuid, friendly_name, address, monitor_type, directory_id, \
     creator_id, interval_ms, cron_expression, use_local_worker, status, uptime_status, \
     flip_status, error_tolerance, description, timeout_ms, expected_response_time_ms, method, \
     expected_min_status_code, expected_max_status_code, request_body, request_headers, \
     request_params, request_query, expected_response_body, expected_response_header, port, \
     dns_query_type, dns_value, deleted_at, created_at, updated_at";

const WORKER_COLUMNS: &str =
    "id, uuid, identifier, status, connected, last_check_in, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, uuid, monitor_id, triggered_at, start_at, end_at, \
     dns_lookup_ms, tcp_connection_ms, tls_handshake_ms, first_byte_ms, content_transfer_ms, \
     status_code, response_body, error_message, error_code, is_ok, created_at";

/// Database trait for abstracting storage operations.
///
/// The minimal contract the engine requires; everything else stays behind
/// the libsql implementation.
#[async_trait]
pub trait Database: Send + Sync {
    /// Create a monitor. A requested `Enabled` status is downgraded to
    /// `Waiting` (the scheduler promotes it once assigned); a duplicate
    /// `(address, directory, type)` tuple fails with `Conflict` before any
    /// write.
    async fn create_monitor(&self, monitor: &Monitor) -> Result<i64>;

    /// Fetch a live (non-deleted) monitor by id.
    async fn find_monitor(&self, id: i64) -> Result<Option<Monitor>>;

    /// Page through monitors in `Enabled` or `Waiting` status. Pages are
    /// 1-based.
    async fn find_enabled_or_waiting(&self, page: u32, limit: u32) -> Result<Vec<Monitor>>;

    async fn count_enabled_or_waiting(&self) -> Result<u64>;

    /// Persist a cron expression and return the updated monitor.
    async fn update_monitor_cron(&self, id: i64, cron_expression: &str) -> Result<Monitor>;

    async fn update_monitor_status(&self, id: i64, status: MonitorStatus) -> Result<()>;

    async fn update_monitor_local_worker(&self, id: i64, use_local_worker: bool) -> Result<()>;

    async fn update_uptime_status(
        &self,
        id: i64,
        uptime_status: UptimeStatus,
        flip_status: bool,
    ) -> Result<()>;

    /// Mark a monitor deleted. The row survives for event history.
    async fn soft_delete_monitor(&self, id: i64) -> Result<()>;

    async fn create_worker(&self, worker: &Worker) -> Result<i64>;

    async fn find_worker_by_uuid(&self, uuid: Uuid) -> Result<Option<Worker>>;

    /// Persist the connection flag, optionally rotating the session
    /// identifier.
    async fn update_worker_connection(
        &self,
        id: i64,
        connected: bool,
        identifier: Option<&str>,
    ) -> Result<()>;

    async fn update_worker_last_check_in(&self, id: i64) -> Result<()>;

    /// Record a monitor/worker assignment.
    async fn link_monitor_worker(&self, monitor_id: i64, worker_id: i64) -> Result<()>;

    /// Workers currently assigned to a monitor.
    async fn find_assigned_workers(&self, monitor_id: i64) -> Result<Vec<Worker>>;

    /// Drop a monitor/worker assignment record.
    async fn unlink_monitor_worker(&self, monitor_id: i64, worker_id: i64) -> Result<()>;

    /// Append-only event insert.
    async fn insert_event(&self, event: &Event) -> Result<i64>;

    /// Most recent events for a monitor, newest first.
    async fn recent_events(&self, monitor_id: i64, limit: usize) -> Result<Vec<Event>>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let uuid_str: String = row.get(1)?;
    let monitor_type: String = row.get(4)?;
    let status: String = row.get(10)?;
    let uptime_status: String = row.get(11)?;
    let dns_query_type: Option<String> = row.get(27)?;

    Ok(Monitor {
        id: Some(row.get(0)?),
        uuid: Uuid::parse_str(&uuid_str)?,
        friendly_name: row.get(2)?,
        address: row.get(3)?,
        monitor_type: MonitorType::parse(&monitor_type),
        directory_id: row.get(5)?,
        creator_id: row.get(6)?,
        interval_ms: row.get::<i64>(7)? as u64,
        cron_expression: row.get(8)?,
        use_local_worker: row.get::<i64>(9)? != 0,
        status: MonitorStatus::parse(&status),
        uptime_status: UptimeStatus::parse(&uptime_status),
        flip_status: row.get::<i64>(12)? != 0,
        error_tolerance: row.get::<i64>(13)? as u32,
        description: row.get(14)?,
        timeout_ms: row.get::<i64>(15)? as u64,
        expected_response_time_ms: row.get::<i64>(16)? as u64,
        method: row.get(17)?,
        expected_min_status_code: row.get::<Option<i64>>(18)?.map(|v| v as u16),
        expected_max_status_code: row.get::<Option<i64>>(19)?.map(|v| v as u16),
        request_body: row.get(20)?,
        request_headers: row.get(21)?,
        request_params: row.get(22)?,
        request_query: row.get(23)?,
        expected_response_body: row.get(24)?,
        expected_response_header: row.get(25)?,
        port: row.get::<Option<i64>>(26)?.map(|v| v as u16),
        dns_query_type: dns_query_type.as_deref().map(DnsQueryType::parse),
        dns_value: row.get(28)?,
        deleted_at: row.get::<Option<i64>>(29)?.map(Monitor::millis_to_datetime),
        created_at: Monitor::millis_to_datetime(row.get(30)?),
        updated_at: Monitor::millis_to_datetime(row.get(31)?),
    })
}

fn worker_from_row(row: &Row) -> Result<Worker> {
    let uuid_str: String = row.get(1)?;
    let status: String = row.get(3)?;

    Ok(Worker {
        id: Some(row.get(0)?),
        uuid: Uuid::parse_str(&uuid_str)?,
        identifier: row.get(2)?,
        status: WorkerStatus::parse(&status),
        connected: row.get::<i64>(4)? != 0,
        last_check_in: row.get::<Option<i64>>(5)?.map(Monitor::millis_to_datetime),
        created_at: Monitor::millis_to_datetime(row.get(6)?),
        updated_at: Monitor::millis_to_datetime(row.get(7)?),
    })
}

fn event_from_row(row: &Row) -> Result<Event> {
    let uuid_str: String = row.get(1)?;

    Ok(Event {
        id: Some(row.get(0)?),
        uuid: Uuid::parse_str(&uuid_str)?,
        monitor_id: row.get(2)?,
        triggered_at: Monitor::millis_to_datetime(row.get(3)?),
        start_at: row.get::<Option<i64>>(4)?.map(Monitor::millis_to_datetime),
        end_at: row.get::<Option<i64>>(5)?.map(Monitor::millis_to_datetime),
        dns_lookup_ms: row.get(6)?,
        tcp_connection_ms: row.get(7)?,
        tls_handshake_ms: row.get(8)?,
        first_byte_ms: row.get(9)?,
        content_transfer_ms: row.get(10)?,
        status_code: row.get::<Option<i64>>(11)?.map(|v| v as u16),
        response_body: row.get(12)?,
        error_message: row.get(13)?,
        error_code: row.get(14)?,
        is_ok: row.get::<i64>(15)? != 0,
        created_at: Monitor::millis_to_datetime(row.get(16)?),
    })
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn create_monitor(&self, monitor: &Monitor) -> Result<i64> {
        let conn = self.get_conn().await?;

        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM monitors
                 WHERE address = ? AND directory_id = ? AND monitor_type = ?
                   AND deleted_at IS NULL",
                params![
                    monitor.address.clone(),
                    monitor.directory_id,
                    monitor.monitor_type.as_str()
                ],
            )
            .await?;

        let duplicates: i64 = rows.next().await?.map(|row| row.get(0)).transpose()?.unwrap_or(0);
        if duplicates > 0 {
            return Err(ServiceError::Conflict(format!(
                "monitor for {} already exists in directory {}",
                monitor.address, monitor.directory_id
            ))
            .into());
        }

        // An enabled monitor starts in Waiting until the scheduler assigns it.
        let status = match monitor.status {
            MonitorStatus::Enabled | MonitorStatus::Waiting => MonitorStatus::Waiting,
            MonitorStatus::Disabled => MonitorStatus::Disabled,
        };

        conn.execute(
            "INSERT INTO monitors (uuid, friendly_name, address, monitor_type, directory_id, \
             creator_id, interval_ms, cron_expression, use_local_worker, status, uptime_status, \
             flip_status, error_tolerance, description, timeout_ms, expected_response_time_ms, \
             method, expected_min_status_code, expected_max_status_code, request_body, \
             request_headers, request_params, request_query, expected_response_body, \
             expected_response_header, port, dns_query_type, dns_value, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
             ?, ?, ?, ?, ?)",
            params![
                monitor.uuid.to_string(),
                monitor.friendly_name.clone(),
                monitor.address.clone(),
                monitor.monitor_type.as_str(),
                monitor.directory_id,
                monitor.creator_id,
                monitor.interval_ms as i64,
                monitor.cron_expression.clone(),
                monitor.use_local_worker as i64,
                status.as_str(),
                monitor.uptime_status.as_str(),
                monitor.flip_status as i64,
                monitor.error_tolerance as i64,
                monitor.description.clone(),
                monitor.timeout_ms as i64,
                monitor.expected_response_time_ms as i64,
                monitor.method.clone(),
                monitor.expected_min_status_code.map(|v| v as i64),
                monitor.expected_max_status_code.map(|v| v as i64),
                monitor.request_body.clone(),
                monitor.request_headers.clone(),
                monitor.request_params.clone(),
                monitor.request_query.clone(),
                monitor.expected_response_body.clone(),
                monitor.expected_response_header.clone(),
                monitor.port.map(|v| v as i64),
                monitor.dns_query_type.map(|v| v.as_str().to_string()),
                monitor.dns_value.clone(),
                Monitor::datetime_to_millis(monitor.created_at),
                Monitor::datetime_to_millis(monitor.updated_at),
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn find_monitor(&self, id: i64) -> Result<Option<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ? AND deleted_at IS NULL"
                ),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(monitor_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_enabled_or_waiting(&self, page: u32, limit: u32) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let offset = (page.max(1) - 1) as i64 * limit as i64;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {MONITOR_COLUMNS} FROM monitors
                     WHERE status IN ('enabled', 'waiting') AND deleted_at IS NULL
                     ORDER BY id LIMIT ? OFFSET ?"
                ),
                params![limit as i64, offset],
            )
            .await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }

        Ok(monitors)
    }

    async fn count_enabled_or_waiting(&self) -> Result<u64> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM monitors
                 WHERE status IN ('enabled', 'waiting') AND deleted_at IS NULL",
                (),
            )
            .await?;

        let count: i64 = rows.next().await?.map(|row| row.get(0)).transpose()?.unwrap_or(0);
        Ok(count as u64)
    }

    async fn update_monitor_cron(&self, id: i64, cron_expression: &str) -> Result<Monitor> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET cron_expression = ?, updated_at = ? WHERE id = ?",
            params![cron_expression, Utc::now().timestamp_millis(), id],
        )
        .await?;
        drop(conn);

        self.find_monitor(id).await?.ok_or_else(|| ServiceError::monitor_not_found(id).into())
    }

    async fn update_monitor_status(&self, id: i64, status: MonitorStatus) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), Utc::now().timestamp_millis(), id],
        )
        .await?;
        Ok(())
    }

    async fn update_monitor_local_worker(&self, id: i64, use_local_worker: bool) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET use_local_worker = ?, updated_at = ? WHERE id = ?",
            params![use_local_worker as i64, Utc::now().timestamp_millis(), id],
        )
        .await?;
        Ok(())
    }

    async fn update_uptime_status(
        &self,
        id: i64,
        uptime_status: UptimeStatus,
        flip_status: bool,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET uptime_status = ?, flip_status = ?, updated_at = ? WHERE id = ?",
            params![
                uptime_status.as_str(),
                flip_status as i64,
                Utc::now().timestamp_millis(),
                id
            ],
        )
        .await?;
        Ok(())
    }

    async fn soft_delete_monitor(&self, id: i64) -> Result<()> {
        let conn = self.get_conn().await?;
        let now = Utc::now().timestamp_millis();
        conn.execute(
            "UPDATE monitors SET deleted_at = ?, status = 'disabled', updated_at = ? WHERE id = ?",
            params![now, now, id],
        )
        .await?;
        Ok(())
    }

    async fn create_worker(&self, worker: &Worker) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO workers (uuid, identifier, status, connected, last_check_in, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                worker.uuid.to_string(),
                worker.identifier.clone(),
                worker.status.as_str(),
                worker.connected as i64,
                worker.last_check_in.map(Monitor::datetime_to_millis),
                Monitor::datetime_to_millis(worker.created_at),
                Monitor::datetime_to_millis(worker.updated_at),
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn find_worker_by_uuid(&self, uuid: Uuid) -> Result<Option<Worker>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE uuid = ?"),
                params![uuid.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(worker_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_worker_connection(
        &self,
        id: i64,
        connected: bool,
        identifier: Option<&str>,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        let now = Utc::now().timestamp_millis();

        match identifier {
            Some(identifier) => {
                conn.execute(
                    "UPDATE workers SET connected = ?, identifier = ?, updated_at = ? WHERE id = ?",
                    params![connected as i64, identifier, now, id],
                )
                .await?;
            }
            None => {
                conn.execute(
                    "UPDATE workers SET connected = ?, updated_at = ? WHERE id = ?",
                    params![connected as i64, now, id],
                )
                .await?;
            }
        }

        Ok(())
    }

    async fn update_worker_last_check_in(&self, id: i64) -> Result<()> {
        let conn = self.get_conn().await?;
        let now = Utc::now().timestamp_millis();
        conn.execute(
            "UPDATE workers SET last_check_in = ?, updated_at = ? WHERE id = ?",
            params![now, now, id],
        )
        .await?;
        Ok(())
    }

    async fn link_monitor_worker(&self, monitor_id: i64, worker_id: i64) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT OR IGNORE INTO monitor_workers (monitor_id, worker_id) VALUES (?, ?)",
            params![monitor_id, worker_id],
        )
        .await?;
        Ok(())
    }

    async fn find_assigned_workers(&self, monitor_id: i64) -> Result<Vec<Worker>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT w.id, w.uuid, w.identifier, w.status, w.connected, w.last_check_in, \
                 w.created_at, w.updated_at FROM workers w \
                 JOIN monitor_workers mw ON mw.worker_id = w.id \
                 WHERE mw.monitor_id = ? ORDER BY w.id",
                params![monitor_id],
            )
            .await?;

        let mut workers = Vec::new();
        while let Some(row) = rows.next().await? {
            workers.push(worker_from_row(&row)?);
        }

        Ok(workers)
    }

    async fn unlink_monitor_worker(&self, monitor_id: i64, worker_id: i64) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "DELETE FROM monitor_workers WHERE monitor_id = ? AND worker_id = ?",
            params![monitor_id, worker_id],
        )
        .await?;
        Ok(())
    }

    async fn insert_event(&self, event: &Event) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO events (uuid, monitor_id, triggered_at, start_at, end_at, \
             dns_lookup_ms, tcp_connection_ms, tls_handshake_ms, first_byte_ms, \
             content_transfer_ms, status_code, response_body, error_message, error_code, is_ok, \
             created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                event.uuid.to_string(),
                event.monitor_id,
                Monitor::datetime_to_millis(event.triggered_at),
                event.start_at.map(Monitor::datetime_to_millis),
                event.end_at.map(Monitor::datetime_to_millis),
                event.dns_lookup_ms,
                event.tcp_connection_ms,
                event.tls_handshake_ms,
                event.first_byte_ms,
                event.content_transfer_ms,
                event.status_code.map(|v| v as i64),
                event.response_body.clone(),
                event.error_message.clone(),
                event.error_code.clone(),
                event.is_ok as i64,
                Monitor::datetime_to_millis(event.created_at),
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn recent_events(&self, monitor_id: i64, limit: usize) -> Result<Vec<Event>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events WHERE monitor_id = ?
                     ORDER BY triggered_at DESC, id DESC LIMIT ?"
                ),
                params![monitor_id, limit as i64],
            )
            .await?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(event_from_row(&row)?);
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::create_test_database;

    #[tokio::test]
    async fn duplicate_monitor_identity_conflicts() -> Result<()> {
        let (database, _dir) = create_test_database().await?;

        let monitor = Monitor::new_http("api", "https://api.example.com/health", 1, 1, 30_000);
        database.create_monitor(&monitor).await?;

        let duplicate = Monitor::new_http("api copy", "https://api.example.com/health", 1, 1, 60_000);
        let err = database.create_monitor(&duplicate).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ServiceError>(),
            Some(ServiceError::Conflict(_))
        ));

        // No second row was written.
        assert_eq!(database.count_enabled_or_waiting().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn same_address_in_another_directory_is_allowed() -> Result<()> {
        let (database, _dir) = create_test_database().await?;

        let monitor = Monitor::new_http("api", "https://api.example.com/health", 1, 1, 30_000);
        database.create_monitor(&monitor).await?;

        let other_directory =
            Monitor::new_http("api staging", "https://api.example.com/health", 2, 1, 30_000);
        database.create_monitor(&other_directory).await?;

        assert_eq!(database.count_enabled_or_waiting().await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn enabled_monitors_are_created_as_waiting() -> Result<()> {
        let (database, _dir) = create_test_database().await?;

        let mut monitor = Monitor::new_http("api", "https://api.example.com", 1, 1, 30_000);
        monitor.status = MonitorStatus::Enabled;
        let id = database.create_monitor(&monitor).await?;

        let stored = database.find_monitor(id).await?.unwrap();
        assert_eq!(stored.status, MonitorStatus::Waiting);
        Ok(())
    }

    #[tokio::test]
    async fn cron_update_returns_refreshed_monitor() -> Result<()> {
        let (database, _dir) = create_test_database().await?;

        let monitor = Monitor::new_http("api", "https://api.example.com", 1, 1, 30_000);
        let id = database.create_monitor(&monitor).await?;

        let updated = database.update_monitor_cron(id, "7/30 * * * * *").await?;
        assert_eq!(updated.cron_expression.as_deref(), Some("7/30 * * * * *"));
        Ok(())
    }

    #[tokio::test]
    async fn soft_deleted_monitor_disappears_and_tuple_is_reusable() -> Result<()> {
        let (database, _dir) = create_test_database().await?;

        let monitor = Monitor::new_http("api", "https://api.example.com", 1, 1, 30_000);
        let id = database.create_monitor(&monitor).await?;

        database.soft_delete_monitor(id).await?;
        assert!(database.find_monitor(id).await?.is_none());

        // The identity tuple is free again.
        let recreated = Monitor::new_http("api again", "https://api.example.com", 1, 1, 30_000);
        database.create_monitor(&recreated).await?;
        Ok(())
    }

    #[tokio::test]
    async fn paging_walks_all_enabled_or_waiting_monitors() -> Result<()> {
        let (database, _dir) = create_test_database().await?;

        for n in 0..5 {
            let monitor =
                Monitor::new_http(format!("m{n}"), format!("https://m{n}.example.com"), 1, 1, 30_000);
            database.create_monitor(&monitor).await?;
        }

        let first = database.find_enabled_or_waiting(1, 2).await?;
        let second = database.find_enabled_or_waiting(2, 2).await?;
        let third = database.find_enabled_or_waiting(3, 2).await?;
        let fourth = database.find_enabled_or_waiting(4, 2).await?;

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(third.len(), 1);
        assert!(fourth.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn worker_connection_round_trip() -> Result<()> {
        let (database, _dir) = create_test_database().await?;

        let uuid = Uuid::new_v4();
        let id = database.create_worker(&Worker::new(uuid)).await?;

        database.update_worker_connection(id, true, Some("session-1")).await?;
        let worker = database.find_worker_by_uuid(uuid).await?.unwrap();
        assert!(worker.connected);
        assert_eq!(worker.identifier.as_deref(), Some("session-1"));
        assert!(worker.last_check_in.is_none());

        database.update_worker_last_check_in(id).await?;
        let worker = database.find_worker_by_uuid(uuid).await?.unwrap();
        assert!(worker.last_check_in.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn events_are_insert_only_and_ordered_newest_first() -> Result<()> {
        let (database, _dir) = create_test_database().await?;

        let monitor = Monitor::new_http("api", "https://api.example.com", 1, 1, 30_000);
        let monitor_id = database.create_monitor(&monitor).await?;

        let mut first = Event::new(monitor_id, Utc::now());
        first.status_code = Some(200);
        first.is_ok = true;
        database.insert_event(&first).await?;

        let mut second = Event::new(monitor_id, Utc::now());
        second.error_code = Some("TIMEOUT".to_string());
        database.insert_event(&second).await?;

        let events = database.recent_events(monitor_id, 10).await?;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].error_code.as_deref(), Some("TIMEOUT"));
        assert!(events[1].is_ok);
        Ok(())
    }
}
