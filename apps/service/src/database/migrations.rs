use anyhow::Result;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
///
/// This is the single source of truth for database schema.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Monitors, workers and events").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Data center assignment tables").await?;
    }

    tracing::info!("Database migrations completed (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp_millis();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: monitors, workers, the monitor/worker join table and events.
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            friendly_name TEXT NOT NULL,
            address TEXT NOT NULL,
            monitor_type TEXT NOT NULL,
            directory_id INTEGER NOT NULL,
            creator_id INTEGER NOT NULL,
            interval_ms INTEGER NOT NULL,
            cron_expression TEXT,
            use_local_worker INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'waiting',
            uptime_status TEXT NOT NULL DEFAULT 'unknown',
            flip_status INTEGER NOT NULL DEFAULT 0,
            error_tolerance INTEGER NOT NULL DEFAULT 0,
            description TEXT,
            timeout_ms INTEGER NOT NULL DEFAULT 5000,
            expected_response_time_ms INTEGER NOT NULL DEFAULT 5000,
            method TEXT,
            expected_min_status_code INTEGER,
            expected_max_status_code INTEGER,
            request_body TEXT,
            request_headers TEXT,
            request_params TEXT,
            request_query TEXT,
            expected_response_body TEXT,
            expected_response_header TEXT,
            port INTEGER,
            dns_query_type TEXT,
            dns_value TEXT,
            deleted_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    // Uniqueness only applies to live rows; soft-deleted monitors may be
    // recreated with the same tuple.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_monitors_identity
         ON monitors (address, directory_id, monitor_type)
         WHERE deleted_at IS NULL",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_monitors_status ON monitors (status)
         WHERE deleted_at IS NULL",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            identifier TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            connected INTEGER NOT NULL DEFAULT 0,
            last_check_in INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitor_workers (
            monitor_id INTEGER NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
            worker_id INTEGER NOT NULL REFERENCES workers(id) ON DELETE CASCADE,
            PRIMARY KEY (monitor_id, worker_id)
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            monitor_id INTEGER NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
            triggered_at INTEGER NOT NULL,
            start_at INTEGER,
            end_at INTEGER,
            dns_lookup_ms INTEGER,
            tcp_connection_ms INTEGER,
            tls_handshake_ms INTEGER,
            first_byte_ms INTEGER,
            content_transfer_ms INTEGER,
            status_code INTEGER,
            response_body TEXT,
            error_message TEXT,
            error_code TEXT,
            is_ok INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_monitor
         ON events (monitor_id, triggered_at DESC)",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v2: data centers and their monitor assignments.
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS data_centers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            region TEXT,
            created_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitor_data_centers (
            monitor_id INTEGER NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
            data_center_id INTEGER NOT NULL REFERENCES data_centers(id) ON DELETE CASCADE,
            PRIMARY KEY (monitor_id, data_center_id)
        )",
        (),
    )
    .await?;

    Ok(())
}
