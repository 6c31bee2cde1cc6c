use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Protocol a monitor probes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorType {
    Http,
    Ping,
    Dns,
}

impl MonitorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorType::Http => "http",
            MonitorType::Ping => "ping",
            MonitorType::Dns => "dns",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "ping" => MonitorType::Ping,
            "dns" => MonitorType::Dns,
            _ => MonitorType::Http,
        }
    }
}

/// Scheduling lifecycle of a monitor.
///
/// `Waiting` means enabled but not yet assigned a worker/cron expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Disabled,
    Waiting,
    Enabled,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Disabled => "disabled",
            MonitorStatus::Waiting => "waiting",
            MonitorStatus::Enabled => "enabled",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "waiting" => MonitorStatus::Waiting,
            "enabled" => MonitorStatus::Enabled,
            _ => MonitorStatus::Disabled,
        }
    }
}

/// Observed availability of the monitored endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UptimeStatus {
    Unknown,
    Up,
    Down,
}

impl UptimeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UptimeStatus::Unknown => "unknown",
            UptimeStatus::Up => "up",
            UptimeStatus::Down => "down",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "up" => UptimeStatus::Up,
            "down" => UptimeStatus::Down,
            _ => UptimeStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Active,
    Inactive,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Active => "active",
            WorkerStatus::Inactive => "inactive",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "inactive" => WorkerStatus::Inactive,
            _ => WorkerStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsQueryType {
    A,
    Aaaa,
}

impl DnsQueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsQueryType::A => "a",
            DnsQueryType::Aaaa => "aaaa",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "aaaa" => DnsQueryType::Aaaa,
            _ => DnsQueryType::A,
        }
    }
}

/// Monitor model - a configured endpoint check definition.
///
/// Uniqueness is `(address, directory_id, monitor_type)` among non-deleted
/// rows; rows are soft-deleted via `deleted_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub friendly_name: String,
    pub address: String,
    pub monitor_type: MonitorType,
    pub directory_id: i64,
    pub creator_id: i64,
    /// Check interval in milliseconds.
    pub interval_ms: u64,
    /// Derived seconds-cron expression; `None` until assignment.
    pub cron_expression: Option<String>,
    pub use_local_worker: bool,
    pub status: MonitorStatus,
    pub uptime_status: UptimeStatus,
    /// Pending-flip marker: opposite results observed but tolerance not yet
    /// exhausted.
    pub flip_status: bool,
    /// Consecutive opposite results required before `uptime_status` flips.
    pub error_tolerance: u32,
    pub description: Option<String>,
    pub timeout_ms: u64,
    pub expected_response_time_ms: u64,

    // http parameters
    pub method: Option<String>,
    pub expected_min_status_code: Option<u16>,
    pub expected_max_status_code: Option<u16>,
    pub request_body: Option<String>,
    /// JSON object of header name -> value.
    pub request_headers: Option<String>,
    pub request_params: Option<String>,
    pub request_query: Option<String>,
    pub expected_response_body: Option<String>,
    pub expected_response_header: Option<String>,

    // ping parameters
    pub port: Option<u16>,

    // dns parameters
    pub dns_query_type: Option<DnsQueryType>,
    pub dns_value: Option<String>,

    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    pub fn new_http(
        friendly_name: impl Into<String>,
        address: impl Into<String>,
        directory_id: i64,
        creator_id: i64,
        interval_ms: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            friendly_name: friendly_name.into(),
            address: address.into(),
            monitor_type: MonitorType::Http,
            directory_id,
            creator_id,
            interval_ms,
            cron_expression: None,
            use_local_worker: false,
            status: MonitorStatus::Waiting,
            uptime_status: UptimeStatus::Unknown,
            flip_status: false,
            error_tolerance: 0,
            description: None,
            timeout_ms: 5_000,
            expected_response_time_ms: 5_000,
            method: Some("GET".to_string()),
            expected_min_status_code: None,
            expected_max_status_code: None,
            request_body: None,
            request_headers: None,
            request_params: None,
            request_query: None,
            expected_response_body: None,
            expected_response_header: None,
            port: None,
            dns_query_type: None,
            dns_value: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Convert a wall-clock instant to epoch milliseconds for storage.
    pub fn datetime_to_millis(time: DateTime<Utc>) -> i64 {
        time.timestamp_millis()
    }

    /// Convert stored epoch milliseconds back to a wall-clock instant.
    pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
    }
}

/// Worker model - a process capable of executing checks.
///
/// `uuid` is stable across reconnects; `identifier` is the transport-session
/// token and changes on every connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub identifier: Option<String>,
    pub status: WorkerStatus,
    pub connected: bool,
    pub last_check_in: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    pub fn new(uuid: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            uuid,
            identifier: None,
            status: WorkerStatus::Active,
            connected: false,
            last_check_in: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Event model - one row per executed check, insert-only.
///
/// Phase durations are individually nullable: a phase the transport skipped
/// is absent, never zero. `is_ok` is written by the result evaluator before
/// persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub monitor_id: i64,
    pub triggered_at: DateTime<Utc>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub dns_lookup_ms: Option<i64>,
    pub tcp_connection_ms: Option<i64>,
    pub tls_handshake_ms: Option<i64>,
    pub first_byte_ms: Option<i64>,
    pub content_transfer_ms: Option<i64>,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub is_ok: bool,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(monitor_id: i64, triggered_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            monitor_id,
            triggered_at,
            start_at: None,
            end_at: None,
            dns_lookup_ms: None,
            tcp_connection_ms: None,
            tls_handshake_ms: None,
            first_byte_ms: None,
            content_transfer_ms: None,
            status_code: None,
            response_body: None,
            error_message: None,
            error_code: None,
            is_ok: false,
            created_at: Utc::now(),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error_message.is_some() || self.error_code.is_some()
    }
}
