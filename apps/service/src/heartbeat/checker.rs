use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Utc;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use url::Url;

use super::timing::Checkpoints;
use crate::database::models::{DnsQueryType, Monitor, MonitorType};
use crate::error::ServiceError;

/// Cap on how much of a response body gets retained on an event.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// What a single probe observed: how far the transport got, and what came
/// back. Timing checkpoints survive even when the probe errors mid-flight.
#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    pub checkpoints: Checkpoints,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

/// Checker trait for the supported probe protocols.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Run one probe. Transport failures are reported through the outcome's
    /// error fields, not as `Err`; `Err` is reserved for malformed monitors.
    async fn check(&self, monitor: &Monitor) -> Result<CheckOutcome>;
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A transport failure mapped to the error fields persisted on events.
struct ProbeError {
    code: &'static str,
    message: String,
}

impl ProbeError {
    fn from_io(err: &io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::ConnectionRefused => "ECONNREFUSED",
            io::ErrorKind::ConnectionReset => "ECONNRESET",
            io::ErrorKind::ConnectionAborted => "ECONNABORTED",
            io::ErrorKind::TimedOut => "ETIMEDOUT",
            io::ErrorKind::UnexpectedEof => "ECONNRESET",
            _ => "EIO",
        };
        Self { code, message: err.to_string() }
    }

    fn resolution(message: String) -> Self {
        Self { code: "ENOTFOUND", message }
    }
}

fn apply_timeout_error(outcome: &mut CheckOutcome, timeout_ms: u64) {
    outcome.error_code = Some("TIMEOUT".to_string());
    outcome.error_message = Some(format!("check timed out after {timeout_ms}ms"));
}

fn apply_probe_error(outcome: &mut CheckOutcome, err: ProbeError) {
    outcome.error_code = Some(err.code.to_string());
    outcome.error_message = Some(err.message);
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ProbeError> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|err| ProbeError::resolution(format!("dns lookup for {host} failed: {err}")))?;

    addrs
        .next()
        .ok_or_else(|| ProbeError::resolution(format!("dns lookup for {host} returned no records")))
}

/// Instrumented HTTP/HTTPS checker.
///
/// Speaks HTTP/1.1 over a raw socket so every transport phase gets its own
/// wall-clock checkpoint; an off-the-shelf client would only expose the
/// total round trip.
pub struct HttpChecker {
    tls: TlsConnector,
}

impl HttpChecker {
    pub fn new() -> Result<Self> {
        let mut roots = rustls::RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        roots.add_parsable_certificates(native.certs);

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self { tls: TlsConnector::from(Arc::new(config)) })
    }

    async fn run(&self, monitor: &Monitor, outcome: &mut CheckOutcome) -> Result<()> {
        let url = Url::parse(&monitor.address).map_err(|err| {
            ServiceError::InvalidAddress(format!("{}: {err}", monitor.address))
        })?;

        let secure = match url.scheme() {
            "https" => true,
            "http" => false,
            other => {
                return Err(ServiceError::InvalidAddress(format!(
                    "unsupported scheme {other} in {}",
                    monitor.address
                ))
                .into());
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| {
                ServiceError::InvalidAddress(format!("no host in {}", monitor.address))
            })?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(if secure { 443 } else { 80 });

        let request = build_request(monitor, &url, &host)?;

        let addr = match resolve(&host, port).await {
            Ok(addr) => addr,
            Err(err) => {
                apply_probe_error(outcome, err);
                return Ok(());
            }
        };
        outcome.checkpoints.dns_lookup = Some(now_ms());

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(err) => {
                apply_probe_error(outcome, ProbeError::from_io(&err));
                return Ok(());
            }
        };
        outcome.checkpoints.tcp_connect = Some(now_ms());

        if secure {
            let server_name = ServerName::try_from(host.clone())
                .map_err(|_| anyhow!("invalid tls server name: {host}"))?;
            let stream = match self.tls.connect(server_name, stream).await {
                Ok(stream) => stream,
                Err(err) => {
                    apply_probe_error(outcome, ProbeError::from_io(&err));
                    return Ok(());
                }
            };
            outcome.checkpoints.tls_handshake = Some(now_ms());
            exchange(stream, &request, outcome).await;
        } else {
            exchange(stream, &request, outcome).await;
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, monitor: &Monitor) -> Result<CheckOutcome> {
        let mut outcome = CheckOutcome { checkpoints: Checkpoints::new(now_ms()), ..Default::default() };

        let timeout_ms = monitor.timeout_ms.max(1);
        match timeout(Duration::from_millis(timeout_ms), self.run(monitor, &mut outcome)).await {
            Ok(result) => result?,
            Err(_) => apply_timeout_error(&mut outcome, timeout_ms),
        }

        Ok(outcome)
    }
}

/// Write the request, record the first-byte and end checkpoints, then parse
/// the status line and body out of the raw response.
async fn exchange<S>(mut stream: S, request: &[u8], outcome: &mut CheckOutcome)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(err) = stream.write_all(request).await {
        apply_probe_error(outcome, ProbeError::from_io(&err));
        return;
    }

    let mut first = [0u8; 1];
    match stream.read(&mut first).await {
        Ok(0) => {
            apply_probe_error(
                outcome,
                ProbeError {
                    code: "ECONNRESET",
                    message: "connection closed before any response byte".to_string(),
                },
            );
            return;
        }
        Ok(_) => outcome.checkpoints.first_byte = Some(now_ms()),
        Err(err) => {
            apply_probe_error(outcome, ProbeError::from_io(&err));
            return;
        }
    }

    let mut raw = Vec::with_capacity(8 * 1024);
    raw.push(first[0]);

    let mut buf = [0u8; 8 * 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if raw.len() < MAX_BODY_BYTES * 2 {
                    raw.extend_from_slice(&buf[..n]);
                }
            }
            Err(err) => {
                apply_probe_error(outcome, ProbeError::from_io(&err));
                return;
            }
        }
    }
    outcome.checkpoints.end = Some(now_ms());

    match parse_response(&raw) {
        Some((status, body)) => {
            outcome.status_code = Some(status);
            outcome.response_body = body;
        }
        None => {
            apply_probe_error(
                outcome,
                ProbeError { code: "EPROTO", message: "malformed http response".to_string() },
            );
        }
    }
}

fn build_request(monitor: &Monitor, url: &Url, host: &str) -> Result<Vec<u8>> {
    let method = monitor.method.as_deref().unwrap_or("GET").to_ascii_uppercase();

    let mut target = url.path().to_string();
    match (url.query(), monitor.request_query.as_deref()) {
        (Some(query), None) => {
            target.push('?');
            target.push_str(query);
        }
        (None, Some(extra)) => {
            target.push('?');
            target.push_str(extra.trim_start_matches('?'));
        }
        (Some(query), Some(extra)) => {
            target.push('?');
            target.push_str(query);
            target.push('&');
            target.push_str(extra.trim_start_matches('?'));
        }
        (None, None) => {}
    }

    let mut request = format!("{method} {target} HTTP/1.1\r\nHost: {host}\r\n");
    request.push_str("User-Agent: uptide/0.1\r\nAccept: */*\r\nConnection: close\r\n");

    if let Some(raw) = monitor.request_headers.as_deref() {
        let headers: HashMap<String, String> = serde_json::from_str(raw)
            .map_err(|err| anyhow!("monitor request_headers is not a json object: {err}"))?;
        for (name, value) in headers {
            request.push_str(&format!("{name}: {value}\r\n"));
        }
    }

    let body = monitor.request_body.as_deref().unwrap_or("");
    if !body.is_empty() {
        request.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    request.push_str("\r\n");

    let mut bytes = request.into_bytes();
    bytes.extend_from_slice(body.as_bytes());
    Ok(bytes)
}

/// Extract the status code and body from a raw HTTP/1.1 response. Bodies are
/// truncated to `MAX_BODY_BYTES`; chunked transfer framing is left as-is
/// since the body is only used for substring matching.
fn parse_response(raw: &[u8]) -> Option<(u16, Option<String>)> {
    let text = String::from_utf8_lossy(raw);
    let status_line = text.lines().next()?;

    let mut parts = status_line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    let status: u16 = parts.next()?.parse().ok()?;

    let body = text.split_once("\r\n\r\n").map(|(_, body)| {
        // The cap may land inside a multi-byte character; back up to the
        // nearest boundary instead of panicking.
        let mut cut = MAX_BODY_BYTES.min(body.len());
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body[..cut].to_string()
    });

    Some((status, body.filter(|b| !b.is_empty())))
}

/// TCP reachability checker. Resolves the host, connects to the monitor's
/// port and hangs up.
pub struct PingChecker;

#[async_trait::async_trait]
impl Checker for PingChecker {
    async fn check(&self, monitor: &Monitor) -> Result<CheckOutcome> {
        let mut outcome = CheckOutcome { checkpoints: Checkpoints::new(now_ms()), ..Default::default() };
        let port = monitor.port.ok_or_else(|| {
            ServiceError::InvalidAddress(format!("ping monitor {} has no port", monitor.address))
        })?;

        let timeout_ms = monitor.timeout_ms.max(1);
        let probe = async {
            let addr = match resolve(&monitor.address, port).await {
                Ok(addr) => addr,
                Err(err) => {
                    apply_probe_error(&mut outcome, err);
                    return;
                }
            };
            outcome.checkpoints.dns_lookup = Some(now_ms());

            match TcpStream::connect(addr).await {
                Ok(_stream) => {
                    let now = now_ms();
                    outcome.checkpoints.tcp_connect = Some(now);
                    outcome.checkpoints.end = Some(now);
                }
                Err(err) => apply_probe_error(&mut outcome, ProbeError::from_io(&err)),
            }
        };

        if timeout(Duration::from_millis(timeout_ms), probe).await.is_err() {
            apply_timeout_error(&mut outcome, timeout_ms);
        }

        Ok(outcome)
    }
}

/// DNS resolution checker. Resolves the monitor address and, when an
/// expected value is configured, requires one of the answers to match it.
pub struct DnsChecker;

#[async_trait::async_trait]
impl Checker for DnsChecker {
    async fn check(&self, monitor: &Monitor) -> Result<CheckOutcome> {
        let mut outcome = CheckOutcome { checkpoints: Checkpoints::new(now_ms()), ..Default::default() };
        let query_type = monitor.dns_query_type.unwrap_or(DnsQueryType::A);

        let timeout_ms = monitor.timeout_ms.max(1);
        let probe = async {
            let addrs = match lookup_host((monitor.address.as_str(), 0)).await {
                Ok(addrs) => addrs,
                Err(err) => {
                    apply_probe_error(
                        &mut outcome,
                        ProbeError::resolution(format!(
                            "dns lookup for {} failed: {err}",
                            monitor.address
                        )),
                    );
                    return;
                }
            };
            let now = now_ms();
            outcome.checkpoints.dns_lookup = Some(now);
            outcome.checkpoints.end = Some(now);

            let answers: Vec<String> = addrs
                .map(|addr| addr.ip())
                .filter(|ip| match query_type {
                    DnsQueryType::A => ip.is_ipv4(),
                    DnsQueryType::Aaaa => ip.is_ipv6(),
                })
                .map(|ip| ip.to_string())
                .collect();

            if answers.is_empty() {
                apply_probe_error(
                    &mut outcome,
                    ProbeError::resolution(format!(
                        "no {} records for {}",
                        query_type.as_str(),
                        monitor.address
                    )),
                );
                return;
            }

            outcome.response_body = Some(answers.join(","));

            if let Some(expected) = monitor.dns_value.as_deref() {
                if !answers.iter().any(|answer| answer == expected) {
                    outcome.error_code = Some("DNS_VALUE_MISMATCH".to_string());
                    outcome.error_message = Some(format!(
                        "expected {expected}, resolved [{}]",
                        answers.join(", ")
                    ));
                }
            }
        };

        if timeout(Duration::from_millis(timeout_ms), probe).await.is_err() {
            apply_timeout_error(&mut outcome, timeout_ms);
        }

        Ok(outcome)
    }
}

/// Checker set indexed by monitor type.
pub struct CheckerSet {
    http: HttpChecker,
    ping: PingChecker,
    dns: DnsChecker,
}

impl CheckerSet {
    pub fn new() -> Result<Self> {
        Ok(Self { http: HttpChecker::new()?, ping: PingChecker, dns: DnsChecker })
    }

    pub fn for_type(&self, monitor_type: MonitorType) -> &dyn Checker {
        match monitor_type {
            MonitorType::Http => &self.http,
            MonitorType::Ping => &self.ping,
            MonitorType::Dns => &self.dns,
        }
    }
}
