use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Raw wall-clock checkpoints captured by a checker, in epoch milliseconds.
///
/// `start` is always present; everything after it records how far the
/// transport got. A checkpoint a transport never reached stays `None`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Checkpoints {
    pub start: i64,
    pub dns_lookup: Option<i64>,
    pub tcp_connect: Option<i64>,
    pub tls_handshake: Option<i64>,
    pub first_byte: Option<i64>,
    pub end: Option<i64>,
}

impl Checkpoints {
    pub fn new(start: i64) -> Self {
        Self { start, ..Default::default() }
    }
}

/// Per-phase durations derived from adjacent checkpoints.
///
/// Each duration exists only when both of its endpoints were recorded;
/// absence propagates instead of collapsing to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseDurations {
    pub dns_lookup_ms: Option<i64>,
    pub tcp_connection_ms: Option<i64>,
    pub tls_handshake_ms: Option<i64>,
    pub first_byte_ms: Option<i64>,
    pub content_transfer_ms: Option<i64>,
}

impl PhaseDurations {
    /// Derive the waterfall. Phases chain: each duration is measured from
    /// the latest earlier checkpoint that exists (plain-HTTP probes skip the
    /// TLS checkpoint, so first byte is measured from connect).
    pub fn from_checkpoints(cp: &Checkpoints) -> Result<Self, ServiceError> {
        let dns_lookup_ms = diff("dns lookup", Some(cp.start), cp.dns_lookup)?;

        // A probe given a literal IP skips resolution; connect time is then
        // measured from the start of the check.
        let tcp_base = cp.dns_lookup.or(Some(cp.start));
        let tcp_connection_ms = diff("tcp connection", tcp_base, cp.tcp_connect)?;
        let tls_handshake_ms = diff("tls handshake", cp.tcp_connect, cp.tls_handshake)?;

        let first_byte_base = cp.tls_handshake.or(cp.tcp_connect);
        let first_byte_ms = diff("first byte", first_byte_base, cp.first_byte)?;
        let content_transfer_ms = diff("content transfer", cp.first_byte, cp.end)?;

        Ok(Self {
            dns_lookup_ms,
            tcp_connection_ms,
            tls_handshake_ms,
            first_byte_ms,
            content_transfer_ms,
        })
    }
}

fn diff(phase: &str, from: Option<i64>, to: Option<i64>) -> Result<Option<i64>, ServiceError> {
    match (from, to) {
        (Some(from), Some(to)) => {
            let elapsed = to - from;
            if elapsed < 0 {
                return Err(ServiceError::Integrity(format!(
                    "{phase} checkpoint precedes its predecessor ({to} < {from})"
                )));
            }
            Ok(Some(elapsed))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_https_waterfall() {
        let cp = Checkpoints {
            start: 0,
            dns_lookup: Some(10),
            tcp_connect: Some(30),
            tls_handshake: Some(60),
            first_byte: Some(90),
            end: Some(150),
        };

        let phases = PhaseDurations::from_checkpoints(&cp).unwrap();
        assert_eq!(phases.dns_lookup_ms, Some(10));
        assert_eq!(phases.tcp_connection_ms, Some(20));
        assert_eq!(phases.tls_handshake_ms, Some(30));
        assert_eq!(phases.first_byte_ms, Some(30));
        assert_eq!(phases.content_transfer_ms, Some(60));

        // Phases partition the total wall time.
        let total: i64 = [
            phases.dns_lookup_ms,
            phases.tcp_connection_ms,
            phases.tls_handshake_ms,
            phases.first_byte_ms,
            phases.content_transfer_ms,
        ]
        .iter()
        .flatten()
        .sum();
        assert_eq!(total, cp.end.unwrap() - cp.start);
    }

    #[test]
    fn plain_http_measures_first_byte_from_connect() {
        let cp = Checkpoints {
            start: 0,
            dns_lookup: Some(5),
            tcp_connect: Some(25),
            tls_handshake: None,
            first_byte: Some(65),
            end: Some(80),
        };

        let phases = PhaseDurations::from_checkpoints(&cp).unwrap();
        assert_eq!(phases.tls_handshake_ms, None);
        assert_eq!(phases.first_byte_ms, Some(40));
        assert_eq!(phases.content_transfer_ms, Some(15));
    }

    #[test]
    fn unreached_phases_stay_absent_not_zero() {
        // Connection refused after DNS resolved.
        let cp = Checkpoints { start: 100, dns_lookup: Some(112), ..Default::default() };

        let phases = PhaseDurations::from_checkpoints(&cp).unwrap();
        assert_eq!(phases.dns_lookup_ms, Some(12));
        assert_eq!(phases.tcp_connection_ms, None);
        assert_eq!(phases.tls_handshake_ms, None);
        assert_eq!(phases.first_byte_ms, None);
        assert_eq!(phases.content_transfer_ms, None);
    }

    #[test]
    fn backwards_checkpoint_is_an_integrity_error() {
        let cp = Checkpoints {
            start: 0,
            dns_lookup: Some(10),
            tcp_connect: Some(8),
            ..Default::default()
        };

        let err = PhaseDurations::from_checkpoints(&cp).unwrap_err();
        assert!(matches!(err, ServiceError::Integrity(_)));
    }

    #[test]
    fn zero_duration_phase_is_valid() {
        let cp = Checkpoints {
            start: 0,
            dns_lookup: Some(0),
            tcp_connect: Some(0),
            ..Default::default()
        };

        let phases = PhaseDurations::from_checkpoints(&cp).unwrap();
        assert_eq!(phases.dns_lookup_ms, Some(0));
        assert_eq!(phases.tcp_connection_ms, Some(0));
    }
}
