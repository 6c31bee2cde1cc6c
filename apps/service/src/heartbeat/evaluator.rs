use crate::database::models::{Event, Monitor, MonitorType};

const DEFAULT_MIN_STATUS: u16 = 200;
const DEFAULT_MAX_STATUS: u16 = 299;

/// Decide whether a finished check counts as a success.
///
/// Any recorded error short-circuits to failure. HTTP results must then land
/// inside the monitor's accepted status window (2xx when unset, bounds
/// inclusive); ping and dns checks pass on the absence of an error.
pub fn evaluate(monitor: &Monitor, event: &Event) -> bool {
    if event.has_error() {
        return false;
    }

    match monitor.monitor_type {
        MonitorType::Http => {
            let min = monitor.expected_min_status_code.unwrap_or(DEFAULT_MIN_STATUS);
            let max = monitor.expected_max_status_code.unwrap_or(DEFAULT_MAX_STATUS);
            match event.status_code {
                Some(code) => code >= min && code <= max,
                None => false,
            }
        }
        MonitorType::Ping | MonitorType::Dns => true,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn http_monitor() -> Monitor {
        Monitor::new_http("api", "https://api.example.com", 1, 1, 30_000)
    }

    fn event_with_status(code: u16) -> Event {
        let mut event = Event::new(1, Utc::now());
        event.status_code = Some(code);
        event
    }

    #[test]
    fn transport_error_fails_even_with_good_status() {
        let monitor = http_monitor();
        let mut event = event_with_status(200);
        event.error_code = Some("ECONNRESET".to_string());

        assert!(!evaluate(&monitor, &event));
    }

    #[test]
    fn default_window_is_2xx_inclusive() {
        let monitor = http_monitor();

        assert!(evaluate(&monitor, &event_with_status(200)));
        assert!(evaluate(&monitor, &event_with_status(204)));
        assert!(evaluate(&monitor, &event_with_status(299)));
        assert!(!evaluate(&monitor, &event_with_status(199)));
        assert!(!evaluate(&monitor, &event_with_status(301)));
        assert!(!evaluate(&monitor, &event_with_status(404)));
    }

    #[test]
    fn explicit_window_overrides_defaults() {
        let mut monitor = http_monitor();
        monitor.expected_min_status_code = Some(200);
        monitor.expected_max_status_code = Some(404);

        assert!(evaluate(&monitor, &event_with_status(404)));
        assert!(!evaluate(&monitor, &event_with_status(405)));
    }

    #[test]
    fn http_without_a_status_code_fails() {
        let monitor = http_monitor();
        let event = Event::new(1, Utc::now());

        assert!(!evaluate(&monitor, &event));
    }

    #[test]
    fn ping_passes_on_no_error() {
        let mut monitor = http_monitor();
        monitor.monitor_type = MonitorType::Ping;

        let clean = Event::new(1, Utc::now());
        assert!(evaluate(&monitor, &clean));

        let mut refused = Event::new(1, Utc::now());
        refused.error_code = Some("ECONNREFUSED".to_string());
        assert!(!evaluate(&monitor, &refused));
    }
}
