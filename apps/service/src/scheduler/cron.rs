use chrono::{DateTime, Duration, Timelike, Utc};
use rand::Rng;

use crate::error::ServiceError;

/// Build a seconds-cron expression for a check interval.
///
/// The shape is `{offset}/{step} * * * * *`: fire every `step` seconds,
/// phase-shifted by a random `offset` so monitors created together do not
/// all fire on the same tick. The offset is drawn from `[0, min(step, 60))`
/// to stay inside the seconds field.
pub fn generate_cron_expression(interval_ms: u64) -> String {
    let step = (interval_ms / 1000).max(1);
    let offset = rand::thread_rng().gen_range(0..step.min(60));
    format!("{offset}/{step} * * * * *")
}

/// A parsed seconds-cron expression.
///
/// Only the `offset/step` seconds field is meaningful; the remaining five
/// fields must be `*`. Steps longer than a minute degrade to one tick per
/// minute at the offset second, which callers accept for coarse intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronSchedule {
    offset: u32,
    step: u32,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ServiceError> {
        let invalid = || ServiceError::InvalidCron(expression.to_string());

        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 6 || fields[1..].iter().any(|field| *field != "*") {
            return Err(invalid());
        }

        let (offset, step) = fields[0].split_once('/').ok_or_else(invalid)?;
        let offset: u32 = offset.parse().map_err(|_| invalid())?;
        let step: u32 = step.parse().map_err(|_| invalid())?;

        if offset > 59 || step == 0 {
            return Err(invalid());
        }

        Ok(Self { offset, step })
    }

    /// Seconds within a minute at which this schedule fires.
    fn fires_at_second(&self, second: u32) -> bool {
        second >= self.offset && (second - self.offset) % self.step == 0
    }

    /// First whole-second instant strictly after `after` at which the
    /// schedule fires.
    pub fn next_fire(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let mut candidate = after
            .with_nanosecond(0)
            .unwrap_or(after)
            + Duration::seconds(1);

        // The firing set repeats every minute, so 61 steps always suffice.
        for _ in 0..=60 {
            if self.fires_at_second(candidate.second()) {
                return candidate;
            }
            candidate += Duration::seconds(1);
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn generated_expression_has_cron_shape() {
        for _ in 0..50 {
            let expression = generate_cron_expression(60_000);
            let fields: Vec<&str> = expression.split_whitespace().collect();
            assert_eq!(fields.len(), 6);
            assert_eq!(&fields[1..], &["*", "*", "*", "*", "*"]);

            let (offset, step) = fields[0].split_once('/').unwrap();
            let offset: u32 = offset.parse().unwrap();
            assert_eq!(step, "60");
            assert!(offset <= 59);
        }
    }

    #[test]
    fn offset_never_exceeds_short_intervals() {
        for _ in 0..50 {
            let expression = generate_cron_expression(5_000);
            let schedule = CronSchedule::parse(&expression).unwrap();
            assert!(schedule.offset < 5);
            assert_eq!(schedule.step, 5);
        }
    }

    #[test]
    fn sub_second_intervals_clamp_to_one_second() {
        let expression = generate_cron_expression(250);
        assert_eq!(expression, "0/1 * * * * *");
    }

    #[test]
    fn parse_rejects_malformed_expressions() {
        assert!(CronSchedule::parse("5/30 * * * * *").is_ok());
        assert!(CronSchedule::parse("*/30 * * * * *").is_err());
        assert!(CronSchedule::parse("5/30 * * * *").is_err());
        assert!(CronSchedule::parse("5/0 * * * * *").is_err());
        assert!(CronSchedule::parse("61/30 * * * * *").is_err());
        assert!(CronSchedule::parse("5/30 * * * 1 *").is_err());
    }

    #[test]
    fn next_fire_walks_the_offset_grid() {
        let schedule = CronSchedule::parse("10/20 * * * * *").unwrap();
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

        let first = schedule.next_fire(base);
        assert_eq!(first.second(), 10);

        let second = schedule.next_fire(first);
        assert_eq!(second.second(), 30);

        let third = schedule.next_fire(second);
        assert_eq!(third.second(), 50);

        // Wraps into the next minute.
        let fourth = schedule.next_fire(third);
        assert_eq!(fourth.second(), 10);
        assert_eq!(fourth.minute(), 1);
    }

    #[test]
    fn next_fire_is_strictly_in_the_future() {
        let schedule = CronSchedule::parse("0/30 * * * * *").unwrap();
        let on_the_tick = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 30).unwrap();

        let next = schedule.next_fire(on_the_tick);
        assert_eq!(next.second(), 0);
        assert_eq!(next.minute(), 1);
    }
}
