use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

const RELAY_PENALTY_TRIGGER: usize = 2;
const RELAY_PENALTY_WINDOW: Duration = Duration::hours(24);
const RELAY_PENALTY_DURATION: Duration = Duration::days(7);

/// Per-user rolling counters. Invariant I4: `day_key`/`month_key` rollover
/// happens lazily, in the same operation that reads or mutates the
/// counters -- there is no background zeroing job.
///
/// The relay-penalty trigger is modeled as a rolling 24h window over
/// per-call timestamps rather than a bare counter with no window key, per
/// the resolved ambiguity around day-boundary behavior: each TURN-relay
/// call is recorded with its own timestamp and summed over the trailing
/// 24h, so the penalty can never be dodged by calling just before midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub user_address: String,
    pub day_key: NaiveDate,
    pub month_key: (i32, u32),
    pub calls_started_today: u32,
    pub failed_starts_today: u32,
    pub call_attempts_hour: u32,
    pub last_attempt_hour: DateTime<Utc>,
    pub seconds_used_month: i64,
    pub relay_call_timestamps: Vec<DateTime<Utc>>,
    pub relay_penalty_until: Option<DateTime<Utc>>,
}

impl UsageCounter {
    pub fn new(user_address: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_address: user_address.into(),
            day_key: now.date_naive(),
            month_key: (now.year(), now.month()),
            calls_started_today: 0,
            failed_starts_today: 0,
            call_attempts_hour: 0,
            last_attempt_hour: now,
            seconds_used_month: 0,
            relay_call_timestamps: Vec::new(),
            relay_penalty_until: None,
        }
    }

    /// Zeroes day/month/hour fields whose window has rolled past, as of
    /// `now`. Must be called before any read or increment.
    pub fn roll_windows(&mut self, now: DateTime<Utc>) {
        if self.day_key != now.date_naive() {
            self.day_key = now.date_naive();
            self.calls_started_today = 0;
            self.failed_starts_today = 0;
        }
        let month_key = (now.year(), now.month());
        if self.month_key != month_key {
            self.month_key = month_key;
            self.seconds_used_month = 0;
        }
        if !same_hour(self.last_attempt_hour, now) {
            self.call_attempts_hour = 0;
            self.last_attempt_hour = now;
        }
    }

    pub fn increment_calls_started(&mut self, now: DateTime<Utc>) {
        self.roll_windows(now);
        self.calls_started_today += 1;
    }

    pub fn increment_failed_starts(&mut self, now: DateTime<Utc>) {
        self.roll_windows(now);
        self.failed_starts_today += 1;
    }

    pub fn increment_call_attempts(&mut self, now: DateTime<Utc>) {
        self.roll_windows(now);
        self.call_attempts_hour += 1;
    }

    pub fn add_seconds_used(&mut self, now: DateTime<Utc>, seconds: i64) {
        self.roll_windows(now);
        self.seconds_used_month += seconds;
    }

    /// Records a TURN-relay call and re-evaluates the rolling penalty.
    pub fn increment_relay_calls(&mut self, now: DateTime<Utc>) {
        self.relay_call_timestamps
            .retain(|t| now.signed_duration_since(*t) <= RELAY_PENALTY_WINDOW);
        self.relay_call_timestamps.push(now);
        if self.relay_call_timestamps.len() >= RELAY_PENALTY_TRIGGER {
            self.relay_penalty_until = Some(now + RELAY_PENALTY_DURATION);
        }
    }

    pub fn relay_penalty_active(&self, now: DateTime<Utc>) -> bool {
        self.relay_penalty_until.is_some_and(|until| now < until)
    }
}

fn same_hour(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.date_naive() == b.date_naive() && a.hour() == b.hour()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn daily_fields_reset_on_day_rollover() {
        let mut counter = UsageCounter::new("call:a", at(2026, 7, 29, 10));
        counter.increment_calls_started(at(2026, 7, 29, 11));
        assert_eq!(counter.calls_started_today, 1);
        counter.roll_windows(at(2026, 7, 30, 0));
        assert_eq!(counter.calls_started_today, 0);
    }

    #[test]
    fn relay_penalty_triggers_at_second_relay_call_in_window() {
        let mut counter = UsageCounter::new("call:a", at(2026, 7, 30, 0));
        counter.increment_relay_calls(at(2026, 7, 30, 1));
        assert!(!counter.relay_penalty_active(at(2026, 7, 30, 1)));
        counter.increment_relay_calls(at(2026, 7, 30, 10));
        assert!(counter.relay_penalty_active(at(2026, 7, 30, 10)));
    }

    #[test]
    fn relay_penalty_does_not_reset_at_midnight() {
        let mut counter = UsageCounter::new("call:a", at(2026, 7, 29, 23));
        counter.increment_relay_calls(at(2026, 7, 29, 23));
        counter.increment_relay_calls(at(2026, 7, 30, 1));
        assert!(counter.relay_penalty_active(at(2026, 7, 30, 1)));
    }

    #[test]
    fn relay_window_drops_calls_older_than_24h() {
        let mut counter = UsageCounter::new("call:a", at(2026, 7, 29, 0));
        counter.increment_relay_calls(at(2026, 7, 29, 0));
        counter.increment_relay_calls(at(2026, 7, 30, 2));
        assert_eq!(counter.relay_call_timestamps.len(), 1);
        assert!(!counter.relay_penalty_active(at(2026, 7, 30, 2)));
    }
}
