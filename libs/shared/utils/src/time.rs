use std::sync::Mutex;

use chrono::{Datelike, Duration, Local, NaiveDateTime, Timelike};
use thiserror::Error;

use shared_config::MAX_REMINDER_LEAD_HOURS;
use shared_models::Weekday;

/// Input format accepted for appointment times, e.g. `2099-06-15 14:30`.
pub const APPOINTMENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Format used when an appointment time is shown to a patient.
pub const REMINDER_DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M";

const ACCEPTED_FORMATS: [&str; 4] = [
    APPOINTMENT_TIME_FORMAT,
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("Date and time are required")]
    Missing,

    #[error("Invalid date/time '{0}', expected yyyy-MM-dd HH:mm")]
    InvalidFormat(String),
}

/// Source of "now" for every time-dependent rule.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in the clinic's local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn parse_appointment_time(raw: &str) -> Result<NaiveDateTime, TimeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(TimeError::Missing);
    }

    ACCEPTED_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| TimeError::InvalidFormat(raw.to_string()))
}

pub fn weekday_of(when: NaiveDateTime) -> Weekday {
    Weekday::from(when.weekday())
}

/// Strictly later than `now`.
pub fn is_future(when: NaiveDateTime, now: NaiveDateTime) -> bool {
    when > now
}

pub fn format_for_reminder(when: NaiveDateTime) -> String {
    when.format(REMINDER_DISPLAY_FORMAT).to_string()
}

/// `when` minus the lead time, with the lead clamped to `[0, MAX_REMINDER_LEAD_HOURS]`.
pub fn reminder_send_time(when: NaiveDateTime, lead_hours: i64) -> NaiveDateTime {
    let lead = Duration::hours(lead_hours.clamp(0, MAX_REMINDER_LEAD_HOURS));
    when.checked_sub_signed(lead).unwrap_or(when)
}

/// Operating window of the clinic as whole hours, `[open_hour, close_hour)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClinicHours {
    pub open_hour: u32,
    pub close_hour: u32,
}

impl Default for ClinicHours {
    fn default() -> Self {
        Self {
            open_hour: 7,
            close_hour: 19,
        }
    }
}

impl ClinicHours {
    pub fn new(open_hour: u32, close_hour: u32) -> Self {
        Self {
            open_hour,
            close_hour,
        }
    }

    pub fn contains(&self, when: NaiveDateTime) -> bool {
        let hour = when.hour();
        hour >= self.open_hour && hour < self.close_hour
    }
}
