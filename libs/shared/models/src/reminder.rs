use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hard upper bound of delivery attempts per reminder.
pub const MAX_DELIVERY_ATTEMPTS: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub appointment_id: i64,
    pub channel: ReminderChannel,
    pub message: String,
    pub scheduled_send_at: NaiveDateTime,
    pub status: ReminderStatus,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub sent_at: Option<NaiveDateTime>,
    /// Earliest time a failed reminder may be retried by the worker.
    pub next_attempt_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    /// Row version, bumped by every write. Guards the dispatcher's final write.
    #[serde(default)]
    pub version: i32,
}

impl Reminder {
    pub fn attempts_exhausted(&self) -> bool {
        self.attempt_count >= MAX_DELIVERY_ATTEMPTS
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderChannel {
    Email,
    Sms,
}

impl ReminderChannel {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "EMAIL" => Some(ReminderChannel::Email),
            "SMS" => Some(ReminderChannel::Sms),
            _ => None,
        }
    }
}

impl fmt::Display for ReminderChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderChannel::Email => write!(f, "EMAIL"),
            ReminderChannel::Sms => write!(f, "SMS"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Failed,
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderStatus::Pending => write!(f, "PENDING"),
            ReminderStatus::Sent => write!(f, "SENT"),
            ReminderStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Reminder row planned for an appointment that is being written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReminder {
    pub channel: ReminderChannel,
    pub message: String,
    pub scheduled_send_at: NaiveDateTime,
}
