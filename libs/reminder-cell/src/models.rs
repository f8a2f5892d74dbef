use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::ReminderChannel;

/// Denormalized view of a reminder's appointment used to render and route a
/// notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderContext {
    pub reminder_id: i64,
    pub appointment_id: i64,
    pub channel: ReminderChannel,
    pub patient_name: String,
    pub patient_email: Option<String>,
    pub patient_phone: Option<String>,
    pub doctor_name: String,
    /// Appointment time as shown to the patient (`dd/MM/yyyy HH:mm`).
    pub appointment_time: String,
    pub clinic_name: String,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub clinic_name: String,
    pub retry_backoff_minutes: i64,
    pub notifier_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

impl DispatcherConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            clinic_name: config.clinic_name.clone(),
            retry_backoff_minutes: config.reminder_retry_backoff_minutes,
            notifier_timeout: Duration::from_secs(config.notifier_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub scan_interval_seconds: u64,
    pub max_concurrent_dispatches: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            worker_id: format!("reminder-worker-{}", Uuid::new_v4()),
            scan_interval_seconds: config.reminder_scan_interval_seconds.max(1),
            max_concurrent_dispatches: config.reminder_max_concurrent.max(1),
        }
    }
}

/// Outcome of one worker pass over due and retryable reminders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub sweep_id: Uuid,
    pub started_at: Option<NaiveDateTime>,
    pub due: usize,
    pub retried: usize,
    pub sent: usize,
    pub failed: usize,
    /// Reminders rejected by a precondition, e.g. cancelled since listing.
    pub skipped: usize,
}

impl SweepSummary {
    pub fn attempted(&self) -> usize {
        self.sent + self.failed
    }
}
