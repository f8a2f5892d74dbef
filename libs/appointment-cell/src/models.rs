// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_config::AppConfig;
use shared_database::RepositoryError;
use shared_models::error::AppError;
use shared_utils::time::{ClinicHours, TimeError};

/// Upper bound for cancellation and reschedule reasons.
pub const MAX_REASON_LENGTH: usize = 255;

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: i64,
    pub doctor_id: i64,
    /// `yyyy-MM-dd HH:mm`
    pub scheduled_at: String,
    /// Zero or absent means "use the doctor's specialty default".
    pub duration_minutes: Option<i32>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub created_by: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub user_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub doctor_id: i64,
    pub scheduled_at: String,
    pub user_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub doctor_id: i64,
    pub scheduled_at: String,
}

// ==============================================================================
// SCHEDULING RULES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingRules {
    pub clinic_hours: ClinicHours,
    /// Used when the doctor has no specialty row.
    pub default_duration_minutes: i32,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl SchedulingRules {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            clinic_hours: ClinicHours::new(config.clinic_open_hour, config.clinic_close_hour),
            default_duration_minutes: config.default_appointment_minutes,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Scheduling conflict: {0}")]
    Conflict(String),

    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<RepositoryError> for AppointmentError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppointmentError::NotFound(msg),
            RepositoryError::Conflict(msg) => AppointmentError::Conflict(msg),
            RepositoryError::StaleWrite(msg) => AppointmentError::InvalidState(msg),
            RepositoryError::Backend(msg) => AppointmentError::Repository(msg),
        }
    }
}

impl From<TimeError> for AppointmentError {
    fn from(err: TimeError) -> Self {
        AppointmentError::Validation(err.to_string())
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::NotFound(msg) => AppError::NotFound(msg),
            AppointmentError::InvalidState(msg) => AppError::InvalidState(msg),
            AppointmentError::Conflict(msg) => AppError::Conflict(msg),
            AppointmentError::Repository(msg) => AppError::Database(msg),
        }
    }
}
