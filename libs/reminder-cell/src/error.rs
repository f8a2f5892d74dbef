use thiserror::Error;

use shared_database::RepositoryError;
use shared_models::error::AppError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReminderError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Maximum delivery attempts ({max_attempts}) reached for reminder {reminder_id}")]
    RetryExhausted { reminder_id: i64, max_attempts: i32 },

    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<RepositoryError> for ReminderError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => ReminderError::NotFound(msg),
            RepositoryError::StaleWrite(msg) => ReminderError::InvalidState(msg),
            RepositoryError::Conflict(msg) | RepositoryError::Backend(msg) => {
                ReminderError::Repository(msg)
            }
        }
    }
}

impl From<ReminderError> for AppError {
    fn from(err: ReminderError) -> Self {
        match err {
            ReminderError::Validation(msg) => AppError::ValidationError(msg),
            ReminderError::NotFound(msg) => AppError::NotFound(msg),
            ReminderError::InvalidState(msg) => AppError::InvalidState(msg),
            e @ ReminderError::RetryExhausted { .. } => AppError::RetryExhausted(e.to_string()),
            ReminderError::Repository(msg) => AppError::Database(msg),
        }
    }
}
