use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use shared_database::Repository;
use shared_utils::time::parse_appointment_time;

use crate::models::AppointmentError;

/// Slot collision detection keyed on (doctor, exact start time).
///
/// Durations are not compared: 10:00 and 10:15 never collide even when the
/// first appointment lasts an hour.
pub struct ConflictChecker {
    repository: Arc<dyn Repository>,
}

impl ConflictChecker {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    pub async fn has_conflict(
        &self,
        doctor_id: i64,
        when: NaiveDateTime,
        exclude_appointment_id: Option<i64>,
    ) -> Result<bool, AppointmentError> {
        let count = self
            .repository
            .count_conflicts(doctor_id, when, exclude_appointment_id)
            .await?;

        if count > 0 {
            warn!(
                "Conflict detected for doctor {} at {} - {} active appointments",
                doctor_id, when, count
            );
        }

        Ok(count > 0)
    }

    /// Whether the doctor's slot at `scheduled_at` is still free.
    pub async fn check_availability(
        &self,
        doctor_id: i64,
        scheduled_at: &str,
    ) -> Result<bool, AppointmentError> {
        if doctor_id <= 0 {
            return Err(AppointmentError::Validation(
                "Doctor id must be a positive number".to_string(),
            ));
        }

        let when = parse_appointment_time(scheduled_at)?;
        let available = !self.has_conflict(doctor_id, when, None).await?;

        debug!("Doctor {} at {} available={}", doctor_id, when, available);
        Ok(available)
    }
}
