use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;

use shared_database::Repository;
use shared_utils::time::weekday_of;

use crate::models::AppointmentError;

/// Matches a requested slot against a doctor's weekly working hours.
pub struct ScheduleValidator {
    repository: Arc<dyn Repository>,
}

impl ScheduleValidator {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// True iff an active schedule row for the slot's weekday covers its time of day.
    pub async fn is_within_working_hours(
        &self,
        doctor_id: i64,
        when: NaiveDateTime,
    ) -> Result<bool, AppointmentError> {
        let day = weekday_of(when);
        let rows = self.repository.find_doctor_schedule(doctor_id, day).await?;

        let covered = rows
            .iter()
            .any(|row| row.is_active && row.covers(when.time()));

        debug!(
            "Doctor {} on {} at {}: {} schedule rows, covered={}",
            doctor_id,
            day,
            when.time(),
            rows.len(),
            covered
        );
        Ok(covered)
    }
}
