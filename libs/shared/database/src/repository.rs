use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

use shared_models::{
    Appointment, Cancellation, DoctorSchedule, NewAppointment, NewReminder, Patient, Reminder,
    Reschedule, Specialty, User, Weekday,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Slot already taken: {0}")]
    Conflict(String),

    #[error("Row changed concurrently: {0}")]
    StaleWrite(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Persistence gateway for the clinic core.
///
/// Every method is atomic on its own. Multi-row writes (`insert_appointment`,
/// `cancel_appointment`, `reschedule_appointment`) apply the appointment change
/// and its reminder cascade as one unit, and re-check their guard conditions
/// inside that unit so that concurrent writers can never double-book a slot.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_appointment(&self, id: i64) -> Result<Option<Appointment>, RepositoryError>;

    /// Inserts a SCHEDULED appointment together with its planned reminders.
    ///
    /// Fails with [`RepositoryError::Conflict`] when an active appointment already
    /// holds the doctor's exact slot.
    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
        reminders: Vec<NewReminder>,
    ) -> Result<Appointment, RepositoryError>;

    /// Marks the appointment CANCELLED and moves its PENDING reminders to FAILED.
    ///
    /// Fails with [`RepositoryError::StaleWrite`] if the appointment is no longer
    /// SCHEDULED or CONFIRMED.
    async fn cancel_appointment(
        &self,
        id: i64,
        cancellation: Cancellation,
    ) -> Result<Appointment, RepositoryError>;

    /// Moves the appointment in place and resets its PENDING/FAILED reminders.
    ///
    /// Reset reminders take the message planned for their channel. Planned
    /// reminders are inserted only for channels that have no PENDING or FAILED
    /// reminder left to reset.
    async fn reschedule_appointment(
        &self,
        id: i64,
        change: Reschedule,
        reminders: Vec<NewReminder>,
    ) -> Result<Appointment, RepositoryError>;

    async fn find_doctor_schedule(
        &self,
        doctor_id: i64,
        day: Weekday,
    ) -> Result<Vec<DoctorSchedule>, RepositoryError>;

    /// Number of SCHEDULED/CONFIRMED appointments of the doctor at exactly `when`.
    async fn count_conflicts(
        &self,
        doctor_id: i64,
        when: NaiveDateTime,
        exclude_appointment_id: Option<i64>,
    ) -> Result<u64, RepositoryError>;

    async fn find_user(&self, id: i64) -> Result<Option<User>, RepositoryError>;

    async fn find_patient(&self, id: i64) -> Result<Option<Patient>, RepositoryError>;

    async fn find_specialty(&self, doctor_id: i64) -> Result<Option<Specialty>, RepositoryError>;

    async fn find_reminder(&self, id: i64) -> Result<Option<Reminder>, RepositoryError>;

    async fn list_reminders_for_appointment(
        &self,
        appointment_id: i64,
    ) -> Result<Vec<Reminder>, RepositoryError>;

    /// PENDING reminders due at `now` whose appointment is still active,
    /// earliest `scheduled_send_at` first.
    async fn list_pending_due_reminders(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<Reminder>, RepositoryError>;

    /// FAILED reminders with attempts left whose retry gate has passed and whose
    /// appointment is still active.
    async fn list_retryable_reminders(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<Reminder>, RepositoryError>;

    /// Compare-and-set write of a delivery outcome.
    ///
    /// Writes only `status`, `attempt_count`, `last_error`, `sent_at` and
    /// `next_attempt_at`, and bumps the version. Succeeds only while the stored
    /// row is still at `expected_version`, otherwise fails with
    /// [`RepositoryError::StaleWrite`]. Cancel and reschedule bump the version of
    /// every reminder they touch.
    async fn update_reminder(
        &self,
        outcome: &Reminder,
        expected_version: i32,
    ) -> Result<Reminder, RepositoryError>;
}
