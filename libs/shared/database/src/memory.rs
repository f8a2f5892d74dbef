use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::RwLock;
use tracing::debug;

use shared_models::{
    Appointment, AppointmentStatus, Cancellation, DoctorSchedule, NewAppointment, NewReminder,
    Patient, Reminder, ReminderChannel, ReminderStatus, Reschedule, Specialty, User, Weekday,
    MAX_DELIVERY_ATTEMPTS,
};

use crate::repository::{Repository, RepositoryError};

#[derive(Debug, Default)]
struct Store {
    appointments: BTreeMap<i64, Appointment>,
    reminders: BTreeMap<i64, Reminder>,
    users: HashMap<i64, User>,
    patients: HashMap<i64, Patient>,
    specialties: HashMap<i64, Specialty>,
    schedules: Vec<DoctorSchedule>,
    appointment_seq: i64,
    reminder_seq: i64,
}

impl Store {
    fn active_at_slot(&self, doctor_id: i64, when: NaiveDateTime, exclude: Option<i64>) -> u64 {
        self.appointments
            .values()
            .filter(|apt| {
                apt.doctor_id == doctor_id
                    && apt.scheduled_at == when
                    && apt.status.is_active()
                    && Some(apt.id) != exclude
            })
            .count() as u64
    }

    fn appointment_is_active(&self, appointment_id: i64) -> bool {
        self.appointments
            .get(&appointment_id)
            .map(|apt| apt.is_active())
            .unwrap_or(false)
    }

    fn push_reminder(&mut self, appointment_id: i64, planned: NewReminder, created_at: NaiveDateTime) {
        self.reminder_seq += 1;
        let reminder = Reminder {
            id: self.reminder_seq,
            appointment_id,
            channel: planned.channel,
            message: planned.message,
            scheduled_send_at: planned.scheduled_send_at,
            status: ReminderStatus::Pending,
            attempt_count: 0,
            last_error: None,
            sent_at: None,
            next_attempt_at: None,
            created_at,
            version: 0,
        };
        self.reminders.insert(reminder.id, reminder);
    }
}

/// Arena-backed repository. Rows are never removed; all multi-row writes happen
/// under one write guard.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_user(&self, user: User) {
        self.store.write().await.users.insert(user.id, user);
    }

    pub async fn upsert_patient(&self, patient: Patient) {
        self.store.write().await.patients.insert(patient.id, patient);
    }

    pub async fn upsert_specialty(&self, specialty: Specialty) {
        self.store
            .write()
            .await
            .specialties
            .insert(specialty.doctor_id, specialty);
    }

    pub async fn add_schedule(&self, schedule: DoctorSchedule) {
        self.store.write().await.schedules.push(schedule);
    }

    /// Stores an appointment row as-is, bypassing slot checks.
    pub async fn upsert_appointment(&self, appointment: Appointment) {
        let mut store = self.store.write().await;
        store.appointment_seq = store.appointment_seq.max(appointment.id);
        store.appointments.insert(appointment.id, appointment);
    }

    /// Stores a reminder row as-is.
    pub async fn upsert_reminder(&self, reminder: Reminder) {
        let mut store = self.store.write().await;
        store.reminder_seq = store.reminder_seq.max(reminder.id);
        store.reminders.insert(reminder.id, reminder);
    }

    pub async fn appointment_count(&self) -> usize {
        self.store.read().await.appointments.len()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_appointment(&self, id: i64) -> Result<Option<Appointment>, RepositoryError> {
        Ok(self.store.read().await.appointments.get(&id).cloned())
    }

    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
        reminders: Vec<NewReminder>,
    ) -> Result<Appointment, RepositoryError> {
        let mut store = self.store.write().await;

        if store.active_at_slot(appointment.doctor_id, appointment.scheduled_at, None) > 0 {
            return Err(RepositoryError::Conflict(format!(
                "doctor {} already has an appointment at {}",
                appointment.doctor_id, appointment.scheduled_at
            )));
        }

        store.appointment_seq += 1;
        let record = Appointment {
            id: store.appointment_seq,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            scheduled_at: appointment.scheduled_at,
            duration_minutes: appointment.duration_minutes,
            status: AppointmentStatus::Scheduled,
            reason: appointment.reason,
            notes: appointment.notes,
            created_by: appointment.created_by,
            cancelled_by: None,
            cancellation_reason: None,
            cancelled_at: None,
            rescheduled_from: None,
            rescheduled_by: None,
            reschedule_reason: None,
            created_at: appointment.created_at,
            updated_at: appointment.created_at,
        };
        store.appointments.insert(record.id, record.clone());

        for planned in reminders {
            store.push_reminder(record.id, planned, appointment.created_at);
        }

        debug!("Stored appointment {} for doctor {}", record.id, record.doctor_id);
        Ok(record)
    }

    async fn cancel_appointment(
        &self,
        id: i64,
        cancellation: Cancellation,
    ) -> Result<Appointment, RepositoryError> {
        let mut store = self.store.write().await;

        let appointment = store
            .appointments
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("appointment {}", id)))?;

        if !appointment.is_active() {
            return Err(RepositoryError::StaleWrite(format!(
                "appointment {} is {}",
                id, appointment.status
            )));
        }

        appointment.status = AppointmentStatus::Cancelled;
        appointment.cancelled_by = Some(cancellation.cancelled_by);
        appointment.cancellation_reason = Some(cancellation.reason);
        appointment.cancelled_at = Some(cancellation.cancelled_at);
        appointment.updated_at = cancellation.cancelled_at;
        let cancelled = appointment.clone();

        let mut cascaded = 0;
        for reminder in store
            .reminders
            .values_mut()
            .filter(|r| r.appointment_id == id && r.status == ReminderStatus::Pending)
        {
            reminder.status = ReminderStatus::Failed;
            reminder.next_attempt_at = None;
            reminder.version += 1;
            cascaded += 1;
        }

        debug!("Cancelled appointment {}, {} reminders cascaded", id, cascaded);
        Ok(cancelled)
    }

    async fn reschedule_appointment(
        &self,
        id: i64,
        change: Reschedule,
        reminders: Vec<NewReminder>,
    ) -> Result<Appointment, RepositoryError> {
        let mut store = self.store.write().await;

        let current = store
            .appointments
            .get(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("appointment {}", id)))?;

        if !current.is_active() {
            return Err(RepositoryError::StaleWrite(format!(
                "appointment {} is {}",
                id, current.status
            )));
        }

        if store.active_at_slot(change.doctor_id, change.scheduled_at, Some(id)) > 0 {
            return Err(RepositoryError::Conflict(format!(
                "doctor {} already has an appointment at {}",
                change.doctor_id, change.scheduled_at
            )));
        }

        let moved = {
            let appointment = store
                .appointments
                .get_mut(&id)
                .ok_or_else(|| RepositoryError::NotFound(format!("appointment {}", id)))?;
            appointment.doctor_id = change.doctor_id;
            appointment.scheduled_at = change.scheduled_at;
            appointment.rescheduled_from = Some(id);
            appointment.rescheduled_by = Some(change.rescheduled_by);
            appointment.reschedule_reason = Some(change.reason);
            appointment.updated_at = change.updated_at;
            appointment.clone()
        };

        let messages: HashMap<ReminderChannel, String> = reminders
            .iter()
            .map(|planned| (planned.channel, planned.message.clone()))
            .collect();

        let mut covered: HashSet<ReminderChannel> = HashSet::new();
        for reminder in store.reminders.values_mut().filter(|r| {
            r.appointment_id == id
                && matches!(r.status, ReminderStatus::Pending | ReminderStatus::Failed)
        }) {
            reminder.status = ReminderStatus::Pending;
            reminder.attempt_count = 0;
            reminder.next_attempt_at = None;
            reminder.scheduled_send_at = change.reminder_send_at;
            if let Some(message) = messages.get(&reminder.channel) {
                reminder.message = message.clone();
            }
            reminder.version += 1;
            covered.insert(reminder.channel);
        }

        for planned in reminders {
            if covered.insert(planned.channel) {
                store.push_reminder(id, planned, change.updated_at);
            }
        }

        debug!("Rescheduled appointment {} to doctor {} at {}", id, moved.doctor_id, moved.scheduled_at);
        Ok(moved)
    }

    async fn find_doctor_schedule(
        &self,
        doctor_id: i64,
        day: Weekday,
    ) -> Result<Vec<DoctorSchedule>, RepositoryError> {
        Ok(self
            .store
            .read()
            .await
            .schedules
            .iter()
            .filter(|s| s.doctor_id == doctor_id && s.day_of_week == day && s.is_active)
            .cloned()
            .collect())
    }

    async fn count_conflicts(
        &self,
        doctor_id: i64,
        when: NaiveDateTime,
        exclude_appointment_id: Option<i64>,
    ) -> Result<u64, RepositoryError> {
        Ok(self
            .store
            .read()
            .await
            .active_at_slot(doctor_id, when, exclude_appointment_id))
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        Ok(self.store.read().await.users.get(&id).cloned())
    }

    async fn find_patient(&self, id: i64) -> Result<Option<Patient>, RepositoryError> {
        Ok(self.store.read().await.patients.get(&id).cloned())
    }

    async fn find_specialty(&self, doctor_id: i64) -> Result<Option<Specialty>, RepositoryError> {
        Ok(self.store.read().await.specialties.get(&doctor_id).cloned())
    }

    async fn find_reminder(&self, id: i64) -> Result<Option<Reminder>, RepositoryError> {
        Ok(self.store.read().await.reminders.get(&id).cloned())
    }

    async fn list_reminders_for_appointment(
        &self,
        appointment_id: i64,
    ) -> Result<Vec<Reminder>, RepositoryError> {
        Ok(self
            .store
            .read()
            .await
            .reminders
            .values()
            .filter(|r| r.appointment_id == appointment_id)
            .cloned()
            .collect())
    }

    async fn list_pending_due_reminders(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<Reminder>, RepositoryError> {
        let store = self.store.read().await;
        let mut due: Vec<Reminder> = store
            .reminders
            .values()
            .filter(|r| {
                r.status == ReminderStatus::Pending
                    && r.scheduled_send_at <= now
                    && store.appointment_is_active(r.appointment_id)
            })
            .cloned()
            .collect();
        due.sort_by_key(|r| (r.scheduled_send_at, r.id));
        Ok(due)
    }

    async fn list_retryable_reminders(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<Reminder>, RepositoryError> {
        let store = self.store.read().await;
        let mut retryable: Vec<Reminder> = store
            .reminders
            .values()
            .filter(|r| {
                r.status == ReminderStatus::Failed
                    && r.attempt_count < MAX_DELIVERY_ATTEMPTS
                    && r.next_attempt_at.map_or(false, |at| at <= now)
                    && store.appointment_is_active(r.appointment_id)
            })
            .cloned()
            .collect();
        retryable.sort_by_key(|r| (r.next_attempt_at, r.id));
        Ok(retryable)
    }

    async fn update_reminder(
        &self,
        outcome: &Reminder,
        expected_version: i32,
    ) -> Result<Reminder, RepositoryError> {
        let mut store = self.store.write().await;

        let stored = store
            .reminders
            .get_mut(&outcome.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("reminder {}", outcome.id)))?;

        if stored.version != expected_version {
            return Err(RepositoryError::StaleWrite(format!(
                "reminder {} is at version {}, expected {}",
                outcome.id, stored.version, expected_version
            )));
        }

        stored.status = outcome.status;
        stored.attempt_count = outcome.attempt_count;
        stored.last_error = outcome.last_error.clone();
        stored.sent_at = outcome.sent_at;
        stored.next_attempt_at = outcome.next_attempt_at;
        stored.version = expected_version + 1;
        Ok(stored.clone())
    }
}
