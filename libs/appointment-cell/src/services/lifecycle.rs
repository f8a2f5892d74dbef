// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, info, instrument, warn};

use reminder_cell::ReminderPlanner;
use shared_database::{LockKey, Repository, RowLocks};
use shared_models::{
    Appointment, Cancellation, NewAppointment, Patient, Reschedule, User, UserRole,
};
use shared_utils::time::{is_future, parse_appointment_time, Clock};

use crate::models::{
    AppointmentError, BookAppointmentRequest, CancelAppointmentRequest,
    RescheduleAppointmentRequest, SchedulingRules, MAX_REASON_LENGTH,
};
use crate::services::{conflict::ConflictChecker, schedule::ScheduleValidator};

/// Appointment state machine: SCHEDULED/CONFIRMED rows can be cancelled or
/// moved, everything else is terminal.
pub struct AppointmentLifecycleService {
    repository: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    locks: Arc<RowLocks>,
    schedule: ScheduleValidator,
    conflicts: ConflictChecker,
    planner: ReminderPlanner,
    rules: SchedulingRules,
}

impl AppointmentLifecycleService {
    pub fn new(
        repository: Arc<dyn Repository>,
        clock: Arc<dyn Clock>,
        locks: Arc<RowLocks>,
        planner: ReminderPlanner,
        rules: SchedulingRules,
    ) -> Self {
        Self {
            schedule: ScheduleValidator::new(Arc::clone(&repository)),
            conflicts: ConflictChecker::new(Arc::clone(&repository)),
            repository,
            clock,
            locks,
            planner,
            rules,
        }
    }

    pub async fn get_appointment(&self, appointment_id: i64) -> Result<Appointment, AppointmentError> {
        require_positive(appointment_id, "Appointment id")?;
        self.load_appointment(appointment_id).await
    }

    pub async fn check_availability(
        &self,
        doctor_id: i64,
        scheduled_at: &str,
    ) -> Result<bool, AppointmentError> {
        self.conflicts.check_availability(doctor_id, scheduled_at).await
    }

    // ==============================================================================
    // BOOK
    // ==============================================================================

    #[instrument(skip(self, request), fields(patient_id = request.patient_id, doctor_id = request.doctor_id))]
    pub async fn book(&self, request: BookAppointmentRequest) -> Result<Appointment, AppointmentError> {
        require_positive(request.patient_id, "Patient id")?;
        require_positive(request.doctor_id, "Doctor id")?;
        require_positive(request.created_by, "Creator id")?;

        let creator = self.load_active_user(request.created_by, "Creator").await?;
        if !creator.role.can_book() {
            return Err(AppointmentError::Validation(format!(
                "User {} with role {} cannot book appointments",
                creator.id, creator.role
            )));
        }

        let patient = self.load_active_patient(request.patient_id).await?;
        let doctor = self.load_active_doctor(request.doctor_id).await?;

        let when = parse_appointment_time(&request.scheduled_at)?;
        self.require_future(when)?;
        if !self.rules.clinic_hours.contains(when) {
            return Err(AppointmentError::Validation(format!(
                "Appointments must start between {:02}:00 and {:02}:00",
                self.rules.clinic_hours.open_hour, self.rules.clinic_hours.close_hour
            )));
        }
        self.require_working_hours(doctor.id, when).await?;

        let reason = optional_text(request.reason, "Reason")?;
        let notes = request.notes.filter(|n| !n.trim().is_empty());
        let duration_minutes = self.resolve_duration(doctor.id, request.duration_minutes).await?;

        let _guard = self.locks.acquire(LockKey::slot(doctor.id, when)).await;

        // Final conflict check under the slot lock
        if self.conflicts.has_conflict(doctor.id, when, None).await? {
            return Err(slot_taken(doctor.id, when));
        }

        let now = self.clock.now();
        let reminders = self.planner.plan(&patient, &doctor, when);
        let appointment = self
            .repository
            .insert_appointment(
                NewAppointment {
                    patient_id: patient.id,
                    doctor_id: doctor.id,
                    scheduled_at: when,
                    duration_minutes,
                    reason,
                    notes,
                    created_by: creator.id,
                    created_at: now,
                },
                reminders,
            )
            .await?;

        info!(
            "Appointment {} booked for patient {} with doctor {} at {}",
            appointment.id, appointment.patient_id, appointment.doctor_id, appointment.scheduled_at
        );
        Ok(appointment)
    }

    // ==============================================================================
    // CANCEL
    // ==============================================================================

    #[instrument(skip(self, request), fields(user_id = request.user_id))]
    pub async fn cancel(
        &self,
        appointment_id: i64,
        request: CancelAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        require_positive(appointment_id, "Appointment id")?;

        let _guard = self.locks.acquire(LockKey::Appointment(appointment_id)).await;

        let appointment = self.load_appointment(appointment_id).await?;
        require_active(&appointment, "cancelled")?;

        require_positive(request.user_id, "User id")?;
        let user = self.load_active_user(request.user_id, "User").await?;
        let reason = required_text(&request.reason, "Cancellation reason")?;

        let cancelled = self
            .repository
            .cancel_appointment(
                appointment.id,
                Cancellation {
                    cancelled_by: user.id,
                    reason,
                    cancelled_at: self.clock.now(),
                },
            )
            .await?;

        info!("Appointment {} cancelled by user {}", cancelled.id, user.id);
        Ok(cancelled)
    }

    // ==============================================================================
    // RESCHEDULE
    // ==============================================================================

    /// Moves an appointment to a new doctor/slot in place.
    ///
    /// Checks run in a fixed order: existence, current state, actor, target
    /// doctor, time, conflict, working hours, reason. The status is kept; only
    /// the `rescheduled_from` marker and audit fields record the move.
    #[instrument(skip(self, request), fields(doctor_id = request.doctor_id, user_id = request.user_id))]
    pub async fn reschedule(
        &self,
        appointment_id: i64,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        require_positive(appointment_id, "Appointment id")?;

        let _appointment_guard = self.locks.acquire(LockKey::Appointment(appointment_id)).await;

        let appointment = self.load_appointment(appointment_id).await?;
        require_active(&appointment, "rescheduled")?;

        require_positive(request.user_id, "User id")?;
        let user = self.load_active_user(request.user_id, "User").await?;

        require_positive(request.doctor_id, "Doctor id")?;
        let doctor = self.load_active_doctor(request.doctor_id).await?;

        let when = parse_appointment_time(&request.scheduled_at)?;
        self.require_future(when)?;

        // Appointment keys sort before slot keys, so this keeps the global lock order.
        let _slot_guard = self.locks.acquire(LockKey::slot(doctor.id, when)).await;

        if self
            .conflicts
            .has_conflict(doctor.id, when, Some(appointment.id))
            .await?
        {
            return Err(slot_taken(doctor.id, when));
        }

        self.require_working_hours(doctor.id, when).await?;
        let reason = required_text(&request.reason, "Reschedule reason")?;

        let patient = self
            .repository
            .find_patient(appointment.patient_id)
            .await?
            .ok_or_else(|| {
                AppointmentError::NotFound(format!("Patient {} not found", appointment.patient_id))
            })?;

        let now = self.clock.now();
        let moved = self
            .repository
            .reschedule_appointment(
                appointment.id,
                Reschedule {
                    doctor_id: doctor.id,
                    scheduled_at: when,
                    rescheduled_by: user.id,
                    reason,
                    reminder_send_at: self.planner.send_time(when),
                    updated_at: now,
                },
                self.planner.plan(&patient, &doctor, when),
            )
            .await?;

        info!(
            "Appointment {} moved from doctor {} at {} to doctor {} at {}",
            moved.id, appointment.doctor_id, appointment.scheduled_at, moved.doctor_id, moved.scheduled_at
        );
        Ok(moved)
    }

    // ==============================================================================
    // HELPERS
    // ==============================================================================

    async fn load_appointment(&self, appointment_id: i64) -> Result<Appointment, AppointmentError> {
        self.repository
            .find_appointment(appointment_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("Appointment {} not found", appointment_id)))
    }

    async fn load_active_user(&self, user_id: i64, label: &str) -> Result<User, AppointmentError> {
        let user = self
            .repository
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("{} {} not found", label, user_id)))?;

        if !user.is_active {
            return Err(AppointmentError::Validation(format!(
                "{} {} is not active",
                label, user_id
            )));
        }
        Ok(user)
    }

    async fn load_active_patient(&self, patient_id: i64) -> Result<Patient, AppointmentError> {
        let patient = self
            .repository
            .find_patient(patient_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("Patient {} not found", patient_id)))?;

        if !patient.is_active {
            return Err(AppointmentError::Validation(format!(
                "Patient {} is not active",
                patient_id
            )));
        }
        Ok(patient)
    }

    async fn load_active_doctor(&self, doctor_id: i64) -> Result<User, AppointmentError> {
        let doctor = self
            .repository
            .find_user(doctor_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("Doctor {} not found", doctor_id)))?;

        if doctor.role != UserRole::Doctor {
            return Err(AppointmentError::Validation(format!(
                "User {} is not a doctor",
                doctor_id
            )));
        }
        if !doctor.is_active {
            return Err(AppointmentError::Validation(format!(
                "Doctor {} is not active",
                doctor_id
            )));
        }
        Ok(doctor)
    }

    fn require_future(&self, when: NaiveDateTime) -> Result<(), AppointmentError> {
        if !is_future(when, self.clock.now()) {
            return Err(AppointmentError::Validation(format!(
                "Appointment time {} must be in the future",
                when
            )));
        }
        Ok(())
    }

    async fn require_working_hours(&self, doctor_id: i64, when: NaiveDateTime) -> Result<(), AppointmentError> {
        if !self.schedule.is_within_working_hours(doctor_id, when).await? {
            return Err(AppointmentError::Validation(format!(
                "Doctor {} has no working hours covering {}",
                doctor_id, when
            )));
        }
        Ok(())
    }

    async fn resolve_duration(&self, doctor_id: i64, requested: Option<i32>) -> Result<i32, AppointmentError> {
        if let Some(minutes) = requested.filter(|m| *m > 0) {
            return Ok(minutes);
        }

        match self.repository.find_specialty(doctor_id).await? {
            Some(specialty) if specialty.consultation_minutes > 0 => {
                debug!(
                    "Using {} default of {} minutes for doctor {}",
                    specialty.name, specialty.consultation_minutes, doctor_id
                );
                Ok(specialty.consultation_minutes)
            }
            _ => {
                warn!(
                    "Doctor {} has no specialty duration, using {} minutes",
                    doctor_id, self.rules.default_duration_minutes
                );
                Ok(self.rules.default_duration_minutes)
            }
        }
    }
}

fn require_positive(id: i64, label: &str) -> Result<(), AppointmentError> {
    if id <= 0 {
        return Err(AppointmentError::Validation(format!(
            "{} must be a positive number",
            label
        )));
    }
    Ok(())
}

fn require_active(appointment: &Appointment, action: &str) -> Result<(), AppointmentError> {
    if !appointment.is_active() {
        return Err(AppointmentError::InvalidState(format!(
            "Appointment {} is {} and cannot be {}",
            appointment.id, appointment.status, action
        )));
    }
    Ok(())
}

fn required_text(value: &str, label: &str) -> Result<String, AppointmentError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppointmentError::Validation(format!("{} is required", label)));
    }
    if value.chars().count() > MAX_REASON_LENGTH {
        return Err(AppointmentError::Validation(format!(
            "{} must be at most {} characters",
            label, MAX_REASON_LENGTH
        )));
    }
    Ok(value.to_string())
}

fn optional_text(value: Option<String>, label: &str) -> Result<Option<String>, AppointmentError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => required_text(text, label).map(Some),
    }
}

fn slot_taken(doctor_id: i64, when: NaiveDateTime) -> AppointmentError {
    AppointmentError::Conflict(format!(
        "Doctor {} already has an appointment at {}",
        doctor_id,
        when.format("%Y-%m-%d %H:%M")
    ))
}
