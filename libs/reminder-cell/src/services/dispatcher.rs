use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use shared_config::MAX_RETRY_BACKOFF_MINUTES;
use shared_database::{LockKey, Repository, RowLocks};
use shared_models::{
    Appointment, Reminder, ReminderChannel, ReminderStatus, MAX_DELIVERY_ATTEMPTS,
};
use shared_utils::time::{format_for_reminder, Clock};

use crate::error::ReminderError;
use crate::models::{DispatcherConfig, ReminderContext};
use crate::services::notifier::Notifier;

pub struct ReminderDispatcher {
    repository: Arc<dyn Repository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    locks: Arc<RowLocks>,
    config: DispatcherConfig,
}

impl ReminderDispatcher {
    pub fn new(
        repository: Arc<dyn Repository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        locks: Arc<RowLocks>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            repository,
            notifier,
            clock,
            locks,
            config,
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// PENDING reminders due at `now`, earliest first. Each call is a fresh snapshot.
    #[instrument(skip(self))]
    pub async fn list_due(&self, now: NaiveDateTime) -> Result<Vec<Reminder>, ReminderError> {
        let due = self.repository.list_pending_due_reminders(now).await?;
        debug!("{} reminders due at {}", due.len(), now);
        Ok(due)
    }

    /// FAILED reminders with attempts left whose backoff has elapsed.
    #[instrument(skip(self))]
    pub async fn list_retryable(&self, now: NaiveDateTime) -> Result<Vec<Reminder>, ReminderError> {
        let retryable = self.repository.list_retryable_reminders(now).await?;
        debug!("{} reminders ready for retry at {}", retryable.len(), now);
        Ok(retryable)
    }

    pub async fn list_for_appointment(&self, appointment_id: i64) -> Result<Vec<Reminder>, ReminderError> {
        if appointment_id <= 0 {
            return Err(ReminderError::Validation(
                "Appointment id must be a positive number".to_string(),
            ));
        }

        Ok(self
            .repository
            .list_reminders_for_appointment(appointment_id)
            .await?)
    }

    /// Makes one delivery attempt for a reminder.
    ///
    /// Delivery problems end up in `last_error` with status FAILED; only
    /// precondition violations are returned as errors. Calls for the same
    /// reminder are serialized for their whole duration.
    #[instrument(skip(self))]
    pub async fn dispatch(&self, reminder_id: i64) -> Result<Reminder, ReminderError> {
        if reminder_id <= 0 {
            return Err(ReminderError::Validation(
                "Reminder id must be a positive number".to_string(),
            ));
        }

        let _guard = self.locks.acquire(LockKey::Reminder(reminder_id)).await;

        let reminder = self
            .repository
            .find_reminder(reminder_id)
            .await?
            .ok_or_else(|| ReminderError::NotFound(format!("Reminder {} not found", reminder_id)))?;

        if reminder.status == ReminderStatus::Sent {
            return Err(ReminderError::InvalidState(format!(
                "Reminder {} was already sent",
                reminder_id
            )));
        }

        let appointment = self
            .repository
            .find_appointment(reminder.appointment_id)
            .await?
            .filter(Appointment::is_active)
            .ok_or_else(|| {
                ReminderError::InvalidState(format!(
                    "Appointment {} of reminder {} is no longer active",
                    reminder.appointment_id, reminder_id
                ))
            })?;

        if reminder.attempts_exhausted() {
            return Err(ReminderError::RetryExhausted {
                reminder_id,
                max_attempts: MAX_DELIVERY_ATTEMPTS,
            });
        }

        let context = self.load_context(&reminder, &appointment).await?;
        let outcome = self.deliver(&context).await;

        let now = self.clock.now();
        let mut updated = reminder.clone();
        updated.attempt_count += 1;

        match outcome {
            Ok(()) => {
                updated.status = ReminderStatus::Sent;
                updated.sent_at = Some(now);
                updated.next_attempt_at = None;
                info!(
                    "Reminder {} sent by {} on attempt {}",
                    reminder_id, updated.channel, updated.attempt_count
                );
            }
            Err(message) => {
                updated.status = ReminderStatus::Failed;
                updated.last_error = Some(message);
                updated.next_attempt_at = if updated.attempts_exhausted() {
                    None
                } else {
                    now.checked_add_signed(self.backoff(updated.attempt_count))
                };
                warn!(
                    "Reminder {} failed on attempt {}/{}: {}",
                    reminder_id,
                    updated.attempt_count,
                    MAX_DELIVERY_ATTEMPTS,
                    updated.last_error.as_deref().unwrap_or_default()
                );
            }
        }

        // A cancel or reschedule that landed while we were sending wins.
        let stored = self
            .repository
            .update_reminder(&updated, reminder.version)
            .await?;

        Ok(stored)
    }

    /// Delay before the next retry: `backoff × 2^(attempts − 1)`.
    pub fn backoff(&self, attempts: i32) -> Duration {
        let exponent = (attempts - 1).clamp(0, 16) as u32;
        let base = self
            .config
            .retry_backoff_minutes
            .clamp(0, MAX_RETRY_BACKOFF_MINUTES);
        Duration::minutes(base * 2_i64.pow(exponent))
    }

    async fn load_context(
        &self,
        reminder: &Reminder,
        appointment: &Appointment,
    ) -> Result<ReminderContext, ReminderError> {
        let patient = self
            .repository
            .find_patient(appointment.patient_id)
            .await?
            .ok_or_else(|| {
                ReminderError::NotFound(format!("Patient {} not found", appointment.patient_id))
            })?;

        let doctor = self
            .repository
            .find_user(appointment.doctor_id)
            .await?
            .ok_or_else(|| {
                ReminderError::NotFound(format!("Doctor {} not found", appointment.doctor_id))
            })?;

        Ok(ReminderContext {
            reminder_id: reminder.id,
            appointment_id: appointment.id,
            channel: reminder.channel,
            patient_name: patient.full_name(),
            patient_email: patient.email,
            patient_phone: patient.phone,
            doctor_name: doctor.full_name(),
            appointment_time: format_for_reminder(appointment.scheduled_at),
            clinic_name: self.config.clinic_name.clone(),
        })
    }

    async fn deliver(&self, context: &ReminderContext) -> Result<(), String> {
        let send = async {
            match context.channel {
                ReminderChannel::Email => {
                    let address = valid_email(context.patient_email.as_deref())?;
                    self.notifier
                        .send_email(address, context)
                        .await
                        .map_err(|e| e.to_string())
                }
                ReminderChannel::Sms => {
                    let phone = valid_phone(context.patient_phone.as_deref())?;
                    self.notifier
                        .send_sms(phone, context)
                        .await
                        .map_err(|e| e.to_string())
                }
            }
        };

        match timeout(self.config.notifier_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(format!(
                "Notifier timed out after {} ms",
                self.config.notifier_timeout.as_millis()
            )),
        }
    }
}

fn valid_email(email: Option<&str>) -> Result<&str, String> {
    let email = email.map(str::trim).unwrap_or_default();
    if email.is_empty() {
        return Err("Patient email is missing".to_string());
    }
    if !email.contains('@') {
        return Err(format!("Patient email '{}' is not a valid address", email));
    }
    Ok(email)
}

fn valid_phone(phone: Option<&str>) -> Result<&str, String> {
    let phone = phone.map(str::trim).unwrap_or_default();
    if phone.is_empty() {
        return Err("Patient phone number is missing".to_string());
    }
    Ok(phone)
}
