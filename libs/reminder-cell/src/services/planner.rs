use chrono::NaiveDateTime;
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_models::{NewReminder, Patient, ReminderChannel, User};
use shared_utils::time::{format_for_reminder, reminder_send_time};

use crate::models::ReminderContext;
use crate::services::notifier::render_sms;

/// Decides which reminder rows an upcoming appointment gets.
#[derive(Debug, Clone)]
pub struct ReminderPlanner {
    channels: Vec<ReminderChannel>,
    lead_hours: i64,
    clinic_name: String,
}

impl ReminderPlanner {
    pub fn new(channels: Vec<ReminderChannel>, lead_hours: i64, clinic_name: impl Into<String>) -> Self {
        Self {
            channels,
            lead_hours,
            clinic_name: clinic_name.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mut channels = Vec::new();
        for code in &config.reminder_channels {
            match ReminderChannel::from_code(code) {
                Some(channel) if !channels.contains(&channel) => channels.push(channel),
                Some(_) => {}
                None => warn!("Ignoring unknown reminder channel '{}'", code),
            }
        }

        Self::new(channels, config.reminder_lead_hours, config.clinic_name.clone())
    }

    pub fn channels(&self) -> &[ReminderChannel] {
        &self.channels
    }

    pub fn send_time(&self, appointment_time: NaiveDateTime) -> NaiveDateTime {
        reminder_send_time(appointment_time, self.lead_hours)
    }

    /// One reminder per configured channel, due `lead_hours` before the slot.
    pub fn plan(&self, patient: &Patient, doctor: &User, appointment_time: NaiveDateTime) -> Vec<NewReminder> {
        let send_at = self.send_time(appointment_time);

        let planned: Vec<NewReminder> = self
            .channels
            .iter()
            .map(|&channel| {
                let context = ReminderContext {
                    reminder_id: 0,
                    appointment_id: 0,
                    channel,
                    patient_name: patient.full_name(),
                    patient_email: patient.email.clone(),
                    patient_phone: patient.phone.clone(),
                    doctor_name: doctor.full_name(),
                    appointment_time: format_for_reminder(appointment_time),
                    clinic_name: self.clinic_name.clone(),
                };

                NewReminder {
                    channel,
                    message: render_sms(&context),
                    scheduled_send_at: send_at,
                }
            })
            .collect();

        debug!("Planned {} reminders due at {}", planned.len(), send_at);
        planned
    }
}
