use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::models::ReminderContext;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifierError {
    #[error("Delivery rejected: {0}")]
    Rejected(String),

    #[error("Transport failure: {0}")]
    Transport(String),
}

/// Outbound email/SMS transport.
///
/// Implementations report delivery problems as `Err`; the dispatcher records
/// them on the reminder and never propagates them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, address: &str, context: &ReminderContext) -> Result<(), NotifierError>;

    async fn send_sms(&self, phone: &str, context: &ReminderContext) -> Result<(), NotifierError>;
}

pub fn render_email_subject(context: &ReminderContext) -> String {
    format!("Appointment reminder - {}", context.clinic_name)
}

pub fn render_email_body(context: &ReminderContext) -> String {
    format!(
        "Dear {},\n\nThis is a reminder of your medical appointment scheduled for {} with {}.\n\n{}",
        context.patient_name, context.appointment_time, context.doctor_name, context.clinic_name
    )
}

pub fn render_sms(context: &ReminderContext) -> String {
    format!(
        "Hello {}, reminder: medical appointment {} with {}. {}",
        context.patient_name, context.appointment_time, context.doctor_name, context.clinic_name
    )
}

/// Notifier that only writes the rendered message to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, address: &str, context: &ReminderContext) -> Result<(), NotifierError> {
        info!(
            reminder_id = context.reminder_id,
            "Email to {} | {} | {}",
            address,
            render_email_subject(context),
            render_email_body(context)
        );
        Ok(())
    }

    async fn send_sms(&self, phone: &str, context: &ReminderContext) -> Result<(), NotifierError> {
        info!(
            reminder_id = context.reminder_id,
            "SMS to {} | {}",
            phone,
            render_sms(context)
        );
        Ok(())
    }
}
