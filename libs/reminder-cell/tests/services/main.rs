use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use mockall::mock;

use reminder_cell::*;
use shared_database::RowLocks;
use shared_models::{Appointment, AppointmentStatus, ReminderChannel, ReminderStatus};
use shared_utils::test_utils::{at, test_appointment, test_reminder, TestClinic, TestConfig};
use shared_utils::time::FixedClock;

mock! {
    pub Notifier {}

    #[async_trait]
    impl Notifier for Notifier {
        async fn send_email(&self, address: &str, context: &ReminderContext) -> Result<(), NotifierError>;
        async fn send_sms(&self, phone: &str, context: &ReminderContext) -> Result<(), NotifierError>;
    }
}

/// Notifier that never answers within the dispatcher's timeout.
pub struct StalledNotifier;

#[async_trait]
impl Notifier for StalledNotifier {
    async fn send_email(&self, _address: &str, _context: &ReminderContext) -> Result<(), NotifierError> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok(())
    }

    async fn send_sms(&self, _phone: &str, _context: &ReminderContext) -> Result<(), NotifierError> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok(())
    }
}

pub const APPOINTMENT_ID: i64 = 50;

pub fn slot() -> NaiveDateTime {
    at("2099-06-16 10:00")
}

pub fn send_at() -> NaiveDateTime {
    at("2099-06-15 10:00")
}

pub struct Harness {
    pub clinic: TestClinic,
    pub clock: Arc<FixedClock>,
    pub dispatcher: Arc<ReminderDispatcher>,
}

impl Harness {
    pub async fn new(notifier: impl Notifier + 'static) -> Self {
        Self::with_config(Arc::new(notifier), TestConfig::default()).await
    }

    pub async fn with_config(notifier: Arc<dyn Notifier>, config: TestConfig) -> Self {
        let clinic = TestClinic::seed().await;
        let clock = Arc::new(FixedClock::new(send_at()));
        let dispatcher = Arc::new(ReminderDispatcher::new(
            clinic.repository.clone(),
            notifier,
            clock.clone(),
            Arc::new(RowLocks::new()),
            DispatcherConfig::from_app_config(&config.to_app_config()),
        ));

        let harness = Self {
            clinic,
            clock,
            dispatcher,
        };
        harness
            .add_appointment(APPOINTMENT_ID, TestClinic::PATIENT_ID, slot())
            .await;
        harness
    }

    pub async fn add_appointment(&self, id: i64, patient_id: i64, scheduled_at: NaiveDateTime) {
        self.clinic
            .repository
            .upsert_appointment(Appointment {
                patient_id,
                ..test_appointment(id, TestClinic::DOCTOR_ID, scheduled_at, AppointmentStatus::Scheduled)
            })
            .await;
    }

    pub async fn add_reminder(
        &self,
        id: i64,
        appointment_id: i64,
        channel: ReminderChannel,
        status: ReminderStatus,
        attempt_count: i32,
    ) {
        self.clinic
            .repository
            .upsert_reminder(test_reminder(id, appointment_id, channel, status, attempt_count, send_at()))
            .await;
    }
}

mod dispatcher_test;
mod worker_test;
