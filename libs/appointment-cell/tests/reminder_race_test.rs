use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio::sync::Notify;

use appointment_cell::*;
use reminder_cell::{
    DispatcherConfig, Notifier, NotifierError, ReminderContext, ReminderDispatcher, ReminderError,
    ReminderPlanner,
};
use shared_database::{Repository, RowLocks};
use shared_models::{ReminderChannel, ReminderStatus};
use shared_utils::test_utils::{at, test_clock, TestClinic, TestConfig};

/// Email sends park until the test releases them.
struct GatedNotifier {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Notifier for GatedNotifier {
    async fn send_email(&self, _address: &str, _context: &ReminderContext) -> Result<(), NotifierError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }

    async fn send_sms(&self, _phone: &str, _context: &ReminderContext) -> Result<(), NotifierError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_reschedule_during_send_keeps_the_new_slot_reminder() {
    let clinic = TestClinic::seed().await;
    let clock = test_clock();
    let locks = Arc::new(RowLocks::new());
    let config = TestConfig {
        notifier_timeout_seconds: 5,
        ..TestConfig::default()
    }
    .to_app_config();

    let service = AppointmentLifecycleService::new(
        clinic.repository.clone(),
        clock.clone(),
        Arc::clone(&locks),
        ReminderPlanner::from_config(&config),
        SchedulingRules::from_config(&config),
    );

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let dispatcher = Arc::new(ReminderDispatcher::new(
        clinic.repository.clone(),
        Arc::new(GatedNotifier {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        }),
        clock,
        locks,
        DispatcherConfig::from_app_config(&config),
    ));

    let appointment = service
        .book(BookAppointmentRequest {
            patient_id: TestClinic::PATIENT_ID,
            doctor_id: TestClinic::DOCTOR_ID,
            scheduled_at: "2099-06-15 14:30".to_string(),
            duration_minutes: None,
            reason: None,
            notes: None,
            created_by: TestClinic::RECEPTIONIST_ID,
        })
        .await
        .unwrap();

    let email = clinic
        .repository
        .list_reminders_for_appointment(appointment.id)
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.channel == ReminderChannel::Email)
        .unwrap();

    let sending = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.dispatch(email.id).await })
    };
    tokio::time::timeout(Duration::from_secs(2), entered.notified())
        .await
        .expect("dispatch should reach the notifier");

    service
        .reschedule(
            appointment.id,
            RescheduleAppointmentRequest {
                doctor_id: TestClinic::DOCTOR_ID,
                scheduled_at: "2099-06-16 10:00".to_string(),
                user_id: TestClinic::RECEPTIONIST_ID,
                reason: "Patient asked for Tuesday".to_string(),
            },
        )
        .await
        .unwrap();

    release.notify_one();
    let outcome = sending.await.unwrap();
    assert_matches!(outcome, Err(ReminderError::InvalidState(_)));

    let current = clinic.repository.find_reminder(email.id).await.unwrap().unwrap();
    assert_eq!(current.status, ReminderStatus::Pending);
    assert_eq!(current.attempt_count, 0);
    assert_eq!(current.scheduled_send_at, at("2099-06-15 10:00"));
    assert!(current.message.contains("16/06/2099 10:00"));

    // The reset reminder is still deliverable for the new slot.
    release.notify_one();
    let sent = dispatcher.dispatch(email.id).await.unwrap();
    assert_eq!(sent.status, ReminderStatus::Sent);
    assert_eq!(sent.scheduled_send_at, at("2099-06-15 10:00"));
}
