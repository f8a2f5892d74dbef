use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Duration;

use reminder_cell::*;
use shared_database::Repository;
use shared_models::{Cancellation, ReminderChannel, ReminderStatus};
use shared_utils::test_utils::{at, TestClinic, TestConfig};

use super::{send_at, slot, Harness, MockNotifier, StalledNotifier, APPOINTMENT_ID};

fn failing_notifier() -> MockNotifier {
    let mut notifier = MockNotifier::new();
    notifier
        .expect_send_email()
        .returning(|_, _| Err(NotifierError::Transport("smtp unavailable".to_string())));
    notifier
}

#[tokio::test]
async fn test_email_to_empty_address_fails_the_attempt() {
    let mut notifier = MockNotifier::new();
    notifier.expect_send_email().never();

    let harness = Harness::new(notifier).await;
    harness
        .add_appointment(60, TestClinic::NO_EMAIL_PATIENT_ID, slot() + Duration::hours(1))
        .await;
    harness
        .add_reminder(1, 60, ReminderChannel::Email, ReminderStatus::Pending, 0)
        .await;

    let reminder = harness.dispatcher.dispatch(1).await.unwrap();

    assert_eq!(reminder.status, ReminderStatus::Failed);
    assert_eq!(reminder.attempt_count, 1);
    assert_eq!(reminder.last_error.as_deref(), Some("Patient email is missing"));
    assert!(reminder.sent_at.is_none());
}

#[tokio::test]
async fn test_successful_email_marks_reminder_sent() {
    let mut notifier = MockNotifier::new();
    notifier
        .expect_send_email()
        .withf(|address, context| {
            address == "ana.quispe@mail.test"
                && context.appointment_time == "16/06/2099 10:00"
                && context.doctor_name == "Luis Ramos"
                && context.clinic_name == "Test Clinic"
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let harness = Harness::new(notifier).await;
    harness
        .add_reminder(1, APPOINTMENT_ID, ReminderChannel::Email, ReminderStatus::Pending, 0)
        .await;

    let reminder = harness.dispatcher.dispatch(1).await.unwrap();

    assert_eq!(reminder.status, ReminderStatus::Sent);
    assert_eq!(reminder.attempt_count, 1);
    assert_eq!(reminder.sent_at, Some(send_at()));
    assert!(reminder.next_attempt_at.is_none());
}

#[tokio::test]
async fn test_sms_goes_to_patient_phone() {
    let mut notifier = MockNotifier::new();
    notifier
        .expect_send_sms()
        .withf(|phone, _| phone == "+51 987 654 321")
        .times(1)
        .returning(|_, _| Ok(()));

    let harness = Harness::new(notifier).await;
    harness
        .add_reminder(2, APPOINTMENT_ID, ReminderChannel::Sms, ReminderStatus::Pending, 0)
        .await;

    let reminder = harness.dispatcher.dispatch(2).await.unwrap();
    assert_eq!(reminder.status, ReminderStatus::Sent);
}

#[tokio::test]
async fn test_sent_reminder_is_never_resent() {
    let mut notifier = MockNotifier::new();
    notifier.expect_send_email().never();

    let harness = Harness::new(notifier).await;
    harness
        .add_reminder(1, APPOINTMENT_ID, ReminderChannel::Email, ReminderStatus::Sent, 1)
        .await;

    let result = harness.dispatcher.dispatch(1).await;
    assert_matches!(result, Err(ReminderError::InvalidState(_)));

    let stored = harness.clinic.repository.find_reminder(1).await.unwrap().unwrap();
    assert_eq!(stored.attempt_count, 1);
}

#[tokio::test]
async fn test_attempts_are_bounded_at_three() {
    let harness = Harness::new(failing_notifier()).await;
    harness
        .add_reminder(1, APPOINTMENT_ID, ReminderChannel::Email, ReminderStatus::Pending, 0)
        .await;

    for expected in 1..=3 {
        let reminder = harness.dispatcher.dispatch(1).await.unwrap();
        assert_eq!(reminder.status, ReminderStatus::Failed);
        assert_eq!(reminder.attempt_count, expected);
        assert!(reminder
            .last_error
            .as_deref()
            .unwrap_or_default()
            .contains("smtp unavailable"));
    }

    let fourth = harness.dispatcher.dispatch(1).await;
    assert_matches!(
        fourth,
        Err(ReminderError::RetryExhausted {
            reminder_id: 1,
            max_attempts: 3
        })
    );

    let stored = harness.clinic.repository.find_reminder(1).await.unwrap().unwrap();
    assert_eq!(stored.attempt_count, 3);
    assert!(stored.next_attempt_at.is_none());
}

#[tokio::test]
async fn test_failed_attempts_back_off_exponentially() {
    let harness = Harness::new(failing_notifier()).await;
    harness
        .add_reminder(1, APPOINTMENT_ID, ReminderChannel::Email, ReminderStatus::Pending, 0)
        .await;

    let first = harness.dispatcher.dispatch(1).await.unwrap();
    assert_eq!(first.next_attempt_at, Some(send_at() + Duration::minutes(15)));

    let second = harness.dispatcher.dispatch(1).await.unwrap();
    assert_eq!(second.next_attempt_at, Some(send_at() + Duration::minutes(30)));

    let third = harness.dispatcher.dispatch(1).await.unwrap();
    assert_eq!(third.next_attempt_at, None);
}

#[tokio::test]
async fn test_cancelled_appointment_blocks_dispatch() {
    let mut notifier = MockNotifier::new();
    notifier.expect_send_email().never();

    let harness = Harness::new(notifier).await;
    harness
        .add_reminder(1, APPOINTMENT_ID, ReminderChannel::Email, ReminderStatus::Pending, 0)
        .await;

    harness
        .clinic
        .repository
        .cancel_appointment(
            APPOINTMENT_ID,
            Cancellation {
                cancelled_by: TestClinic::RECEPTIONIST_ID,
                reason: "Patient travelling".to_string(),
                cancelled_at: send_at(),
            },
        )
        .await
        .unwrap();

    let cascaded = harness.clinic.repository.find_reminder(1).await.unwrap().unwrap();
    assert_eq!(cascaded.status, ReminderStatus::Failed);
    assert_eq!(cascaded.attempt_count, 0);

    let result = harness.dispatcher.dispatch(1).await;
    assert_matches!(result, Err(ReminderError::InvalidState(_)));
}

#[tokio::test]
async fn test_missing_reminder_and_bad_id() {
    let harness = Harness::new(MockNotifier::new()).await;

    assert_matches!(
        harness.dispatcher.dispatch(404).await,
        Err(ReminderError::NotFound(_))
    );
    assert_matches!(
        harness.dispatcher.dispatch(0).await,
        Err(ReminderError::Validation(_))
    );
}

#[tokio::test]
async fn test_notifier_timeout_counts_as_failure() {
    let harness = Harness::with_config(Arc::new(StalledNotifier), TestConfig::default()).await;
    harness
        .add_reminder(1, APPOINTMENT_ID, ReminderChannel::Sms, ReminderStatus::Pending, 0)
        .await;

    let reminder = harness.dispatcher.dispatch(1).await.unwrap();

    assert_eq!(reminder.status, ReminderStatus::Failed);
    assert_eq!(reminder.attempt_count, 1);
    assert!(reminder.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_concurrent_dispatch_of_one_reminder_sends_once() {
    let mut notifier = MockNotifier::new();
    notifier.expect_send_email().times(1).returning(|_, _| Ok(()));

    let harness = Harness::new(notifier).await;
    harness
        .add_reminder(1, APPOINTMENT_ID, ReminderChannel::Email, ReminderStatus::Pending, 0)
        .await;

    let first = Arc::clone(&harness.dispatcher);
    let second = Arc::clone(&harness.dispatcher);
    let (a, b) = tokio::join!(
        tokio::spawn(async move { first.dispatch(1).await }),
        tokio::spawn(async move { second.dispatch(1).await }),
    );
    let results = [a.unwrap(), b.unwrap()];

    let sent = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(ReminderError::InvalidState(_))))
        .count();
    assert_eq!((sent, rejected), (1, 1));

    let stored = harness.clinic.repository.find_reminder(1).await.unwrap().unwrap();
    assert_eq!(stored.attempt_count, 1);
}

#[tokio::test]
async fn test_list_due_filters_and_orders() {
    let harness = Harness::new(MockNotifier::new()).await;
    harness
        .add_appointment(61, TestClinic::PATIENT_ID, slot() - Duration::hours(2))
        .await;

    harness
        .add_reminder(1, APPOINTMENT_ID, ReminderChannel::Email, ReminderStatus::Pending, 0)
        .await;
    harness
        .add_reminder(2, APPOINTMENT_ID, ReminderChannel::Sms, ReminderStatus::Sent, 1)
        .await;
    harness
        .clinic
        .repository
        .upsert_reminder(shared_utils::test_utils::test_reminder(
            3,
            61,
            ReminderChannel::Email,
            ReminderStatus::Pending,
            0,
            send_at() - Duration::hours(2),
        ))
        .await;
    harness
        .clinic
        .repository
        .upsert_reminder(shared_utils::test_utils::test_reminder(
            4,
            61,
            ReminderChannel::Sms,
            ReminderStatus::Pending,
            0,
            at("2099-06-20 09:00"),
        ))
        .await;

    let due = harness.dispatcher.list_due(harness.dispatcher.now()).await.unwrap();
    let ids: Vec<i64> = due.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![3, 1]);

    harness
        .clinic
        .repository
        .cancel_appointment(
            61,
            Cancellation {
                cancelled_by: TestClinic::RECEPTIONIST_ID,
                reason: "Duplicate".to_string(),
                cancelled_at: send_at(),
            },
        )
        .await
        .unwrap();

    let due = harness.dispatcher.list_due(harness.dispatcher.now()).await.unwrap();
    let ids: Vec<i64> = due.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn test_failed_reminder_with_attempts_left_can_be_redispatched() {
    let mut notifier = MockNotifier::new();
    notifier.expect_send_email().times(1).returning(|_, _| Ok(()));

    let harness = Harness::new(notifier).await;
    harness
        .add_reminder(1, APPOINTMENT_ID, ReminderChannel::Email, ReminderStatus::Failed, 2)
        .await;

    let reminder = harness.dispatcher.dispatch(1).await.unwrap();
    assert_eq!(reminder.status, ReminderStatus::Sent);
    assert_eq!(reminder.attempt_count, 3);
}
