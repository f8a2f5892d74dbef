use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use reminder_cell::*;
use shared_database::Repository;
use shared_models::{ReminderChannel, ReminderStatus};

use super::{Harness, MockNotifier, APPOINTMENT_ID};

fn worker_for(harness: &Harness, max_concurrent_dispatches: usize) -> ReminderWorkerService {
    ReminderWorkerService::new(
        WorkerConfig {
            worker_id: "test-reminder-worker".to_string(),
            scan_interval_seconds: 1,
            max_concurrent_dispatches,
        },
        Arc::clone(&harness.dispatcher),
    )
}

#[tokio::test]
async fn test_sweep_dispatches_every_due_reminder() {
    let mut notifier = MockNotifier::new();
    notifier.expect_send_email().times(1).returning(|_, _| Ok(()));
    notifier
        .expect_send_sms()
        .times(1)
        .returning(|_, _| Err(NotifierError::Rejected("number blocked".to_string())));

    let harness = Harness::new(notifier).await;
    harness
        .add_reminder(1, APPOINTMENT_ID, ReminderChannel::Email, ReminderStatus::Pending, 0)
        .await;
    harness
        .add_reminder(2, APPOINTMENT_ID, ReminderChannel::Sms, ReminderStatus::Pending, 0)
        .await;

    let summary = worker_for(&harness, 2).run_sweep().await.unwrap();

    assert_eq!(summary.due, 2);
    assert_eq!(summary.retried, 0);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.started_at, Some(harness.dispatcher.now()));
}

#[tokio::test]
async fn test_failed_reminder_waits_for_backoff_before_retry() {
    let mut notifier = MockNotifier::new();
    let mut calls = 0;
    notifier.expect_send_sms().times(2).returning(move |_, _| {
        calls += 1;
        if calls == 1 {
            Err(NotifierError::Transport("gateway down".to_string()))
        } else {
            Ok(())
        }
    });

    let harness = Harness::new(notifier).await;
    harness
        .add_reminder(1, APPOINTMENT_ID, ReminderChannel::Sms, ReminderStatus::Pending, 0)
        .await;
    let worker = worker_for(&harness, 1);

    let first = worker.run_sweep().await.unwrap();
    assert_eq!((first.sent, first.failed), (0, 1));

    let idle = worker.run_sweep().await.unwrap();
    assert_eq!(idle.attempted(), 0);
    assert_eq!(idle.retried, 0);

    harness.clock.advance(Duration::minutes(15));
    let retry = worker.run_sweep().await.unwrap();
    assert_eq!(retry.retried, 1);
    assert_eq!(retry.sent, 1);

    let stored = harness.clinic.repository.find_reminder(1).await.unwrap().unwrap();
    assert_eq!(stored.status, ReminderStatus::Sent);
    assert_eq!(stored.attempt_count, 2);
    assert_eq!(stored.last_error.as_deref(), Some("Transport failure: gateway down"));
}

#[tokio::test]
async fn test_worker_stops_on_shutdown() {
    let harness = Harness::new(MockNotifier::new()).await;
    let worker = Arc::new(worker_for(&harness, 1));

    let running = Arc::clone(&worker);
    let handle = tokio::spawn(async move { running.start().await });

    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert!(worker.is_running().await);

    worker.shutdown().await;
    tokio::time::timeout(StdDuration::from_secs(3), handle)
        .await
        .expect("worker should stop after shutdown")
        .unwrap();
    assert!(!worker.is_running().await);
}
