use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::{Notify, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_models::{Reminder, ReminderStatus};

use crate::error::ReminderError;
use crate::models::{SweepSummary, WorkerConfig};
use crate::services::dispatcher::ReminderDispatcher;

/// Periodically dispatches due and retryable reminders.
pub struct ReminderWorkerService {
    config: WorkerConfig,
    dispatcher: Arc<ReminderDispatcher>,
    is_shutdown: RwLock<bool>,
    wake: Notify,
}

impl ReminderWorkerService {
    pub fn new(config: WorkerConfig, dispatcher: Arc<ReminderDispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            is_shutdown: RwLock::new(false),
            wake: Notify::new(),
        }
    }

    /// Runs sweeps until [`shutdown`](Self::shutdown) is called.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn start(&self) {
        info!(
            "Starting reminder worker, scanning every {}s with up to {} concurrent dispatches",
            self.config.scan_interval_seconds, self.config.max_concurrent_dispatches
        );

        let mut ticker = interval(Duration::from_secs(self.config.scan_interval_seconds));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *self.is_shutdown.read().await {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
            }

            if *self.is_shutdown.read().await {
                break;
            }

            match self.run_sweep().await {
                Ok(summary) if summary.attempted() > 0 || summary.skipped > 0 => info!(
                    "Sweep {}: {} sent, {} failed, {} skipped",
                    summary.sweep_id, summary.sent, summary.failed, summary.skipped
                ),
                Ok(summary) => debug!("Sweep {}: nothing to send", summary.sweep_id),
                Err(e) => error!("Reminder sweep failed: {}", e),
            }
        }

        info!("Reminder worker {} stopped", self.config.worker_id);
    }

    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown for worker {}", self.config.worker_id);
        *self.is_shutdown.write().await = true;
        self.wake.notify_waiters();
    }

    pub async fn is_running(&self) -> bool {
        !*self.is_shutdown.read().await
    }

    /// One pass: lists due and retryable reminders and dispatches each of them once.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn run_sweep(&self) -> Result<SweepSummary, ReminderError> {
        let now = self.dispatcher.now();
        let due = self.dispatcher.list_due(now).await?;
        let retryable = self.dispatcher.list_retryable(now).await?;

        let mut summary = SweepSummary {
            sweep_id: Uuid::new_v4(),
            started_at: Some(now),
            due: due.len(),
            retried: retryable.len(),
            ..SweepSummary::default()
        };

        let mut seen = HashSet::new();
        let ids: Vec<i64> = due
            .iter()
            .chain(retryable.iter())
            .map(|reminder| reminder.id)
            .filter(|id| seen.insert(*id))
            .collect();

        let results: Vec<(i64, Result<Reminder, ReminderError>)> = stream::iter(ids)
            .map(|id| {
                let dispatcher = Arc::clone(&self.dispatcher);
                async move { (id, dispatcher.dispatch(id).await) }
            })
            .buffer_unordered(self.config.max_concurrent_dispatches)
            .collect()
            .await;

        for (id, result) in results {
            match result {
                Ok(reminder) if reminder.status == ReminderStatus::Sent => summary.sent += 1,
                Ok(_) => summary.failed += 1,
                Err(ReminderError::Repository(msg)) => {
                    error!("Reminder {} could not be dispatched: {}", id, msg);
                    summary.skipped += 1;
                }
                Err(e) => {
                    warn!("Reminder {} skipped: {}", id, e);
                    summary.skipped += 1;
                }
            }
        }

        Ok(summary)
    }
}
