use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::services::{ReminderDispatcher, ReminderWorkerService};

pub struct ReminderState {
    pub dispatcher: Arc<ReminderDispatcher>,
    pub worker: Arc<ReminderWorkerService>,
}

pub fn reminder_routes(state: Arc<ReminderState>) -> Router {
    Router::new()
        .route("/due", get(handlers::list_due_reminders))
        .route("/sweep", post(handlers::run_sweep))
        .route("/{reminder_id}/dispatch", post(handlers::dispatch_reminder))
        .route("/appointment/{appointment_id}", get(handlers::get_appointment_reminders))
        .with_state(state)
}
