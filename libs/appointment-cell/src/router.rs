// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers;
use crate::services::AppointmentLifecycleService;

pub fn appointment_routes(service: Arc<AppointmentLifecycleService>) -> Router {
    Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/availability", get(handlers::check_availability))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .with_state(service)
}
