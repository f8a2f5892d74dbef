use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::{appointment_routes, AppointmentLifecycleService};
use reminder_cell::{reminder_routes, ReminderState};

pub struct AppServices {
    pub appointments: Arc<AppointmentLifecycleService>,
    pub reminders: Arc<ReminderState>,
}

pub fn create_router(services: AppServices) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic API is running!" }))
        .nest("/api/appointments", appointment_routes(services.appointments))
        .nest("/api/reminders", reminder_routes(services.reminders))
}
