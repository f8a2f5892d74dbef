use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use shared_models::error::AppError;

use crate::router::ReminderState;

pub async fn list_due_reminders(
    State(state): State<Arc<ReminderState>>,
) -> Result<Json<Value>, AppError> {
    let now = state.dispatcher.now();
    let reminders = state.dispatcher.list_due(now).await?;

    Ok(Json(json!({
        "success": true,
        "as_of": now,
        "total": reminders.len(),
        "reminders": reminders
    })))
}

pub async fn dispatch_reminder(
    State(state): State<Arc<ReminderState>>,
    Path(reminder_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    info!("Manual dispatch requested for reminder {}", reminder_id);

    let reminder = state.dispatcher.dispatch(reminder_id).await?;

    Ok(Json(json!({
        "success": true,
        "delivered": reminder.sent_at.is_some(),
        "reminder": reminder
    })))
}

pub async fn get_appointment_reminders(
    State(state): State<Arc<ReminderState>>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let reminders = state.dispatcher.list_for_appointment(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment_id": appointment_id,
        "reminders": reminders
    })))
}

pub async fn run_sweep(
    State(state): State<Arc<ReminderState>>,
) -> Result<Json<Value>, AppError> {
    let summary = state.worker.run_sweep().await?;

    Ok(Json(json!({
        "success": true,
        "sweep": summary
    })))
}
