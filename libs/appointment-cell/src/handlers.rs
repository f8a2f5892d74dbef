// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use shared_models::error::AppError;

use crate::models::{
    AvailabilityQuery, BookAppointmentRequest, CancelAppointmentRequest,
    RescheduleAppointmentRequest,
};
use crate::services::AppointmentLifecycleService;

pub async fn book_appointment(
    State(service): State<Arc<AppointmentLifecycleService>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Booking request from user {} for patient {}", request.created_by, request.patient_id);

    let appointment = service.book(request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

pub async fn get_appointment(
    State(service): State<Arc<AppointmentLifecycleService>>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.get_appointment(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

pub async fn cancel_appointment(
    State(service): State<Arc<AppointmentLifecycleService>>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.cancel(appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled successfully"
    })))
}

pub async fn reschedule_appointment(
    State(service): State<Arc<AppointmentLifecycleService>>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.reschedule(appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled successfully"
    })))
}

pub async fn check_availability(
    State(service): State<Arc<AppointmentLifecycleService>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let available = service
        .check_availability(query.doctor_id, &query.scheduled_at)
        .await?;

    Ok(Json(json!({
        "success": true,
        "doctor_id": query.doctor_id,
        "scheduled_at": query.scheduled_at,
        "available": available
    })))
}
