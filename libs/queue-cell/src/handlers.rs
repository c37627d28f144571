// libs/queue-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{BookAppointmentRequest, UpdateQueueStatusRequest};
use crate::services::{ClinicScheduler, Clock};

const SLOT_TIME_FORMAT: &str = "%H:%M";

/// Shared state for the queue cell routes.
pub struct QueueCellState {
    pub scheduler: Arc<ClinicScheduler>,
    pub clock: Arc<dyn Clock>,
}

impl QueueCellState {
    pub fn new(scheduler: Arc<ClinicScheduler>, clock: Arc<dyn Clock>) -> Self {
        Self { scheduler, clock }
    }
}

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AvailableSlotsQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueueBoardQuery {
    pub doctor_id: Option<Uuid>,
    pub date: Option<String>,
}

fn invalid_body(rejection: JsonRejection) -> AppError {
    debug!("Rejected request body: {}", rejection);
    AppError::ValidationError(rejection.body_text())
}

// ==============================================================================
// SLOT AND BOOKING HANDLERS
// ==============================================================================

pub async fn get_available_slots(
    State(state): State<Arc<QueueCellState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AvailableSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let date = query
        .date
        .ok_or_else(|| AppError::BadRequest("Missing required query param: date".to_string()))?;

    let slots = state
        .scheduler
        .available_slots(doctor_id, &date, state.clock.now())
        .await?;

    let slots: Vec<Value> = slots
        .iter()
        .map(|slot| {
            json!({
                "start": slot.start.format(SLOT_TIME_FORMAT).to_string(),
                "end": slot.end.format(SLOT_TIME_FORMAT).to_string(),
                "remaining": slot.remaining,
            })
        })
        .collect();

    Ok(Json(json!({
        "date": date,
        "doctor_id": doctor_id,
        "slots": slots
    })))
}

pub async fn book_appointment(
    State(state): State<Arc<QueueCellState>>,
    payload: Result<Json<BookAppointmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(request) = payload.map_err(invalid_body)?;
    info!("Booking request from patient {} for doctor {}", request.patient_id, request.doctor_id);

    let confirmation = state.scheduler.book(&request, state.clock.now()).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Appointment booked successfully!",
            "appointment": confirmation
        })),
    ))
}

pub async fn complete_appointment(
    State(state): State<Arc<QueueCellState>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .scheduler
        .complete_appointment(appointment_id, state.clock.now())
        .await?;

    Ok(Json(json!({
        "message": "Appointment marked as completed",
        "appointment": appointment
    })))
}

pub async fn get_patient_appointments(
    State(state): State<Arc<QueueCellState>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let overview = state
        .scheduler
        .patient_appointments(patient_id, state.clock.now())
        .await?;

    Ok(Json(json!(overview)))
}

// ==============================================================================
// QUEUE HANDLERS
// ==============================================================================

pub async fn get_patient_queue_status(
    State(state): State<Arc<QueueCellState>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    debug!("Queue status request for patient {}", patient_id);

    let status = state.scheduler.queue_status(patient_id, state.clock.now()).await?;
    Ok(Json(json!(status)))
}

pub async fn get_live_queue(
    State(state): State<Arc<QueueCellState>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let live = state.scheduler.live_queue(doctor_id, state.clock.now()).await?;

    Ok(Json(json!({
        "doctor_id": live.doctor_id,
        "date": live.date,
        "slot_start": live.slot.start.format(SLOT_TIME_FORMAT).to_string(),
        "slot_end": live.slot.end.format(SLOT_TIME_FORMAT).to_string(),
        "count": live.entries.len(),
        "queue": live.entries
    })))
}

pub async fn get_queue_board(
    State(state): State<Arc<QueueCellState>>,
    Query(query): Query<QueueBoardQuery>,
) -> Result<Json<Value>, AppError> {
    let board = state
        .scheduler
        .queue_board(query.doctor_id, query.date.as_deref(), state.clock.now())
        .await?;

    Ok(Json(json!({
        "total": board.len(),
        "queue": board
    })))
}

pub async fn update_queue_status(
    State(state): State<Arc<QueueCellState>>,
    Path(appointment_id): Path<Uuid>,
    payload: Result<Json<UpdateQueueStatusRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload.map_err(invalid_body)?;
    info!("Queue status update for appointment {} to {}", appointment_id, request.status);

    let entry = state
        .scheduler
        .update_queue_status(appointment_id, request.status, state.clock.now())
        .await?;

    Ok(Json(json!({
        "message": "Queue updated successfully!",
        "queue": entry
    })))
}
