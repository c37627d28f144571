// libs/queue-cell/src/error.rs
use chrono::{NaiveDateTime, NaiveTime};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{AppointmentStatus, QueueStatus};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Selected time slot is full ({slot_start}-{slot_end}, capacity {capacity})")]
    SlotFull {
        slot_start: NaiveTime,
        slot_end: NaiveTime,
        capacity: u32,
    },

    #[error("Cannot book an appointment in the past (requested {requested}, now {now})")]
    PastTime {
        requested: NaiveDateTime,
        now: NaiveDateTime,
    },

    #[error("Appointment cannot be marked as completed before scheduled time ({scheduled}, now {now})")]
    TooEarly {
        scheduled: NaiveDateTime,
        now: NaiveDateTime,
    },

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(Uuid),

    #[error("Appointment {0} is already completed")]
    AlreadyCompleted(Uuid),

    #[error("Invalid appointment status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Invalid queue status transition from {from} to {to}")]
    InvalidQueueTransition {
        from: QueueStatus,
        to: QueueStatus,
    },

    #[error("Queue entry already exists for appointment {0}")]
    DuplicateQueueEntry(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

const SLOT_TIME_FORMAT: &str = "%H:%M";

impl From<SchedulingError> for AppError {
    fn from(error: SchedulingError) -> Self {
        match error {
            SchedulingError::Validation(msg) => AppError::ValidationError(msg),
            SchedulingError::SlotFull { slot_start, slot_end, capacity } => AppError::Rejected {
                message: "Selected time slot is full".to_string(),
                details: json!({
                    "slot_start": slot_start.format(SLOT_TIME_FORMAT).to_string(),
                    "slot_end": slot_end.format(SLOT_TIME_FORMAT).to_string(),
                    "capacity": capacity,
                }),
            },
            SchedulingError::PastTime { requested, now } => AppError::Rejected {
                message: "Cannot book an appointment in the past".to_string(),
                details: json!({
                    "requested": requested,
                    "now": now,
                }),
            },
            SchedulingError::TooEarly { scheduled, now } => AppError::Rejected {
                message: "Appointment cannot be marked as completed before scheduled time".to_string(),
                details: json!({
                    "scheduled": scheduled,
                    "now": now,
                }),
            },
            SchedulingError::AppointmentNotFound(_) => AppError::NotFound("Appointment not found".to_string()),
            SchedulingError::AlreadyCompleted(_) => AppError::Conflict("Appointment already completed".to_string()),
            e @ SchedulingError::InvalidStatusTransition { .. } => AppError::Conflict(e.to_string()),
            e @ SchedulingError::InvalidQueueTransition { .. } => AppError::Conflict(e.to_string()),
            e @ SchedulingError::DuplicateQueueEntry(_) => AppError::Conflict(e.to_string()),
            SchedulingError::Store(StoreError::AppointmentNotFound(_)) => {
                AppError::NotFound("Appointment not found".to_string())
            }
            SchedulingError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}
