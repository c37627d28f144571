// libs/queue-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::{self, QueueCellState};

pub fn queue_routes(state: Arc<QueueCellState>) -> Router {
    Router::new()
        // Slots and booking
        .route("/doctors/{doctor_id}/available_slots", get(handlers::get_available_slots))
        .route("/appointments/book", post(handlers::book_appointment))
        .route("/appointments/{appointment_id}/complete", post(handlers::complete_appointment))
        .route("/patients/{patient_id}/appointments", get(handlers::get_patient_appointments))

        // Queue
        .route("/queue", get(handlers::get_queue_board))
        .route("/queue/patient/{patient_id}", get(handlers::get_patient_queue_status))
        .route("/queue/live/{doctor_id}", get(handlers::get_live_queue))
        .route("/queue/appointments/{appointment_id}", put(handlers::update_queue_status))
        .with_state(state)
}
