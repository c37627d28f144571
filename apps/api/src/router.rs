use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use queue_cell::{queue_routes, QueueCellState};

pub fn create_router(state: Arc<QueueCellState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic queue API is running!" }))
        .merge(queue_routes(state))
}
