pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use error::SchedulingError;
pub use handlers::QueueCellState;
pub use router::queue_routes;
pub use services::{ClinicScheduler, Clock, FixedClock, SystemClock};
pub use store::{MemoryStore, SchedulingStore, StoreError, SupabaseStore};
