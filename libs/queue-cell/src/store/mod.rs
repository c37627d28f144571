// libs/queue-cell/src/store/mod.rs
//
// Persistence boundary for the scheduling core. Every multi-row change the
// core relies on (booking, completion sweep, queue entry creation) is a
// single call here so an implementation can make it atomic.
//

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Appointment, DoctorRef, NewBooking, PatientRef, QueueBoardEntry, QueueEntry, QueueStatus,
    QueuedAppointment, SlotWindow, TokenScope,
};

pub mod memory;
pub mod supabase;

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The capacity re-check inside the booking unit found the slot full.
    #[error("Slot is full ({count} active appointments)")]
    SlotFull { count: u32 },

    #[error("Queue entry already exists for appointment {0}")]
    DuplicateQueueEntry(Uuid),

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(Uuid),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(error: anyhow::Error) -> Self {
        StoreError::Unavailable(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Serialization(error.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait SchedulingStore: Send + Sync {
    async fn get_appointment(&self, appointment_id: Uuid) -> StoreResult<Option<Appointment>>;

    /// Active appointments of one doctor on one date, optionally limited to a slot.
    async fn active_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        window: Option<SlotWindow>,
    ) -> StoreResult<Vec<Appointment>>;

    /// All appointments of a patient regardless of status, ordered by date and time.
    async fn appointments_for_patient(&self, patient_id: Uuid) -> StoreResult<Vec<Appointment>>;

    /// Active appointments dated before `today`, or on `today` before `cutoff`.
    async fn stale_appointments(&self, today: NaiveDate, cutoff: NaiveTime) -> StoreResult<Vec<Appointment>>;

    /// Active appointments in one slot joined with their queue entries.
    async fn queued_in_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        window: SlotWindow,
    ) -> StoreResult<Vec<QueuedAppointment>>;

    /// Queue board rows, filtered by doctor and/or date.
    async fn queue_board(
        &self,
        doctor_id: Option<Uuid>,
        date: Option<NaiveDate>,
    ) -> StoreResult<Vec<QueueBoardEntry>>;

    async fn queue_entry_for(&self, appointment_id: Uuid) -> StoreResult<Option<QueueEntry>>;

    /// Re-count the slot, insert the appointment and its queue entry with the
    /// next token of the slot scope. Nothing is written when the slot is full.
    async fn insert_booking(&self, booking: NewBooking) -> StoreResult<(Appointment, QueueEntry)>;

    /// Create a queue entry, failing with `DuplicateQueueEntry` if one exists.
    async fn insert_queue_entry(
        &self,
        appointment_id: Uuid,
        scope: TokenScope,
        status: QueueStatus,
    ) -> StoreResult<QueueEntry>;

    /// Return the existing entry, or create one. The flag is true when created.
    async fn ensure_queue_entry(
        &self,
        appointment_id: Uuid,
        scope: TokenScope,
        status: QueueStatus,
    ) -> StoreResult<(QueueEntry, bool)>;

    async fn set_queue_status(&self, appointment_id: Uuid, status: QueueStatus) -> StoreResult<Option<QueueEntry>>;

    /// Complete the still-active appointments among `ids` together with their
    /// queue entries. Returns how many appointments changed.
    async fn complete_appointments(&self, ids: &[Uuid]) -> StoreResult<usize>;

    async fn doctor(&self, doctor_id: Uuid) -> StoreResult<Option<DoctorRef>>;

    async fn patient(&self, patient_id: Uuid) -> StoreResult<Option<PatientRef>>;
}
