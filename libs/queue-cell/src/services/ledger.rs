// libs/queue-cell/src/services/ledger.rs
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{
    Appointment, NewBooking, QueueBoardEntry, QueueEntry, QueueStatus, TokenScope,
};
use crate::store::{SchedulingStore, StoreError};

/// Owns queue entries and their token numbers.
pub struct QueueLedger {
    store: Arc<dyn SchedulingStore>,
}

impl QueueLedger {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self { store }
    }

    /// Persist an appointment together with its slot-scoped queue entry.
    pub async fn record_booking(&self, booking: NewBooking) -> Result<(Appointment, QueueEntry), SchedulingError> {
        let slot = booking.slot;
        let capacity = booking.capacity;

        match self.store.insert_booking(booking).await {
            Ok((appointment, entry)) => {
                info!("Appointment {} queued with token {}", appointment.id, entry.token_no);
                Ok((appointment, entry))
            }
            Err(StoreError::SlotFull { count }) => {
                warn!("Slot {} filled up before commit ({} booked)", slot, count);
                Err(SchedulingError::SlotFull {
                    slot_start: slot.start,
                    slot_end: slot.end,
                    capacity,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create an entry with the next token of `scope`. Fails if the
    /// appointment already has one.
    pub async fn assign_token(
        &self,
        appointment_id: Uuid,
        scope: TokenScope,
        status: QueueStatus,
    ) -> Result<QueueEntry, SchedulingError> {
        match self.store.insert_queue_entry(appointment_id, scope, status).await {
            Ok(entry) => Ok(entry),
            Err(StoreError::DuplicateQueueEntry(id)) => Err(SchedulingError::DuplicateQueueEntry(id)),
            Err(StoreError::AppointmentNotFound(id)) => Err(SchedulingError::AppointmentNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// The appointment's entry, created with a day-scoped token if missing.
    pub async fn ensure_entry(
        &self,
        appointment: &Appointment,
        status: QueueStatus,
    ) -> Result<(QueueEntry, bool), SchedulingError> {
        let scope = TokenScope::Day { date: appointment.date };
        let (entry, created) = self.store.ensure_queue_entry(appointment.id, scope, status).await?;

        if created {
            info!("Created missing queue entry for appointment {} (token {})", appointment.id, entry.token_no);
        }
        Ok((entry, created))
    }

    /// Move an appointment's queue entry forward, creating it if needed.
    pub async fn set_status(&self, appointment_id: Uuid, status: QueueStatus) -> Result<QueueEntry, SchedulingError> {
        let appointment = self
            .store
            .get_appointment(appointment_id)
            .await?
            .ok_or(SchedulingError::AppointmentNotFound(appointment_id))?;

        let (entry, created) = self.ensure_entry(&appointment, status).await?;
        if created || entry.status == status {
            return Ok(entry);
        }

        if !entry.status.can_transition_to(&status) {
            warn!("Rejected queue transition {} -> {} for {}", entry.status, status, appointment_id);
            return Err(SchedulingError::InvalidQueueTransition { from: entry.status, to: status });
        }

        debug!("Queue status for {}: {} -> {}", appointment_id, entry.status, status);
        self.store
            .set_queue_status(appointment_id, status)
            .await?
            .ok_or(SchedulingError::AppointmentNotFound(appointment_id))
    }

    pub async fn board(
        &self,
        doctor_id: Option<Uuid>,
        date: Option<NaiveDate>,
    ) -> Result<Vec<QueueBoardEntry>, SchedulingError> {
        Ok(self.store.queue_board(doctor_id, date).await?)
    }
}
