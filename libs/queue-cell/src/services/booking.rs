// libs/queue-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{info, instrument, warn};

use crate::error::SchedulingError;
use crate::models::{BookingConfirmation, BookingRequest, NewBooking, SchedulingRules, SlotKey};
use crate::services::calendar::SlotCalendar;
use crate::services::ledger::QueueLedger;
use crate::services::locks::ScopeLocks;

pub struct BookingCoordinator {
    calendar: Arc<SlotCalendar>,
    ledger: Arc<QueueLedger>,
    rules: Arc<SchedulingRules>,
    locks: Arc<ScopeLocks<SlotKey>>,
}

impl BookingCoordinator {
    pub fn new(
        calendar: Arc<SlotCalendar>,
        ledger: Arc<QueueLedger>,
        rules: Arc<SchedulingRules>,
        locks: Arc<ScopeLocks<SlotKey>>,
    ) -> Self {
        Self { calendar, ledger, rules, locks }
    }

    /// Book a place in the slot containing `request.time`.
    ///
    /// The capacity check and the write run under the slot lock, and the
    /// store re-counts inside its own atomic unit, so a slot never ends up
    /// with more than `slot_capacity` active appointments.
    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, date = %request.date, time = %request.time))]
    pub async fn book(&self, request: BookingRequest, now: NaiveDateTime) -> Result<BookingConfirmation, SchedulingError> {
        let requested = request.date.and_time(request.time);
        if requested < now {
            warn!("Rejected booking in the past: {} < {}", requested, now);
            return Err(SchedulingError::PastTime { requested, now });
        }

        let slot = self.rules.slot_for(request.time);
        if !self.rules.is_within_workday(&slot) {
            return Err(SchedulingError::Validation(format!(
                "Requested time {} is outside working hours {}-{}",
                request.time.format("%H:%M"),
                self.rules.workday_start.format("%H:%M"),
                self.rules.workday_end.format("%H:%M"),
            )));
        }

        let key = SlotKey { doctor_id: request.doctor_id, date: request.date, start: slot.start };
        let _guard = self.locks.lock(&key).await;

        let booked = self.calendar.capacity_of(request.doctor_id, request.date, slot).await?;
        if booked >= self.rules.slot_capacity {
            warn!("Slot {} is full ({} booked)", key, booked);
            return Err(SchedulingError::SlotFull {
                slot_start: slot.start,
                slot_end: slot.end,
                capacity: self.rules.slot_capacity,
            });
        }

        let (appointment, entry) = self
            .ledger
            .record_booking(NewBooking {
                patient_id: request.patient_id,
                doctor_id: request.doctor_id,
                date: request.date,
                time: request.time,
                slot,
                capacity: self.rules.slot_capacity,
            })
            .await?;

        info!("Booked appointment {} for patient {} in slot {}", appointment.id, appointment.patient_id, slot);

        Ok(BookingConfirmation {
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            date: appointment.date,
            time: appointment.time,
            status: appointment.status,
            token_no: entry.token_no,
            slot,
        })
    }
}
