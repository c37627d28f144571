// libs/queue-cell/src/services/calendar.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{AvailableSlot, SchedulingRules, SlotWindow};
use crate::store::SchedulingStore;

/// Slot availability for a doctor's working day.
pub struct SlotCalendar {
    store: Arc<dyn SchedulingStore>,
    rules: Arc<SchedulingRules>,
}

impl SlotCalendar {
    pub fn new(store: Arc<dyn SchedulingStore>, rules: Arc<SchedulingRules>) -> Self {
        Self { store, rules }
    }

    /// Slots of `date` that still have room and have not yet ended.
    ///
    /// Counts come from a single read of the doctor's day, so every slot in
    /// the answer reflects the same snapshot.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Vec<AvailableSlot>, SchedulingError> {
        if date < now.date() {
            debug!("Requested availability for past date {}", date);
            return Ok(Vec::new());
        }

        let booked = self.store.active_appointments(doctor_id, date, None).await?;

        let mut per_slot: HashMap<NaiveTime, u32> = HashMap::new();
        for appointment in &booked {
            *per_slot.entry(self.rules.slot_for(appointment.time).start).or_insert(0) += 1;
        }

        let slots = self
            .rules
            .slots_for_day()
            .into_iter()
            .filter(|slot| date > now.date() || slot.end_at(date) > now)
            .filter_map(|slot| {
                let taken = per_slot.get(&slot.start).copied().unwrap_or(0);
                let remaining = self.rules.slot_capacity.saturating_sub(taken);
                (remaining > 0).then_some(AvailableSlot {
                    start: slot.start,
                    end: slot.end,
                    remaining,
                })
            })
            .collect::<Vec<_>>();

        debug!("Doctor {} has {} open slots on {}", doctor_id, slots.len(), date);
        Ok(slots)
    }

    /// Active appointments currently holding places in one slot.
    pub async fn capacity_of(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        window: SlotWindow,
    ) -> Result<u32, SchedulingError> {
        let booked = self.store.active_appointments(doctor_id, date, Some(window)).await?;
        Ok(booked.len() as u32)
    }
}
