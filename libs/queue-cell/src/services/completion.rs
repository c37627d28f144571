// libs/queue-cell/src/services/completion.rs
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{Appointment, AppointmentStatus, SchedulingRules, SlotKey};
use crate::services::locks::ScopeLocks;
use crate::store::SchedulingStore;

/// Explicit completion of an appointment by clinic staff.
pub struct AppointmentCompletionService {
    store: Arc<dyn SchedulingStore>,
    rules: Arc<SchedulingRules>,
    locks: Arc<ScopeLocks<SlotKey>>,
}

impl AppointmentCompletionService {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        rules: Arc<SchedulingRules>,
        locks: Arc<ScopeLocks<SlotKey>>,
    ) -> Self {
        Self { store, rules, locks }
    }

    #[instrument(skip(self))]
    pub async fn complete(&self, appointment_id: Uuid, now: NaiveDateTime) -> Result<Appointment, SchedulingError> {
        let appointment = self
            .store
            .get_appointment(appointment_id)
            .await?
            .ok_or(SchedulingError::AppointmentNotFound(appointment_id))?;

        match appointment.status {
            AppointmentStatus::Completed => return Err(SchedulingError::AlreadyCompleted(appointment_id)),
            status if !status.can_transition_to(&AppointmentStatus::Completed) => {
                return Err(SchedulingError::InvalidStatusTransition {
                    from: status,
                    to: AppointmentStatus::Completed,
                });
            }
            _ => {}
        }

        let scheduled = appointment.scheduled_at();
        if now < scheduled {
            warn!("Completion of {} requested before its start {}", appointment_id, scheduled);
            return Err(SchedulingError::TooEarly { scheduled, now });
        }

        let window = self.rules.slot_for(appointment.time);
        let _guard = self.locks.lock(&SlotKey::of(&appointment, &window)).await;

        // A concurrent sweep may have completed it since the read above.
        if self.store.complete_appointments(&[appointment_id]).await? == 0 {
            return Err(SchedulingError::AlreadyCompleted(appointment_id));
        }

        info!("Appointment {} marked as completed", appointment_id);
        Ok(Appointment { status: AppointmentStatus::Completed, ..appointment })
    }
}
