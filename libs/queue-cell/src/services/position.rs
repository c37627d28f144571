// libs/queue-cell/src/services/position.rs
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{
    Appointment, AppointmentSnapshot, DoctorSummary, LiveQueue, LiveQueueEntry, QueueStatus, QueueStatusReport,
    QueuedAppointment, SchedulingRules,
};
use crate::services::ledger::QueueLedger;
use crate::store::SchedulingStore;

/// Position and wait estimates within a slot's sub-queue.
pub struct PositionEstimator {
    store: Arc<dyn SchedulingStore>,
    rules: Arc<SchedulingRules>,
    ledger: Arc<QueueLedger>,
}

impl PositionEstimator {
    pub fn new(store: Arc<dyn SchedulingStore>, rules: Arc<SchedulingRules>, ledger: Arc<QueueLedger>) -> Self {
        Self { store, rules, ledger }
    }

    /// Queue standing of the patient's next queued appointment, `None` when
    /// the patient has nothing waiting in the current slot or later.
    pub async fn status_for(
        &self,
        patient_id: Uuid,
        now: NaiveDateTime,
    ) -> Result<Option<QueueStatusReport>, SchedulingError> {
        let mut candidates: Vec<Appointment> = self
            .store
            .appointments_for_patient(patient_id)
            .await?
            .into_iter()
            .filter(|a| a.is_active() && self.rules.is_current_or_upcoming(a, now))
            .collect();
        candidates.sort_by_key(|a| (a.date, a.time));

        // An appointment whose entry has left the queue no longer counts.
        let mut selected = None;
        for candidate in candidates {
            match self.store.queue_entry_for(candidate.id).await? {
                Some(entry) if !entry.status.is_queued() => {
                    debug!("Skipping appointment {} with queue status {}", candidate.id, entry.status);
                }
                _ => {
                    selected = Some(candidate);
                    break;
                }
            }
        }

        let Some(target) = selected else {
            debug!("Patient {} has no queued appointment in the current slot or later", patient_id);
            return Ok(None);
        };

        let (ensured, _) = self.ledger.ensure_entry(&target, QueueStatus::Waiting).await?;

        let slot = self.rules.slot_for(target.time);
        let sub_queue: Vec<QueuedAppointment> = self
            .store
            .queued_in_slot(target.doctor_id, target.date, slot)
            .await?
            .into_iter()
            .filter(|row| row.entry.status.is_queued())
            .collect();

        // Prefer the snapshot row so token and status come from the same read.
        let entry = sub_queue
            .iter()
            .find(|row| row.appointment.id == target.id)
            .map(|row| row.entry.clone())
            .unwrap_or(ensured);

        let own_key = (target.time, entry.token_no);
        let ahead = sub_queue
            .iter()
            .filter(|row| row.appointment.id != target.id && row.queue_key() < own_key)
            .count() as u32;
        let is_first_in_slot = ahead == 0;

        let scheduled_at = target.scheduled_at();
        let (position, ahead_count, estimated_wait_minutes) = if entry.status == QueueStatus::InProgress {
            (0, 0, 0)
        } else {
            let mut wait = ahead * self.rules.service_minutes;
            if scheduled_at > now {
                let until = scheduled_at.signed_duration_since(now).num_minutes().max(0) as u32;
                wait = wait.max(until);
            }
            (ahead + 1, ahead, wait)
        };

        let doctor_name = self.store.doctor(target.doctor_id).await?.map(|d| d.name);

        Ok(Some(QueueStatusReport {
            queue_status: entry.status,
            position,
            ahead_count,
            estimated_wait_minutes,
            is_first_in_slot,
            appointment: AppointmentSnapshot::from(&target),
            doctor: DoctorSummary { id: target.doctor_id, name: doctor_name },
            queue_id: entry.id,
            token_no: entry.token_no,
            slot,
            expected_start_time: scheduled_at,
            last_updated: now,
        }))
    }

    /// The sub-queue of the slot containing `now` for one doctor.
    pub async fn live_queue(&self, doctor_id: Uuid, now: NaiveDateTime) -> Result<LiveQueue, SchedulingError> {
        let date = now.date();
        let slot = self.rules.current_slot(now);

        let rows = self.store.queued_in_slot(doctor_id, date, slot).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows.into_iter().filter(|row| row.entry.status.is_queued()) {
            let patient_name = self.store.patient(row.appointment.patient_id).await?.map(|p| p.name);
            entries.push(LiveQueueEntry {
                position: entries.len() as u32 + 1,
                appointment_id: row.appointment.id,
                patient_id: row.appointment.patient_id,
                patient_name,
                time: row.appointment.time,
                token_no: row.entry.token_no,
                queue_status: row.entry.status,
                appointment_status: row.appointment.status,
            });
        }

        debug!("Live queue for doctor {} in {}: {} entries", doctor_id, slot, entries.len());
        Ok(LiveQueue { doctor_id, date, slot, entries })
    }
}
