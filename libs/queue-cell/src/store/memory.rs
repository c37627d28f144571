// libs/queue-cell/src/store/memory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentStatus, DoctorRef, NewBooking, PatientRef, QueueBoardEntry, QueueEntry,
    QueueStatus, QueuedAppointment, SlotWindow, TokenScope,
};
use crate::store::{SchedulingStore, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    appointments: HashMap<Uuid, Appointment>,
    queue: HashMap<Uuid, QueueEntry>,
    doctors: HashMap<Uuid, DoctorRef>,
    patients: HashMap<Uuid, PatientRef>,
}

impl Tables {
    fn entry_for(&self, appointment_id: Uuid) -> Option<&QueueEntry> {
        self.queue.get(&appointment_id)
    }

    fn next_token(&self, scope: &TokenScope) -> u32 {
        self.queue
            .values()
            .filter(|entry| {
                self.appointments
                    .get(&entry.appointment_id)
                    .map(|appointment| scope.covers(appointment))
                    .unwrap_or(false)
            })
            .map(|entry| entry.token_no)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn create_entry(&mut self, appointment_id: Uuid, scope: &TokenScope, status: QueueStatus) -> QueueEntry {
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            appointment_id,
            token_no: self.next_token(scope),
            status,
        };
        self.queue.insert(appointment_id, entry.clone());
        entry
    }

    fn joined(&self, appointment: &Appointment) -> Option<QueuedAppointment> {
        self.entry_for(appointment.id).map(|entry| QueuedAppointment {
            appointment: appointment.clone(),
            entry: entry.clone(),
        })
    }
}

/// Process-local store. All tables sit behind one lock, so every trait call
/// is a single atomic unit.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_doctor(&self, name: &str) -> DoctorRef {
        let doctor = DoctorRef { id: Uuid::new_v4(), name: name.to_string() };
        self.tables.write().await.doctors.insert(doctor.id, doctor.clone());
        doctor
    }

    pub async fn register_patient(&self, name: &str) -> PatientRef {
        let patient = PatientRef { id: Uuid::new_v4(), name: name.to_string() };
        self.tables.write().await.patients.insert(patient.id, patient.clone());
        patient
    }

    /// Insert an appointment row as-is, without capacity checks or a queue entry.
    pub async fn insert_appointment(&self, appointment: Appointment) {
        self.tables.write().await.appointments.insert(appointment.id, appointment);
    }

    /// Overwrite a queue entry row as-is.
    pub async fn put_queue_entry(&self, entry: QueueEntry) {
        self.tables.write().await.queue.insert(entry.appointment_id, entry);
    }

    pub async fn appointment_count(&self) -> usize {
        self.tables.read().await.appointments.len()
    }
}

#[async_trait]
impl SchedulingStore for MemoryStore {
    async fn get_appointment(&self, appointment_id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self.tables.read().await.appointments.get(&appointment_id).cloned())
    }

    async fn active_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        window: Option<SlotWindow>,
    ) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.read().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.date == date && a.is_active())
            .filter(|a| window.map(|w| w.contains(a.time)).unwrap_or(true))
            .cloned()
            .collect();

        appointments.sort_by_key(|a| a.time);
        Ok(appointments)
    }

    async fn appointments_for_patient(&self, patient_id: Uuid) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.read().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();

        appointments.sort_by_key(|a| (a.date, a.time));
        Ok(appointments)
    }

    async fn stale_appointments(&self, today: NaiveDate, cutoff: NaiveTime) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .appointments
            .values()
            .filter(|a| a.is_active())
            .filter(|a| a.date < today || (a.date == today && a.time < cutoff))
            .cloned()
            .collect())
    }

    async fn queued_in_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        window: SlotWindow,
    ) -> StoreResult<Vec<QueuedAppointment>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<QueuedAppointment> = tables
            .appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.date == date && a.is_active() && window.contains(a.time))
            .filter_map(|a| tables.joined(a))
            .collect();

        rows.sort_by_key(|row| row.queue_key());
        Ok(rows)
    }

    async fn queue_board(
        &self,
        doctor_id: Option<Uuid>,
        date: Option<NaiveDate>,
    ) -> StoreResult<Vec<QueueBoardEntry>> {
        let tables = self.tables.read().await;
        let mut board: Vec<QueueBoardEntry> = tables
            .queue
            .values()
            .filter_map(|entry| {
                let appointment = tables.appointments.get(&entry.appointment_id)?;
                if doctor_id.is_some_and(|id| id != appointment.doctor_id)
                    || date.is_some_and(|d| d != appointment.date)
                {
                    return None;
                }

                Some(QueueBoardEntry {
                    queue_id: entry.id,
                    token_no: entry.token_no,
                    queue_status: entry.status,
                    appointment_id: appointment.id,
                    date: appointment.date,
                    time: appointment.time,
                    appointment_status: appointment.status,
                    patient_id: appointment.patient_id,
                    patient_name: tables.patients.get(&appointment.patient_id).map(|p| p.name.clone()),
                    doctor_id: appointment.doctor_id,
                    doctor_name: tables.doctors.get(&appointment.doctor_id).map(|d| d.name.clone()),
                })
            })
            .collect();

        board.sort_by_key(|row| (row.date, row.time, row.token_no));
        Ok(board)
    }

    async fn queue_entry_for(&self, appointment_id: Uuid) -> StoreResult<Option<QueueEntry>> {
        Ok(self.tables.read().await.entry_for(appointment_id).cloned())
    }

    async fn insert_booking(&self, booking: NewBooking) -> StoreResult<(Appointment, QueueEntry)> {
        let mut tables = self.tables.write().await;

        let count = tables
            .appointments
            .values()
            .filter(|a| {
                a.doctor_id == booking.doctor_id
                    && a.date == booking.date
                    && a.is_active()
                    && booking.slot.contains(a.time)
            })
            .count() as u32;

        if count >= booking.capacity {
            return Err(StoreError::SlotFull { count });
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: booking.patient_id,
            doctor_id: booking.doctor_id,
            date: booking.date,
            time: booking.time,
            status: AppointmentStatus::Scheduled,
        };
        tables.appointments.insert(appointment.id, appointment.clone());
        let entry = tables.create_entry(appointment.id, &booking.token_scope(), QueueStatus::Waiting);

        debug!("Stored appointment {} with token {}", appointment.id, entry.token_no);
        Ok((appointment, entry))
    }

    async fn insert_queue_entry(
        &self,
        appointment_id: Uuid,
        scope: TokenScope,
        status: QueueStatus,
    ) -> StoreResult<QueueEntry> {
        let mut tables = self.tables.write().await;

        if !tables.appointments.contains_key(&appointment_id) {
            return Err(StoreError::AppointmentNotFound(appointment_id));
        }
        if tables.entry_for(appointment_id).is_some() {
            return Err(StoreError::DuplicateQueueEntry(appointment_id));
        }

        Ok(tables.create_entry(appointment_id, &scope, status))
    }

    async fn ensure_queue_entry(
        &self,
        appointment_id: Uuid,
        scope: TokenScope,
        status: QueueStatus,
    ) -> StoreResult<(QueueEntry, bool)> {
        let mut tables = self.tables.write().await;

        if !tables.appointments.contains_key(&appointment_id) {
            return Err(StoreError::AppointmentNotFound(appointment_id));
        }
        if let Some(existing) = tables.entry_for(appointment_id) {
            return Ok((existing.clone(), false));
        }

        Ok((tables.create_entry(appointment_id, &scope, status), true))
    }

    async fn set_queue_status(&self, appointment_id: Uuid, status: QueueStatus) -> StoreResult<Option<QueueEntry>> {
        let mut tables = self.tables.write().await;
        Ok(tables.queue.get_mut(&appointment_id).map(|entry| {
            entry.status = status;
            entry.clone()
        }))
    }

    async fn complete_appointments(&self, ids: &[Uuid]) -> StoreResult<usize> {
        let mut tables = self.tables.write().await;
        let mut completed = 0;

        for id in ids {
            let changed = match tables.appointments.get_mut(id) {
                Some(appointment) if appointment.is_active() => {
                    appointment.status = AppointmentStatus::Completed;
                    true
                }
                _ => false,
            };

            if changed {
                if let Some(entry) = tables.queue.get_mut(id) {
                    entry.status = QueueStatus::Completed;
                }
                completed += 1;
            }
        }

        Ok(completed)
    }

    async fn doctor(&self, doctor_id: Uuid) -> StoreResult<Option<DoctorRef>> {
        Ok(self.tables.read().await.doctors.get(&doctor_id).cloned())
    }

    async fn patient(&self, patient_id: Uuid) -> StoreResult<Option<PatientRef>> {
        Ok(self.tables.read().await.patients.get(&patient_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Timelike;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 2).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn booking(doctor_id: Uuid, time: NaiveTime) -> NewBooking {
        NewBooking {
            patient_id: Uuid::new_v4(),
            doctor_id,
            date: date(),
            time,
            slot: SlotWindow::new(at(time.hour(), 0), 60),
            capacity: 2,
        }
    }

    #[tokio::test]
    async fn booking_unit_rechecks_capacity() {
        let store = MemoryStore::new();
        let doctor = Uuid::new_v4();

        store.insert_booking(booking(doctor, at(10, 0))).await.unwrap();
        store.insert_booking(booking(doctor, at(10, 10))).await.unwrap();
        let third = store.insert_booking(booking(doctor, at(10, 20))).await;

        assert_matches!(third, Err(StoreError::SlotFull { count: 2 }));
        assert_eq!(store.appointment_count().await, 2);
    }

    #[tokio::test]
    async fn tokens_are_per_doctor_slot() {
        let store = MemoryStore::new();
        let first_doctor = Uuid::new_v4();
        let second_doctor = Uuid::new_v4();

        let (_, a) = store.insert_booking(booking(first_doctor, at(10, 0))).await.unwrap();
        let (_, b) = store.insert_booking(booking(first_doctor, at(10, 30))).await.unwrap();
        let (_, c) = store.insert_booking(booking(second_doctor, at(10, 0))).await.unwrap();

        assert_eq!((a.token_no, b.token_no, c.token_no), (1, 2, 1));
    }

    #[tokio::test]
    async fn strict_insert_rejects_second_entry() {
        let store = MemoryStore::new();
        let (appointment, _) = store.insert_booking(booking(Uuid::new_v4(), at(11, 0))).await.unwrap();

        let result = store
            .insert_queue_entry(appointment.id, TokenScope::Day { date: date() }, QueueStatus::Waiting)
            .await;

        assert_matches!(result, Err(StoreError::DuplicateQueueEntry(id)) if id == appointment.id);
    }

    #[tokio::test]
    async fn completion_skips_terminal_rows() {
        let store = MemoryStore::new();
        let (appointment, _) = store.insert_booking(booking(Uuid::new_v4(), at(11, 0))).await.unwrap();

        assert_eq!(store.complete_appointments(&[appointment.id]).await.unwrap(), 1);
        assert_eq!(store.complete_appointments(&[appointment.id]).await.unwrap(), 0);

        let entry = store.queue_entry_for(appointment.id).await.unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Completed);
    }
}
