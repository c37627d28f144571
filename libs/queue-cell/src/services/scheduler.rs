// libs/queue-cell/src/services/scheduler.rs
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{
    parse_date, Appointment, AvailableSlot, BookAppointmentRequest, BookingConfirmation, BookingRequest,
    LiveQueue, PatientAppointments, QueueBoardEntry, QueueEntry, QueueStatus, QueueStatusResponse,
    SchedulingRules, SlotKey, SweepReport,
};
use crate::services::{
    AppointmentCompletionService, BookingCoordinator, PositionEstimator, QueueLedger, ScopeLocks, SlotCalendar,
    TimeTransitionSweeper,
};
use crate::store::SchedulingStore;

/// Entry point for the boundary layer. Wires the scheduling components
/// around one store and one set of slot locks.
pub struct ClinicScheduler {
    store: Arc<dyn SchedulingStore>,
    rules: Arc<SchedulingRules>,
    calendar: Arc<SlotCalendar>,
    ledger: Arc<QueueLedger>,
    sweeper: TimeTransitionSweeper,
    estimator: PositionEstimator,
    booking: BookingCoordinator,
    completion: AppointmentCompletionService,
}

impl ClinicScheduler {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self::with_rules(store, SchedulingRules::default())
    }

    pub fn with_rules(store: Arc<dyn SchedulingStore>, rules: SchedulingRules) -> Self {
        let rules = Arc::new(rules);
        let locks = Arc::new(ScopeLocks::<SlotKey>::new());
        let calendar = Arc::new(SlotCalendar::new(store.clone(), rules.clone()));
        let ledger = Arc::new(QueueLedger::new(store.clone()));

        Self {
            sweeper: TimeTransitionSweeper::new(store.clone(), rules.clone(), locks.clone()),
            estimator: PositionEstimator::new(store.clone(), rules.clone(), ledger.clone()),
            booking: BookingCoordinator::new(calendar.clone(), ledger.clone(), rules.clone(), locks.clone()),
            completion: AppointmentCompletionService::new(store.clone(), rules.clone(), locks),
            store,
            rules,
            calendar,
            ledger,
        }
    }

    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<AvailableSlot>, SchedulingError> {
        let date = parse_date(date)?;
        self.calendar.available_slots(doctor_id, date, now).await
    }

    pub async fn book(
        &self,
        request: &BookAppointmentRequest,
        now: NaiveDateTime,
    ) -> Result<BookingConfirmation, SchedulingError> {
        let request = BookingRequest::try_from(request)?;
        self.booking.book(request, now).await
    }

    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        now: NaiveDateTime,
    ) -> Result<Appointment, SchedulingError> {
        self.completion.complete(appointment_id, now).await
    }

    pub async fn sweep(&self, now: NaiveDateTime) -> Result<SweepReport, SchedulingError> {
        self.sweeper.sweep(now).await
    }

    pub async fn queue_status(&self, patient_id: Uuid, now: NaiveDateTime) -> Result<QueueStatusResponse, SchedulingError> {
        self.sweeper.sweep(now).await?;
        Ok(self.estimator.status_for(patient_id, now).await?.into())
    }

    pub async fn live_queue(&self, doctor_id: Uuid, now: NaiveDateTime) -> Result<LiveQueue, SchedulingError> {
        self.sweeper.sweep(now).await?;
        self.estimator.live_queue(doctor_id, now).await
    }

    pub async fn queue_board(
        &self,
        doctor_id: Option<Uuid>,
        date: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<Vec<QueueBoardEntry>, SchedulingError> {
        let date = date.map(parse_date).transpose()?;
        self.sweeper.sweep(now).await?;
        self.ledger.board(doctor_id, date).await
    }

    pub async fn update_queue_status(
        &self,
        appointment_id: Uuid,
        status: QueueStatus,
        now: NaiveDateTime,
    ) -> Result<QueueEntry, SchedulingError> {
        self.sweeper.sweep(now).await?;
        self.ledger.set_status(appointment_id, status).await
    }

    /// A patient's appointments split into upcoming (active, current slot or
    /// later) and past (everything else).
    pub async fn patient_appointments(
        &self,
        patient_id: Uuid,
        now: NaiveDateTime,
    ) -> Result<PatientAppointments, SchedulingError> {
        self.sweeper.sweep(now).await?;

        let (upcoming, mut past): (Vec<Appointment>, Vec<Appointment>) = self
            .store
            .appointments_for_patient(patient_id)
            .await?
            .into_iter()
            .partition(|a| a.is_active() && self.rules.is_current_or_upcoming(a, now));
        past.reverse();

        debug!("Patient {}: {} upcoming, {} past", patient_id, upcoming.len(), past.len());
        Ok(PatientAppointments {
            patient_id,
            upcoming_count: upcoming.len(),
            past_count: past.len(),
            upcoming,
            past,
        })
    }
}
