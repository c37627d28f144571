// libs/queue-cell/src/store/supabase.rs
//
// PostgREST-backed store. Reads go through table endpoints; the multi-row
// writes (booking, queue entry creation, completion) go through Postgres
// functions so that each one runs in a single transaction on the server.
//

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_database::{ApiError, SupabaseClient};

use crate::models::{
    Appointment, DoctorRef, NewBooking, PatientRef, QueueBoardEntry, QueueEntry, QueueStatus,
    QueuedAppointment, SlotWindow, TokenScope,
};
use crate::store::{SchedulingStore, StoreError, StoreResult};

/// Status column names seen in deployed `queue` tables, in preference order.
const STATUS_COLUMNS: [&str; 2] = ["q_status", "status"];
const ACTIVE_STATUSES: &str = "in.(Scheduled,Waiting)";
const APPOINTMENT_FIELDS: &str = "id,patient_id,doctor_id,date,time,status";
const FILTER_TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum BookingOutcome {
    Booked {
        appointment: Appointment,
        queue_id: Uuid,
        token_no: u32,
    },
    SlotFull {
        count: u32,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum EnqueueOutcome {
    Created { queue_id: Uuid, token_no: u32, queue_status: QueueStatus },
    Existing { queue_id: Uuid, token_no: u32, queue_status: QueueStatus },
    Duplicate,
    NotFound,
}

#[derive(Debug, Deserialize)]
struct QueueRowKeys {
    id: Uuid,
    appointment_id: Uuid,
    token_no: u32,
}

pub struct SupabaseStore {
    supabase: Arc<SupabaseClient>,
    status_column: OnceCell<String>,
}

impl SupabaseStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            status_column: OnceCell::new(),
        }
    }

    /// Name of the queue status column, looked up once per process.
    #[instrument(skip(self))]
    pub async fn status_column(&self) -> StoreResult<&str> {
        let column = self
            .status_column
            .get_or_try_init(|| async {
                for candidate in STATUS_COLUMNS {
                    let path = format!("/rest/v1/queue?select={}&limit=1", candidate);
                    match self.supabase.request::<Vec<Value>>(Method::GET, &path, None, None).await {
                        Ok(_) => {
                            info!("Queue status column resolved to '{}'", candidate);
                            return Ok(candidate.to_string());
                        }
                        Err(e) if e.downcast_ref::<ApiError>().is_some_and(ApiError::is_missing_column) => {
                            debug!("Queue status column '{}' not present: {}", candidate, e);
                        }
                        Err(e) => {
                            warn!("Queue status column lookup for '{}' failed: {}", candidate, e);
                            return Err(StoreError::Unavailable(e.to_string()));
                        }
                    }
                }

                warn!("No queue status column found among {:?}", STATUS_COLUMNS);
                Err(StoreError::Schema("Queue status column not found".to_string()))
            })
            .await?;

        Ok(column.as_str())
    }

    async fn get_rows(&self, path: &str) -> StoreResult<Vec<Value>> {
        Ok(self.supabase.request(Method::GET, path, None, None).await?)
    }

    async fn get_appointments(&self, path: &str) -> StoreResult<Vec<Appointment>> {
        Ok(self.supabase.request(Method::GET, path, None, None).await?)
    }

    async fn queue_select(&self) -> StoreResult<String> {
        Ok(format!("id,appointment_id,token_no,{}", self.status_column().await?))
    }

    fn rpc_scope_args(scope: &TokenScope) -> Value {
        match scope {
            TokenScope::Slot { doctor_id, date, window } => json!({
                "p_scope": "slot",
                "p_doctor_id": doctor_id,
                "p_date": date,
                "p_slot_start": window.start.format(FILTER_TIME_FORMAT).to_string(),
                "p_slot_end": window.end.format(FILTER_TIME_FORMAT).to_string(),
            }),
            TokenScope::Day { date } => json!({
                "p_scope": "day",
                "p_doctor_id": Value::Null,
                "p_date": date,
                "p_slot_start": Value::Null,
                "p_slot_end": Value::Null,
            }),
        }
    }

    async fn enqueue(
        &self,
        appointment_id: Uuid,
        scope: TokenScope,
        status: QueueStatus,
        strict: bool,
    ) -> StoreResult<(QueueEntry, bool)> {
        let mut args = Self::rpc_scope_args(&scope);
        if let Value::Object(map) = &mut args {
            map.insert("p_appointment_id".to_string(), json!(appointment_id));
            map.insert("p_status".to_string(), json!(status.as_str()));
            map.insert("p_status_column".to_string(), json!(self.status_column().await?));
            map.insert("p_strict".to_string(), json!(strict));
        }

        let outcome: EnqueueOutcome = self.supabase.rpc("enqueue_appointment", args).await?;
        match outcome {
            EnqueueOutcome::Created { queue_id, token_no, queue_status } => Ok((
                QueueEntry { id: queue_id, appointment_id, token_no, status: queue_status },
                true,
            )),
            EnqueueOutcome::Existing { queue_id, token_no, queue_status } => Ok((
                QueueEntry { id: queue_id, appointment_id, token_no, status: queue_status },
                false,
            )),
            EnqueueOutcome::Duplicate => Err(StoreError::DuplicateQueueEntry(appointment_id)),
            EnqueueOutcome::NotFound => Err(StoreError::AppointmentNotFound(appointment_id)),
        }
    }
}

fn entry_from_row(row: &Value, column: &str) -> StoreResult<QueueEntry> {
    let keys: QueueRowKeys = serde_json::from_value(row.clone())?;
    let raw_status = row
        .get(column)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Serialization(format!("queue row missing '{}'", column)))?;
    let status = raw_status.parse::<QueueStatus>().map_err(StoreError::Serialization)?;

    Ok(QueueEntry {
        id: keys.id,
        appointment_id: keys.appointment_id,
        token_no: keys.token_no,
        status,
    })
}

fn joined_from_row(row: &Value, column: &str) -> StoreResult<QueuedAppointment> {
    let appointment = row
        .get("appointments")
        .cloned()
        .ok_or_else(|| StoreError::Serialization("queue row missing embedded appointment".to_string()))?;

    Ok(QueuedAppointment {
        appointment: serde_json::from_value(appointment)?,
        entry: entry_from_row(row, column)?,
    })
}

fn embedded_name(row: &Value, relation: &str) -> Option<String> {
    row.get("appointments")?
        .get(relation)?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl SchedulingStore for SupabaseStore {
    async fn get_appointment(&self, appointment_id: Uuid) -> StoreResult<Option<Appointment>> {
        let path = format!("/rest/v1/appointments?id=eq.{}&select={}", appointment_id, APPOINTMENT_FIELDS);
        Ok(self.get_appointments(&path).await?.into_iter().next())
    }

    async fn active_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        window: Option<SlotWindow>,
    ) -> StoreResult<Vec<Appointment>> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&status={}&select={}&order=time.asc",
            doctor_id, date, ACTIVE_STATUSES, APPOINTMENT_FIELDS
        );

        let appointments = self.get_appointments(&path).await?;
        Ok(match window {
            Some(window) => appointments.into_iter().filter(|a| window.contains(a.time)).collect(),
            None => appointments,
        })
    }

    async fn appointments_for_patient(&self, patient_id: Uuid) -> StoreResult<Vec<Appointment>> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&select={}&order=date.asc,time.asc",
            patient_id, APPOINTMENT_FIELDS
        );
        self.get_appointments(&path).await
    }

    async fn stale_appointments(&self, today: NaiveDate, cutoff: NaiveTime) -> StoreResult<Vec<Appointment>> {
        let path = format!(
            "/rest/v1/appointments?status={}&or=(date.lt.{},and(date.eq.{},time.lt.{}))&select={}",
            ACTIVE_STATUSES,
            today,
            today,
            cutoff.format(FILTER_TIME_FORMAT),
            APPOINTMENT_FIELDS
        );
        self.get_appointments(&path).await
    }

    async fn queued_in_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        window: SlotWindow,
    ) -> StoreResult<Vec<QueuedAppointment>> {
        let column = self.status_column().await?;
        let path = format!(
            "/rest/v1/queue?select={},appointments!inner({})\
             &appointments.doctor_id=eq.{}&appointments.date=eq.{}&appointments.status={}",
            self.queue_select().await?,
            APPOINTMENT_FIELDS,
            doctor_id,
            date,
            ACTIVE_STATUSES
        );

        let mut rows = self
            .get_rows(&path)
            .await?
            .iter()
            .map(|row| joined_from_row(row, column))
            .collect::<StoreResult<Vec<_>>>()?;

        rows.retain(|row| window.contains(row.appointment.time));
        rows.sort_by_key(|row| row.queue_key());
        Ok(rows)
    }

    async fn queue_board(
        &self,
        doctor_id: Option<Uuid>,
        date: Option<NaiveDate>,
    ) -> StoreResult<Vec<QueueBoardEntry>> {
        let column = self.status_column().await?;
        let mut path = format!(
            "/rest/v1/queue?select={},appointments!inner({},patients(name),doctors(name))",
            self.queue_select().await?,
            APPOINTMENT_FIELDS
        );
        if let Some(doctor_id) = doctor_id {
            path.push_str(&format!("&appointments.doctor_id=eq.{}", doctor_id));
        }
        if let Some(date) = date {
            path.push_str(&format!("&appointments.date=eq.{}", date));
        }

        let mut board = Vec::new();
        for row in self.get_rows(&path).await? {
            let joined = joined_from_row(&row, column)?;
            board.push(QueueBoardEntry {
                queue_id: joined.entry.id,
                token_no: joined.entry.token_no,
                queue_status: joined.entry.status,
                appointment_id: joined.appointment.id,
                date: joined.appointment.date,
                time: joined.appointment.time,
                appointment_status: joined.appointment.status,
                patient_id: joined.appointment.patient_id,
                patient_name: embedded_name(&row, "patients"),
                doctor_id: joined.appointment.doctor_id,
                doctor_name: embedded_name(&row, "doctors"),
            });
        }

        board.sort_by_key(|row| (row.date, row.time, row.token_no));
        Ok(board)
    }

    async fn queue_entry_for(&self, appointment_id: Uuid) -> StoreResult<Option<QueueEntry>> {
        let column = self.status_column().await?;
        let path = format!(
            "/rest/v1/queue?appointment_id=eq.{}&select={}",
            appointment_id,
            self.queue_select().await?
        );

        self.get_rows(&path)
            .await?
            .first()
            .map(|row| entry_from_row(row, column))
            .transpose()
    }

    #[instrument(skip(self, booking), fields(doctor_id = %booking.doctor_id, date = %booking.date))]
    async fn insert_booking(&self, booking: NewBooking) -> StoreResult<(Appointment, QueueEntry)> {
        let args = json!({
            "p_patient_id": booking.patient_id,
            "p_doctor_id": booking.doctor_id,
            "p_date": booking.date,
            "p_time": booking.time.format(FILTER_TIME_FORMAT).to_string(),
            "p_slot_start": booking.slot.start.format(FILTER_TIME_FORMAT).to_string(),
            "p_slot_end": booking.slot.end.format(FILTER_TIME_FORMAT).to_string(),
            "p_capacity": booking.capacity,
            "p_status_column": self.status_column().await?,
        });

        match self.supabase.rpc::<BookingOutcome>("book_appointment", args).await? {
            BookingOutcome::Booked { appointment, queue_id, token_no } => {
                let entry = QueueEntry {
                    id: queue_id,
                    appointment_id: appointment.id,
                    token_no,
                    status: QueueStatus::Waiting,
                };
                Ok((appointment, entry))
            }
            BookingOutcome::SlotFull { count } => Err(StoreError::SlotFull { count }),
        }
    }

    async fn insert_queue_entry(
        &self,
        appointment_id: Uuid,
        scope: TokenScope,
        status: QueueStatus,
    ) -> StoreResult<QueueEntry> {
        let (entry, _) = self.enqueue(appointment_id, scope, status, true).await?;
        Ok(entry)
    }

    async fn ensure_queue_entry(
        &self,
        appointment_id: Uuid,
        scope: TokenScope,
        status: QueueStatus,
    ) -> StoreResult<(QueueEntry, bool)> {
        self.enqueue(appointment_id, scope, status, false).await
    }

    async fn set_queue_status(&self, appointment_id: Uuid, status: QueueStatus) -> StoreResult<Option<QueueEntry>> {
        let column = self.status_column().await?;
        let filter = format!("appointment_id=eq.{}&select={}", appointment_id, self.queue_select().await?);

        let rows: Vec<Value> = self
            .supabase
            .patch_returning("queue", &filter, json!({ column: status.as_str() }))
            .await?;

        rows.first().map(|row| entry_from_row(row, column)).transpose()
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn complete_appointments(&self, ids: &[Uuid]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let column = self.status_column().await?;
        let completed: usize = self
            .supabase
            .rpc(
                "complete_appointments",
                json!({ "p_ids": ids, "p_status_column": column }),
            )
            .await?;

        debug!("Completed {} of {} appointments", completed, ids.len());
        Ok(completed)
    }

    async fn doctor(&self, doctor_id: Uuid) -> StoreResult<Option<DoctorRef>> {
        let path = format!("/rest/v1/doctors?id=eq.{}&select=id,name", doctor_id);
        let doctors: Vec<DoctorRef> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(doctors.into_iter().next())
    }

    async fn patient(&self, patient_id: Uuid) -> StoreResult<Option<PatientRef>> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=id,name", patient_id);
        let patients: Vec<PatientRef> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(patients.into_iter().next())
    }
}
