// libs/queue-cell/src/models.rs
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::SchedulingError;

// ==============================================================================
// CORE SCHEDULING MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
}

impl Appointment {
    /// Scheduled start as a wall-clock timestamp.
    pub fn scheduled_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentStatus {
    Scheduled,
    Waiting,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Active appointments occupy slot capacity and can be queued.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Waiting)
    }

    pub fn can_transition_to(&self, target: &AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        match (self, target) {
            (Scheduled, Waiting) => true,
            (Scheduled | Waiting, Completed) => true,
            (Scheduled | Waiting, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "Scheduled",
            AppointmentStatus::Waiting => "Waiting",
            AppointmentStatus::Completed => "Completed",
            AppointmentStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QueueStatus {
    Waiting,
    #[serde(rename = "Consulting", alias = "In Progress", alias = "InProgress", alias = "in_progress")]
    InProgress,
    Completed,
}

impl QueueStatus {
    /// Waiting or being served; completed entries leave the queue.
    pub fn is_queued(&self) -> bool {
        matches!(self, QueueStatus::Waiting | QueueStatus::InProgress)
    }

    pub fn can_transition_to(&self, target: &QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (self, target),
            (Waiting, InProgress) | (Waiting, Completed) | (InProgress, Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "Waiting",
            QueueStatus::InProgress => "Consulting",
            QueueStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "waiting" => Ok(QueueStatus::Waiting),
            "consulting" | "in progress" | "inprogress" | "in_progress" => Ok(QueueStatus::InProgress),
            "completed" => Ok(QueueStatus::Completed),
            other => Err(format!("unknown queue status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub token_no: u32,
    pub status: QueueStatus,
}

/// An active appointment joined with its queue entry, read as one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedAppointment {
    pub appointment: Appointment,
    pub entry: QueueEntry,
}

impl QueuedAppointment {
    /// Sub-queue order: scheduled time, then token.
    pub fn queue_key(&self) -> (NaiveTime, u32) {
        (self.appointment.time, self.entry.token_no)
    }
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

/// Half-open interval `[start, end)` of one slot. Derived, never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SlotWindow {
    pub fn new(start: NaiveTime, minutes: u32) -> Self {
        Self {
            start,
            end: start + Duration::minutes(i64::from(minutes)),
        }
    }

    /// True for the last slot of the day, whose end rolls over to 00:00.
    pub fn wraps_midnight(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.wraps_midnight() {
            time >= self.start
        } else {
            time >= self.start && time < self.end
        }
    }

    pub fn end_at(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.start) + (self.end.signed_duration_since(self.start) + wrap_correction(self))
    }
}

fn wrap_correction(window: &SlotWindow) -> Duration {
    if window.wraps_midnight() {
        Duration::days(1)
    } else {
        Duration::zero()
    }
}

impl fmt::Display for SlotWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Identifies one slot of one doctor's day; also the booking lock key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start: NaiveTime,
}

impl SlotKey {
    pub fn of(appointment: &Appointment, window: &SlotWindow) -> Self {
        Self {
            doctor_id: appointment.doctor_id,
            date: appointment.date,
            start: window.start,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doctor:{}:{}:{}", self.doctor_id, self.date, self.start.format("%H:%M"))
    }
}

/// Grouping within which token numbers increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenScope {
    /// Tokens handed out at booking time.
    Slot {
        doctor_id: Uuid,
        date: NaiveDate,
        window: SlotWindow,
    },
    /// Tokens for entries created outside the booking flow.
    Day { date: NaiveDate },
}

impl TokenScope {
    pub fn covers(&self, appointment: &Appointment) -> bool {
        match self {
            TokenScope::Slot { doctor_id, date, window } => {
                appointment.doctor_id == *doctor_id
                    && appointment.date == *date
                    && window.contains(appointment.time)
            }
            TokenScope::Day { date } => appointment.date == *date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailableSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub remaining: u32,
}

/// Everything the store needs to commit a booking in one unit.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub slot: SlotWindow,
    pub capacity: u32,
}

impl NewBooking {
    pub fn token_scope(&self) -> TokenScope {
        TokenScope::Slot {
            doctor_id: self.doctor_id,
            date: self.date,
            window: self.slot,
        }
    }
}

// ==============================================================================
// REFERENCE ENTITIES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientRef {
    pub id: Uuid,
    pub name: String,
}

// ==============================================================================
// SCHEDULING RULES
// ==============================================================================

#[derive(Debug, Clone)]
pub struct SchedulingRules {
    pub workday_start: NaiveTime,
    pub workday_end: NaiveTime,
    pub slot_minutes: u32,
    pub slot_capacity: u32,
    /// Assumed consultation length per patient ahead in the queue.
    pub service_minutes: u32,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            workday_start: clock_time(9, 0),
            workday_end: clock_time(18, 0),
            slot_minutes: 30,
            slot_capacity: 5,
            service_minutes: 15,
        }
    }
}

fn clock_time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::default() + Duration::minutes(i64::from(hour * 60 + minute))
}

impl SchedulingRules {
    /// The slot containing `time`, with boundaries counted from midnight.
    pub fn slot_for(&self, time: NaiveTime) -> SlotWindow {
        let slot_seconds = self.slot_minutes.max(1) * 60;
        let seconds = time.num_seconds_from_midnight();
        let start = NaiveTime::default() + Duration::seconds(i64::from(seconds - seconds % slot_seconds));
        SlotWindow::new(start, self.slot_minutes.max(1))
    }

    pub fn current_slot(&self, now: NaiveDateTime) -> SlotWindow {
        self.slot_for(now.time())
    }

    pub fn slots_for_day(&self) -> Vec<SlotWindow> {
        let width = self.slot_minutes.max(1);
        let end = self.workday_end.num_seconds_from_midnight() / 60;
        let mut minute = self.workday_start.num_seconds_from_midnight() / 60;
        let mut slots = Vec::new();

        while minute + width <= end {
            slots.push(SlotWindow::new(clock_time(0, minute), width));
            minute += width;
        }

        slots
    }

    pub fn is_within_workday(&self, slot: &SlotWindow) -> bool {
        !slot.wraps_midnight()
            && slot.start >= self.workday_start
            && slot.end <= self.workday_end
    }

    /// Whether an appointment is in the current slot or later.
    pub fn is_current_or_upcoming(&self, appointment: &Appointment, now: NaiveDateTime) -> bool {
        let today = now.date();
        let current = self.current_slot(now);
        appointment.date > today || (appointment.date == today && appointment.time >= current.start)
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: String,
    pub time: String,
}

/// A booking request whose date and time have been validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookingRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl TryFrom<&BookAppointmentRequest> for BookingRequest {
    type Error = SchedulingError;

    fn try_from(request: &BookAppointmentRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            date: parse_date(&request.date)?,
            time: parse_time(&request.time)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingConfirmation {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    pub token_no: u32,
    pub slot: SlotWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateQueueStatusRequest {
    #[serde(alias = "q_status")]
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentSnapshot {
    pub id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
}

impl From<&Appointment> for AppointmentSnapshot {
    fn from(appointment: &Appointment) -> Self {
        Self {
            id: appointment.id,
            date: appointment.date,
            time: appointment.time,
            status: appointment.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorSummary {
    pub id: Uuid,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueStatusReport {
    pub queue_status: QueueStatus,
    pub position: u32,
    pub ahead_count: u32,
    pub estimated_wait_minutes: u32,
    pub is_first_in_slot: bool,
    pub appointment: AppointmentSnapshot,
    pub doctor: DoctorSummary,
    pub queue_id: Uuid,
    pub token_no: u32,
    pub slot: SlotWindow,
    pub expected_start_time: NaiveDateTime,
    pub last_updated: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueStatusResponse {
    pub in_queue: bool,
    #[serde(flatten)]
    pub status: Option<QueueStatusReport>,
}

impl From<Option<QueueStatusReport>> for QueueStatusResponse {
    fn from(status: Option<QueueStatusReport>) -> Self {
        Self {
            in_queue: status.is_some(),
            status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveQueueEntry {
    pub position: u32,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: Option<String>,
    pub time: NaiveTime,
    pub token_no: u32,
    pub queue_status: QueueStatus,
    pub appointment_status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveQueue {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub slot: SlotWindow,
    pub entries: Vec<LiveQueueEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueBoardEntry {
    pub queue_id: Uuid,
    pub token_no: u32,
    pub queue_status: QueueStatus,
    pub appointment_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub appointment_status: AppointmentStatus,
    pub patient_id: Uuid,
    pub patient_name: Option<String>,
    pub doctor_id: Uuid,
    pub doctor_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientAppointments {
    pub patient_id: Uuid,
    pub upcoming_count: usize,
    pub past_count: usize,
    pub upcoming: Vec<Appointment>,
    pub past: Vec<Appointment>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub completed: usize,
}

// ==============================================================================
// PARSING HELPERS
// ==============================================================================

pub fn parse_date(value: &str) -> Result<NaiveDate, SchedulingError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| SchedulingError::Validation("Invalid date format. Use YYYY-MM-DD".to_string()))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(value: &str) -> Result<NaiveTime, SchedulingError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| SchedulingError::Validation("Invalid time format. Use HH:MM".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn slot_for_floors_to_half_hour() {
        let rules = SchedulingRules::default();

        assert_eq!(rules.slot_for(t(9, 15)), SlotWindow { start: t(9, 0), end: t(9, 30) });
        assert_eq!(rules.slot_for(t(13, 30)), SlotWindow { start: t(13, 30), end: t(14, 0) });
        assert_eq!(
            rules.slot_for(NaiveTime::from_hms_opt(13, 59, 59).unwrap()),
            SlotWindow { start: t(13, 30), end: t(14, 0) }
        );
    }

    #[test]
    fn working_day_has_eighteen_slots() {
        let slots = SchedulingRules::default().slots_for_day();

        assert_eq!(slots.len(), 18);
        assert_eq!(slots.first().unwrap().start, t(9, 0));
        assert_eq!(slots.last().unwrap().start, t(17, 30));
        assert_eq!(slots.last().unwrap().end, t(18, 0));
    }

    #[test]
    fn slot_window_is_half_open() {
        let window = SlotWindow::new(t(13, 30), 30);

        assert!(window.contains(t(13, 30)));
        assert!(window.contains(t(13, 45)));
        assert!(!window.contains(t(14, 0)));
        assert!(!window.contains(t(13, 29)));
    }

    #[test]
    fn last_slot_of_day_wraps_midnight() {
        let window = SlotWindow::new(t(23, 30), 30);
        let date = NaiveDate::from_ymd_opt(2025, 11, 2).unwrap();

        assert!(window.wraps_midnight());
        assert!(window.contains(t(23, 45)));
        assert!(!window.contains(t(0, 10)));
        assert_eq!(window.end_at(date), NaiveDate::from_ymd_opt(2025, 11, 3).unwrap().and_time(t(0, 0)));
        assert!(!SchedulingRules::default().is_within_workday(&window));
    }

    #[test]
    fn queue_status_accepts_legacy_names() {
        assert_eq!("In Progress".parse::<QueueStatus>(), Ok(QueueStatus::InProgress));
        assert_eq!("consulting".parse::<QueueStatus>(), Ok(QueueStatus::InProgress));
        assert!("paused".parse::<QueueStatus>().is_err());

        let parsed: QueueStatus = serde_json::from_str("\"In Progress\"").unwrap();
        assert_eq!(parsed, QueueStatus::InProgress);
        assert_eq!(serde_json::to_string(&QueueStatus::InProgress).unwrap(), "\"Consulting\"");
    }

    #[test]
    fn appointment_status_moves_forward_only() {
        use AppointmentStatus::*;

        assert!(Scheduled.can_transition_to(&Completed));
        assert!(Waiting.can_transition_to(&Completed));
        assert!(!Completed.can_transition_to(&Waiting));
        assert!(!Cancelled.can_transition_to(&Completed));
    }

    #[test]
    fn time_parsing_accepts_seconds() {
        assert_eq!(parse_time("09:15").unwrap(), t(9, 15));
        assert_eq!(parse_time("09:15:00").unwrap(), t(9, 15));
        assert!(parse_time("9.15").is_err());
        assert!(parse_date("2025-13-01").is_err());
    }
}
