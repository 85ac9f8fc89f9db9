// libs/appointment-cell/src/models.rs
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use availability_cell::models::AvailabilityError;
use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::time::{self, booking_end_minute, minute_of_day, TimeParseError, MINUTES_PER_DAY};
use shared_models::{Appointment, AppointmentId, AppointmentStatus, StaffId};

// ==============================================================================
// CONFLICT MODELS
// ==============================================================================

/// A proposed placement checked against the current bookings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictCandidate {
    /// The appointment being moved, excluded from its own check.
    #[serde(default)]
    pub id: Option<AppointmentId>,
    pub staff_id: StaffId,
    #[serde(with = "time::calendar_date")]
    pub date: NaiveDate,
    #[serde(with = "time::hhmm")]
    pub start_time: NaiveTime,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

impl ConflictCandidate {
    pub fn for_appointment(appointment: &Appointment, staff_id: StaffId, date: NaiveDate, start_time: NaiveTime) -> Self {
        Self {
            id: Some(appointment.id),
            staff_id,
            date,
            start_time,
            duration_minutes: appointment.duration_minutes,
        }
    }

    pub fn start_minute(&self) -> u32 {
        minute_of_day(self.start_time)
    }

    pub fn end_minute(&self, slot_minutes: u32) -> u32 {
        booking_end_minute(self.start_minute(), self.duration_minutes, slot_minutes)
    }

    /// A placement must have a positive duration and end by midnight.
    pub fn validate_extent(&self, slot_minutes: u32) -> Result<(), AppointmentError> {
        if self.duration_minutes == Some(0) {
            return Err(AppointmentError::InvalidInput("duration must be positive".to_string()));
        }
        if self.end_minute(slot_minutes) > MINUTES_PER_DAY {
            return Err(AppointmentError::InvalidInput(format!(
                "appointment at {} runs past the end of the day",
                self.start_time.format("%H:%M")
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictResult {
    pub has_conflict: bool,
    pub conflicts: Vec<Appointment>,
}

impl ConflictResult {
    pub fn clear() -> Self {
        Self::default()
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub staff_id: StaffId,
    pub patient_id: Uuid,
    pub date: String,
    pub start_time: String,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub program_key: Option<String>,
    #[serde(default)]
    pub is_extra_treatment: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_date: String,
    pub new_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferAppointmentRequest {
    pub new_staff_id: StaffId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub exclude_appointment_id: Option<AppointmentId>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found: {0}")]
    NotFound(AppointmentId),

    #[error("Staff member not found: {0}")]
    StaffNotFound(StaffId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("No availability: {0}")]
    NoAvailability(String),

    #[error("Appointment conflicts with {} existing booking(s)", .0.len())]
    ConflictDetected(Vec<Appointment>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum RescheduleError {
    #[error("Appointment not found: {0}")]
    NotFound(AppointmentId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Appointment cannot be rescheduled in status {0}")]
    NotMovable(AppointmentStatus),

    #[error("No slots available on {0}")]
    NoSlots(NaiveDate),

    #[error("No availability: {0}")]
    NoAvailability(String),

    #[error("Appointment conflicts with {} existing booking(s)", .0.len())]
    ConflictDetected(Vec<Appointment>),

    #[error("Conflict check has not completed for the selected time")]
    CheckPending,

    #[error("Reschedule not possible from state {0}")]
    InvalidState(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Appointment not found: {0}")]
    NotFound(AppointmentId),

    #[error("Staff member not found: {0}")]
    StaffNotFound(StaffId),

    #[error("Appointment is already assigned to {0}")]
    SameStaff(StaffId),

    #[error("Staff member {0} is not clinically qualified")]
    NotQualified(StaffId),

    #[error("Appointment cannot be transferred in status {0}")]
    NotMovable(AppointmentStatus),

    #[error("No availability: {0}")]
    NoAvailability(String),

    #[error("Appointment conflicts with {} existing booking(s)", .0.len())]
    ConflictDetected(Vec<Appointment>),

    #[error("Availability and conflict checks have not completed for the selected target")]
    CheckPending,

    #[error("Transfer not possible from state {0}")]
    InvalidState(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TimeParseError> for AppointmentError {
    fn from(err: TimeParseError) -> Self {
        AppointmentError::InvalidInput(err.to_string())
    }
}

impl From<TimeParseError> for RescheduleError {
    fn from(err: TimeParseError) -> Self {
        RescheduleError::InvalidInput(err.to_string())
    }
}

impl From<AvailabilityError> for AppointmentError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::Store(e) => AppointmentError::Store(e),
            other => AppointmentError::InvalidInput(other.to_string()),
        }
    }
}

impl From<AvailabilityError> for RescheduleError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::Store(e) => RescheduleError::Store(e),
            other => RescheduleError::InvalidInput(other.to_string()),
        }
    }
}

impl From<AvailabilityError> for TransferError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::Store(e) => TransferError::Store(e),
            other => TransferError::NoAvailability(other.to_string()),
        }
    }
}

fn conflict_error(message: String, conflicts: &[Appointment]) -> AppError {
    AppError::Conflict {
        message,
        details: Some(json!({
            "conflicting_appointments": conflicts
        })),
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            e @ (AppointmentError::NotFound(_) | AppointmentError::StaffNotFound(_)) => {
                AppError::NotFound(e.to_string())
            }
            AppointmentError::InvalidInput(msg) => AppError::BadRequest(msg),
            e @ AppointmentError::InvalidStatusTransition { .. } => AppError::ValidationError(e.to_string()),
            e @ AppointmentError::NoAvailability(_) => AppError::conflict(e.to_string()),
            AppointmentError::ConflictDetected(conflicts) => {
                conflict_error("Appointment conflicts with existing booking".to_string(), &conflicts)
            }
            AppointmentError::Store(e) => e.into(),
        }
    }
}

impl From<RescheduleError> for AppError {
    fn from(err: RescheduleError) -> Self {
        match err {
            e @ RescheduleError::NotFound(_) => AppError::NotFound(e.to_string()),
            RescheduleError::InvalidInput(msg) => AppError::BadRequest(msg),
            e @ (RescheduleError::NotMovable(_)
                | RescheduleError::CheckPending
                | RescheduleError::InvalidState(_)) => AppError::ValidationError(e.to_string()),
            e @ (RescheduleError::NoSlots(_) | RescheduleError::NoAvailability(_)) => {
                AppError::conflict(e.to_string())
            }
            RescheduleError::ConflictDetected(conflicts) => {
                conflict_error("Requested time conflicts with existing booking".to_string(), &conflicts)
            }
            RescheduleError::Store(e) => e.into(),
        }
    }
}

impl From<TransferError> for AppError {
    fn from(err: TransferError) -> Self {
        match err {
            e @ (TransferError::NotFound(_) | TransferError::StaffNotFound(_)) => {
                AppError::NotFound(e.to_string())
            }
            e @ (TransferError::SameStaff(_)
                | TransferError::NotQualified(_)
                | TransferError::NotMovable(_)
                | TransferError::CheckPending
                | TransferError::InvalidState(_)) => AppError::ValidationError(e.to_string()),
            e @ TransferError::NoAvailability(_) => AppError::conflict(e.to_string()),
            TransferError::ConflictDetected(conflicts) => {
                conflict_error("Target staff member has a conflicting booking".to_string(), &conflicts)
            }
            TransferError::Store(e) => e.into(),
        }
    }
}
