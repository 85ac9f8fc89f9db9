use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::staff::StaffId;
use crate::time::{self, booking_end_minute, minute_of_day};

pub type AppointmentId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub staff_id: StaffId,
    /// Denormalized display name of the assignee at write time.
    pub staff_name: String,
    pub patient_id: Uuid,
    #[serde(with = "time::calendar_date")]
    pub date: NaiveDate,
    #[serde(with = "time::hhmm")]
    pub start_time: NaiveTime,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub program_key: Option<String>,
    #[serde(default)]
    pub is_extra_treatment: bool,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Duration as booked, defaulting to one slot when absent.
    pub fn duration_or(&self, slot_minutes: u32) -> u32 {
        self.duration_minutes.unwrap_or(slot_minutes)
    }

    pub fn start_minute(&self) -> u32 {
        minute_of_day(self.start_time)
    }

    /// Exclusive end offset; never shorter than one slot.
    pub fn end_minute(&self, slot_minutes: u32) -> u32 {
        booking_end_minute(self.start_minute(), self.duration_minutes, slot_minutes)
    }

    pub fn is_active(&self) -> bool {
        self.status.occupies_schedule()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Cancelled rows are kept for audit but never block a slot.
    pub fn occupies_schedule(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    /// Only upcoming appointments may be moved between dates or staff.
    pub fn is_movable(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}
