// libs/availability-cell/src/models.rs
use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_config::SchedulingConfig;
use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::time::{self, TimeRange, TimeParseError};
use shared_models::StaffId;

// ==============================================================================
// AVAILABILITY RULES
// ==============================================================================

/// Per-date exception to the default weekly rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateOverride {
    Unavailable,
    AvailableWithExceptions {
        #[serde(default)]
        unavailable_ranges: Vec<TimeRange>,
    },
}

impl DateOverride {
    pub fn is_available(&self) -> bool {
        matches!(self, DateOverride::AvailableWithExceptions { .. })
    }

    pub fn unavailable_ranges(&self) -> &[TimeRange] {
        match self {
            DateOverride::Unavailable => &[],
            DateOverride::AvailableWithExceptions { unavailable_ranges } => unavailable_ranges,
        }
    }
}

/// Override map owned by one staff member. Dates absent from the map fall
/// back to the clinic's [`AvailabilityPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaffAvailability {
    pub staff_id: StaffId,
    pub overrides: BTreeMap<NaiveDate, DateOverride>,
}

impl StaffAvailability {
    pub fn new(staff_id: StaffId) -> Self {
        Self {
            staff_id,
            overrides: BTreeMap::new(),
        }
    }

    pub fn override_for(&self, date: NaiveDate) -> Option<&DateOverride> {
        self.overrides.get(&date)
    }
}

/// The default weekly rule: every day but `rest_day` is open from
/// `day_start` to `day_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityPolicy {
    pub rest_day: Weekday,
    #[serde(with = "time::hhmm")]
    pub day_start: NaiveTime,
    #[serde(with = "time::hhmm")]
    pub day_end: NaiveTime,
    pub slot_minutes: u32,
}

impl AvailabilityPolicy {
    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self {
            rest_day: config.rest_day,
            day_start: config.day_start,
            day_end: config.day_end,
            slot_minutes: config.slot_minutes.max(1),
        }
    }

    /// `None` if the configured hours are empty or inverted.
    pub fn open_range(&self) -> Option<TimeRange> {
        let range = TimeRange::new(self.day_start, self.day_end);
        range.is_valid().then_some(range)
    }
}

impl Default for AvailabilityPolicy {
    fn default() -> Self {
        Self::from_config(&SchedulingConfig::default())
    }
}

// ==============================================================================
// RESOLVED VIEWS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosedReason {
    RestDay,
    MarkedUnavailable,
    NoOpenHours,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveAvailability {
    #[serde(with = "time::calendar_date")]
    pub date: NaiveDate,
    pub enabled: bool,
    pub open_ranges: Vec<TimeRange>,
    pub unavailable_ranges: Vec<TimeRange>,
    pub closed_reason: Option<ClosedReason>,
}

impl EffectiveAvailability {
    pub fn closed(date: NaiveDate, reason: ClosedReason) -> Self {
        Self {
            date,
            enabled: false,
            open_ranges: vec![],
            unavailable_ranges: vec![],
            closed_reason: Some(reason),
        }
    }

    /// Whether `[start, end)` (minute offsets) sits inside an open range and
    /// clear of every unavailable sub-range.
    pub fn covers(&self, start: u32, end: u32) -> bool {
        self.enabled
            && self.open_ranges.iter().any(|range| range.contains_minutes(start, end))
            && !self.unavailable_ranges.iter().any(|range| range.overlaps_minutes(start, end))
    }
}

/// A bookable start time. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateSlot {
    #[serde(with = "time::calendar_date")]
    pub date: NaiveDate,
    #[serde(with = "time::hhmm")]
    pub start_time: NaiveTime,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetOverrideRequest {
    #[serde(rename = "override")]
    pub date_override: DateOverride,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} is the weekly rest day and cannot be made available")]
    RestDayOverride(NaiveDate),

    #[error("Unavailable range {start}-{end} must start before it ends")]
    InvalidRange { start: NaiveTime, end: NaiveTime },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TimeParseError> for AvailabilityError {
    fn from(err: TimeParseError) -> Self {
        AvailabilityError::InvalidInput(err.to_string())
    }
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::InvalidInput(msg) => AppError::BadRequest(msg),
            e @ AvailabilityError::RestDayOverride(_) => AppError::ValidationError(e.to_string()),
            e @ AvailabilityError::InvalidRange { .. } => AppError::ValidationError(e.to_string()),
            AvailabilityError::Store(e) => e.into(),
        }
    }
}
