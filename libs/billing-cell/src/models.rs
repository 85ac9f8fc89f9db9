use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use shared_models::{Appointment, AppointmentId};

// ==============================================================================
// COUNTER MODELS
// ==============================================================================

/// Identifies one yearly capacity counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub program_key: String,
    pub year: i32,
}

impl CounterKey {
    pub fn new(program_key: impl Into<String>, year: i32) -> Self {
        Self {
            program_key: program_key.into(),
            year,
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session_counter:{}:{}", self.program_key, self.year)
    }
}

/// The position a session took in its program's yearly count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOrdinal {
    pub ordinal: u64,
    pub over_cap: bool,
}

// ==============================================================================
// BILLING MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    /// Within the yearly capacity; nothing to charge.
    Free,
    AutoPaid,
    /// Extra treatment awaiting payment.
    Pending,
}

impl fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingStatus::Free => write!(f, "free"),
            BillingStatus::AutoPaid => write!(f, "auto_paid"),
            BillingStatus::Pending => write!(f, "pending"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingRecord {
    pub appointment_id: AppointmentId,
    pub program_key: String,
    pub year: i32,
    pub amount: f64,
    pub status: BillingStatus,
    /// Absent for extra treatments, which never consume capacity.
    pub session_ordinal: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a billing attempt. A duplicate delivery is not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BillingClassification {
    Billed { record: BillingRecord },
    /// `record` is `None` while the first attempt is still in flight.
    AlreadyBilled { record: Option<BillingRecord> },
}

impl BillingClassification {
    pub fn record(&self) -> Option<&BillingRecord> {
        match self {
            BillingClassification::Billed { record } => Some(record),
            BillingClassification::AlreadyBilled { record } => record.as_ref(),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, BillingClassification::AlreadyBilled { .. })
    }
}

/// Result of a claim attempt on an appointment's billing slot.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed,
    Billed(BillingRecord),
    /// Held by an earlier attempt. `charge` is set once that attempt has
    /// consumed its ordinal, and is what a redelivery finalizes.
    Open { charge: Option<BillingRecord> },
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifySessionRequest {
    pub program_key: String,
    pub year: i32,
    pub appointment_id: AppointmentId,
    #[serde(default)]
    pub is_extra_treatment: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub appointment: Appointment,
    pub billing: BillingClassification,
}
