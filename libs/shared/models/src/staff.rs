use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable staff identity. Display names are projections and never used as keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaffId(pub Uuid);

impl StaffId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StaffId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StaffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    FrontDesk,
    Clinician,
    Admin,
}

impl StaffRole {
    pub fn is_clinical(&self) -> bool {
        matches!(self, StaffRole::Clinician)
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaffRole::FrontDesk => write!(f, "front_desk"),
            StaffRole::Clinician => write!(f, "clinician"),
            StaffRole::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub display_name: String,
    pub role: StaffRole,
}
