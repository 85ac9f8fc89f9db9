use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use shared_database::{StoreError, SupabaseClient};
use shared_models::{Appointment, AppointmentId, AppointmentStatus, StaffId};

use crate::models::ConflictCandidate;
use crate::services::conflict::ConflictDetector;

/// Where an appointment sits on the schedule. Conditional writes compare
/// against the key the caller last read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleKey {
    pub staff_id: StaffId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

impl ScheduleKey {
    pub fn of(appointment: &Appointment) -> Self {
        Self {
            staff_id: appointment.staff_id,
            date: appointment.date,
            start_time: appointment.start_time,
        }
    }
}

/// A reschedule or transfer, applied only if the row still matches `expected`.
#[derive(Debug, Clone)]
pub struct ScheduleChange {
    pub appointment_id: AppointmentId,
    pub expected: ScheduleKey,
    pub next: ScheduleKey,
    pub next_staff_name: String,
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError>;

    /// Every appointment ever assigned to the staff member, cancelled included.
    async fn list_for_staff(&self, staff_id: StaffId) -> Result<Vec<Appointment>, StoreError>;

    async fn list_for_staff_on(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// Rejects with `StaleWrite` when the new booking would overlap an active one.
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError>;

    /// `StaleWrite` when the row moved, left pending/confirmed, or the target
    /// placement is no longer free.
    async fn commit_change(&self, change: ScheduleChange) -> Result<Appointment, StoreError>;

    async fn set_status(
        &self,
        id: AppointmentId,
        expected: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<Appointment, StoreError>;
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

/// Runs the conflict check inside the write lock, so two commits racing for
/// the same placement cannot both succeed.
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<AppointmentId, Appointment>>,
    detector: ConflictDetector,
}

impl InMemoryAppointmentStore {
    pub fn new(slot_minutes: u32) -> Self {
        Self {
            appointments: RwLock::new(HashMap::new()),
            detector: ConflictDetector::new(slot_minutes),
        }
    }

    pub async fn with_appointments(slot_minutes: u32, appointments: Vec<Appointment>) -> Self {
        let store = Self::new(slot_minutes);
        {
            let mut map = store.appointments.write().await;
            for apt in appointments {
                map.insert(apt.id, apt);
            }
        }
        store
    }

    fn sorted(mut appointments: Vec<Appointment>) -> Vec<Appointment> {
        appointments.sort_by_key(|apt| (apt.date, apt.start_time));
        appointments
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn list_for_staff(&self, staff_id: StaffId) -> Result<Vec<Appointment>, StoreError> {
        let map = self.appointments.read().await;
        Ok(Self::sorted(
            map.values().filter(|apt| apt.staff_id == staff_id).cloned().collect(),
        ))
    }

    async fn list_for_staff_on(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError> {
        let map = self.appointments.read().await;
        Ok(Self::sorted(
            map.values()
                .filter(|apt| apt.staff_id == staff_id && apt.date == date)
                .cloned()
                .collect(),
        ))
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let mut map = self.appointments.write().await;

        if appointment.is_active() {
            let candidate = ConflictCandidate {
                id: Some(appointment.id),
                staff_id: appointment.staff_id,
                date: appointment.date,
                start_time: appointment.start_time,
                duration_minutes: appointment.duration_minutes,
            };
            let existing: Vec<Appointment> = map.values().cloned().collect();
            if self.detector.check(&existing, &candidate).has_conflict {
                return Err(StoreError::StaleWrite(format!(
                    "placement for appointment {} is already taken",
                    appointment.id
                )));
            }
        }

        map.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn commit_change(&self, change: ScheduleChange) -> Result<Appointment, StoreError> {
        let mut map = self.appointments.write().await;

        let current = map
            .get(&change.appointment_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", change.appointment_id)))?;

        if ScheduleKey::of(&current) != change.expected || !current.status.is_movable() {
            return Err(StoreError::StaleWrite(format!(
                "appointment {} changed since it was read",
                change.appointment_id
            )));
        }

        let candidate = ConflictCandidate::for_appointment(
            &current,
            change.next.staff_id,
            change.next.date,
            change.next.start_time,
        );
        let existing: Vec<Appointment> = map.values().cloned().collect();
        if self.detector.check(&existing, &candidate).has_conflict {
            return Err(StoreError::StaleWrite(format!(
                "target placement for appointment {} is no longer free",
                change.appointment_id
            )));
        }

        let mut updated = current;
        updated.staff_id = change.next.staff_id;
        updated.staff_name = change.next_staff_name;
        updated.date = change.next.date;
        updated.start_time = change.next.start_time;
        updated.updated_at = Utc::now();

        map.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn set_status(
        &self,
        id: AppointmentId,
        expected: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        let mut map = self.appointments.write().await;
        let apt = map
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", id)))?;

        if apt.status != expected {
            return Err(StoreError::StaleWrite(format!(
                "appointment {} is {} not {}",
                id, apt.status, expected
            )));
        }

        apt.status = next;
        apt.updated_at = Utc::now();
        Ok(apt.clone())
    }
}

// ==============================================================================
// SUPABASE STORE
// ==============================================================================

/// PostgREST-backed store over the `appointments` table. Overlap protection
/// on insert relies on the table's exclusion constraint, reported as 409.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>, StoreError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| StoreError::Malformed(format!("Failed to parse appointments: {}", e)))
    }

    fn first_written(rows: Vec<Value>, what: String) -> Result<Appointment, StoreError> {
        Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or(StoreError::StaleWrite(what))
    }

    fn write_error(err: anyhow::Error) -> StoreError {
        let message = err.to_string();
        if message.contains("(409") {
            StoreError::StaleWrite(message)
        } else {
            StoreError::Unavailable(message)
        }
    }

    fn time_filter(time: NaiveTime) -> String {
        time.format("%H:%M:%S").to_string()
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(Self::parse_rows(result)?.into_iter().next())
    }

    async fn list_for_staff(&self, staff_id: StaffId) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?staff_id=eq.{}&order=date.asc,start_time.asc",
            staff_id
        );
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        debug!("Loaded {} appointments for staff {}", result.len(), staff_id);
        Self::parse_rows(result)
    }

    async fn list_for_staff_on(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?staff_id=eq.{}&date=eq.{}&order=start_time.asc",
            staff_id,
            date.format("%Y-%m-%d")
        );
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        Self::parse_rows(result)
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let body = serde_json::to_value(&appointment)?;
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                None,
                Some(body),
                Some(SupabaseClient::prefer("return=representation")),
            )
            .await
            .map_err(Self::write_error)?;

        Self::first_written(result, format!("insert of appointment {} returned no row", appointment.id))
    }

    async fn commit_change(&self, change: ScheduleChange) -> Result<Appointment, StoreError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&staff_id=eq.{}&date=eq.{}&start_time=eq.{}&status=in.(pending,confirmed)",
            change.appointment_id,
            change.expected.staff_id,
            change.expected.date.format("%Y-%m-%d"),
            Self::time_filter(change.expected.start_time),
        );
        let body = json!({
            "staff_id": change.next.staff_id,
            "staff_name": change.next_staff_name,
            "date": change.next.date.format("%Y-%m-%d").to_string(),
            "start_time": Self::time_filter(change.next.start_time),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(body),
                Some(SupabaseClient::prefer("return=representation")),
            )
            .await
            .map_err(Self::write_error)?;

        if result.is_empty() {
            warn!("Conditional update matched no row for appointment {}", change.appointment_id);
        }
        Self::first_written(
            result,
            format!("appointment {} changed since it was read", change.appointment_id),
        )
    }

    async fn set_status(
        &self,
        id: AppointmentId,
        expected: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&status=eq.{}", id, expected);
        let body = json!({
            "status": next,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(body),
                Some(SupabaseClient::prefer("return=representation")),
            )
            .await
            .map_err(Self::write_error)?;

        Self::first_written(result, format!("appointment {} is no longer {}", id, expected))
    }
}
