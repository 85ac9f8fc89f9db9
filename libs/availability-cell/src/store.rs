use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use shared_database::{StoreError, SupabaseClient};
use shared_models::time::{self, TimeRange};
use shared_models::StaffId;

use crate::models::{DateOverride, StaffAvailability};

/// Read/write access to staff availability overrides.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn get_override(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> Result<Option<DateOverride>, StoreError>;

    async fn load(&self, staff_id: StaffId) -> Result<StaffAvailability, StoreError>;

    async fn put_override(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        date_override: DateOverride,
    ) -> Result<(), StoreError>;

    /// Returns whether an override existed.
    async fn delete_override(&self, staff_id: StaffId, date: NaiveDate) -> Result<bool, StoreError>;
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

#[derive(Default)]
pub struct InMemoryAvailabilityStore {
    staff: RwLock<HashMap<StaffId, StaffAvailability>>,
}

impl InMemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvailabilityStore for InMemoryAvailabilityStore {
    async fn get_override(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> Result<Option<DateOverride>, StoreError> {
        let staff = self.staff.read().await;
        Ok(staff
            .get(&staff_id)
            .and_then(|availability| availability.override_for(date))
            .cloned())
    }

    async fn load(&self, staff_id: StaffId) -> Result<StaffAvailability, StoreError> {
        let staff = self.staff.read().await;
        Ok(staff
            .get(&staff_id)
            .cloned()
            .unwrap_or_else(|| StaffAvailability::new(staff_id)))
    }

    async fn put_override(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        date_override: DateOverride,
    ) -> Result<(), StoreError> {
        let mut staff = self.staff.write().await;
        staff
            .entry(staff_id)
            .or_insert_with(|| StaffAvailability::new(staff_id))
            .overrides
            .insert(date, date_override);
        Ok(())
    }

    async fn delete_override(&self, staff_id: StaffId, date: NaiveDate) -> Result<bool, StoreError> {
        let mut staff = self.staff.write().await;
        Ok(staff
            .get_mut(&staff_id)
            .map(|availability| availability.overrides.remove(&date).is_some())
            .unwrap_or(false))
    }
}

// ==============================================================================
// SUPABASE STORE
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OverrideRow {
    staff_id: StaffId,
    #[serde(with = "time::calendar_date")]
    override_date: NaiveDate,
    is_available: bool,
    #[serde(default)]
    unavailable_ranges: Vec<TimeRange>,
}

impl OverrideRow {
    fn new(staff_id: StaffId, date: NaiveDate, date_override: &DateOverride) -> Self {
        Self {
            staff_id,
            override_date: date,
            is_available: date_override.is_available(),
            unavailable_ranges: date_override.unavailable_ranges().to_vec(),
        }
    }

    fn into_override(self) -> DateOverride {
        if self.is_available {
            DateOverride::AvailableWithExceptions {
                unavailable_ranges: self.unavailable_ranges,
            }
        } else {
            DateOverride::Unavailable
        }
    }
}

pub struct SupabaseAvailabilityStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAvailabilityStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<OverrideRow>, StoreError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<OverrideRow>, _>>()
            .map_err(|e| StoreError::Malformed(format!("Failed to parse overrides: {}", e)))
    }
}

#[async_trait]
impl AvailabilityStore for SupabaseAvailabilityStore {
    async fn get_override(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> Result<Option<DateOverride>, StoreError> {
        let path = format!(
            "/rest/v1/availability_overrides?staff_id=eq.{}&override_date=eq.{}",
            staff_id,
            date.format("%Y-%m-%d")
        );
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;

        Ok(Self::parse_rows(result)?
            .into_iter()
            .next()
            .map(OverrideRow::into_override))
    }

    async fn load(&self, staff_id: StaffId) -> Result<StaffAvailability, StoreError> {
        let path = format!(
            "/rest/v1/availability_overrides?staff_id=eq.{}&order=override_date.asc",
            staff_id
        );
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;

        let mut availability = StaffAvailability::new(staff_id);
        for row in Self::parse_rows(result)? {
            availability.overrides.insert(row.override_date, row.into_override());
        }
        debug!("Loaded {} overrides for staff {}", availability.overrides.len(), staff_id);
        Ok(availability)
    }

    async fn put_override(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        date_override: DateOverride,
    ) -> Result<(), StoreError> {
        let row = serde_json::to_value(OverrideRow::new(staff_id, date, &date_override))?;

        let _: Option<Vec<Value>> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/availability_overrides?on_conflict=staff_id,override_date",
            None,
            Some(row),
            Some(SupabaseClient::prefer("resolution=merge-duplicates,return=minimal")),
        ).await?;

        Ok(())
    }

    async fn delete_override(&self, staff_id: StaffId, date: NaiveDate) -> Result<bool, StoreError> {
        let path = format!(
            "/rest/v1/availability_overrides?staff_id=eq.{}&override_date=eq.{}",
            staff_id,
            date.format("%Y-%m-%d")
        );
        let deleted: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            None,
            None,
            Some(SupabaseClient::prefer("return=representation")),
        ).await?;

        Ok(!deleted.is_empty())
    }
}
