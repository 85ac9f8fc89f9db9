use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use shared_database::{StoreError, SupabaseClient};
use shared_models::AppointmentId;

use crate::models::{BillingRecord, BillingStatus, ClaimOutcome};

/// One billing slot per appointment, claimed before any counter work.
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Create-if-absent. Exactly one concurrent caller sees `Claimed`.
    async fn claim(
        &self,
        appointment_id: AppointmentId,
        program_key: &str,
        year: i32,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Record the computed charge on an open claim without finalizing it.
    /// `StaleWrite` if there is no open claim.
    async fn reserve(&self, charge: &BillingRecord) -> Result<(), StoreError>;

    /// Fill in a claimed slot. `StaleWrite` if there is no open claim.
    async fn finalize(&self, record: BillingRecord) -> Result<BillingRecord, StoreError>;

    /// Drop an unfinalized claim so the appointment can be billed again.
    async fn release(&self, appointment_id: AppointmentId) -> Result<(), StoreError>;

    async fn get(&self, appointment_id: AppointmentId) -> Result<Option<BillingRecord>, StoreError>;
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

#[derive(Debug, Clone)]
enum Slot {
    Claimed { charge: Option<BillingRecord> },
    Finalized(BillingRecord),
}

#[derive(Default)]
pub struct InMemoryBillingStore {
    slots: Mutex<HashMap<AppointmentId, Slot>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<BillingRecord> {
        self.slots
            .lock()
            .await
            .values()
            .filter_map(|slot| match slot {
                Slot::Finalized(record) => Some(record.clone()),
                Slot::Claimed { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn claim(
        &self,
        appointment_id: AppointmentId,
        _program_key: &str,
        _year: i32,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut slots = self.slots.lock().await;
        match slots.get(&appointment_id) {
            Some(Slot::Claimed { charge }) => Ok(ClaimOutcome::Open { charge: charge.clone() }),
            Some(Slot::Finalized(record)) => Ok(ClaimOutcome::Billed(record.clone())),
            None => {
                slots.insert(appointment_id, Slot::Claimed { charge: None });
                Ok(ClaimOutcome::Claimed)
            }
        }
    }

    async fn reserve(&self, charge: &BillingRecord) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().await;
        match slots.get_mut(&charge.appointment_id) {
            Some(Slot::Claimed { charge: reserved }) => {
                *reserved = Some(charge.clone());
                Ok(())
            }
            _ => Err(StoreError::StaleWrite(format!(
                "no open billing claim for appointment {}",
                charge.appointment_id
            ))),
        }
    }

    async fn finalize(&self, record: BillingRecord) -> Result<BillingRecord, StoreError> {
        let mut slots = self.slots.lock().await;
        match slots.get(&record.appointment_id) {
            Some(Slot::Claimed { .. }) => {
                slots.insert(record.appointment_id, Slot::Finalized(record.clone()));
                Ok(record)
            }
            _ => Err(StoreError::StaleWrite(format!(
                "no open billing claim for appointment {}",
                record.appointment_id
            ))),
        }
    }

    async fn release(&self, appointment_id: AppointmentId) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().await;
        if let Some(Slot::Claimed { .. }) = slots.get(&appointment_id) {
            slots.remove(&appointment_id);
        }
        Ok(())
    }

    async fn get(&self, appointment_id: AppointmentId) -> Result<Option<BillingRecord>, StoreError> {
        Ok(match self.slots.lock().await.get(&appointment_id) {
            Some(Slot::Finalized(record)) => Some(record.clone()),
            _ => None,
        })
    }
}

// ==============================================================================
// SUPABASE STORE
// ==============================================================================

/// Row in `billing_records`; a claim is a row whose `status` is still null.
/// `charge_status` holds a reserved charge until the row is finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BillingRow {
    appointment_id: AppointmentId,
    program_key: String,
    year: i32,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    status: Option<BillingStatus>,
    #[serde(default)]
    session_ordinal: Option<u64>,
    #[serde(default)]
    charge_status: Option<BillingStatus>,
    created_at: DateTime<Utc>,
}

impl BillingRow {
    fn with_status(self, status: BillingStatus) -> BillingRecord {
        BillingRecord {
            appointment_id: self.appointment_id,
            program_key: self.program_key,
            year: self.year,
            amount: self.amount.unwrap_or(0.0),
            status,
            session_ordinal: self.session_ordinal,
            created_at: self.created_at,
        }
    }

    fn into_record(self) -> Option<BillingRecord> {
        let status = self.status?;
        Some(self.with_status(status))
    }

    fn into_claim_outcome(self) -> ClaimOutcome {
        match (self.status, self.charge_status) {
            (Some(status), _) => ClaimOutcome::Billed(self.with_status(status)),
            (None, Some(charge)) => ClaimOutcome::Open {
                charge: Some(self.with_status(charge)),
            },
            (None, None) => ClaimOutcome::Open { charge: None },
        }
    }
}

pub struct SupabaseBillingStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseBillingStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<BillingRow>, StoreError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<BillingRow>, _>>()
            .map_err(|e| StoreError::Malformed(format!("Failed to parse billing records: {}", e)))
    }

    async fn fetch(&self, appointment_id: AppointmentId) -> Result<Option<BillingRow>, StoreError> {
        let path = format!("/rest/v1/billing_records?appointment_id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(Self::parse_rows(result)?.into_iter().next())
    }
}

#[async_trait]
impl BillingStore for SupabaseBillingStore {
    async fn claim(
        &self,
        appointment_id: AppointmentId,
        program_key: &str,
        year: i32,
    ) -> Result<ClaimOutcome, StoreError> {
        let body = json!({
            "appointment_id": appointment_id,
            "program_key": program_key,
            "year": year,
            "created_at": Utc::now().to_rfc3339(),
        });

        // A duplicate primary key is ignored and comes back as an empty array.
        let inserted: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/billing_records?on_conflict=appointment_id",
                None,
                Some(body),
                Some(SupabaseClient::prefer("resolution=ignore-duplicates,return=representation")),
            )
            .await?;

        if !inserted.is_empty() {
            return Ok(ClaimOutcome::Claimed);
        }

        debug!("Billing slot for appointment {} already taken", appointment_id);
        match self.fetch(appointment_id).await? {
            Some(row) => Ok(row.into_claim_outcome()),
            // Released between our insert and read; the caller may try again.
            None => Err(StoreError::StaleWrite(format!(
                "billing claim for appointment {} vanished",
                appointment_id
            ))),
        }
    }

    async fn reserve(&self, charge: &BillingRecord) -> Result<(), StoreError> {
        let path = format!(
            "/rest/v1/billing_records?appointment_id=eq.{}&status=is.null",
            charge.appointment_id
        );
        let body = json!({
            "amount": charge.amount,
            "charge_status": charge.status,
            "session_ordinal": charge.session_ordinal,
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
            .await?;

        if result.is_empty() {
            return Err(StoreError::StaleWrite(format!(
                "no open billing claim for appointment {}",
                charge.appointment_id
            )));
        }
        Ok(())
    }

    async fn finalize(&self, record: BillingRecord) -> Result<BillingRecord, StoreError> {
        let path = format!(
            "/rest/v1/billing_records?appointment_id=eq.{}&status=is.null",
            record.appointment_id
        );
        let body = json!({
            "amount": record.amount,
            "status": record.status,
            "session_ordinal": record.session_ordinal,
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
            .await?;

        Self::parse_rows(result)?
            .into_iter()
            .next()
            .and_then(BillingRow::into_record)
            .ok_or_else(|| {
                StoreError::StaleWrite(format!(
                    "no open billing claim for appointment {}",
                    record.appointment_id
                ))
            })
    }

    async fn release(&self, appointment_id: AppointmentId) -> Result<(), StoreError> {
        let path = format!(
            "/rest/v1/billing_records?appointment_id=eq.{}&status=is.null",
            appointment_id
        );
        let _: Value = self.supabase.request(Method::DELETE, &path, None, None).await?;
        Ok(())
    }

    async fn get(&self, appointment_id: AppointmentId) -> Result<Option<BillingRecord>, StoreError> {
        Ok(self.fetch(appointment_id).await?.and_then(BillingRow::into_record))
    }
}
