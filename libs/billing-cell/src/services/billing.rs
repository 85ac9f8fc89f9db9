use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use shared_config::BillingConfig;
use shared_database::StoreError;
use shared_models::AppointmentId;

use crate::error::BillingError;
use crate::models::{BillingClassification, BillingRecord, BillingStatus, ClaimOutcome};
use crate::services::counter::CapacityCounter;
use crate::store::BillingStore;

const FINALIZE_BACKOFF: Duration = Duration::from_millis(50);

pub struct BillingService {
    store: Arc<dyn BillingStore>,
    capacity: CapacityCounter,
    standard_rate: f64,
    finalize_retries: u32,
    /// Charges whose ordinal is consumed but which could not be written to
    /// the store. A redelivery resumes from here.
    unsettled: Mutex<HashMap<AppointmentId, BillingRecord>>,
}

impl BillingService {
    pub fn new(store: Arc<dyn BillingStore>, capacity: CapacityCounter, config: &BillingConfig) -> Self {
        Self {
            store,
            capacity,
            standard_rate: config.standard_rate,
            finalize_retries: config.finalize_retries.max(1),
            unsettled: Mutex::new(HashMap::new()),
        }
    }

    pub fn standard_rate(&self) -> f64 {
        self.standard_rate
    }

    pub async fn get_record(&self, appointment_id: AppointmentId) -> Result<Option<BillingRecord>, BillingError> {
        Ok(self.store.get(appointment_id).await?)
    }

    /// Bill one completed session, at most once per appointment.
    ///
    /// The appointment's billing slot is claimed first; only the claim winner
    /// touches the counter. The resulting charge is reserved on the claim
    /// before it is finalized, so a redelivery after a store outage finishes
    /// the same charge instead of consuming a new ordinal. Extra treatments
    /// never consume capacity and are left pending at the standard rate.
    #[instrument(skip(self), fields(appointment_id = %appointment_id))]
    pub async fn classify_session_for_billing(
        &self,
        program_key: &str,
        year: i32,
        appointment_id: AppointmentId,
        is_extra_treatment: bool,
    ) -> Result<BillingClassification, BillingError> {
        if program_key.trim().is_empty() {
            return Err(BillingError::InvalidInput("program_key must not be empty".to_string()));
        }

        let charge = match self.store.claim(appointment_id, program_key, year).await? {
            ClaimOutcome::Claimed => {
                self.compute_charge(program_key, year, appointment_id, is_extra_treatment)
                    .await?
            }
            ClaimOutcome::Billed(record) => {
                debug!("Appointment {} already billed, skipping", appointment_id);
                return Ok(BillingClassification::AlreadyBilled { record: Some(record) });
            }
            ClaimOutcome::Open { charge: Some(charge) } => {
                info!("Resuming reserved charge for appointment {}", appointment_id);
                return self.settle(charge, true).await;
            }
            ClaimOutcome::Open { charge: None } => {
                let unsettled = self.unsettled.lock().await.get(&appointment_id).cloned();
                match unsettled {
                    Some(charge) => {
                        info!("Resuming unsettled charge for appointment {}", appointment_id);
                        return self.settle(charge, false).await;
                    }
                    None => {
                        debug!("Appointment {} is being billed by another attempt", appointment_id);
                        return Ok(BillingClassification::AlreadyBilled { record: None });
                    }
                }
            }
        };

        self.settle(charge, false).await
    }

    async fn compute_charge(
        &self,
        program_key: &str,
        year: i32,
        appointment_id: AppointmentId,
        is_extra_treatment: bool,
    ) -> Result<BillingRecord, BillingError> {
        let (amount, status, session_ordinal) = if is_extra_treatment {
            (self.standard_rate, BillingStatus::Pending, None)
        } else {
            match self.capacity.increment_and_classify(program_key, year).await {
                Ok(session) if session.over_cap => {
                    (self.standard_rate, BillingStatus::AutoPaid, Some(session.ordinal))
                }
                Ok(session) => (0.0, BillingStatus::Free, Some(session.ordinal)),
                Err(e) => {
                    warn!("Session counter failed for {}: {}", appointment_id, e);
                    if let Err(release_err) = self.store.release(appointment_id).await {
                        error!("Failed to release billing claim for {}: {}", appointment_id, release_err);
                    }
                    return Err(e);
                }
            }
        };

        Ok(BillingRecord {
            appointment_id,
            program_key: program_key.to_string(),
            year,
            amount,
            status,
            session_ordinal,
            created_at: Utc::now(),
        })
    }

    /// Reserve (unless already reserved) and finalize `charge`.
    async fn settle(&self, charge: BillingRecord, reserved: bool) -> Result<BillingClassification, BillingError> {
        let appointment_id = charge.appointment_id;

        let written = if reserved {
            Ok(())
        } else {
            self.with_retry(&charge, |store, charge| async move { store.reserve(&charge).await })
                .await
        };
        let finalized = match written {
            Ok(()) => {
                self.with_retry(&charge, |store, charge| async move { store.finalize(charge).await })
                    .await
            }
            Err(e) => Err(e),
        };

        match finalized {
            Ok(stored) => {
                self.unsettled.lock().await.remove(&appointment_id);
                info!(
                    "Appointment {} billed as {} ({:.2}), session {:?} of {}",
                    appointment_id,
                    stored.status,
                    stored.amount,
                    stored.session_ordinal,
                    self.capacity.threshold()
                );
                Ok(BillingClassification::Billed { record: stored })
            }
            // Another delivery finalized the same charge first.
            Err(StoreError::StaleWrite(_)) => {
                self.unsettled.lock().await.remove(&appointment_id);
                let record = self.store.get(appointment_id).await?;
                Ok(BillingClassification::AlreadyBilled { record })
            }
            Err(StoreError::Unavailable(reason)) => {
                error!(
                    "Billing record for {} (session {:?}) left unfinalized: {}",
                    appointment_id, charge.session_ordinal, reason
                );
                let attempts = self.finalize_retries;
                self.unsettled.lock().await.insert(appointment_id, charge);
                Err(BillingError::FinalizeFailed {
                    appointment_id,
                    attempts,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn with_retry<T, F, Fut>(&self, charge: &BillingRecord, write: F) -> Result<T, StoreError>
    where
        F: Fn(Arc<dyn BillingStore>, BillingRecord) -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match write(self.store.clone(), charge.clone()).await {
                Err(StoreError::Unavailable(reason)) if attempt < self.finalize_retries => {
                    warn!(
                        "Billing write attempt {} for {} failed: {}",
                        attempt, charge.appointment_id, reason
                    );
                    tokio::time::sleep(FINALIZE_BACKOFF * attempt).await;
                }
                other => return other,
            }
        }
    }
}
