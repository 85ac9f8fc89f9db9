use std::sync::Arc;

use chrono::Datelike;
use tracing::{debug, info};

use appointment_cell::models::AppointmentError;
use appointment_cell::services::AppointmentLifecycleService;
use appointment_cell::store::AppointmentStore;
use shared_database::StoreError;
use shared_models::{AppointmentId, AppointmentStatus};

use crate::error::BillingError;
use crate::models::CompletionOutcome;
use crate::services::billing::BillingService;

/// Marks a session completed and bills it. Safe to call again for an
/// appointment that is already completed.
pub struct SessionCompletionService {
    appointments: Arc<dyn AppointmentStore>,
    lifecycle: Arc<AppointmentLifecycleService>,
    billing: Arc<BillingService>,
}

impl SessionCompletionService {
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        lifecycle: Arc<AppointmentLifecycleService>,
        billing: Arc<BillingService>,
    ) -> Self {
        Self {
            appointments,
            lifecycle,
            billing,
        }
    }

    pub async fn complete_session(&self, appointment_id: AppointmentId) -> Result<CompletionOutcome, BillingError> {
        let current = self
            .appointments
            .get(appointment_id)
            .await?
            .ok_or(BillingError::AppointmentNotFound(appointment_id))?;

        let program_key = current
            .program_key
            .clone()
            .ok_or_else(|| BillingError::InvalidInput(format!("appointment {} has no program", appointment_id)))?;

        let appointment = if current.status == AppointmentStatus::Completed {
            debug!("Appointment {} already completed", appointment_id);
            current
        } else {
            match self.lifecycle.complete(appointment_id).await {
                Ok(completed) => completed,
                // Lost the race against a concurrent completion of the same session.
                Err(AppointmentError::Store(StoreError::StaleWrite(_))) => self
                    .appointments
                    .get(appointment_id)
                    .await?
                    .filter(|apt| apt.status == AppointmentStatus::Completed)
                    .ok_or(BillingError::Appointment(AppointmentError::InvalidStatusTransition {
                        from: current.status,
                        to: AppointmentStatus::Completed,
                    }))?,
                Err(e) => return Err(e.into()),
            }
        };

        let billing = self
            .billing
            .classify_session_for_billing(
                &program_key,
                appointment.date.year(),
                appointment_id,
                appointment.is_extra_treatment,
            )
            .await?;

        info!("Session {} completed", appointment_id);
        Ok(CompletionOutcome { appointment, billing })
    }
}
