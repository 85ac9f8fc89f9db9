use std::sync::Arc;

use tracing::{debug, info, warn};

use shared_models::{Appointment, AppointmentId, AppointmentStatus};

use crate::models::AppointmentError;
use crate::store::AppointmentStore;

/// All valid next statuses for a given current status.
pub fn valid_transitions(current: AppointmentStatus) -> &'static [AppointmentStatus] {
    match current {
        AppointmentStatus::Pending => &[AppointmentStatus::Confirmed, AppointmentStatus::Cancelled],
        AppointmentStatus::Confirmed => &[AppointmentStatus::Completed, AppointmentStatus::Cancelled],
        // Terminal states
        AppointmentStatus::Completed | AppointmentStatus::Cancelled => &[],
    }
}

pub fn validate_status_transition(
    current: AppointmentStatus,
    next: AppointmentStatus,
) -> Result<(), AppointmentError> {
    if !valid_transitions(current).contains(&next) {
        warn!("Invalid status transition attempted: {} -> {}", current, next);
        return Err(AppointmentError::InvalidStatusTransition { from: current, to: next });
    }
    Ok(())
}

pub struct AppointmentLifecycleService {
    store: Arc<dyn AppointmentStore>,
}

impl AppointmentLifecycleService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    pub async fn update_status(
        &self,
        id: AppointmentId,
        next: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let current = self
            .store
            .get(id)
            .await?
            .ok_or(AppointmentError::NotFound(id))?;

        debug!("Transitioning appointment {} from {} to {}", id, current.status, next);
        validate_status_transition(current.status, next)?;

        let updated = self.store.set_status(id, current.status, next).await?;
        info!("Appointment {} is now {}", id, next);
        Ok(updated)
    }

    pub async fn confirm(&self, id: AppointmentId) -> Result<Appointment, AppointmentError> {
        self.update_status(id, AppointmentStatus::Confirmed).await
    }

    pub async fn cancel(&self, id: AppointmentId) -> Result<Appointment, AppointmentError> {
        self.update_status(id, AppointmentStatus::Cancelled).await
    }

    pub async fn complete(&self, id: AppointmentId) -> Result<Appointment, AppointmentError> {
        self.update_status(id, AppointmentStatus::Completed).await
    }
}
