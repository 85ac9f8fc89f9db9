use thiserror::Error;

use appointment_cell::models::AppointmentError;
use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::AppointmentId;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(AppointmentId),

    #[error("No billing record for appointment {0}")]
    RecordNotFound(AppointmentId),

    #[error("Session counter unavailable: {0}")]
    CounterUnavailable(String),

    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Billing record for {appointment_id} not finalized after {attempts} attempts")]
    FinalizeFailed {
        appointment_id: AppointmentId,
        attempts: u32,
    },

    #[error(transparent)]
    Appointment(#[from] AppointmentError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvalidInput(msg) => AppError::BadRequest(msg),
            e @ (BillingError::AppointmentNotFound(_) | BillingError::RecordNotFound(_)) => AppError::NotFound(e.to_string()),
            e @ (BillingError::CounterUnavailable(_) | BillingError::RedisError(_)) => {
                AppError::ServiceUnavailable(e.to_string())
            }
            e @ BillingError::FinalizeFailed { .. } => AppError::ServiceUnavailable(e.to_string()),
            BillingError::Appointment(e) => e.into(),
            BillingError::Store(e) => e.into(),
        }
    }
}
