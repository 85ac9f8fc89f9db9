use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use shared_models::error::AppError;
use shared_models::AppointmentId;

use crate::error::BillingError;
use crate::models::ClassifySessionRequest;
use crate::services::{BillingService, SessionCompletionService};

pub struct BillingState {
    pub billing: Arc<BillingService>,
    pub completion: Arc<SessionCompletionService>,
}

#[axum::debug_handler]
pub async fn classify_session(
    State(state): State<Arc<BillingState>>,
    Json(request): Json<ClassifySessionRequest>,
) -> Result<Json<Value>, AppError> {
    let classification = state
        .billing
        .classify_session_for_billing(
            &request.program_key,
            request.year,
            request.appointment_id,
            request.is_extra_treatment,
        )
        .await?;

    Ok(Json(json!(classification)))
}

#[axum::debug_handler]
pub async fn complete_session(
    State(state): State<Arc<BillingState>>,
    Path(appointment_id): Path<AppointmentId>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.completion.complete_session(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": outcome.appointment,
        "billing": outcome.billing
    })))
}

#[axum::debug_handler]
pub async fn get_billing_record(
    State(state): State<Arc<BillingState>>,
    Path(appointment_id): Path<AppointmentId>,
) -> Result<Json<Value>, AppError> {
    let record = state
        .billing
        .get_record(appointment_id)
        .await?
        .ok_or(BillingError::RecordNotFound(appointment_id))?;

    Ok(Json(json!(record)))
}
