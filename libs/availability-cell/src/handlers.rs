// libs/availability-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use shared_models::error::AppError;
use shared_models::time::parse_calendar_date;
use shared_models::StaffId;

use crate::models::{AvailabilityError, EffectiveAvailability, SetOverrideRequest};
use crate::services::resolver::AvailabilityResolver;

pub struct AvailabilityState {
    pub resolver: Arc<AvailabilityResolver>,
}

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<AvailabilityState>>,
    Path((staff_id, date)): Path<(StaffId, String)>,
) -> Result<Json<EffectiveAvailability>, AppError> {
    let date = parse_calendar_date(&date).map_err(AvailabilityError::from)?;
    let availability = state.resolver.resolve(staff_id, date).await?;
    Ok(Json(availability))
}

#[axum::debug_handler]
pub async fn set_override(
    State(state): State<Arc<AvailabilityState>>,
    Path((staff_id, date)): Path<(StaffId, String)>,
    Json(request): Json<SetOverrideRequest>,
) -> Result<Json<Value>, AppError> {
    let date = parse_calendar_date(&date).map_err(AvailabilityError::from)?;
    state.resolver.set_override(staff_id, date, request.date_override).await?;

    let availability = state.resolver.resolve(staff_id, date).await?;
    Ok(Json(json!({
        "success": true,
        "availability": availability
    })))
}

#[axum::debug_handler]
pub async fn clear_override(
    State(state): State<Arc<AvailabilityState>>,
    Path((staff_id, date)): Path<(StaffId, String)>,
) -> Result<Json<Value>, AppError> {
    let date = parse_calendar_date(&date).map_err(AvailabilityError::from)?;
    let removed = state.resolver.clear_override(staff_id, date).await?;

    Ok(Json(json!({
        "success": true,
        "removed": removed
    })))
}
