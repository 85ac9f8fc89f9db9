use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};

use availability_cell::services::SlotService;
use shared_models::error::AppError;
use shared_models::time::{parse_calendar_date, parse_clock_time};
use shared_models::{AppointmentId, StaffId};

use crate::models::{
    AppointmentError, BookAppointmentRequest, ConflictCandidate, RescheduleAppointmentRequest,
    RescheduleError, SlotQuery, TransferAppointmentRequest,
};
use crate::services::{
    AppointmentBookingService, AppointmentLifecycleService, ConflictDetectionService,
    RescheduleService, TransferService,
};
use crate::store::AppointmentStore;

pub struct AppointmentState {
    pub store: Arc<dyn AppointmentStore>,
    pub slots: Arc<SlotService>,
    pub conflicts: Arc<ConflictDetectionService>,
    pub booking: Arc<AppointmentBookingService>,
    pub lifecycle: Arc<AppointmentLifecycleService>,
    pub reschedule: Arc<RescheduleService>,
    pub transfer: Arc<TransferService>,
}

// ==============================================================================
// SLOTS AND CONFLICTS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_slots(
    State(state): State<Arc<AppointmentState>>,
    Path((staff_id, date)): Path<(StaffId, String)>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let date = parse_calendar_date(&date).map_err(AppointmentError::from)?;
    let history = state.store.list_for_staff(staff_id).await.map_err(AppointmentError::from)?;

    let slots = state
        .slots
        .generate_slots(staff_id, date, &history, query.exclude_appointment_id)
        .await
        .map_err(AppointmentError::from)?;

    Ok(Json(json!({
        "staff_id": staff_id,
        "date": date.format("%Y-%m-%d").to_string(),
        "slots": slots
    })))
}

#[axum::debug_handler]
pub async fn check_conflicts(
    State(state): State<Arc<AppointmentState>>,
    Json(candidate): Json<ConflictCandidate>,
) -> Result<Json<Value>, AppError> {
    candidate.validate_extent(state.conflicts.detector().slot_minutes())?;
    let result = state.conflicts.check_current(&candidate).await.map_err(AppointmentError::from)?;

    Ok(Json(json!({
        "has_conflict": result.has_conflict,
        "conflicting_appointments": result.conflicts
    })))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppointmentState>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.book_appointment(request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<AppointmentId>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.get_appointment(appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<AppointmentId>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let new_date = parse_calendar_date(&request.new_date).map_err(RescheduleError::from)?;
    let new_time = parse_clock_time(&request.new_time).map_err(RescheduleError::from)?;

    let appointment = state
        .reschedule
        .reschedule(appointment_id, new_date, new_time)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn get_transfer_targets(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<AppointmentId>,
) -> Result<Json<Value>, AppError> {
    let targets = state.transfer.transfer_targets(appointment_id).await?;

    Ok(Json(json!({
        "appointment_id": appointment_id,
        "targets": targets
    })))
}

#[axum::debug_handler]
pub async fn transfer_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<AppointmentId>,
    Json(request): Json<TransferAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .transfer
        .transfer(appointment_id, request.new_staff_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<AppointmentId>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.confirm(appointment_id).await?;
    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<AppointmentId>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.cancel(appointment_id).await?;
    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}
