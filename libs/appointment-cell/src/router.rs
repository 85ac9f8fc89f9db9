use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, patch},
};

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/staff/{staff_id}/slots/{date}", get(handlers::get_slots))
        .route("/conflicts/check", post(handlers::check_conflicts))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/{appointment_id}/transfer-targets", get(handlers::get_transfer_targets))
        .route("/{appointment_id}/transfer", post(handlers::transfer_appointment))
        .route("/{appointment_id}/confirm", post(handlers::confirm_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .with_state(state)
}
