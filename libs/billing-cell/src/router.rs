use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers::{self, BillingState};

pub fn billing_routes(state: Arc<BillingState>) -> Router {
    Router::new()
        .route("/sessions", post(handlers::classify_session))
        .route("/appointments/{appointment_id}", get(handlers::get_billing_record))
        .route("/appointments/{appointment_id}/complete", post(handlers::complete_session))
        .with_state(state)
}
