use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use availability_cell::router::availability_routes;
use billing_cell::router::billing_routes;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/availability", availability_routes(state.availability))
        .nest("/appointments", appointment_routes(state.appointments))
        .nest("/billing", billing_routes(state.billing))
}
