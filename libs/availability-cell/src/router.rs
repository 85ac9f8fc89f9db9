// libs/availability-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use crate::handlers::{self, AvailabilityState};

pub fn availability_routes(state: Arc<AvailabilityState>) -> Router {
    Router::new()
        .route("/staff/{staff_id}/dates/{date}", get(handlers::get_availability))
        .route(
            "/staff/{staff_id}/dates/{date}/override",
            axum::routing::put(handlers::set_override).delete(handlers::clear_override),
        )
        .with_state(state)
}
