pub mod faxes;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/faxes/inbound", post(faxes::handle_inbound))
        .route("/api/v1/faxes/status", post(faxes::handle_status))
        .with_state(state)
}
