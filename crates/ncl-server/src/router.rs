use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all consent ledger endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route("/v1/ledger/status", get(handler::ledger_status_handler))
        .route(
            "/v1/consent/:subject",
            get(handler::get_consent_handler).put(handler::set_consent_handler),
        )
        .route("/v1/consent/:subject/history", get(handler::history_handler))
        .route("/v1/consent/:subject/verify", get(handler::verify_handler))
        .route("/v1/gate/:subject", get(handler::gate_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
