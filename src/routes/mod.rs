pub mod api;
pub mod live;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::handlers::api::health_check;
use crate::state::AppState;

/// Assemble every route with its state.
///
/// CORS and security headers are layered on by the binary.
pub fn create_app(app_state: Arc<AppState>) -> Router {
    let live_routes = live::create_live_router(&app_state.config.live_path);

    Router::new()
        .route("/", get(health_check))
        .merge(api::create_api_router())
        .merge(live_routes)
        .fallback(live::reject_upgrade)
        .with_state(app_state)
}
