//! Live relay WebSocket route configuration

use axum::{
    Router,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::handlers::live::live_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the live relay router
///
/// # Endpoint
///
/// `GET {path}` - WebSocket upgrade for a relayed live session
///
/// # Protocol
///
/// After the upgrade the client sends:
/// 1. A routing directive `{"service_url": "wss://..."}`
/// 2. The `setup` frame
/// 3. `realtime_input`, `client_content` and `tool_response` frames
///
/// Every frame except a consumed routing directive is relayed upstream
/// verbatim, and every upstream frame is relayed back.
pub fn create_live_router(path: &str) -> Router<Arc<AppState>> {
    Router::new()
        .route(path, get(live_handler))
        .layer(TraceLayer::new_for_http())
}

/// Fallback for unknown paths. Upgrade requests get an empty 404 and the
/// transport is closed.
pub async fn reject_upgrade(headers: HeaderMap) -> Response {
    let is_upgrade = headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"));

    if is_upgrade {
        warn!("Rejecting WebSocket upgrade on unknown path");
        return (StatusCode::NOT_FOUND, [(header::CONNECTION, "close")]).into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}
