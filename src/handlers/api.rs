use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

use crate::core::live::DiscoveredConfig;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Health check handler
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

/// Deployment values clients need to build the routing directive and
/// session configuration. `projectId` is null when no project is configured.
pub async fn config_discovery(State(state): State<Arc<AppState>>) -> Json<DiscoveredConfig> {
    let config = &state.config;
    Json(DiscoveredConfig {
        project_id: config.google_project_id.clone(),
        location_text: config.location_text.clone(),
        location_voice: config.location_voice.clone(),
        model_text: config.model_text.clone(),
        model_voice: config.model_voice.clone(),
    })
}
