//! Session parameters published by the gateway at `GET /api/config`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::base::{LiveError, LiveResult};
use super::config::{SessionConfig, model_uri, service_url};

/// Project, regions and models the gateway is deployed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredConfig {
    pub project_id: Option<String>,
    pub location_text: String,
    pub location_voice: String,
    pub model_text: String,
    pub model_voice: String,
}

impl DiscoveredConfig {
    /// Regional endpoint for voice sessions.
    pub fn voice_service_url(&self) -> String {
        service_url(&self.location_voice)
    }

    /// Default voice session config against the discovered voice model.
    pub fn voice_session_config(&self) -> LiveResult<SessionConfig> {
        let project_id = self.project_id.as_deref().ok_or_else(|| {
            LiveError::InvalidConfiguration("gateway did not publish a project id".to_string())
        })?;
        Ok(SessionConfig::new(model_uri(
            project_id,
            &self.location_voice,
            &self.model_voice,
        )))
    }
}

/// Fetch `{base_url}/api/config`, where `base_url` is the gateway's http(s)
/// origin.
pub async fn fetch_discovery(base_url: &str) -> LiveResult<DiscoveredConfig> {
    let url = format!("{}/api/config", base_url.trim_end_matches('/'));
    debug!(%url, "Fetching gateway configuration");

    let response = reqwest::get(&url)
        .await
        .map_err(|e| LiveError::Discovery(e.to_string()))?;
    if !response.status().is_success() {
        return Err(LiveError::Discovery(format!(
            "{url} returned {}",
            response.status()
        )));
    }
    response
        .json::<DiscoveredConfig>()
        .await
        .map_err(|e| LiveError::Discovery(format!("invalid configuration body: {e}")))
}
