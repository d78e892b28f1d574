use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   tls:
///     cert_path: "/etc/certs/server.pem"
///     key_path: "/etc/certs/server.key"
///
/// gateway:
///   path: "/ws/gemini-live"
///   upstream_connect_timeout_seconds: 30
///   forward_routing_directive: true
///   allowed_upstream_hosts:
///     - "*.googleapis.com"
///
/// credentials:
///   access_token: "ya29...."
///
/// google:
///   project_id: "my-project"
///   location_text: "global"
///   location_voice: "us-central1"
///   model_text: "gemini-3-flash-preview"
///   model_voice: "gemini-live-2.5-flash-native-audio"
///
/// security:
///   cors_allowed_origins: "https://app.example.com"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub gateway: Option<GatewayYaml>,
    pub credentials: Option<CredentialsYaml>,
    pub google: Option<GoogleYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Relay settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GatewayYaml {
    /// Upgrade path for live connections
    pub path: Option<String>,
    /// 0 disables the timeout
    pub upstream_connect_timeout_seconds: Option<u64>,
    pub forward_routing_directive: Option<bool>,
    /// Exact hosts or `*.suffix` wildcards a directive may name
    pub allowed_upstream_hosts: Option<Vec<String>>,
}

/// Upstream credential settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsYaml {
    /// Static access token; when absent Application Default Credentials
    /// are used
    pub access_token: Option<String>,
}

/// Deployment values published at `/api/config`
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GoogleYaml {
    pub project_id: Option<String>,
    pub location_text: Option<String>,
    pub location_voice: Option<String>,
    pub model_text: Option<String>,
    pub model_voice: Option<String>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// Comma-separated origins or "*"
    pub cors_allowed_origins: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
