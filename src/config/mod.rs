//! Configuration module for the live gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use live_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::core::live::service_url;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

/// Default upgrade path for live connections.
pub const DEFAULT_LIVE_PATH: &str = "/ws/gemini-live";

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway:
/// - Server settings (host, port, TLS)
/// - Relay settings (upgrade path, upstream open timeout)
/// - Upstream credentials
/// - Deployment values published to clients
/// - Security settings (CORS)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Relay settings
    /// Only upgrade path accepted for live connections
    pub live_path: String,
    /// Upstream open timeout in seconds; 0 waits indefinitely
    pub upstream_connect_timeout_seconds: u64,
    /// Forward the routing directive frame upstream ahead of queued payload.
    /// Hosted live endpoints expect `setup` first, so disable this when the
    /// gateway fronts them directly.
    pub forward_routing_directive: bool,
    /// Hosts a routing directive may name; empty allows any host. Entries
    /// are exact host names or `*.suffix` wildcards.
    pub upstream_allowed_hosts: Vec<String>,

    // Upstream credentials
    /// Static bearer token; when unset tokens come from Application Default
    /// Credentials
    pub upstream_access_token: Option<String>,

    // Deployment values served at /api/config
    pub google_project_id: Option<String>,
    pub location_text: String,
    pub location_voice: String,
    pub model_text: String,
    pub model_voice: String,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            tls: None,
            live_path: DEFAULT_LIVE_PATH.to_string(),
            upstream_connect_timeout_seconds: 30,
            forward_routing_directive: true,
            upstream_allowed_hosts: Vec::new(),
            upstream_access_token: None,
            google_project_id: None,
            location_text: "global".to_string(),
            location_voice: "us-central1".to_string(),
            model_text: "gemini-3-flash-preview".to_string(),
            model_voice: "gemini-live-2.5-flash-native-audio".to_string(),
            cors_allowed_origins: None,
        }
    }
}

/// Zeroize the upstream token when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut token) = self.upstream_access_token {
            token.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// The `.env` file is loaded in `main.rs`, so its values arrive here as
    /// environment variables.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        validation::validate_port(self.port)?;
        validation::validate_live_path(&self.live_path)?;
        validation::validate_tls(&self.tls)?;
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Upstream open timeout, `None` when disabled.
    pub fn upstream_connect_timeout(&self) -> Option<Duration> {
        match self.upstream_connect_timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Whether a routing directive may name `host`.
    pub fn upstream_host_allowed(&self, host: &str) -> bool {
        host_allowed(&self.upstream_allowed_hosts, host)
    }

    /// Whether the configured voice endpoint is a hosted Google endpoint
    /// while directives are still forwarded upstream.
    pub fn forwards_directive_to_hosted_endpoint(&self) -> bool {
        self.forward_routing_directive && is_hosted_endpoint(&self.voice_service_url())
    }

    /// Regional endpoint voice clients route to.
    pub fn voice_service_url(&self) -> String {
        service_url(&self.location_voice)
    }
}

/// Match `host` against exact names and `*.suffix` wildcards. An empty list
/// allows every host.
pub fn host_allowed(allowed: &[String], host: &str) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let host = host.to_ascii_lowercase();
    allowed.iter().any(|pattern| {
        let pattern = pattern.trim().to_ascii_lowercase();
        match pattern.strip_prefix("*.") {
            Some(suffix) => host
                .strip_suffix(suffix)
                .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.')),
            None => host == pattern,
        }
    })
}

/// Whether `service_url` points at a `googleapis.com` host.
pub fn is_hosted_endpoint(service_url: &str) -> bool {
    url::Url::parse(service_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| host == "googleapis.com" || host.ends_with(".googleapis.com"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "HOST",
        "PORT",
        "TLS_CERT_PATH",
        "TLS_KEY_PATH",
        "LIVE_PATH",
        "UPSTREAM_CONNECT_TIMEOUT_SECONDS",
        "FORWARD_ROUTING_DIRECTIVE",
        "UPSTREAM_ACCESS_TOKEN",
        "UPSTREAM_ALLOWED_HOSTS",
        "GOOGLE_CLOUD_PROJECT",
        "GOOGLE_CLOUD_LOCATION_TEXT",
        "GOOGLE_CLOUD_LOCATION_VOICE",
        "GEMINI_MODEL_ID_TEXT",
        "GEMINI_MODEL_ID_VOICE",
        "CORS_ALLOWED_ORIGINS",
    ];

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            for name in ENV_VARS {
                env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.address(), "0.0.0.0:3001");
        assert!(!config.is_tls_enabled());
        assert_eq!(config.live_path, "/ws/gemini-live");
        assert_eq!(
            config.upstream_connect_timeout(),
            Some(Duration::from_secs(30))
        );
        assert!(config.forward_routing_directive);
        assert!(config.upstream_access_token.is_none());
        assert!(config.upstream_allowed_hosts.is_empty());
        assert!(config.upstream_host_allowed("anything.example.com"));
        assert!(config.google_project_id.is_none());
        assert_eq!(config.location_text, "global");
        assert_eq!(config.location_voice, "us-central1");
        assert_eq!(config.model_text, "gemini-3-flash-preview");
        assert_eq!(config.model_voice, "gemini-live-2.5-flash-native-audio");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "8080");
            env::set_var("GOOGLE_CLOUD_PROJECT", "env-project");
            env::set_var("UPSTREAM_CONNECT_TIMEOUT_SECONDS", "0");
            env::set_var("FORWARD_ROUTING_DIRECTIVE", "false");
            env::set_var("UPSTREAM_ACCESS_TOKEN", "env-token");
            env::set_var("UPSTREAM_ALLOWED_HOSTS", "*.googleapis.com, localhost");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.upstream_allowed_hosts,
            vec!["*.googleapis.com", "localhost"]
        );
        assert!(config.upstream_host_allowed("us-central1-aiplatform.googleapis.com"));
        assert!(!config.upstream_host_allowed("attacker.example.com"));
        assert_eq!(config.google_project_id, Some("env-project".to_string()));
        assert_eq!(config.upstream_connect_timeout(), None);
        assert!(!config.forward_routing_directive);
        assert_eq!(config.upstream_access_token, Some("env-token".to_string()));

        cleanup_env_vars();
    }

    #[test]
    fn test_host_allowed_patterns() {
        let allowed = vec!["*.googleapis.com".to_string(), "LocalHost".to_string()];
        assert!(host_allowed(&allowed, "us-central1-aiplatform.googleapis.com"));
        assert!(host_allowed(&allowed, "localhost"));
        assert!(!host_allowed(&allowed, "googleapis.com"));
        assert!(!host_allowed(&allowed, "evilgoogleapis.com"));
        assert!(!host_allowed(&allowed, "googleapis.com.evil.net"));
        assert!(!host_allowed(&allowed, "127.0.0.1"));
        assert!(host_allowed(&[], "127.0.0.1"));
    }

    #[test]
    fn test_directive_forwarding_to_hosted_endpoint() {
        let mut config = ServerConfig::default();
        assert!(config.forwards_directive_to_hosted_endpoint());

        config.forward_routing_directive = false;
        assert!(!config.forwards_directive_to_hosted_endpoint());

        assert!(is_hosted_endpoint(
            "wss://us-central1-aiplatform.googleapis.com/ws/live"
        ));
        assert!(!is_hosted_endpoint("ws://127.0.0.1:9000/ws/live"));
        assert!(!is_hosted_endpoint("not a url"));
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "not-a-port");
        }

        let result = ServerConfig::from_env();
        assert!(result.unwrap_err().to_string().contains("PORT"));

        unsafe {
            env::set_var("PORT", "0");
        }
        assert!(ServerConfig::from_env().is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_only() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080

gateway:
  path: "/ws/live"

google:
  project_id: "yaml-project"
  location_voice: "europe-west4"
"#;

        fs::write(&config_path, yaml_content).unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.live_path, "/ws/live");
        assert_eq!(config.google_project_id, Some("yaml-project".to_string()));
        assert_eq!(
            config.voice_service_url(),
            "wss://europe-west4-aiplatform.googleapis.com/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent"
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"

credentials:
  access_token: "yaml-token"
"#;

        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("HOST", "10.0.0.1");
            env::set_var("PORT", "9000");
            env::set_var("UPSTREAM_ACCESS_TOKEN", "env-token");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.upstream_access_token, Some("yaml-token".to_string()));
        // ENV value kept where YAML is silent
        assert_eq!(config.port, 9000);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_relative_live_path() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "gateway:\n  path: \"ws/live\"\n").unwrap();

        let result = ServerConfig::from_file(&config_path);
        assert!(result.unwrap_err().to_string().contains("must start with"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_tls_files() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
server:
  tls:
    cert_path: "/nonexistent/cert.pem"
    key_path: "/nonexistent/key.pem"
"#,
        )
        .unwrap();

        let result = ServerConfig::from_file(&config_path);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("TLS certificate file not found")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = PathBuf::from("/nonexistent/config.yaml");
        let result = ServerConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );

        cleanup_env_vars();
    }
}
