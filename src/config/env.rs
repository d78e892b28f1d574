//! Environment variable loading.

use std::env;
use std::path::PathBuf;

use super::{ServerConfig, TlsConfig};

/// Read a variable, treating unset and blank the same.
pub(super) fn env_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| format!("Invalid value for {name} ({raw}): {e}"))
        })
        .transpose()
}

pub(super) fn parse_bool(name: &str, raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("Invalid boolean for {name}: {raw}")),
    }
}

/// Split a comma-separated list, dropping blank entries.
pub(super) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build a configuration from defaults overridden by environment variables.
pub(super) fn load_from_env() -> Result<ServerConfig, String> {
    let mut config = ServerConfig::default();

    if let Some(host) = env_var("HOST") {
        config.host = host;
    }
    if let Some(port) = parse_env::<u16>("PORT")? {
        config.port = port;
    }
    if let (Some(cert), Some(key)) = (env_var("TLS_CERT_PATH"), env_var("TLS_KEY_PATH")) {
        config.tls = Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        });
    }

    if let Some(path) = env_var("LIVE_PATH") {
        config.live_path = path;
    }
    if let Some(timeout) = parse_env::<u64>("UPSTREAM_CONNECT_TIMEOUT_SECONDS")? {
        config.upstream_connect_timeout_seconds = timeout;
    }
    if let Some(raw) = env_var("FORWARD_ROUTING_DIRECTIVE") {
        config.forward_routing_directive = parse_bool("FORWARD_ROUTING_DIRECTIVE", &raw)?;
    }

    if let Some(hosts) = env_var("UPSTREAM_ALLOWED_HOSTS") {
        config.upstream_allowed_hosts = split_list(&hosts);
    }

    config.upstream_access_token = env_var("UPSTREAM_ACCESS_TOKEN");

    config.google_project_id = env_var("GOOGLE_CLOUD_PROJECT");
    if let Some(location) = env_var("GOOGLE_CLOUD_LOCATION_TEXT") {
        config.location_text = location;
    }
    if let Some(location) = env_var("GOOGLE_CLOUD_LOCATION_VOICE") {
        config.location_voice = location;
    }
    if let Some(model) = env_var("GEMINI_MODEL_ID_TEXT") {
        config.model_text = model;
    }
    if let Some(model) = env_var("GEMINI_MODEL_ID_VOICE") {
        config.model_voice = model;
    }

    config.cors_allowed_origins = env_var("CORS_ALLOWED_ORIGINS");

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("X", "TRUE").unwrap());
        assert!(parse_bool("X", "on").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").unwrap_err().contains("X"));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(" a.example.com, *.googleapis.com ,,"),
            vec!["a.example.com", "*.googleapis.com"]
        );
        assert!(split_list(" , ").is_empty());
    }
}
