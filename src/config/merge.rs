//! Merging YAML overrides onto the environment configuration.

use std::path::PathBuf;

use super::env::load_from_env;
use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig};

/// Environment (with defaults) as the base, YAML values on top.
pub(super) fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, String> {
    let mut config = load_from_env()?;
    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls {
            if tls.enabled == Some(false) {
                config.tls = None;
            } else if let (Some(cert), Some(key)) = (tls.cert_path, tls.key_path) {
                config.tls = Some(TlsConfig {
                    cert_path: PathBuf::from(cert),
                    key_path: PathBuf::from(key),
                });
            } else if tls.enabled == Some(true) {
                return Err("TLS enabled but cert_path or key_path is missing".to_string());
            }
        }
    }

    if let Some(gateway) = yaml.gateway {
        if let Some(path) = gateway.path {
            config.live_path = path;
        }
        if let Some(timeout) = gateway.upstream_connect_timeout_seconds {
            config.upstream_connect_timeout_seconds = timeout;
        }
        if let Some(forward) = gateway.forward_routing_directive {
            config.forward_routing_directive = forward;
        }
        if let Some(hosts) = gateway.allowed_upstream_hosts {
            config.upstream_allowed_hosts = hosts;
        }
    }

    if let Some(token) = yaml.credentials.and_then(|c| c.access_token) {
        config.upstream_access_token = Some(token);
    }

    if let Some(google) = yaml.google {
        if let Some(project) = google.project_id {
            config.google_project_id = Some(project);
        }
        if let Some(location) = google.location_text {
            config.location_text = location;
        }
        if let Some(location) = google.location_voice {
            config.location_voice = location;
        }
        if let Some(model) = google.model_text {
            config.model_text = model;
        }
        if let Some(model) = google.model_voice {
            config.model_voice = model;
        }
    }

    if let Some(origins) = yaml.security.and_then(|s| s.cors_allowed_origins) {
        config.cors_allowed_origins = Some(origins);
    }

    Ok(config)
}
