use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::auth::{CredentialProvider, credential_provider};
use crate::handlers::live::ConnectionRegistry;

/// Application state shared by every request and connection
pub struct AppState {
    pub config: ServerConfig,
    /// Reentrant source of upstream access tokens
    pub credentials: Arc<dyn CredentialProvider>,
    pub connections: ConnectionRegistry,
}

impl AppState {
    /// Build state with the credential provider the configuration selects.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let credentials = credential_provider(config.upstream_access_token.as_deref());
        Self::with_credentials(config, credentials)
    }

    pub fn with_credentials(
        config: ServerConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            credentials,
            connections: ConnectionRegistry::new(),
        })
    }
}
