//! Upstream credentials.
//!
//! The gateway needs a bearer token for every upstream connection. Tokens come
//! either from configuration ([`StaticTokenProvider`]) or from Application
//! Default Credentials ([`AdcTokenProvider`]): the key file named by
//! `GOOGLE_APPLICATION_CREDENTIALS`, then gcloud user credentials, then the
//! compute metadata server.

use std::sync::Arc;

use async_trait::async_trait;
use google_cloud_auth::credentials::{Builder, CacheableResource, Credentials};
use http::header::AUTHORIZATION;
use http::{Extensions, HeaderMap};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroize;

/// OAuth scope requested for upstream tokens.
pub const GOOGLE_CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("No upstream credentials available: {0}")]
    Unavailable(String),

    #[error("Token request failed: {0}")]
    Request(String),

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

pub type CredentialResult<T> = Result<T, CredentialError>;

/// Source of short-lived upstream access tokens.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a currently valid access token.
    async fn upstream_token(&self) -> CredentialResult<String>;
}

// =============================================================================
// Static token
// =============================================================================

/// Fixed token taken from configuration.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn upstream_token(&self) -> CredentialResult<String> {
        if self.token.is_empty() {
            return Err(CredentialError::Unavailable(
                "configured access token is empty".to_string(),
            ));
        }
        Ok(self.token.clone())
    }
}

impl Drop for StaticTokenProvider {
    fn drop(&mut self) {
        self.token.zeroize();
    }
}

// =============================================================================
// Application Default Credentials
// =============================================================================

/// Tokens from Application Default Credentials.
///
/// Credentials are resolved on first use, so a gateway started without them
/// still serves; each connection then fails with a credential error until
/// they appear. The underlying credentials cache and refresh tokens.
pub struct AdcTokenProvider {
    scopes: Vec<String>,
    credentials: Mutex<Option<Credentials>>,
}

impl AdcTokenProvider {
    pub fn new(scopes: &[&str]) -> Self {
        Self {
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            credentials: Mutex::new(None),
        }
    }

    fn credentials(&self) -> CredentialResult<Credentials> {
        let mut slot = self.credentials.lock();
        if let Some(credentials) = slot.as_ref() {
            return Ok(credentials.clone());
        }

        let credentials = Builder::default()
            .with_scopes(self.scopes.clone())
            .build()
            .map_err(|e| CredentialError::Unavailable(e.to_string()))?;
        info!("Loaded application default credentials");
        *slot = Some(credentials.clone());
        Ok(credentials)
    }
}

#[async_trait]
impl CredentialProvider for AdcTokenProvider {
    async fn upstream_token(&self) -> CredentialResult<String> {
        let credentials = self.credentials()?;
        let headers = match credentials
            .headers(Extensions::new())
            .await
            .map_err(|e| CredentialError::Request(e.to_string()))?
        {
            CacheableResource::New { data, .. } => data,
            _ => {
                return Err(CredentialError::InvalidResponse(
                    "credentials returned no headers".to_string(),
                ));
            }
        };
        debug!("Obtained upstream access token");
        bearer_token(&headers)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> CredentialResult<String> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| CredentialError::InvalidResponse("no authorization header".to_string()))?
        .to_str()
        .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CredentialError::InvalidResponse("not a bearer token".to_string()))
}

/// Pick the provider for the given settings: a configured token wins over
/// Application Default Credentials.
pub fn credential_provider(access_token: Option<&str>) -> Arc<dyn CredentialProvider> {
    match access_token {
        Some(token) => Arc::new(StaticTokenProvider::new(token)),
        None => Arc::new(AdcTokenProvider::new(&[GOOGLE_CLOUD_PLATFORM_SCOPE])),
    }
}
