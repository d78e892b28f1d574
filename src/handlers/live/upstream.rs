//! Upstream socket acquisition.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::config::host_allowed;
use crate::core::auth::CredentialProvider;

/// Upstream websocket as opened by the gateway.
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Fatal per-connection gateway failures. Each one closes the client.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Credential acquisition failed: {0}")]
    CredentialFailure(String),

    #[error("Upstream connection failed: {0}")]
    UpstreamConnectFailure(String),

    #[error("Upstream connection timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Invalid service url: {0}")]
    InvalidServiceUrl(String),

    #[error("Transport closed: {0}")]
    TransportClosed(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Parse a directive's service url and check it against the host allowlist.
/// An empty allowlist accepts any ws/wss host.
pub fn validate_service_url(service_url: &str, allowed_hosts: &[String]) -> GatewayResult<Url> {
    let url = Url::parse(service_url)
        .map_err(|e| GatewayError::InvalidServiceUrl(format!("{service_url}: {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(GatewayError::InvalidServiceUrl(format!(
            "{service_url}: scheme must be ws or wss"
        )));
    }
    let host = url.host_str().unwrap_or_default();
    if !host_allowed(allowed_hosts, host) {
        return Err(GatewayError::InvalidServiceUrl(format!(
            "{service_url}: host {host} is not an allowed upstream"
        )));
    }
    Ok(url)
}

/// Append the access token to the service url as the `access_token` query
/// parameter.
pub fn build_upstream_url(
    service_url: &str,
    token: &str,
    allowed_hosts: &[String],
) -> GatewayResult<Url> {
    let mut url = validate_service_url(service_url, allowed_hosts)?;
    url.query_pairs_mut().append_pair("access_token", token);
    Ok(url)
}

/// Acquire a credential and open the upstream socket.
///
/// The service url is checked before any token is requested. The timeout,
/// when set, bounds only the socket open.
pub async fn open_upstream(
    credentials: Arc<dyn CredentialProvider>,
    service_url: String,
    allowed_hosts: Vec<String>,
    timeout: Option<Duration>,
) -> GatewayResult<UpstreamSocket> {
    validate_service_url(&service_url, &allowed_hosts)?;
    let token = credentials
        .upstream_token()
        .await
        .map_err(|e| GatewayError::CredentialFailure(e.to_string()))?;
    let url = build_upstream_url(&service_url, &token, &allowed_hosts)?;

    let connect = tokio_tungstenite::connect_async(url.as_str());
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| GatewayError::UpstreamTimeout(limit))?,
        None => connect.await,
    };

    let (socket, _response) =
        result.map_err(|e| GatewayError::UpstreamConnectFailure(e.to_string()))?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::{CredentialError, CredentialResult, StaticTokenProvider};
    use async_trait::async_trait;

    #[test]
    fn test_build_upstream_url_appends_token() {
        let url = build_upstream_url("wss://upstream.example.com/ws/live", "abc", &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://upstream.example.com/ws/live?access_token=abc"
        );
    }

    #[test]
    fn test_build_upstream_url_existing_query() {
        let url = build_upstream_url("wss://upstream.example.com/x?alt=json", "a/b+c", &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://upstream.example.com/x?alt=json&access_token=a%2Fb%2Bc"
        );
    }

    #[test]
    fn test_build_upstream_url_rejects_bad_input() {
        assert!(matches!(
            build_upstream_url("not a url", "t", &[]),
            Err(GatewayError::InvalidServiceUrl(_))
        ));
        assert!(matches!(
            build_upstream_url("https://example.com", "t", &[]),
            Err(GatewayError::InvalidServiceUrl(_))
        ));
    }

    #[test]
    fn test_build_upstream_url_enforces_allowlist() {
        let allowed = vec!["*.googleapis.com".to_string()];
        let url = build_upstream_url(
            "wss://us-central1-aiplatform.googleapis.com/ws/live",
            "t",
            &allowed,
        )
        .unwrap();
        assert_eq!(url.host_str(), Some("us-central1-aiplatform.googleapis.com"));

        let rejected = build_upstream_url("wss://collector.example.net/ws", "secret", &allowed);
        match rejected {
            Err(GatewayError::InvalidServiceUrl(message)) => {
                assert!(message.contains("collector.example.net"));
                assert!(!message.contains("secret"));
            }
            other => panic!("expected InvalidServiceUrl, got {other:?}"),
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl CredentialProvider for FailingProvider {
        async fn upstream_token(&self) -> CredentialResult<String> {
            Err(CredentialError::Unavailable("no token".to_string()))
        }
    }

    #[tokio::test]
    async fn test_open_upstream_credential_failure() {
        let result = open_upstream(
            Arc::new(FailingProvider),
            "wss://upstream.example.com/x".to_string(),
            Vec::new(),
            None,
        )
        .await;
        assert!(matches!(result, Err(GatewayError::CredentialFailure(_))));
    }

    #[tokio::test]
    async fn test_open_upstream_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = open_upstream(
            Arc::new(StaticTokenProvider::new("t")),
            format!("ws://127.0.0.1:{port}/x"),
            Vec::new(),
            Some(Duration::from_secs(5)),
        )
        .await;
        assert!(matches!(result, Err(GatewayError::UpstreamConnectFailure(_))));
    }

    #[tokio::test]
    async fn test_open_upstream_timeout() {
        // Accepts TCP but never answers the websocket handshake
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = tokio::spawn(async move {
            let _held = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let result = open_upstream(
            Arc::new(StaticTokenProvider::new("t")),
            format!("ws://127.0.0.1:{port}/x"),
            Vec::new(),
            Some(Duration::from_millis(100)),
        )
        .await;
        assert!(matches!(result, Err(GatewayError::UpstreamTimeout(_))));
    }

    #[tokio::test]
    async fn test_open_upstream_disallowed_host_skips_credentials() {
        // Would fail with CredentialFailure if the token were requested
        let result = open_upstream(
            Arc::new(FailingProvider),
            "wss://collector.example.net/ws".to_string(),
            vec!["*.googleapis.com".to_string()],
            None,
        )
        .await;
        assert!(matches!(result, Err(GatewayError::InvalidServiceUrl(_))));
    }
}
