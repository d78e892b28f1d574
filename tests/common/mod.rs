//! Shared test infrastructure
//!
//! - [`MockUpstream`]: a scripted stand-in for the hosted live service
//! - [`spawn_gateway`]: the full router served on an ephemeral port

// Not every test binary uses every helper
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use live_gateway::core::CredentialProvider;
use live_gateway::core::auth::StaticTokenProvider;
use live_gateway::{AppState, ServerConfig, routes};

/// Token every test gateway hands upstream.
pub const TEST_TOKEN: &str = "test-token";

/// How the mock upstream treats each connection.
#[derive(Clone, Default)]
pub struct UpstreamBehavior {
    /// Wait this long before completing the websocket handshake
    pub accept_delay: Duration,
    /// Frames sent right after the handshake
    pub greeting: Vec<Message>,
    /// Close the connection after the greeting
    pub close_after_greeting: bool,
    /// Answer a `setup` frame with `setupComplete` followed by these frames
    pub after_setup: Option<Vec<Message>>,
}

impl UpstreamBehavior {
    /// Complete setup, then send `frames`.
    pub fn session(frames: Vec<Value>) -> Self {
        Self {
            after_setup: Some(frames.into_iter().map(json_message).collect()),
            ..Default::default()
        }
    }
}

/// Text frame holding `value`.
pub fn json_message(value: Value) -> Message {
    Message::Text(value.to_string().into())
}

/// Scripted upstream live service.
pub struct MockUpstream {
    pub addr: SocketAddr,
    /// Request URI (path and query) of every accepted connection
    pub uris: Arc<Mutex<Vec<String>>>,
    /// Data frames received, across all connections, in arrival order
    pub frames: Arc<Mutex<Vec<Message>>>,
    pub connections: Arc<AtomicUsize>,
    /// Connections whose read side has ended
    pub closed: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub async fn start(behavior: UpstreamBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mock = Self {
            addr,
            uris: Arc::new(Mutex::new(Vec::new())),
            frames: Arc::new(Mutex::new(Vec::new())),
            connections: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        };

        let uris = mock.uris.clone();
        let frames = mock.frames.clone();
        let connections = mock.connections.clone();
        let closed = mock.closed.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handle_connection(
                    stream,
                    behavior.clone(),
                    uris.clone(),
                    frames.clone(),
                    closed.clone(),
                ));
            }
        });

        mock
    }

    /// Service URL a routing directive should name to reach this mock.
    pub fn service_url(&self) -> String {
        format!("ws://{}/ws/live", self.addr)
    }

    /// Received frames as text; binary frames are rendered lossily.
    pub fn texts(&self) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .map(|message| match message {
                Message::Text(text) => text.as_str().to_string(),
                Message::Binary(data) => String::from_utf8_lossy(data).into_owned(),
                other => format!("{other:?}"),
            })
            .collect()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }
}

async fn handle_connection(
    stream: TcpStream,
    behavior: UpstreamBehavior,
    uris: Arc<Mutex<Vec<String>>>,
    frames: Arc<Mutex<Vec<Message>>>,
    closed: Arc<AtomicUsize>,
) {
    tokio::time::sleep(behavior.accept_delay).await;

    let record_uri = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        uris.lock().push(request.uri().to_string());
        Ok(response)
    };
    let Ok(ws_stream) = accept_hdr_async(stream, record_uri).await else {
        closed.fetch_add(1, Ordering::SeqCst);
        return;
    };
    let (mut write, mut read) = ws_stream.split();

    for message in behavior.greeting.iter().cloned() {
        if write.send(message).await.is_err() {
            break;
        }
    }
    if behavior.close_after_greeting {
        let _ = write.send(Message::Close(None)).await;
        closed.fetch_add(1, Ordering::SeqCst);
        return;
    }

    while let Some(Ok(message)) = read.next().await {
        match message {
            Message::Text(_) | Message::Binary(_) => {}
            Message::Close(_) => break,
            _ => continue,
        }

        let is_setup = serde_json::from_slice::<Value>(&message.clone().into_data())
            .ok()
            .is_some_and(|value| value.get("setup").is_some());
        frames.lock().push(message);

        if is_setup && let Some(replies) = &behavior.after_setup {
            let _ = write
                .send(json_message(json!({ "setupComplete": {} })))
                .await;
            for reply in replies.iter().cloned() {
                let _ = write.send(reply).await;
            }
        }
    }

    closed.fetch_add(1, Ordering::SeqCst);
}

/// Gateway configuration for tests: loopback, static token.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.upstream_access_token = Some(TEST_TOKEN.to_string());
    config.google_project_id = Some("test-project".to_string());
    config
}

/// Serve the full router on an ephemeral port.
pub async fn spawn_gateway(config: ServerConfig) -> (SocketAddr, Arc<AppState>) {
    spawn_gateway_with(config, Arc::new(StaticTokenProvider::new(TEST_TOKEN))).await
}

pub async fn spawn_gateway_with(
    config: ServerConfig,
    credentials: Arc<dyn CredentialProvider>,
) -> (SocketAddr, Arc<AppState>) {
    let state = AppState::with_credentials(config, credentials);
    let app = routes::create_app(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Live endpoint URL of a gateway spawned with the default path.
pub fn live_url(addr: SocketAddr) -> String {
    format!("ws://{addr}/ws/gemini-live")
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
