//! Live session client.
//!
//! Connects to the relay gateway, performs the routing + setup handshake and
//! turns inbound frames into [`LiveEventHandler`] calls.
//!
//! # Example
//!
//! ```rust,ignore
//! use live_gateway::core::live::{LiveSessionClient, SessionConfig, service_url};
//! use std::sync::Arc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::base::{
    CloseReason, LiveError, LiveEventHandler, LiveResult, SessionState, TranscriptRole,
};
use super::config::SessionConfig;
use super::messages::{ClientMessage, FunctionResponse, InboundEvent, RoutingDirective};
use crate::core::audio::{AudioChunkSink, AudioError, AudioResult};

/// Channel capacity for outbound frames.
const WS_CHANNEL_CAPACITY: usize = 256;

/// How long `disconnect()` waits for the close frame to go out.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

// =============================================================================
// Shared session state
// =============================================================================

/// Work item for the callback dispatcher.
enum Dispatch {
    Event(InboundEvent),
    /// Always the last item; fires `on_close`
    Closed(CloseReason),
}

/// State shared between the client handle, its socket task and its
/// dispatcher task.
///
/// The socket task never awaits handler code: it classifies frames and
/// queues them for the dispatcher, so handlers are free to send on the
/// same session.
struct SessionShared {
    state: RwLock<SessionState>,
    connected: AtomicBool,
    /// Set once `on_close` has fired or callbacks were suppressed
    close_notified: AtomicBool,
    handler: Arc<dyn LiveEventHandler>,
    /// Only ever locked to clone or take the sender, never across an await
    ws_sender: Mutex<Option<mpsc::Sender<Message>>>,
    audio_bytes_sent: AtomicU64,
}

impl SessionShared {
    fn callbacks_suppressed(&self) -> bool {
        self.close_notified.load(Ordering::SeqCst)
    }

    fn sender(&self) -> Option<mpsc::Sender<Message>> {
        if !self.connected.load(Ordering::SeqCst) {
            return None;
        }
        self.ws_sender.lock().clone()
    }

    fn mark_closed(&self) {
        *self.state.write() = SessionState::Closed;
        self.connected.store(false, Ordering::SeqCst);
        self.ws_sender.lock().take();
    }

    async fn notify_close(&self, reason: CloseReason) {
        if !self.close_notified.swap(true, Ordering::SeqCst) {
            info!(%reason, "Live session closed");
            self.handler.on_close(reason).await;
        }
    }

    fn classify(&self, frame: &[u8]) -> InboundEvent {
        let event = InboundEvent::from_frame(frame);
        if matches!(event, InboundEvent::SetupComplete) {
            let mut state = self.state.write();
            if *state == SessionState::AwaitingSetup {
                *state = SessionState::Active;
            }
        }
        event
    }

    async fn run_dispatcher(&self, mut events: mpsc::UnboundedReceiver<Dispatch>) {
        while let Some(item) = events.recv().await {
            match item {
                Dispatch::Event(event) => self.dispatch(event).await,
                Dispatch::Closed(reason) => {
                    self.notify_close(reason).await;
                    break;
                }
            }
        }
    }

    async fn dispatch(&self, event: InboundEvent) {
        if self.callbacks_suppressed() {
            return;
        }
        let handler = &self.handler;
        match event {
            InboundEvent::SetupComplete => {
                info!("Live session setup complete");
                handler.on_setup_complete().await;
            }
            InboundEvent::TurnComplete => handler.on_turn_complete().await,
            InboundEvent::Interrupted => {
                debug!("Model output interrupted");
                handler.on_interrupted().await;
            }
            InboundEvent::InputTranscription { text, finished } => {
                handler
                    .on_transcription(TranscriptRole::User, text, finished)
                    .await
            }
            InboundEvent::OutputTranscription { text, finished } => {
                handler
                    .on_transcription(TranscriptRole::Agent, text, finished)
                    .await
            }
            InboundEvent::ToolCall(payload) => handler.on_tool_call(payload).await,
            InboundEvent::Text(text) => handler.on_text(text).await,
            InboundEvent::Audio(data) => handler.on_audio(data).await,
            InboundEvent::Error(payload) => {
                warn!(error = %payload, "Upstream reported an error");
                handler
                    .on_error(LiveError::ProtocolError(payload.to_string()))
                    .await;
            }
            InboundEvent::Unclassified => trace!("Dropping unclassified frame"),
        }
    }
}

// =============================================================================
// Live Session Client
// =============================================================================

/// Client for one live session through the relay gateway.
///
/// A client is single use: once it reaches [`SessionState::Closed`] a new
/// client must be created. All methods take `&self` so the client can be
/// shared behind an `Arc` with the capture pipeline.
///
/// Handler callbacks run one at a time, in arrival order, on a task separate
/// from the socket. A slow callback delays later callbacks but never the
/// transport.
pub struct LiveSessionClient {
    gateway_url: String,
    service_url: String,
    config: Arc<SessionConfig>,
    shared: Arc<SessionShared>,
    connection_handle: Mutex<Option<JoinHandle<()>>>,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
}

impl LiveSessionClient {
    /// Create a client. `gateway_url` must be a `ws://` or `wss://` URL.
    pub fn new(
        gateway_url: impl Into<String>,
        service_url: impl Into<String>,
        config: SessionConfig,
        handler: Arc<dyn LiveEventHandler>,
    ) -> LiveResult<Self> {
        let gateway_url = gateway_url.into();
        let parsed = Url::parse(&gateway_url)
            .map_err(|e| LiveError::InvalidConfiguration(format!("gateway url: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(LiveError::InvalidConfiguration(format!(
                "gateway url must use ws or wss, got {}",
                parsed.scheme()
            )));
        }

        Ok(Self {
            gateway_url,
            service_url: service_url.into(),
            config: Arc::new(config),
            shared: Arc::new(SessionShared {
                state: RwLock::new(SessionState::Idle),
                connected: AtomicBool::new(false),
                close_notified: AtomicBool::new(false),
                handler,
                ws_sender: Mutex::new(None),
                audio_bytes_sent: AtomicU64::new(0),
            }),
            connection_handle: Mutex::new(None),
            dispatch_handle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Total base64 audio payload bytes handed to the transport.
    pub fn bytes_sent(&self) -> u64 {
        self.shared.audio_bytes_sent.load(Ordering::Relaxed)
    }

    async fn fail(&self, reason: CloseReason) {
        self.shared.mark_closed();
        self.shared.notify_close(reason).await;
    }

    /// Open the transport and send the routing directive followed by the
    /// setup frame. Returns once both frames are written; setup completion is
    /// reported through [`LiveEventHandler::on_setup_complete`].
    pub async fn connect(&self) -> LiveResult<()> {
        {
            let mut state = self.shared.state.write();
            if *state != SessionState::Idle {
                return Err(LiveError::InvalidState(format!(
                    "connect called in state {state}"
                )));
            }
            *state = SessionState::Connecting;
        }

        let directive = serde_json::to_string(&RoutingDirective::new(self.service_url.clone()))
            .map_err(|e| LiveError::SerializationError(e.to_string()))?;
        let setup = serde_json::to_string(&ClientMessage::setup(&self.config))
            .map_err(|e| LiveError::SerializationError(e.to_string()))?;

        let ws_stream = match tokio_tungstenite::connect_async(self.gateway_url.as_str()).await {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                warn!(url = %self.gateway_url, error = %e, "Failed to connect to gateway");
                self.fail(CloseReason::ConnectFailed(e.to_string())).await;
                return Err(LiveError::ConnectionFailed(e.to_string()));
            }
        };

        info!(url = %self.gateway_url, "Connected to gateway");
        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        for frame in [directive, setup] {
            if let Err(e) = ws_sink.send(Message::Text(frame.into())).await {
                self.fail(CloseReason::TransportError(e.to_string())).await;
                return Err(LiveError::TransportClosed(e.to_string()));
            }
        }

        let (tx, mut rx) = mpsc::channel::<Message>(WS_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel::<Dispatch>();
        *self.shared.ws_sender.lock() = Some(tx);
        self.shared.connected.store(true, Ordering::SeqCst);
        *self.shared.state.write() = SessionState::AwaitingSetup;

        let shared = self.shared.clone();
        let dispatch_handle = tokio::spawn(async move {
            shared.run_dispatcher(event_rx).await;
        });

        let shared = self.shared.clone();
        let connection_handle = tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    outgoing = rx.recv() => match outgoing {
                        Some(message) => {
                            if let Err(e) = ws_sink.send(message).await {
                                break CloseReason::TransportError(e.to_string());
                            }
                        }
                        None => {
                            // Sender dropped by disconnect()
                            let _ = ws_sink.send(Message::Close(None)).await;
                            break CloseReason::Remote { code: None, reason: "client disconnect".to_string() };
                        }
                    },
                    incoming = ws_stream.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            let _ = event_tx.send(Dispatch::Event(shared.classify(text.as_bytes())));
                        }
                        Some(Ok(Message::Binary(data))) => {
                            let _ = event_tx.send(Dispatch::Event(shared.classify(&data)));
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break match frame {
                                Some(frame) => CloseReason::Remote {
                                    code: Some(u16::from(frame.code)),
                                    reason: frame.reason.as_str().to_string(),
                                },
                                None => CloseReason::Remote { code: None, reason: String::new() },
                            };
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                break CloseReason::TransportError(e.to_string());
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break CloseReason::TransportError(e.to_string()),
                        None => break CloseReason::Remote { code: None, reason: String::new() },
                    },
                }
            };
            drop(rx);
            shared.mark_closed();
            let _ = event_tx.send(Dispatch::Closed(reason));
        });

        *self.dispatch_handle.lock() = Some(dispatch_handle);
        *self.connection_handle.lock() = Some(connection_handle);
        Ok(())
    }

    async fn send_message(&self, message: &ClientMessage) -> LiveResult<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| LiveError::SerializationError(e.to_string()))?;

        let Some(tx) = self.shared.sender() else {
            return Err(LiveError::NotConnected);
        };
        tx.send(Message::Text(json.into()))
            .await
            .map_err(|e| LiveError::TransportClosed(e.to_string()))
    }

    /// Stream one base64 PCM16 chunk at the capture rate.
    pub async fn send_audio_message(&self, base64_pcm: &str) -> LiveResult<()> {
        self.send_message(&ClientMessage::audio(base64_pcm)).await?;
        self.shared
            .audio_bytes_sent
            .fetch_add(base64_pcm.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Send a complete user text turn.
    pub async fn send_text(&self, text: &str) -> LiveResult<()> {
        self.send_message(&ClientMessage::text(text)).await
    }

    /// Answer one or more function calls from a tool call event.
    pub async fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> LiveResult<()> {
        self.send_message(&ClientMessage::tool_response(responses))
            .await
    }

    /// Close the session. No callbacks fire afterwards. Idempotent.
    ///
    /// Safe to call while a callback is still running: the dispatcher is not
    /// awaited and drains its queue without invoking the handler.
    pub async fn disconnect(&self) {
        self.shared.close_notified.store(true, Ordering::SeqCst);
        self.shared.ws_sender.lock().take();

        let handle = self.connection_handle.lock().take();
        if let Some(mut handle) = handle
            && tokio::time::timeout(DISCONNECT_GRACE, &mut handle)
                .await
                .is_err()
        {
            handle.abort();
        }

        self.shared.mark_closed();
        debug!("Live session disconnected");
    }
}

#[async_trait]
impl AudioChunkSink for LiveSessionClient {
    fn is_open(&self) -> bool {
        self.is_connected()
    }

    async fn send_audio_chunk(&self, chunk: String) -> AudioResult<()> {
        self.send_audio_message(&chunk)
            .await
            .map_err(|e| AudioError::Transport(e.to_string()))
    }
}

impl Drop for LiveSessionClient {
    fn drop(&mut self) {
        self.shared.close_notified.store(true, Ordering::SeqCst);
        for handle in [
            self.connection_handle.get_mut().take(),
            self.dispatch_handle.get_mut().take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::live::config::service_url;

    struct NoopHandler;

    #[async_trait]
    impl LiveEventHandler for NoopHandler {}

    fn client(url: &str) -> LiveResult<LiveSessionClient> {
        LiveSessionClient::new(
            url,
            service_url("us-central1"),
            SessionConfig::new("m"),
            Arc::new(NoopHandler),
        )
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        assert!(matches!(
            client("http://localhost:3001"),
            Err(LiveError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            client("not a url"),
            Err(LiveError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let client = client("ws://127.0.0.1:9/ws").unwrap();
        assert_eq!(client.state(), SessionState::Idle);
        assert!(matches!(
            client.send_text("hi").await,
            Err(LiveError::NotConnected)
        ));
        assert!(!client.is_open());
        assert_eq!(client.bytes_sent(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_closes_session() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = client(&format!("ws://127.0.0.1:{port}/ws")).unwrap();
        let result = client.connect().await;
        assert!(matches!(result, Err(LiveError::ConnectionFailed(_))));
        assert_eq!(client.state(), SessionState::Closed);

        // Single use
        assert!(matches!(
            client.connect().await,
            Err(LiveError::InvalidState(_))
        ));
    }
}
