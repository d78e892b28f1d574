//! Voice session: the live client wired to the audio pipelines.
//!
//! - setup complete starts microphone capture
//! - model audio is queued on the player
//! - an interruption flushes the player (barge-in)
//! - transcription fragments are merged into a running transcript
//! - closing the session stops capture and releases the output device

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::audio::{
    AudioCapture, AudioChunkSink, AudioError, AudioPlayer, AudioResult, CaptureBackend,
    PlaybackBackend,
};
use super::live::{
    CloseReason, FunctionCall, FunctionResponse, LiveError, LiveEventHandler, LiveResult,
    LiveSessionClient, SessionConfig, TranscriptRole, function_calls,
};

/// Answers function calls issued by the model.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Produce the `response` object for one call.
    async fn call(&self, call: &FunctionCall) -> Value;
}

/// Coarse session phase for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoicePhase {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VoiceStatus {
    pub phase: VoicePhase,
    /// Model audio is playing
    pub speaking: bool,
    /// Microphone or speaker could not be opened
    pub text_only: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub text: String,
}

/// Capture sink that resolves the client once it exists.
#[derive(Default)]
struct ClientLink {
    client: OnceLock<Weak<LiveSessionClient>>,
}

impl ClientLink {
    fn get(&self) -> Option<Arc<LiveSessionClient>> {
        self.client.get().and_then(Weak::upgrade)
    }
}

#[async_trait]
impl AudioChunkSink for ClientLink {
    fn is_open(&self) -> bool {
        self.get().is_some_and(|client| client.is_open())
    }

    async fn send_audio_chunk(&self, chunk: String) -> AudioResult<()> {
        match self.get() {
            Some(client) => client.send_audio_chunk(chunk).await,
            None => Err(AudioError::Transport("session client dropped".to_string())),
        }
    }
}

// =============================================================================
// Event handling
// =============================================================================

struct VoiceHandler {
    player: AudioPlayer,
    capture: Mutex<AudioCapture>,
    input_device: RwLock<Option<String>>,
    status: RwLock<VoiceStatus>,
    transcript: RwLock<Vec<TranscriptEntry>>,
    tools: RwLock<Option<Arc<dyn ToolHandler>>>,
    link: Arc<ClientLink>,
}

impl VoiceHandler {
    fn record_error(&self, message: String) {
        self.status.write().last_error = Some(message);
    }

    fn append_transcript(&self, role: TranscriptRole, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut transcript = self.transcript.write();
        match transcript.last_mut() {
            Some(last) if last.role == role => last.text.push_str(text),
            _ => transcript.push(TranscriptEntry {
                role,
                text: text.to_string(),
            }),
        }
    }

    fn release_devices(&self) {
        self.capture.lock().stop();
        self.player.destroy();
    }
}

#[async_trait]
impl LiveEventHandler for VoiceHandler {
    async fn on_setup_complete(&self) {
        self.status.write().phase = VoicePhase::Connected;

        let device = self.input_device.read().clone();
        let started = self.capture.lock().start(device.as_deref());
        if let Err(e) = started {
            warn!("Microphone unavailable, continuing text-only: {}", e);
            let mut status = self.status.write();
            status.text_only = true;
            status.last_error = Some(e.to_string());
        }
    }

    async fn on_audio(&self, data: String) {
        self.status.write().speaking = true;
        if let Err(e) = self.player.play(&data) {
            debug!("Dropping model audio: {}", e);
        }
    }

    async fn on_text(&self, text: String) {
        self.append_transcript(TranscriptRole::Agent, &text);
    }

    async fn on_transcription(&self, role: TranscriptRole, text: String, _finished: bool) {
        self.append_transcript(role, &text);
    }

    async fn on_tool_call(&self, payload: Value) {
        let Some(tools) = self.tools.read().clone() else {
            debug!("Tool call received with no tool handler");
            return;
        };
        let Some(client) = self.link.get() else {
            return;
        };

        let mut responses = Vec::new();
        for call in function_calls(&payload) {
            let response = tools.call(&call).await;
            responses.push(FunctionResponse {
                id: call.id.clone(),
                name: call.name.clone(),
                response,
            });
        }
        if responses.is_empty() {
            return;
        }
        if let Err(e) = client.send_tool_response(responses).await {
            warn!("Failed to send tool response: {}", e);
        }
    }

    async fn on_turn_complete(&self) {
        self.status.write().speaking = false;
    }

    async fn on_interrupted(&self) {
        self.status.write().speaking = false;
        self.player.interrupt();
    }

    async fn on_error(&self, error: LiveError) {
        self.record_error(error.to_string());
    }

    async fn on_close(&self, reason: CloseReason) {
        info!(%reason, "Voice session closed");
        self.release_devices();
        let mut status = self.status.write();
        status.phase = VoicePhase::Disconnected;
        status.speaking = false;
    }
}

// =============================================================================
// Voice Session
// =============================================================================

/// One conversation: a live session client plus capture and playback.
pub struct VoiceSession {
    client: Arc<LiveSessionClient>,
    handler: Arc<VoiceHandler>,
}

impl VoiceSession {
    pub fn new(
        gateway_url: impl Into<String>,
        service_url: impl Into<String>,
        config: SessionConfig,
        capture_backend: Box<dyn CaptureBackend>,
        playback_backend: Box<dyn PlaybackBackend>,
    ) -> LiveResult<Self> {
        let link = Arc::new(ClientLink::default());
        let handler = Arc::new(VoiceHandler {
            player: AudioPlayer::new(playback_backend),
            capture: Mutex::new(AudioCapture::new(capture_backend, link.clone())),
            input_device: RwLock::new(None),
            status: RwLock::new(VoiceStatus::default()),
            transcript: RwLock::new(Vec::new()),
            tools: RwLock::new(None),
            link: link.clone(),
        });

        let client = Arc::new(LiveSessionClient::new(
            gateway_url,
            service_url,
            config,
            handler.clone(),
        )?);
        // Freshly created, so the slot is empty.
        let _ = link.client.set(Arc::downgrade(&client));

        Ok(Self { client, handler })
    }

    /// Capture from the named input device instead of the default.
    pub fn set_input_device(&self, device_id: Option<String>) {
        *self.handler.input_device.write() = device_id;
    }

    pub fn set_tool_handler(&self, tools: Arc<dyn ToolHandler>) {
        *self.handler.tools.write() = Some(tools);
    }

    /// Open the speaker and connect. Capture starts once setup completes.
    pub async fn start(&self) -> LiveResult<()> {
        if let Err(e) = self.handler.player.init() {
            warn!("Speaker unavailable, continuing text-only: {}", e);
            let mut status = self.handler.status.write();
            status.text_only = true;
            status.last_error = Some(e.to_string());
        }

        self.handler.status.write().phase = VoicePhase::Connecting;
        if let Err(e) = self.client.connect().await {
            self.handler.record_error(e.to_string());
            self.handler.release_devices();
            return Err(e);
        }
        Ok(())
    }

    pub async fn send_text(&self, text: &str) -> LiveResult<()> {
        self.handler.append_transcript(TranscriptRole::User, text);
        self.client.send_text(text).await
    }

    /// Disconnect and release both devices.
    pub async fn end(&self) {
        self.client.disconnect().await;
        self.handler.release_devices();
        let mut status = self.handler.status.write();
        status.phase = VoicePhase::Disconnected;
        status.speaking = false;
    }

    pub fn status(&self) -> VoiceStatus {
        self.handler.status.read().clone()
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.handler.transcript.read().clone()
    }

    pub fn client(&self) -> &Arc<LiveSessionClient> {
        &self.client
    }

    pub fn player(&self) -> &AudioPlayer {
        &self.handler.player
    }

    pub fn capture_running(&self) -> bool {
        self.handler.capture.lock().is_running()
    }
}
