//! Base types for the live session client.
//!
//! # Audio Format
//!
//! Microphone audio goes up as PCM 16-bit little-endian at 16kHz; model audio
//! comes back as PCM 16-bit little-endian at 24kHz. Both travel base64 encoded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during a live session.
#[derive(Debug, Error)]
pub enum LiveError {
    /// Transport to the gateway could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation not allowed in the current session state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// No open transport
    #[error("Not connected")]
    NotConnected,

    /// Transport closed or failed while sending
    #[error("Transport closed: {0}")]
    TransportClosed(String),

    /// Upstream reported an error frame
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration discovery request failed
    #[error("Configuration discovery failed: {0}")]
    Discovery(String),
}

/// Result type for live session operations.
pub type LiveResult<T> = Result<T, LiveError>;

// =============================================================================
// Session State
// =============================================================================

/// Session lifecycle. Transitions only move forward; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    AwaitingSetup,
    Active,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::AwaitingSetup => write!(f, "awaiting_setup"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Why a session reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The transport to the gateway never opened
    ConnectFailed(String),
    /// The gateway closed the transport
    Remote { code: Option<u16>, reason: String },
    /// Read or write failure on an open transport
    TransportError(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ConnectFailed(e) => write!(f, "connect failed: {e}"),
            CloseReason::Remote { code: Some(code), reason } => {
                write!(f, "closed by remote ({code}): {reason}")
            }
            CloseReason::Remote { code: None, .. } => write!(f, "closed by remote"),
            CloseReason::TransportError(e) => write!(f, "transport error: {e}"),
        }
    }
}

/// Speaker of a transcription fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Agent,
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Agent => write!(f, "agent"),
        }
    }
}

// =============================================================================
// Event Handler
// =============================================================================

/// Consumer of session events.
///
/// Every method defaults to a no-op. `on_close` fires at most once per
/// session, and never after an explicit `disconnect()`.
#[async_trait]
pub trait LiveEventHandler: Send + Sync {
    async fn on_setup_complete(&self) {}

    /// Base64 PCM16 model audio at the playback rate.
    async fn on_audio(&self, _data: String) {}

    async fn on_text(&self, _text: String) {}

    async fn on_transcription(&self, _role: TranscriptRole, _text: String, _finished: bool) {}

    async fn on_tool_call(&self, _payload: Value) {}

    async fn on_turn_complete(&self) {}

    async fn on_interrupted(&self) {}

    /// Error frames reported by upstream. The session stays open.
    async fn on_error(&self, _error: LiveError) {}

    async fn on_close(&self, _reason: CloseReason) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Idle.to_string(), "idle");
        assert_eq!(SessionState::AwaitingSetup.to_string(), "awaiting_setup");
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[test]
    fn test_close_reason_display() {
        let reason = CloseReason::Remote {
            code: Some(1000),
            reason: "bye".to_string(),
        };
        assert_eq!(reason.to_string(), "closed by remote (1000): bye");
        assert_eq!(
            CloseReason::ConnectFailed("refused".to_string()).to_string(),
            "connect failed: refused"
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(LiveError::NotConnected.to_string(), "Not connected");
        assert_eq!(
            LiveError::ProtocolError("bad".to_string()).to_string(),
            "Protocol error: bad"
        );
    }
}
