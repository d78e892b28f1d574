pub mod audio;
pub mod auth;
pub mod live;
pub mod voice;

// Re-export commonly used types for convenience
pub use audio::{AudioCapture, AudioError, AudioPlayer, AudioResult};

pub use auth::{CredentialError, CredentialProvider, CredentialResult};

pub use live::{
    InboundEvent, LiveError, LiveEventHandler, LiveResult, LiveSessionClient, SessionConfig,
    SessionState,
};

pub use voice::{ToolHandler, TranscriptEntry, VoicePhase, VoiceSession, VoiceStatus};
