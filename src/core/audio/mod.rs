//! Client-side audio pipelines.
//!
//! - [`capture`]: microphone blocks -> PCM16 -> base64 -> session client
//! - [`playback`]: base64 PCM16 from the session -> gapless, interruptible output
//! - [`resample`]: device rate conversion, sinc with `high-quality-audio`
//!
//! Device access sits behind [`CaptureBackend`] and [`PlaybackBackend`] so the
//! pipelines run the same against cpal devices (`native-audio` feature) or
//! in-memory backends.

pub mod capture;
pub mod pcm;
pub mod playback;
pub mod resample;

#[cfg(feature = "native-audio")]
pub mod native;

use thiserror::Error;

pub use capture::{
    AudioCapture, AudioChunkSink, CaptureBackend, CaptureConstraints, CaptureFeed, CaptureStats,
    ChannelCaptureBackend,
};
pub use pcm::{CAPTURE_SAMPLE_RATE, PCM_MIME_TYPE, PLAYBACK_SAMPLE_RATE};
pub use playback::{AudioPlayer, PlaybackBackend, PlaybackBuffer, PullPlaybackBackend};
pub use resample::StreamResampler;

#[cfg(feature = "native-audio")]
pub use native::{CpalCaptureBackend, CpalPlaybackBackend};

/// Errors raised by the audio pipelines.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Permission denied, no device, or no device matching the requested id
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Player used before `init()` or after `destroy()`
    #[error("Audio player not initialized")]
    NotInitialized,

    /// Payload could not be decoded as PCM16
    #[error("Invalid audio frame: {0}")]
    InvalidFrame(String),

    /// Device-level failure after the stream was opened
    #[error("Audio backend error: {0}")]
    Backend(String),

    /// Chunk could not be handed to the session transport
    #[error("Audio transport error: {0}")]
    Transport(String),
}

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;
