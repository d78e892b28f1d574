//! Live Session Protocol client.
//!
//! Speaks the bidirectional live protocol through the relay gateway:
//!
//! 1. routing directive `{"service_url": ...}` (consumed by the gateway)
//! 2. `setup` frame built from a [`SessionConfig`]
//! 3. streaming `realtime_input` audio, `client_content` text turns and
//!    `tool_response` answers
//!
//! Inbound frames are classified into [`InboundEvent`]s and delivered to a
//! [`LiveEventHandler`].

mod base;
pub mod client;
pub mod config;
pub mod discovery;
pub mod messages;

pub use base::{
    CloseReason, LiveError, LiveEventHandler, LiveResult, SessionState, TranscriptRole,
};
pub use client::LiveSessionClient;
pub use config::{
    ActivityDetection, ActivityHandling, DEFAULT_LOCATION, DEFAULT_VOICE, EndSensitivity,
    FunctionDeclaration, ResponseModality, SessionConfig, StartSensitivity, model_uri,
    service_url,
};
pub use discovery::{DiscoveredConfig, fetch_discovery};
pub use messages::{
    ClientMessage, FunctionCall, FunctionResponse, InboundEvent, RoutingDirective, function_calls,
};
