//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check and configuration discovery endpoints
//! - `live` - Live relay WebSocket gateway

pub mod api;
pub mod live;

// Re-export commonly used handlers for convenient access
pub use live::live_handler;
