//! Live relay gateway
//!
//! Each client connection gets its own task and [`ConnectionRecord`]. Nothing
//! is shared between connections except the credential provider and the
//! [`ConnectionRegistry`] snapshots.

mod connection;
mod handler;
mod registry;
mod upstream;

pub use connection::{ClientFrameAction, ConnectionRecord, OutboundFrame};
pub use handler::live_handler;
pub use registry::{ConnectionRegistry, ConnectionState, ConnectionSummary};
pub use upstream::{
    GatewayError, GatewayResult, UpstreamSocket, build_upstream_url, open_upstream,
    validate_service_url,
};
