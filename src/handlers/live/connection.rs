//! Per-connection relay state.
//!
//! The record is owned by its connection task and never shared; the registry
//! only sees snapshots.

use std::collections::VecDeque;

use bytes::Bytes;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tracing::debug;
use uuid::Uuid;

use super::registry::{ConnectionRegistry, ConnectionState, ConnectionSummary};
use crate::core::live::RoutingDirective;

/// A client frame on its way upstream. Frame kind is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Bytes),
}

impl OutboundFrame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            OutboundFrame::Text(text) => text.as_bytes(),
            OutboundFrame::Binary(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<OutboundFrame> for UpstreamMessage {
    fn from(frame: OutboundFrame) -> Self {
        match frame {
            OutboundFrame::Text(text) => UpstreamMessage::Text(text.into()),
            OutboundFrame::Binary(data) => UpstreamMessage::Binary(data),
        }
    }
}

/// What the connection task should do with a client frame.
#[derive(Debug, PartialEq, Eq)]
pub enum ClientFrameAction {
    /// First routing directive: start opening the upstream socket
    OpenUpstream { service_url: String },
    /// Upstream is open: send the frame now
    Forward(OutboundFrame),
    /// Held until the upstream socket opens
    Queued,
}

/// Relay state for one client connection.
#[derive(Debug)]
pub struct ConnectionRecord {
    id: Uuid,
    state: ConnectionState,
    queue: VecDeque<OutboundFrame>,
    upstream_requested: bool,
    upstream_open: bool,
    forward_routing_directive: bool,
}

impl ConnectionRecord {
    pub fn new(id: Uuid, forward_routing_directive: bool) -> Self {
        Self {
            id,
            state: ConnectionState::New,
            queue: VecDeque::new(),
            upstream_requested: false,
            upstream_open: false,
            forward_routing_directive,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_upstream_requested(&self) -> bool {
        self.upstream_requested
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!(connection_id = %self.id, from = %self.state, to = %next, "Connection state change");
            self.state = next;
        }
    }

    /// Route one frame received from the client.
    ///
    /// The first routing directive triggers the upstream open; later ones are
    /// ordinary payload. Every frame that cannot be sent yet is queued in
    /// arrival order.
    pub fn accept_client_frame(&mut self, frame: OutboundFrame) -> ClientFrameAction {
        if !self.upstream_requested
            && let Some(service_url) = RoutingDirective::detect(frame.as_bytes())
        {
            self.upstream_requested = true;
            if self.forward_routing_directive {
                self.queue.push_back(frame);
            }
            self.transition(ConnectionState::ConnectingUpstream);
            return ClientFrameAction::OpenUpstream { service_url };
        }

        if self.upstream_open {
            return ClientFrameAction::Forward(frame);
        }

        self.queue.push_back(frame);
        if self.state == ConnectionState::New {
            self.transition(ConnectionState::QueueingOutbound);
        }
        ClientFrameAction::Queued
    }

    /// Upstream socket is open: hand back the queue in arrival order and
    /// switch to forwarding.
    pub fn upstream_opened(&mut self) -> Vec<OutboundFrame> {
        self.upstream_open = true;
        self.transition(ConnectionState::Forwarding);
        self.queue.drain(..).collect()
    }

    /// Upstream socket went away while the client is still attached.
    pub fn upstream_lost(&mut self) {
        self.upstream_open = false;
    }

    pub fn close(&mut self) {
        self.upstream_open = false;
        self.queue.clear();
        self.transition(ConnectionState::Closed);
    }

    pub fn publish(&self, registry: &ConnectionRegistry) {
        registry.update(self.id, self.state, self.queue.len());
    }

    pub fn summary(&self, registry: &ConnectionRegistry) -> Option<ConnectionSummary> {
        registry.get(&self.id)
    }
}
