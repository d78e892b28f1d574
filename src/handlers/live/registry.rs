//! Registry of live gateway connections.

use std::fmt;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

/// Per-connection lifecycle label.
///
/// `New -> QueueingOutbound -> ConnectingUpstream -> Forwarding -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    New,
    QueueingOutbound,
    ConnectingUpstream,
    Forwarding,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::New => write!(f, "new"),
            ConnectionState::QueueingOutbound => write!(f, "queueing_outbound"),
            ConnectionState::ConnectingUpstream => write!(f, "connecting_upstream"),
            ConnectionState::Forwarding => write!(f, "forwarding"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Snapshot of one connection, as published in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub state: ConnectionState,
    /// Frames waiting for the upstream socket
    pub queued: usize,
    pub opened_at: Instant,
}

/// Live connections keyed by connection id.
///
/// Each entry is written only by its own connection task; readers get
/// snapshots.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, ConnectionSummary>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update(&self, id: Uuid, state: ConnectionState, queued: usize) {
        self.connections
            .entry(id)
            .and_modify(|summary| {
                summary.state = state;
                summary.queued = queued;
            })
            .or_insert_with(|| ConnectionSummary {
                state,
                queued,
                opened_at: Instant::now(),
            });
    }

    pub(crate) fn remove(&self, id: &Uuid) {
        self.connections.remove(id);
    }

    pub fn get(&self, id: &Uuid) -> Option<ConnectionSummary> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of connections currently in `state`.
    pub fn count_in(&self, state: ConnectionState) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().state == state)
            .count()
    }
}
