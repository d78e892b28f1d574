//! Live relay WebSocket handler
//!
//! One task per client connection drives three event sources in a single
//! `select!` loop: client frames, the pending upstream open and upstream
//! frames. Client frames are queued until the upstream socket is open, then
//! drained in arrival order before anything else is forwarded.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::future::OptionFuture;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::select;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::connection::{ClientFrameAction, ConnectionRecord, OutboundFrame};
use super::upstream::{GatewayResult, UpstreamSocket, open_upstream};
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

type PendingUpstream = Pin<Box<dyn Future<Output = GatewayResult<UpstreamSocket>> + Send>>;
type UpstreamSink = SplitSink<UpstreamSocket, UpstreamMessage>;
type UpstreamStream = SplitStream<UpstreamSocket>;

/// Live relay WebSocket handler
///
/// Upgrades the HTTP connection and relays it to the upstream live service
/// named by the client's routing directive.
pub async fn live_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    debug!("Live WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_live_socket(socket, state))
}

/// Why the relay loop ended.
#[derive(Debug)]
enum CloseCause {
    Client,
    Upstream,
    Failed,
}

/// Upstream frame as relayed to the client. Binary frames holding valid UTF-8
/// are relayed as text so the browser can parse them as JSON.
fn to_client_message(message: UpstreamMessage) -> Option<Message> {
    match message {
        UpstreamMessage::Text(text) => Some(Message::Text(text.as_str().into())),
        UpstreamMessage::Binary(data) => match std::str::from_utf8(&data) {
            Ok(text) => Some(Message::Text(text.into())),
            Err(_) => Some(Message::Binary(data)),
        },
        _ => None,
    }
}

/// Handle one relayed connection until either side closes.
async fn handle_live_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    let mut record =
        ConnectionRecord::new(connection_id, app_state.config.forward_routing_directive);
    record.publish(&app_state.connections);
    info!(%connection_id, "Live WebSocket connection established");

    let (mut client_tx, mut client_rx) = socket.split();
    let mut pending: Option<PendingUpstream> = None;
    let mut upstream_tx: Option<UpstreamSink> = None;
    let mut upstream_rx: Option<UpstreamStream> = None;

    let cause = loop {
        select! {
            msg_result = client_rx.next() => {
                let frame = match msg_result {
                    Some(Ok(Message::Text(text))) => OutboundFrame::Text(text.as_str().to_owned()),
                    Some(Ok(Message::Binary(data))) => OutboundFrame::Binary(data),
                    Some(Ok(Message::Close(_))) | None => break CloseCause::Client,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(%connection_id, "Client socket error: {}", e);
                        break CloseCause::Client;
                    }
                };

                match record.accept_client_frame(frame) {
                    ClientFrameAction::OpenUpstream { service_url } => {
                        info!(%connection_id, %service_url, "Routing directive received, opening upstream");
                        pending = Some(Box::pin(open_upstream(
                            app_state.credentials.clone(),
                            service_url,
                            app_state.config.upstream_allowed_hosts.clone(),
                            app_state.config.upstream_connect_timeout(),
                        )));
                    }
                    ClientFrameAction::Forward(frame) => {
                        let bytes = frame.len();
                        if let Some(tx) = upstream_tx.as_mut()
                            && let Err(e) = tx.send(frame.into()).await
                        {
                            warn!(%connection_id, bytes, "Failed to forward frame upstream: {}", e);
                            break CloseCause::Upstream;
                        }
                    }
                    ClientFrameAction::Queued => {
                        debug!(%connection_id, queued = record.queued(), "Frame queued");
                    }
                }
                record.publish(&app_state.connections);
            }

            Some(opened) = OptionFuture::from(pending.as_mut()), if pending.is_some() => {
                pending = None;
                match opened {
                    Ok(socket) => {
                        let (mut tx, rx) = socket.split();
                        let queued = record.upstream_opened();
                        info!(%connection_id, queued = queued.len(), "Upstream connected, draining queue");

                        let mut drained = true;
                        for frame in queued {
                            if let Err(e) = tx.send(frame.into()).await {
                                warn!(%connection_id, "Failed to drain queue upstream: {}", e);
                                drained = false;
                                break;
                            }
                        }
                        upstream_tx = Some(tx);
                        upstream_rx = Some(rx);
                        record.publish(&app_state.connections);
                        if !drained {
                            break CloseCause::Upstream;
                        }
                    }
                    Err(e) => {
                        error!(%connection_id, "Upstream open failed: {}", e);
                        break CloseCause::Failed;
                    }
                }
            }

            Some(upstream_msg) = OptionFuture::from(upstream_rx.as_mut().map(|rx| rx.next())), if upstream_rx.is_some() => {
                match upstream_msg {
                    Some(Ok(UpstreamMessage::Close(frame))) => {
                        info!(%connection_id, ?frame, "Upstream closed");
                        break CloseCause::Upstream;
                    }
                    Some(Ok(message)) => {
                        if let Some(message) = to_client_message(message)
                            && let Err(e) = client_tx.send(message).await
                        {
                            debug!(%connection_id, "Client gone, dropping upstream frame: {}", e);
                            break CloseCause::Client;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(%connection_id, "Upstream socket error: {}", e);
                        record.upstream_lost();
                        break CloseCause::Upstream;
                    }
                    None => {
                        record.upstream_lost();
                        break CloseCause::Upstream;
                    }
                }
            }
        }
    };

    // Closing either side closes the other.
    if let Some(pending) = pending.take() {
        debug!(%connection_id, "Client left while upstream was opening, reaping");
        tokio::spawn(async move {
            if let Ok(mut socket) = pending.await {
                let _ = socket.close(None).await;
            }
        });
    }
    if let Some(mut tx) = upstream_tx.take() {
        let _ = tx.close().await;
    }
    if !matches!(cause, CloseCause::Client) {
        let _ = client_tx.send(Message::Close(None)).await;
    }
    let _ = client_tx.close().await;

    record.close();
    app_state.connections.remove(&connection_id);
    info!(%connection_id, ?cause, "Live WebSocket connection closed");
}
