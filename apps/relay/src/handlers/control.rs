//! Control-channel endpoint
//!
//! Clients open a WebSocket at `/tunnel?tunnelId=&port=&subdomain=`.
//! A successful handshake registers the tunnel and answers with a
//! `connected` frame before anything else; failures answer with an
//! `error` frame and an immediate close, leaving nothing registered.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::HOST;
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use porthole_common::constants::KEEPALIVE_PERIOD_SECS;
use porthole_common::validation::parse_port;
use porthole_common::{Frame, generate_tunnel_id};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::base_url::derive_base_url;
use crate::tunnel::Tunnel;
use crate::{CONTROL_CHANNEL_BUFFER, SharedState};

#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "tunnelId")]
    tunnel_id: Option<String>,
    port: Option<String>,
    subdomain: Option<String>,
}

pub async fn tunnel_upgrade(
    State(state): State<SharedState>,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ws.on_upgrade(move |socket| handle_control_channel(socket, state, query, host))
}

async fn handle_control_channel(
    socket: WebSocket,
    state: SharedState,
    query: HandshakeQuery,
    host: Option<String>,
) {
    let local_port = match query.port.as_deref().map(parse_port) {
        Some(Ok(port)) => port,
        _ => {
            warn!("handshake rejected: missing or invalid port parameter");
            reject(socket, "Malformed handshake: a numeric `port` query parameter is required")
                .await;
            return;
        }
    };

    let tunnel_id = query
        .tunnel_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(generate_tunnel_id);

    let (control_tx, control_rx) = mpsc::channel::<WsMessage>(CONTROL_CHANNEL_BUFFER);
    let tunnel = match state
        .registry
        .register(
            tunnel_id.clone(),
            local_port,
            query.subdomain.as_deref(),
            control_tx.clone(),
        )
        .await
    {
        Ok(tunnel) => tunnel,
        Err(err) => {
            warn!(%tunnel_id, "handshake rejected: {err}");
            reject(socket, &err.to_string()).await;
            return;
        }
    };

    let slug = tunnel.slug.clone();
    info!(slug = %slug, tunnel_id = %tunnel_id, local_port, "tunnel registered");

    let base = derive_base_url(
        state.config.public_url.as_deref(),
        host.as_deref(),
        state.active_scheme,
        state.active_port,
    );
    let public_url = format!("{base}/t/{slug}");

    let (mut ws_sink, ws_stream) = socket.split();

    // The handshake ack must hit the wire before any request frame.
    // Dispatchers may already be queueing into the control channel, so
    // `connected` goes out directly on the sink before the writer
    // starts draining the queue.
    let connected = Frame::Connected {
        tunnel_id: tunnel_id.clone(),
        subdomain: slug.clone(),
        public_url: public_url.clone(),
    };
    let ack = match serde_json::to_string(&connected) {
        Ok(json) => json,
        Err(err) => {
            warn!(slug = %slug, "cannot serialise handshake ack: {err}");
            teardown(&state, &tunnel).await;
            return;
        }
    };
    if ws_sink.send(WsMessage::Text(ack.into())).await.is_err() {
        warn!(slug = %slug, "control channel closed before handshake ack");
        teardown(&state, &tunnel).await;
        return;
    }
    info!(slug = %slug, public_url = %public_url, "tunnel ready");

    let writer = tokio::spawn(write_pump(ws_sink, control_rx));

    let keepalive = tokio::spawn(keepalive_pump(control_tx.clone()));

    read_pump(ws_stream, &state, &tunnel).await;

    keepalive.abort();
    teardown(&state, &tunnel).await;
    // Let the writer flush any queued close frame, then stop it
    let _ = control_tx.send(WsMessage::Close(None)).await;
    drop(control_tx);
    let _ = tokio::time::timeout(Duration::from_secs(1), writer).await;
    info!(slug = %slug, "tunnel closed");
}

/// Consume incoming frames until the channel closes or the relay shuts
/// down. Malformed frames are logged and skipped; only transport close
/// terminates the tunnel.
async fn read_pump(mut ws_stream: SplitStream<WebSocket>, state: &SharedState, tunnel: &Tunnel) {
    let mut shutdown = state.shutdown_signal();

    loop {
        tokio::select! {
            message = ws_stream.next() => match message {
                Some(Ok(WsMessage::Text(text))) => handle_frame(tunnel, &text).await,
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(WsMessage::Binary(_))) => {
                    warn!(slug = %tunnel.slug, "unexpected binary frame dropped");
                }
                Some(Ok(_)) => {} // transport ping/pong
                Some(Err(err)) => {
                    warn!(slug = %tunnel.slug, "control channel error: {err}");
                    break;
                }
            },
            _ = shutdown.changed() => {
                info!(slug = %tunnel.slug, "closing control channel for shutdown");
                tunnel.close().await;
                break;
            }
        }
    }
}

async fn handle_frame(tunnel: &Tunnel, text: &str) {
    match serde_json::from_str::<Frame>(text) {
        Ok(Frame::Response(response)) => {
            let request_id = response.request_id.clone();
            if !tunnel.resolve(response).await {
                // Deadline fired or the visitor went away; drop silently
                debug!(slug = %tunnel.slug, request_id, "response for unknown request dropped");
            }
        }
        Ok(Frame::Pong) => debug!(slug = %tunnel.slug, "pong received"),
        Ok(Frame::Ping) => {
            let _ = tunnel.send(&Frame::Pong).await;
        }
        Ok(other) => {
            warn!(slug = %tunnel.slug, "unexpected frame dropped: {other:?}");
        }
        Err(err) => {
            warn!(slug = %tunnel.slug, "malformed frame skipped: {err}");
        }
    }
}

/// Single consumer of the control channel; serialises all writes so
/// concurrent frame sends never interleave on the socket.
async fn write_pump(
    mut ws_sink: SplitSink<WebSocket, WsMessage>,
    mut control_rx: mpsc::Receiver<WsMessage>,
) {
    while let Some(message) = control_rx.recv().await {
        let closing = matches!(message, WsMessage::Close(_));
        if ws_sink.send(message).await.is_err() || closing {
            break;
        }
    }
}

async fn keepalive_pump(control_tx: mpsc::Sender<WsMessage>) {
    let Ok(ping) = serde_json::to_string(&Frame::Ping) else {
        return;
    };
    let mut interval = tokio::time::interval(Duration::from_secs(KEEPALIVE_PERIOD_SECS));
    interval.tick().await; // immediate first tick

    loop {
        interval.tick().await;
        if control_tx
            .send(WsMessage::Text(ping.clone().into()))
            .await
            .is_err()
        {
            break;
        }
    }
}

/// Remove the tunnel from the registry and fail everything in flight.
/// Lookup misses the slug from this point on; a new handshake may take
/// it over immediately.
async fn teardown(state: &SharedState, tunnel: &Arc<Tunnel>) {
    state.registry.unregister(&tunnel.slug).await;
    let failed = tunnel.fail_pending().await;
    if failed > 0 {
        info!(slug = %tunnel.slug, failed, "failed in-flight requests on teardown");
    }
}

/// Handshake failure: `error` frame, then immediate close
async fn reject(mut socket: WebSocket, message: &str) {
    let frame = Frame::Error {
        message: message.to_string(),
    };
    if let Ok(json) = serde_json::to_string(&frame) {
        let _ = socket.send(WsMessage::Text(json.into())).await;
    }
    let _ = socket.send(WsMessage::Close(None)).await;
}
