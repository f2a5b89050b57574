//! Per-tunnel state: the control-channel sender and in-flight requests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::Message as WsMessage;
use porthole_common::{Frame, ResponseFrame, TunnelError, current_timestamp_secs};
use tokio::sync::{Mutex, mpsc, oneshot};

/// One live tunnel: a slug bound to a control channel.
///
/// Shared between the control-channel task and concurrent visitor
/// dispatchers via `Arc`; the pending map is serialised behind a mutex,
/// and all channel writes funnel through one mpsc consumer so frames
/// never interleave.
#[derive(Debug)]
pub struct Tunnel {
    pub tunnel_id: String,
    pub slug: String,
    pub local_port: u16,
    connected_at: Instant,
    connected_at_epoch: i64,
    control_tx: mpsc::Sender<WsMessage>,
    request_count: AtomicU64,
    pending: Mutex<HashMap<String, oneshot::Sender<ResponseFrame>>>,
}

impl Tunnel {
    pub fn new(
        tunnel_id: String,
        slug: String,
        local_port: u16,
        control_tx: mpsc::Sender<WsMessage>,
    ) -> Self {
        Self {
            tunnel_id,
            slug,
            local_port,
            connected_at: Instant::now(),
            connected_at_epoch: current_timestamp_secs(),
            control_tx,
            request_count: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the control channel can still accept frames
    pub fn is_writable(&self) -> bool {
        !self.control_tx.is_closed()
    }

    /// Serialise and queue a frame for the channel writer
    pub async fn send(&self, frame: &Frame) -> Result<(), TunnelError> {
        let json = serde_json::to_string(frame)?;
        self.control_tx
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|_| TunnelError::ConnectionError("control channel closed".to_string()))
    }

    /// Queue a normal close for the channel writer (relay shutdown)
    pub async fn close(&self) {
        let _ = self.control_tx.send(WsMessage::Close(None)).await;
    }

    /// Register an in-flight request and return its completion sink
    pub async fn track(&self, request_id: &str) -> oneshot::Receiver<ResponseFrame> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.to_string(), tx);
        rx
    }

    /// Complete a pending request with its response frame.
    /// Returns false when the request is unknown (timed out or abandoned).
    pub async fn resolve(&self, response: ResponseFrame) -> bool {
        let sink = self.pending.lock().await.remove(&response.request_id);
        match sink {
            Some(sink) => sink.send(response).is_ok(),
            None => false,
        }
    }

    /// Drop a pending request without completing it (deadline fired or
    /// the frame could not be sent). Returns whether it was still tracked.
    pub async fn abandon(&self, request_id: &str) -> bool {
        self.pending.lock().await.remove(request_id).is_some()
    }

    /// Fail every in-flight request by dropping its completion sink.
    /// Called once at teardown; returns how many were failed.
    pub async fn fail_pending(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        pending.clear();
        count
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Count an accepted visitor request
    pub fn note_request(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn connected_at_epoch(&self) -> i64 {
        self.connected_at_epoch
    }
}
