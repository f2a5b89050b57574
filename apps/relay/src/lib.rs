//! Relay server: accepts control channels from forwarder agents and
//! exposes each one at a public `/t/<slug>/` mount.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{any, get};
use tokio::sync::watch;

pub mod base_url;
pub mod config;
pub mod handlers;
pub mod registry;
pub mod rewrite;
pub mod tunnel;

pub use config::Config;
use registry::TunnelRegistry;

/// Buffered frames per control channel before senders back-pressure
pub(crate) const CONTROL_CHANNEL_BUFFER: usize = 64;

/// State shared by every handler
pub struct RelayState {
    pub config: Config,
    pub registry: TunnelRegistry,
    pub active_scheme: &'static str,
    pub active_port: u16,
    started_at: Instant,
    shutdown_rx: watch::Receiver<bool>,
}

pub type SharedState = Arc<RelayState>;

impl RelayState {
    pub fn new(
        config: Config,
        active_scheme: &'static str,
        active_port: u16,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let registry = TunnelRegistry::new(config.max_tunnels);
        Self {
            config,
            registry,
            active_scheme,
            active_port,
            started_at: Instant::now(),
            shutdown_rx,
        }
    }

    /// A fresh handle on the shutdown notification
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// The single listener serves the status surface, the visitor mounts
/// and the control-channel upgrade endpoint.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(handlers::status::index))
        .route("/health", get(handlers::status::health))
        .route("/stats", get(handlers::status::stats))
        .route("/tunnel", get(handlers::control::tunnel_upgrade))
        .route("/t/{slug}", any(handlers::proxy::visitor_root))
        .route("/t/{slug}/{*rest}", any(handlers::proxy::visitor_subpath))
        .fallback(handlers::status::not_found)
        .with_state(state)
}
