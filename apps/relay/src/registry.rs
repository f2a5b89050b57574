//! Process-wide tunnel registry and slug index
//!
//! Both maps live behind one lock so registration and removal stay
//! atomic: a slug is never visible to lookup before its tunnel is
//! installed, nor after the tunnel is removed.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message as WsMessage;
use porthole_common::TunnelError;
use porthole_common::constants::SLUG_RETRY_CAP;
use porthole_common::generate_slug;
use porthole_common::validation::{is_valid_slug, sanitize_slug};
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use crate::tunnel::Tunnel;

pub struct TunnelRegistry {
    max_tunnels: usize,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    by_slug: HashMap<String, Arc<Tunnel>>,
    slug_of: HashMap<String, String>,
}

impl TunnelRegistry {
    pub fn new(max_tunnels: usize) -> Self {
        Self {
            max_tunnels,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Allocate a slug and install the tunnel, atomically.
    ///
    /// Fails when the relay is at capacity or slug generation keeps
    /// colliding; in either case nothing is registered.
    pub async fn register(
        &self,
        tunnel_id: String,
        local_port: u16,
        preferred_slug: Option<&str>,
        control_tx: mpsc::Sender<WsMessage>,
    ) -> Result<Arc<Tunnel>, TunnelError> {
        let mut inner = self.inner.write().await;

        if inner.by_slug.len() >= self.max_tunnels {
            return Err(TunnelError::CapacityExceeded(self.max_tunnels));
        }

        let slug = allocate_slug(&inner, preferred_slug)?;
        let tunnel = Arc::new(Tunnel::new(
            tunnel_id.clone(),
            slug.clone(),
            local_port,
            control_tx,
        ));

        inner.slug_of.insert(tunnel_id, slug.clone());
        inner.by_slug.insert(slug, tunnel.clone());

        Ok(tunnel)
    }

    /// Remove a tunnel; its slug becomes reusable immediately.
    /// Returns the removed tunnel so the caller can drain it.
    pub async fn unregister(&self, slug: &str) -> Option<Arc<Tunnel>> {
        let mut inner = self.inner.write().await;
        let tunnel = inner.by_slug.remove(slug)?;

        // A reconnect may have re-registered the same tunnel_id under a
        // new slug; only drop the index entry if it still points here.
        if inner.slug_of.get(&tunnel.tunnel_id).map(String::as_str) == Some(slug) {
            inner.slug_of.remove(&tunnel.tunnel_id);
        }

        Some(tunnel)
    }

    pub async fn lookup(&self, slug: &str) -> Option<Arc<Tunnel>> {
        self.inner.read().await.by_slug.get(slug).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_slug.len()
    }

    /// Live tunnels ordered by slug, for the status page
    pub async fn snapshot(&self) -> Vec<Arc<Tunnel>> {
        let inner = self.inner.read().await;
        let mut tunnels: Vec<Arc<Tunnel>> = inner.by_slug.values().cloned().collect();
        tunnels.sort_by(|a, b| a.slug.cmp(&b.slug));
        tunnels
    }
}

fn allocate_slug(inner: &Inner, preferred: Option<&str>) -> Result<String, TunnelError> {
    if let Some(requested) = preferred {
        if let Some(candidate) = sanitize_slug(requested) {
            if is_valid_slug(&candidate) && !inner.by_slug.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        debug!(requested, "preferred slug unavailable, generating one");
    }

    for _ in 0..SLUG_RETRY_CAP {
        let candidate = generate_slug();
        if !inner.by_slug.contains_key(&candidate) {
            return Ok(candidate);
        }
    }

    Err(TunnelError::SlugExhausted)
}
