//! Health, stats and HTML status surfaces

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::http::header::HOST;
use axum::response::{Html, IntoResponse, Response};
use serde_json::{Value, json};

use crate::SharedState;
use crate::base_url::derive_base_url;

/// `GET /health`
pub async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "tunnels": state.registry.len().await,
        "uptime": state.uptime_secs(),
    }))
}

/// `GET /stats`
pub async fn stats(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "activeTunnels": state.registry.len().await,
        "maxTunnels": state.config.max_tunnels,
        "uptime": state.uptime_secs(),
    }))
}

/// `GET /` — HTML status page listing live tunnels
pub async fn index(State(state): State<SharedState>, headers: HeaderMap) -> Html<String> {
    let host = headers.get(HOST).and_then(|v| v.to_str().ok());
    let base = derive_base_url(
        state.config.public_url.as_deref(),
        host,
        state.active_scheme,
        state.active_port,
    );

    let tunnels = state.registry.snapshot().await;
    let mut rows = String::new();
    for tunnel in &tunnels {
        rows.push_str(&format!(
            "<tr><td><a href=\"{base}/t/{slug}/\">{slug}</a></td>\
             <td>{port}</td><td>{uptime}s</td><td>{requests}</td></tr>",
            base = base,
            slug = tunnel.slug,
            port = tunnel.local_port,
            uptime = tunnel.uptime().as_secs(),
            requests = tunnel.request_count(),
        ));
    }

    let table = if tunnels.is_empty() {
        "<p>No tunnels connected.</p>".to_string()
    } else {
        format!(
            "<table><tr><th>Tunnel</th><th>Local port</th><th>Up</th><th>Requests</th></tr>{rows}</table>"
        )
    };

    Html(format!(
        "<!doctype html><html><head><title>porthole relay</title>{STYLE}</head>\
         <body><h1>porthole relay</h1>\
         <p>Base URL: <code>{base}</code> &middot; {count} tunnel(s) live</p>\
         {table}</body></html>",
        count = tunnels.len(),
    ))
}

/// Fallback for unknown paths and dead slugs
pub async fn not_found() -> Response {
    not_found_page()
}

pub fn not_found_page() -> Response {
    let body = format!(
        "<!doctype html><html><head><title>Tunnel not found</title>{STYLE}</head>\
         <body><h1>Tunnel not found</h1>\
         <p>There is no live tunnel at this address. The developer may have \
         stopped sharing, or the link has expired.</p></body></html>"
    );
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body,
    )
        .into_response()
}

const STYLE: &str = "<style>body{font-family:system-ui,sans-serif;max-width:40rem;\
margin:3rem auto;padding:0 1rem;color:#222}table{border-collapse:collapse}\
td,th{border:1px solid #ccc;padding:.4rem .8rem;text-align:left}\
code{background:#f4f4f4;padding:.1rem .3rem}</style>";

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_not_found_page_shape() {
        let response = not_found_page();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("Tunnel not found"));
    }
}
