//! Visitor request dispatch
//!
//! `/t/<slug>/<rest>` requests are buffered, framed and sent down the
//! owning tunnel's control channel, then the handler suspends on the
//! pending record until the response frame arrives or the deadline
//! fires. HTML/JS/CSS responses pass through the content rewriter on
//! the way back out.

use std::time::Instant;

use axum::body::{Body, to_bytes};
use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use porthole_common::constants::MAX_BODY_SIZE_BYTES;
use porthole_common::validation::validate_path;
use porthole_common::{
    Frame, RequestFrame, ResponseFrame, decode_body, encode_body, generate_request_id,
    headers_to_map, map_to_headers, strip_response_hop_headers,
};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::handlers::status;
use crate::{SharedState, rewrite};

/// Visitor-facing 502 body when the local server cannot be reached
/// (send failure or deadline)
const LOCAL_UNREACHABLE: &str =
    "Failed to reach local server. Make sure your dev server is running.";

/// Visitor-facing 502 body when the control channel is already gone
const TUNNEL_LOST: &str = "Tunnel connection lost. Please try again.";

/// Visitor-facing 502 body when the tunnel tears down mid-request
const TUNNEL_DISCONNECTED: &str = "Tunnel disconnected";

/// `/t/{slug}` — bare tunnel root
pub async fn visitor_root(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    request: Request,
) -> Response {
    dispatch(state, slug, request).await
}

/// `/t/{slug}/{*rest}` — everything beneath the tunnel root
pub async fn visitor_subpath(
    State(state): State<SharedState>,
    Path((slug, _rest)): Path<(String, String)>,
    request: Request,
) -> Response {
    dispatch(state, slug, request).await
}

async fn dispatch(state: SharedState, slug: String, request: Request) -> Response {
    let Some(tunnel) = state.registry.lookup(&slug).await else {
        return status::not_found_page();
    };

    if !tunnel.is_writable() {
        return plain(StatusCode::BAD_GATEWAY, TUNNEL_LOST);
    }

    let method = request.method().as_str().to_string();
    let path = match validate_path(&forwarded_path(request.uri(), &slug)) {
        Ok(path) => path,
        Err(err) => {
            warn!(slug = %slug, "refusing request: {err}");
            return plain(StatusCode::URI_TOO_LONG, "Request path too long");
        }
    };
    // Headers go into the frame verbatim; the agent strips its own
    // hop-by-hop set before calling the local server
    let headers = headers_to_map(request.headers());

    // Bodies are fully buffered; no streaming in v1
    let body = match to_bytes(request.into_body(), MAX_BODY_SIZE_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return plain(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
    };

    let request_id = generate_request_id();
    let completion = tunnel.track(&request_id).await;
    tunnel.note_request();

    let frame = Frame::Request(RequestFrame {
        request_id: request_id.clone(),
        method,
        path,
        headers,
        body: encode_body(&body),
    });

    let started = Instant::now();
    if tunnel.send(&frame).await.is_err() {
        tunnel.abandon(&request_id).await;
        warn!(slug = %slug, request_id, "control channel closed mid-send");
        return plain(StatusCode::BAD_GATEWAY, LOCAL_UNREACHABLE);
    }

    match timeout(state.config.request_timeout, completion).await {
        Ok(Ok(response)) => {
            debug!(
                slug = %slug,
                request_id,
                status = response.status_code,
                latency_ms = started.elapsed().as_millis() as u64,
                "request completed"
            );
            build_visitor_response(response, &slug)
        }
        // The completion sink was dropped: tunnel teardown drained it
        Ok(Err(_)) => plain(StatusCode::BAD_GATEWAY, TUNNEL_DISCONNECTED),
        Err(_) => {
            tunnel.abandon(&request_id).await;
            warn!(slug = %slug, request_id, "request deadline fired");
            plain(StatusCode::BAD_GATEWAY, LOCAL_UNREACHABLE)
        }
    }
}

/// Strip the `/t/<slug>` mount from the request URI, keeping the query
/// string. An empty remainder forwards as `/`.
fn forwarded_path(uri: &Uri, slug: &str) -> String {
    let mount = format!("/t/{slug}");
    let rest = uri.path().strip_prefix(&mount).unwrap_or("/");
    let path = if rest.is_empty() { "/" } else { rest };

    match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

fn build_visitor_response(frame: ResponseFrame, slug: &str) -> Response {
    let status = StatusCode::from_u16(frame.status_code).unwrap_or(StatusCode::BAD_GATEWAY);
    let ResponseFrame { mut headers, body, .. } = frame;

    let mut bytes = match decode_body(&body) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(slug = %slug, "undecodable response body: {err}");
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let content_type = headers
        .get("content-type")
        .and_then(|values| values.first())
        .cloned()
        .unwrap_or_default();

    if let Some(rewritten) = rewrite::rewrite_body(&bytes, &content_type, slug) {
        bytes = rewritten.into_bytes();
        headers.insert("content-length".to_string(), vec![bytes.len().to_string()]);
    }

    strip_response_hop_headers(&mut headers);

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = map_to_headers(&headers);
    response
}

fn plain(status: StatusCode, body: &'static str) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
}
