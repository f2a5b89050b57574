//! Forwarder agent
//!
//! Holds one outbound control channel to the relay, proxies request
//! frames to the local dev server, and reconnects with exponential
//! backoff when the channel drops. Lifecycle is surfaced to embedders
//! as a tagged event stream.

use anyhow::{Result, anyhow};
use clap::Parser;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use porthole_common::{
    Frame, RequestFrame, ResponseFrame, TunnelError,
    constants::{DEFAULT_MAX_RECONNECT_ATTEMPTS, RECONNECT_MAX_DELAY_MS, RECONNECT_MIN_DELAY_MS},
    decode_body, encode_body, headers_to_map, strip_request_hop_headers,
    strip_response_hop_headers,
};
use reqwest::Client;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use tracing::{debug, error, info, warn};

type WebSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// CLI arguments for the forwarder agent
#[derive(Parser, Debug)]
#[command(name = "porthole")]
#[command(about = "Expose a local dev server through a porthole relay", long_about = None)]
#[command(version)]
struct Args {
    /// Local port to forward requests to
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Local host address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Relay endpoint (ws:// or wss:// base URL)
    #[arg(short, long, env = "PORTHOLE_ENDPOINT", default_value = "ws://localhost:8080")]
    endpoint: String,

    /// Preferred slug; the relay may assign a generated one instead
    #[arg(short, long)]
    subdomain: Option<String>,

    /// Stable tunnel identifier; generated by the relay when absent
    #[arg(long)]
    tunnel_id: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Handshake timeout in seconds
    #[arg(long, default_value = "10")]
    connect_timeout: u64,

    /// Per-request timeout against the local server, in seconds
    #[arg(long, default_value = "30")]
    request_timeout: u64,

    /// Reconnection attempts before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_RECONNECT_ATTEMPTS)]
    max_reconnect_attempts: u32,
}

/// Configuration for the forwarder
#[derive(Debug, Clone)]
pub struct Config {
    /// Local service address, e.g. "http://127.0.0.1:3000"
    pub local_address: String,

    /// Local port, sent in the handshake
    pub local_port: u16,

    /// Relay base endpoint
    pub endpoint: String,

    /// Preferred slug, re-requested on every reconnect
    pub subdomain: Option<String>,

    /// Tunnel id, re-sent on every reconnect once known
    pub tunnel_id: Option<String>,

    /// Handshake timeout
    pub connect_timeout: Duration,

    /// Request timeout when calling the local service
    pub request_timeout: Duration,

    /// Reconnection strategy
    pub reconnect: ReconnectConfig,
}

/// Exponential backoff bounds for reconnection
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Config {
    fn from_args(args: Args) -> Self {
        Self {
            local_address: format!("http://{}:{}", args.host, args.port),
            local_port: args.port,
            endpoint: args.endpoint.trim_end_matches('/').to_string(),
            subdomain: args.subdomain,
            tunnel_id: args.tunnel_id,
            connect_timeout: Duration::from_secs(args.connect_timeout),
            request_timeout: Duration::from_secs(args.request_timeout),
            reconnect: ReconnectConfig {
                min_delay: Duration::from_millis(RECONNECT_MIN_DELAY_MS),
                max_delay: Duration::from_millis(RECONNECT_MAX_DELAY_MS),
                max_attempts: args.max_reconnect_attempts,
            },
        }
    }
}

/// Backoff is pure computation: 1s doubling per attempt, capped
fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let delay = config.min_delay.saturating_mul(1u32 << exponent);
    delay.min(config.max_delay)
}

/// Connection lifecycle, driven by transport events
#[derive(Debug, Clone)]
enum ConnectionState {
    Idle,
    Connecting,
    Open { public_url: String },
    Reconnecting { attempt: u32 },
    Closed,
}

/// Lifecycle events emitted for the embedding UI
#[derive(Debug, Clone)]
pub enum TunnelEvent {
    Connected { slug: String, public_url: String },
    Disconnected,
    Error(String),
    Request { method: String, path: String },
    Reconnecting { attempt: u32, delay: Duration },
}

/// Owns the control channel and the reconnect loop
pub struct TunnelController {
    config: Config,
    state: Arc<Mutex<ConnectionState>>,
    /// Adopted from the relay's `connected` frame, reused on reconnect
    tunnel_id: Arc<Mutex<Option<String>>>,
    events: mpsc::UnboundedSender<TunnelEvent>,
}

impl TunnelController {
    pub fn new(config: Config, events: mpsc::UnboundedSender<TunnelEvent>) -> Self {
        let tunnel_id = Arc::new(Mutex::new(config.tunnel_id.clone()));
        Self {
            config,
            state: Arc::new(Mutex::new(ConnectionState::Idle)),
            tunnel_id,
            events,
        }
    }

    fn emit(&self, event: TunnelEvent) {
        let _ = self.events.send(event);
    }

    async fn set_state(&self, next: ConnectionState) {
        *self.state.lock().await = next;
    }

    /// Run until reconnection attempts are exhausted
    pub async fn run(&self) -> Result<()> {
        let mut attempt: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting).await;

            match self.establish().await {
                Ok((ws_stream, slug, public_url)) => {
                    attempt = 0;
                    info!("tunnel open: {public_url}");
                    self.set_state(ConnectionState::Open {
                        public_url: public_url.clone(),
                    })
                    .await;
                    self.emit(TunnelEvent::Connected { slug, public_url });

                    if let Err(err) = self.handle_connection(ws_stream).await {
                        error!("connection error: {err}");
                    }
                    self.emit(TunnelEvent::Disconnected);
                }
                Err(err) => {
                    error!("failed to connect: {err}");
                    self.emit(TunnelEvent::Error(err.to_string()));
                }
            }

            attempt += 1;
            if attempt > self.config.reconnect.max_attempts {
                self.set_state(ConnectionState::Closed).await;
                return Err(anyhow!(
                    "giving up after {} reconnect attempts",
                    self.config.reconnect.max_attempts
                ));
            }

            let delay = backoff_delay(attempt, &self.config.reconnect);
            self.set_state(ConnectionState::Reconnecting { attempt }).await;
            self.emit(TunnelEvent::Reconnecting { attempt, delay });
            info!("reconnecting in {delay:?} (attempt {attempt})");
            tokio::time::sleep(delay).await;
        }
    }

    /// Open the channel and wait for the `connected` handshake ack
    async fn establish(&self) -> Result<(WebSocket, String, String)> {
        let url = build_ws_url(
            &self.config.endpoint,
            self.config.local_port,
            self.tunnel_id.lock().await.as_deref(),
            self.config.subdomain.as_deref(),
        );
        debug!("connecting to {url}");

        let (mut ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| TunnelError::ConnectionError(e.to_string()))?;

        let handshake = tokio::time::timeout(self.config.connect_timeout, async {
            while let Some(message) = ws_stream.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<Frame>(&text) {
                        Ok(Frame::Connected {
                            tunnel_id,
                            subdomain,
                            public_url,
                        }) => return Ok((tunnel_id, subdomain, public_url)),
                        Ok(Frame::Error { message }) => {
                            return Err(TunnelError::ConnectionError(message));
                        }
                        Ok(_) => {} // nothing else is valid before `connected`, skip
                        Err(err) => debug!("skipping malformed handshake frame: {err}"),
                    },
                    Ok(WsMessage::Close(_)) => {
                        return Err(TunnelError::ConnectionError(
                            "relay closed the channel during handshake".to_string(),
                        ));
                    }
                    Err(err) => return Err(TunnelError::WebSocketError(err.to_string())),
                    _ => {}
                }
            }
            Err(TunnelError::ConnectionError(
                "channel closed before handshake".to_string(),
            ))
        });

        let (tunnel_id, slug, public_url) = handshake
            .await
            .map_err(|_| TunnelError::ConnectionError("handshake timeout".to_string()))??;

        *self.tunnel_id.lock().await = Some(tunnel_id);

        Ok((ws_stream, slug, public_url))
    }

    /// Pump the open channel until it drops
    async fn handle_connection(&self, ws_stream: WebSocket) -> Result<()> {
        let (ws_sink, ws_read) = ws_stream.split();
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<WsMessage>(100);

        let client = Client::builder()
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| TunnelError::HttpError(e.to_string()))?;

        let write_task = tokio::spawn(write_pump(ws_sink, outgoing_rx));
        let read_task = tokio::spawn(read_pump(
            ws_read,
            outgoing_tx.clone(),
            client,
            self.config.local_address.clone(),
            self.events.clone(),
        ));

        // Either task ending means the connection is gone
        tokio::select! {
            result = write_task => debug!("write task ended: {result:?}"),
            result = read_task => debug!("read task ended: {result:?}"),
        }

        Ok(())
    }
}

/// Handshake URL with `tunnelId`, `port` and `subdomain` query params
fn build_ws_url(
    endpoint: &str,
    port: u16,
    tunnel_id: Option<&str>,
    subdomain: Option<&str>,
) -> String {
    let mut url = format!("{}/tunnel?port={}", endpoint.trim_end_matches('/'), port);
    if let Some(id) = tunnel_id {
        url.push_str("&tunnelId=");
        url.push_str(id);
    }
    if let Some(slug) = subdomain {
        url.push_str("&subdomain=");
        url.push_str(slug);
    }
    url
}

/// Single writer for the channel; outgoing frames never interleave
async fn write_pump(
    mut ws_sink: SplitSink<WebSocket, WsMessage>,
    mut outgoing_rx: mpsc::Receiver<WsMessage>,
) {
    while let Some(message) = outgoing_rx.recv().await {
        if let Err(err) = ws_sink.send(message).await {
            error!("failed to send frame: {err}");
            break;
        }
    }
    debug!("write pump exiting");
}

async fn read_pump(
    mut ws_read: SplitStream<WebSocket>,
    outgoing_tx: mpsc::Sender<WsMessage>,
    client: Client,
    local_address: String,
    events: mpsc::UnboundedSender<TunnelEvent>,
) {
    while let Some(message) = ws_read.next().await {
        match message {
            Ok(WsMessage::Text(text)) => {
                handle_frame(&text, &outgoing_tx, &client, &local_address, &events).await;
            }
            Ok(WsMessage::Ping(payload)) => {
                if outgoing_tx.send(WsMessage::Pong(payload)).await.is_err() {
                    break;
                }
            }
            Ok(WsMessage::Close(_)) => {
                info!("relay closed the channel");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                error!("channel error: {err}");
                break;
            }
        }
    }
    debug!("read pump exiting");
}

async fn handle_frame(
    text: &str,
    outgoing_tx: &mpsc::Sender<WsMessage>,
    client: &Client,
    local_address: &str,
    events: &mpsc::UnboundedSender<TunnelEvent>,
) {
    let frame = match serde_json::from_str::<Frame>(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!("malformed frame skipped: {err}");
            return;
        }
    };

    match frame {
        Frame::Request(request) => {
            debug!("{} {}", request.method, request.path);
            let _ = events.send(TunnelEvent::Request {
                method: request.method.clone(),
                path: request.path.clone(),
            });

            let client = client.clone();
            let local_address = local_address.to_string();
            let outgoing_tx = outgoing_tx.clone();
            tokio::spawn(async move {
                let response = proxy_to_local(&client, &local_address, request).await;
                if let Err(err) = send_frame(&outgoing_tx, &Frame::Response(response)).await {
                    error!("failed to send response frame: {err}");
                }
            });
        }
        Frame::Ping => {
            if let Err(err) = send_frame(outgoing_tx, &Frame::Pong).await {
                error!("failed to answer ping: {err}");
            }
        }
        Frame::Pong => debug!("pong received"),
        Frame::Error { message } => {
            error!("relay error: {message}");
            let _ = events.send(TunnelEvent::Error(message));
        }
        Frame::Connected { .. } => debug!("duplicate connected frame ignored"),
        Frame::Response(_) => warn!("unexpected response frame dropped"),
    }
}

async fn send_frame(outgoing_tx: &mpsc::Sender<WsMessage>, frame: &Frame) -> Result<()> {
    let json = serde_json::to_string(frame)?;
    outgoing_tx
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|_| anyhow!("write pump is gone"))
}

/// Perform the local HTTP exchange for one request frame. Failures
/// become a synthesised 502 response so the visitor always gets an
/// answer with the matching request id.
async fn proxy_to_local(
    client: &Client,
    local_address: &str,
    request: RequestFrame,
) -> ResponseFrame {
    let started = Instant::now();
    let request_id = request.request_id.clone();

    match local_exchange(client, local_address, request).await {
        Ok(mut response) => {
            response.request_id = request_id;
            debug!(
                status = response.status_code,
                latency_ms = started.elapsed().as_millis() as u64,
                "local exchange done"
            );
            response
        }
        Err(err) => {
            error!("local server error: {err}");
            ResponseFrame::plain_text(
                request_id,
                502,
                &format!("Local server unreachable at {local_address}. Is your dev server running?"),
            )
        }
    }
}

async fn local_exchange(
    client: &Client,
    local_address: &str,
    request: RequestFrame,
) -> Result<ResponseFrame> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .map_err(|_| TunnelError::InvalidFrame(format!("bad method {:?}", request.method)))?;
    let url = format!("{}{}", local_address, request.path);

    let mut builder = client.request(method, &url);

    let mut headers = request.headers;
    strip_request_hop_headers(&mut headers);
    for (name, values) in &headers {
        for value in values {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }

    if !request.body.is_empty() {
        let body = decode_body(&request.body)
            .map_err(|e| TunnelError::InvalidFrame(format!("undecodable body: {e}")))?;
        builder = builder.body(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| TunnelError::LocalUnreachable(e.to_string()))?;

    let status_code = response.status().as_u16();
    let mut headers = headers_to_map(response.headers());
    strip_response_hop_headers(&mut headers);

    let body = response
        .bytes()
        .await
        .map_err(|e| TunnelError::HttpError(e.to_string()))?;

    Ok(ResponseFrame {
        request_id: String::new(), // overwritten by the caller
        status_code,
        headers,
        body: encode_body(&body),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    info!("porthole forwarder v{}", env!("CARGO_PKG_VERSION"));
    info!("local server: http://{}:{}", args.host, args.port);
    info!("relay: {}", args.endpoint);

    let config = Config::from_args(args);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    // The embedding UI would subscribe here; standalone we just log
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                TunnelEvent::Connected { public_url, .. } => {
                    info!("forwarding {public_url} -> local server");
                }
                TunnelEvent::Disconnected => warn!("tunnel disconnected"),
                TunnelEvent::Error(message) => warn!("tunnel error: {message}"),
                TunnelEvent::Reconnecting { attempt, delay } => {
                    info!("reconnect attempt {attempt} in {delay:?}");
                }
                TunnelEvent::Request { .. } => {}
            }
        }
    });

    let controller = TunnelController::new(config, events_tx);

    tokio::select! {
        result = controller.run() => {
            error!("controller exited: {result:?}");
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(overrides: impl FnOnce(&mut Args)) -> Args {
        let mut args = Args {
            port: 3000,
            host: "127.0.0.1".to_string(),
            endpoint: "ws://localhost:8080".to_string(),
            subdomain: None,
            tunnel_id: None,
            verbose: false,
            connect_timeout: 10,
            request_timeout: 30,
            max_reconnect_attempts: 5,
        };
        overrides(&mut args);
        args
    }

    #[test]
    fn test_config_from_args() {
        let config = Config::from_args(args(|a| {
            a.port = 8080;
            a.host = "localhost".to_string();
            a.endpoint = "wss://relay.example.com/".to_string();
            a.subdomain = Some("my-app".to_string());
        }));

        assert_eq!(config.local_address, "http://localhost:8080");
        assert_eq!(config.endpoint, "wss://relay.example.com");
        assert_eq!(config.subdomain.as_deref(), Some("my-app"));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = ReconnectConfig {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        };

        assert_eq!(backoff_delay(1, &config), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, &config), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, &config), Duration::from_secs(4));
        assert_eq!(backoff_delay(4, &config), Duration::from_secs(8));
        assert_eq!(backoff_delay(5, &config), Duration::from_secs(16));
        assert_eq!(backoff_delay(6, &config), Duration::from_secs(30));
        assert_eq!(backoff_delay(60, &config), Duration::from_secs(30));
    }

    #[test]
    fn test_build_ws_url_variants() {
        assert_eq!(
            build_ws_url("ws://localhost:8080", 3000, None, None),
            "ws://localhost:8080/tunnel?port=3000"
        );
        assert_eq!(
            build_ws_url("wss://relay.example.com/", 4000, Some("abc123"), Some("my-app")),
            "wss://relay.example.com/tunnel?port=4000&tunnelId=abc123&subdomain=my-app"
        );
    }

    #[test]
    fn test_controller_starts_idle_with_configured_tunnel_id() {
        let config = Config::from_args(args(|a| {
            a.tunnel_id = Some("abc123def456".to_string());
        }));
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let controller = TunnelController::new(config, events_tx);

        assert!(matches!(
            *controller.state.blocking_lock(),
            ConnectionState::Idle
        ));
        assert_eq!(
            controller.tunnel_id.blocking_lock().as_deref(),
            Some("abc123def456")
        );
    }

    #[test]
    fn test_local_502_response_shape() {
        let frame =
            ResponseFrame::plain_text("r1".to_string(), 502, "Local server unreachable");
        assert_eq!(frame.status_code, 502);
        assert_eq!(
            frame.headers.get("content-type").unwrap(),
            &vec!["text/plain".to_string()]
        );
    }
}
