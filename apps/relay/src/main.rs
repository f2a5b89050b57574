use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use porthole_common::constants::SHUTDOWN_GRACE_SECS;
use porthole_relay::{Config, RelayState, router};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(false)
        .init();

    info!("porthole relay v{}", env!("CARGO_PKG_VERSION"));

    // TLS failures are survivable: log and fall back to plain HTTP
    let (scheme, port, tls) = if config.use_https {
        match load_tls(&config).await {
            Ok(rustls) => ("https", config.https_port, Some(rustls)),
            Err(err) => {
                error!("TLS startup failed: {err:#}; falling back to plain HTTP");
                ("http", config.port, None)
            }
        }
    } else {
        ("http", config.port, None)
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = Arc::new(RelayState::new(config, scheme, port, shutdown_rx));
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let handle = Handle::new();

    info!(%addr, scheme, "listening");

    // The watcher only resolves by hard-exiting after the grace period;
    // a clean drain completes `serve` first, dropping the timer, so the
    // exit-0 path below stays reachable.
    tokio::select! {
        result = serve(addr, handle.clone(), app, tls) => result?,
        _ = shutdown_watcher(shutdown_tx, handle) => {}
    }

    info!("relay drained cleanly");
    Ok(())
}

async fn serve(
    addr: SocketAddr,
    handle: Handle,
    app: Router,
    tls: Option<RustlsConfig>,
) -> anyhow::Result<()> {
    match tls {
        Some(rustls) => axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .context("HTTPS listener failed"),
        None => axum_server::bind(addr)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .context("HTTP listener failed"),
    }
}

async fn load_tls(config: &Config) -> anyhow::Result<RustlsConfig> {
    let cert = config
        .ssl_cert
        .as_ref()
        .context("USE_HTTPS is set but SSL_CERT is not")?;
    let key = config
        .ssl_key
        .as_ref()
        .context("USE_HTTPS is set but SSL_KEY is not")?;

    RustlsConfig::from_pem_file(cert, key)
        .await
        .with_context(|| format!("loading TLS material from {} / {}", cert.display(), key.display()))
}

/// On SIGTERM/SIGINT: notify control channels (they close with a normal
/// reason), stop accepting, and hard-exit with code 1 if draining
/// outlives the grace period.
async fn shutdown_watcher(shutdown_tx: watch::Sender<bool>, handle: Handle) {
    wait_for_signal().await;
    info!("shutdown signal received, draining");

    let _ = shutdown_tx.send(true);
    handle.graceful_shutdown(None);

    tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_SECS)).await;
    error!("grace period elapsed, forcing exit");
    std::process::exit(1);
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            error!("cannot install SIGTERM handler: {err}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
