//! Relay configuration from environment variables

use std::path::PathBuf;
use std::time::Duration;

use porthole_common::constants::{DEFAULT_MAX_TUNNELS, DEFAULT_REQUEST_TIMEOUT_MS};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port (`PORT`)
    pub port: u16,
    /// HTTPS listen port, used when `use_https` is set (`HTTPS_PORT`)
    pub https_port: u16,
    /// Enable the built-in TLS listener (`USE_HTTPS`)
    pub use_https: bool,
    /// PEM certificate path (`SSL_CERT`)
    pub ssl_cert: Option<PathBuf>,
    /// PEM private key path (`SSL_KEY`)
    pub ssl_key: Option<PathBuf>,
    /// Hard cap on simultaneous tunnels (`MAX_TUNNELS`)
    pub max_tunnels: usize,
    /// Per-request deadline (`REQUEST_TIMEOUT`, milliseconds)
    pub request_timeout: Duration,
    /// Overrides base-URL auto-detection (`PUBLIC_URL`)
    pub public_url: Option<String>,
    /// Log level (`LOG_LEVEL`)
    pub log_level: tracing::Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            https_port: 8443,
            use_https: false,
            ssl_cert: None,
            ssl_key: None,
            max_tunnels: DEFAULT_MAX_TUNNELS,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            public_url: None,
            log_level: tracing::Level::INFO,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source, so parsing is
    /// testable without touching process environment
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        Self {
            port: parse_or(&get, "PORT", defaults.port),
            https_port: parse_or(&get, "HTTPS_PORT", defaults.https_port),
            use_https: get("USE_HTTPS")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            ssl_cert: get("SSL_CERT").map(PathBuf::from),
            ssl_key: get("SSL_KEY").map(PathBuf::from),
            max_tunnels: parse_or(&get, "MAX_TUNNELS", defaults.max_tunnels),
            request_timeout: Duration::from_millis(parse_or(
                &get,
                "REQUEST_TIMEOUT",
                DEFAULT_REQUEST_TIMEOUT_MS,
            )),
            public_url: get("PUBLIC_URL").map(|u| u.trim_end_matches('/').to_string()),
            log_level: get("LOG_LEVEL")
                .and_then(|v| match v.parse() {
                    Ok(level) => Some(level),
                    Err(_) => {
                        warn!("unrecognised LOG_LEVEL {v:?}, using info");
                        None
                    }
                })
                .unwrap_or(defaults.log_level),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    match get(name) {
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("unparseable {name}={raw:?}, using default");
                default
            }
        },
        None => default,
    }
}
