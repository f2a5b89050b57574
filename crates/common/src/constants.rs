/// Keep-alive ping period on the control channel (30 seconds)
pub const KEEPALIVE_PERIOD_SECS: u64 = 30;

/// Default per-request deadline waiting for a response frame (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default cap on simultaneous tunnels per relay
pub const DEFAULT_MAX_TUNNELS: usize = 1000;

/// Maximum request/response body size carried over a frame (2 MiB)
pub const MAX_BODY_SIZE_BYTES: usize = 2 * 1024 * 1024;

/// Maximum slug length after sanitisation
pub const MAX_SLUG_LEN: usize = 63;

/// Attempts at generating a non-colliding slug before rejecting the handshake
pub const SLUG_RETRY_CAP: usize = 100;

/// Minimum delay for exponential backoff reconnection (1 second)
pub const RECONNECT_MIN_DELAY_MS: u64 = 1000;

/// Maximum delay for exponential backoff reconnection (30 seconds)
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Default cap on reconnection attempts
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Grace period before a shutting-down relay hard-exits (5 seconds)
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_values() {
        // Compile-time checks documenting constraints between constants
        const _: () = assert!(KEEPALIVE_PERIOD_SECS * 1000 <= DEFAULT_REQUEST_TIMEOUT_MS);
        const _: () = assert!(RECONNECT_MIN_DELAY_MS < RECONNECT_MAX_DELAY_MS);
        const _: () = assert!(SLUG_RETRY_CAP > 0);
        const _: () = assert!(MAX_SLUG_LEN <= 63);

        assert_eq!(MAX_BODY_SIZE_BYTES, 2 * 1024 * 1024);
    }
}
