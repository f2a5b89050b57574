//! Common protocol types and utilities for the porthole tunnel system
//!
//! This crate provides the wire protocol, body encoding, header conversions,
//! and slug handling shared by the relay server and the forwarder agent.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod utils;
pub mod validation;

// Re-export commonly used types for convenience
pub use error::{Result, TunnelError};
pub use protocol::{Frame, RequestFrame, ResponseFrame};
pub use utils::{
    current_timestamp_millis, current_timestamp_secs, decode_body, encode_body,
    generate_request_id, generate_slug, generate_tunnel_id, headers_to_map, map_to_headers,
    strip_request_hop_headers, strip_response_hop_headers,
};
