mod encoding;
mod headers;
mod id;
mod time;

pub use encoding::{decode_body, encode_body};
pub use headers::{
    headers_to_map, map_to_headers, strip_request_hop_headers, strip_response_hop_headers,
};
pub use id::{generate_request_id, generate_slug, generate_tunnel_id};
pub use time::{current_timestamp_millis, current_timestamp_secs};
