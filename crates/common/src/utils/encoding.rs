use base64::{Engine as _, engine::general_purpose::STANDARD};

/// Encode bytes to a Base64 string for text-safe framing
pub fn encode_body(body: &[u8]) -> String {
    STANDARD.encode(body)
}

/// Decode a Base64 string back to bytes
pub fn decode_body(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}
