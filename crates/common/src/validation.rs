//! Validation for client-supplied handshake and request data
//!
//! Slugs become URL path segments and log fields, so anything the client
//! sends is checked or sanitised before it reaches the registry.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::constants::MAX_SLUG_LEN;

/// Acceptable slug: lowercase alphanumerics and hyphens
static SLUG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

/// Maximum length for forwarded HTTP paths (including the query string)
pub const MAX_PATH_LENGTH: usize = 2048;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid slug: {0}")]
    InvalidSlug(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Path too long: {0} bytes (max: {1})")]
    PathTooLong(usize, usize),
}

/// Check whether a client-requested slug is acceptable as-is.
///
/// A preferred slug is honoured iff it is non-empty, matches
/// `[a-z0-9-]+` and fits the length cap. Anything else makes the relay
/// fall back to a generated slug.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.len() <= MAX_SLUG_LEN && SLUG_REGEX.is_match(slug)
}

/// Lowercase a requested slug and strip characters outside `[a-z0-9-]`,
/// truncating to the length cap. Returns `None` if nothing usable remains.
pub fn sanitize_slug(requested: &str) -> Option<String> {
    let cleaned: String = requested
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .take(MAX_SLUG_LEN)
        .collect();

    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Parse the numeric `port` handshake parameter
pub fn parse_port(raw: &str) -> Result<u16, ValidationError> {
    raw.parse::<u16>()
        .map_err(|_| ValidationError::InvalidPort(raw.chars().take(32).collect()))
}

/// Cap the forwarded path-and-query length and drop control characters
/// before the path is framed. Always yields a leading slash.
pub fn validate_path(path: &str) -> Result<String, ValidationError> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(ValidationError::PathTooLong(path.len(), MAX_PATH_LENGTH));
    }

    let mut sanitized: String = path
        .chars()
        .filter(|c| !c.is_control() || *c == '\t')
        .collect();
    if !sanitized.starts_with('/') {
        sanitized.insert(0, '/');
    }

    Ok(sanitized)
}
