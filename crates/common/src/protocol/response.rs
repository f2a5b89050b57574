use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The local server's response, sent back from the agent to the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFrame {
    /// Must match the `requestId` of the corresponding request frame
    pub request_id: String,

    /// HTTP status code (200, 404, 502, etc.)
    pub status_code: u16,

    /// Response headers; multiple values per name are supported
    pub headers: HashMap<String, Vec<String>>,

    /// Response body encoded in Base64
    #[serde(default)]
    pub body: String,
}

impl ResponseFrame {
    /// Synthesise a plain-text response, e.g. for local-server failures
    pub fn plain_text(request_id: String, status_code: u16, text: &str) -> Self {
        Self {
            request_id,
            status_code,
            headers: HashMap::from([(
                "content-type".to_string(),
                vec!["text/plain".to_string()],
            )]),
            body: crate::utils::encode_body(text.as_bytes()),
        }
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }
}
