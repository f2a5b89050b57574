use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A visitor HTTP request forwarded from the relay to the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFrame {
    /// Correlates the request with its response; chosen by the relay,
    /// opaque to the agent, echoed verbatim in the matching response
    pub request_id: String,

    /// HTTP method (GET, POST, PUT, DELETE, etc.)
    pub method: String,

    /// Path plus query string, relative to the local server root
    /// Example: "/api/v1/users?limit=10"
    pub path: String,

    /// HTTP headers; multiple values per name are supported
    pub headers: HashMap<String, Vec<String>>,

    /// Request body encoded in Base64; empty string for bodyless requests
    #[serde(default)]
    pub body: String,
}

impl RequestFrame {
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_defaults_to_empty() {
        let json = r#"{
            "requestId": "r1",
            "method": "GET",
            "path": "/",
            "headers": {}
        }"#;

        let parsed: RequestFrame = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.body, "");
        assert!(!parsed.has_body());
    }

    #[test]
    fn test_multiple_header_values_survive_round_trip() {
        let mut headers = HashMap::new();
        headers.insert(
            "cookie".to_string(),
            vec!["session=abc".to_string(), "token=xyz".to_string()],
        );

        let frame = RequestFrame {
            request_id: "r2".to_string(),
            method: "POST".to_string(),
            path: "/submit".to_string(),
            headers,
            body: "eyJ0ZXN0IjoidmFsdWUifQ==".to_string(),
        };

        let json = serde_json::to_string(&frame).unwrap();
        let parsed: RequestFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.headers.get("cookie").unwrap().len(), 2);
        assert!(parsed.has_body());
    }

    #[test]
    fn test_camel_case_field_names() {
        let frame = RequestFrame {
            request_id: "r3".to_string(),
            method: "GET".to_string(),
            path: "/x".to_string(),
            headers: HashMap::new(),
            body: String::new(),
        };

        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""requestId":"r3""#));
        assert!(!json.contains("request_id"));
    }
}
