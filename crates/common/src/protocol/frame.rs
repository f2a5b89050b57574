use serde::{Deserialize, Serialize};

use super::{RequestFrame, ResponseFrame};

/// All control-channel messages are wrapped in this typed envelope.
///
/// One JSON object per WebSocket text frame, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Handshake acknowledgement, sent exactly once as the first frame
    Connected {
        #[serde(rename = "tunnelId")]
        tunnel_id: String,
        /// The slug assigned to the tunnel
        subdomain: String,
        #[serde(rename = "publicUrl")]
        public_url: String,
    },

    /// Terminal error; the sender may close the channel right after
    Error { message: String },

    /// Liveness probe, relay to client
    Ping,
    /// Optional reply to `Ping`
    Pong,

    /// Visitor request to be proxied to the local server
    Request(RequestFrame),
    /// Matches a prior `Request` by `requestId`
    Response(ResponseFrame),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_ping_pong_serialization() {
        let json = serde_json::to_string(&Frame::Ping).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);

        let json = serde_json::to_string(&Frame::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);

        let parsed: Frame = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, Frame::Pong));
    }

    #[test]
    fn test_connected_serialization() {
        let frame = Frame::Connected {
            tunnel_id: "k3j9x2m7q1w5".to_string(),
            subdomain: "brisk-otter-42".to_string(),
            public_url: "https://tunnel.example.com/t/brisk-otter-42".to_string(),
        };

        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"connected""#));
        assert!(json.contains(r#""tunnelId":"k3j9x2m7q1w5""#));
        assert!(json.contains(r#""subdomain":"brisk-otter-42""#));
        assert!(json.contains(r#""publicUrl":"https://tunnel.example.com/t/brisk-otter-42""#));

        match serde_json::from_str::<Frame>(&json).unwrap() {
            Frame::Connected { subdomain, .. } => assert_eq!(subdomain, "brisk-otter-42"),
            _ => panic!("Expected Connected"),
        }
    }

    #[test]
    fn test_request_serialization() {
        let frame = Frame::Request(RequestFrame {
            request_id: "8c1a7f0e-0000-4000-8000-000000000000".to_string(),
            method: "GET".to_string(),
            path: "/api/users?limit=10".to_string(),
            headers: HashMap::new(),
            body: String::new(),
        });

        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"request""#));
        assert!(json.contains(r#""requestId":"8c1a7f0e-0000-4000-8000-000000000000""#));
        assert!(json.contains(r#""path":"/api/users?limit=10""#));

        let parsed: Frame = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, Frame::Request(_)));
    }

    #[test]
    fn test_response_round_trip() {
        let frame = Frame::Response(ResponseFrame {
            request_id: "req-1".to_string(),
            status_code: 200,
            headers: HashMap::from([(
                "content-type".to_string(),
                vec!["text/html".to_string()],
            )]),
            body: "aGk=".to_string(),
        });

        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""statusCode":200"#));

        match serde_json::from_str::<Frame>(&json).unwrap() {
            Frame::Response(r) => {
                assert_eq!(r.request_id, "req-1");
                assert_eq!(r.status_code, 200);
                assert_eq!(r.body, "aGk=");
            }
            _ => panic!("Expected Response"),
        }
    }

    #[test]
    fn test_error_serialization() {
        let frame = Frame::Error {
            message: "Tunnel capacity exceeded".to_string(),
        };

        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"type":"error","message":"Tunnel capacity exceeded"}"#
        );
    }

    #[test]
    fn test_malformed_frame_rejected() {
        assert!(serde_json::from_str::<Frame>(r#"{"type":"warp"}"#).is_err());
        assert!(serde_json::from_str::<Frame>("not json at all").is_err());
        assert!(serde_json::from_str::<Frame>(r#"{"type":"request"}"#).is_err());
    }
}
