use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Hop-by-hop headers the agent drops before calling the local server.
/// `transfer-encoding` is meaningless once the body has been buffered.
const REQUEST_HOP_HEADERS: [&str; 4] = ["host", "connection", "keep-alive", "transfer-encoding"];

/// Hop-by-hop headers stripped from responses before they leave the tunnel
const RESPONSE_HOP_HEADERS: [&str; 3] = ["transfer-encoding", "connection", "keep-alive"];

/// Convert HTTP headers to the wire format, preserving multiple values
pub fn headers_to_map(headers: &HeaderMap) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();

    for (name, value) in headers.iter() {
        let key = name.as_str().to_string();
        let val = value.to_str().unwrap_or("").to_string();

        map.entry(key).or_default().push(val);
    }

    map
}

/// Convert the wire format back into an HTTP `HeaderMap`.
/// Names or values that are not valid HTTP are skipped.
pub fn map_to_headers(map: &HashMap<String, Vec<String>>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, values) in map.iter() {
        if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) {
            for value in values {
                if let Ok(header_value) = HeaderValue::from_str(value) {
                    headers.append(header_name.clone(), header_value);
                }
            }
        }
    }

    headers
}

/// Remove `host`, `connection` and `keep-alive` from a request header map
pub fn strip_request_hop_headers(map: &mut HashMap<String, Vec<String>>) {
    map.retain(|name, _| !REQUEST_HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str()));
}

/// Remove `transfer-encoding`, `connection` and `keep-alive` from a
/// response header map
pub fn strip_response_hop_headers(map: &mut HashMap<String, Vec<String>>) {
    map.retain(|name, _| !RESPONSE_HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_to_map_multiple_values() {
        let mut headers = HeaderMap::new();
        headers.insert("set-cookie", "session=abc".parse().unwrap());
        headers.append("set-cookie", "token=xyz".parse().unwrap());

        let map = headers_to_map(&headers);
        let cookies = map.get("set-cookie").unwrap();
        assert_eq!(cookies.len(), 2);
        assert!(cookies.contains(&"session=abc".to_string()));
        assert!(cookies.contains(&"token=xyz".to_string()));
    }

    #[test]
    fn test_map_to_headers_skips_invalid_names() {
        let mut map = HashMap::new();
        map.insert("valid-header".to_string(), vec!["value".to_string()]);
        map.insert("invalid header".to_string(), vec!["value".to_string()]);

        let headers = map_to_headers(&map);
        assert_eq!(headers.len(), 1);
        assert!(headers.get("valid-header").is_some());
    }

    #[test]
    fn test_round_trip_conversion() {
        let mut original = HeaderMap::new();
        original.insert("content-type", "application/json".parse().unwrap());
        original.insert("accept", "text/html".parse().unwrap());
        original.append("accept", "application/json".parse().unwrap());

        let converted = map_to_headers(&headers_to_map(&original));

        assert_eq!(converted.len(), original.len());
        let accepts: Vec<_> = converted
            .get_all("accept")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(accepts.len(), 2);
    }

    #[test]
    fn test_strip_request_hop_headers() {
        let mut map = HashMap::from([
            ("Host".to_string(), vec!["example.com".to_string()]),
            ("connection".to_string(), vec!["close".to_string()]),
            ("Keep-Alive".to_string(), vec!["timeout=5".to_string()]),
            ("Transfer-Encoding".to_string(), vec!["chunked".to_string()]),
            ("accept".to_string(), vec!["*/*".to_string()]),
        ]);

        strip_request_hop_headers(&mut map);

        assert_eq!(map.len(), 1);
        assert!(map.contains_key("accept"));
    }

    #[test]
    fn test_strip_response_hop_headers() {
        let mut map = HashMap::from([
            ("Transfer-Encoding".to_string(), vec!["chunked".to_string()]),
            ("connection".to_string(), vec!["keep-alive".to_string()]),
            ("keep-alive".to_string(), vec!["timeout=5".to_string()]),
            ("content-type".to_string(), vec!["text/html".to_string()]),
        ]);

        strip_response_hop_headers(&mut map);

        assert_eq!(map.len(), 1);
        assert!(map.contains_key("content-type"));
    }
}
