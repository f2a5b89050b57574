//! Public base-URL derivation
//!
//! Priority: configured `PUBLIC_URL`, then the incoming `Host` header,
//! then the first non-loopback LAN IPv4 address.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

/// Hosting platforms that terminate TLS in front of the relay; a Host
/// header under one of these gets an `https` public URL even though the
/// relay itself listens on plain HTTP.
const CLOUD_HOST_SUFFIXES: [&str; 7] = [
    ".onrender.com",
    ".railway.app",
    ".fly.dev",
    ".herokuapp.com",
    ".vercel.app",
    ".up.railway.app",
    ".azurewebsites.net",
];

pub fn derive_base_url(
    public_url: Option<&str>,
    host_header: Option<&str>,
    active_scheme: &str,
    active_port: u16,
) -> String {
    if let Some(configured) = public_url {
        return configured.trim_end_matches('/').to_string();
    }

    if let Some(host) = host_header.filter(|h| !h.is_empty()) {
        let scheme = if is_cloud_host(host) { "https" } else { active_scheme };
        return format!("{scheme}://{host}");
    }

    let ip = lan_ipv4().unwrap_or(Ipv4Addr::LOCALHOST);
    format!("{active_scheme}://{ip}:{active_port}")
}

fn is_cloud_host(host: &str) -> bool {
    let bare = host.split(':').next().unwrap_or(host);
    CLOUD_HOST_SUFFIXES.iter().any(|suffix| bare.ends_with(suffix))
}

/// The LAN IPv4 address of the interface holding the default route.
/// Connecting a UDP socket sends no packets; it only binds a source
/// address, which is what we are after.
pub fn lan_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:80").ok()?;
    match socket.local_addr().ok()? {
        SocketAddr::V4(addr) if !addr.ip().is_loopback() && !addr.ip().is_unspecified() => {
            Some(*addr.ip())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_public_url_wins() {
        let url = derive_base_url(
            Some("https://tunnel.example.com/"),
            Some("other.example.com"),
            "http",
            8080,
        );
        assert_eq!(url, "https://tunnel.example.com");
    }

    #[test]
    fn test_host_header_uses_active_scheme() {
        let url = derive_base_url(None, Some("relay.internal:8080"), "http", 8080);
        assert_eq!(url, "http://relay.internal:8080");

        let url = derive_base_url(None, Some("relay.internal"), "https", 8443);
        assert_eq!(url, "https://relay.internal");
    }

    #[test]
    fn test_cloud_hosts_upgrade_to_https() {
        for host in [
            "myapp.onrender.com",
            "myapp.up.railway.app",
            "myapp.fly.dev",
            "myapp.herokuapp.com",
            "myapp.vercel.app",
            "myapp.azurewebsites.net",
        ] {
            let url = derive_base_url(None, Some(host), "http", 8080);
            assert_eq!(url, format!("https://{host}"), "host: {host}");
        }
    }

    #[test]
    fn test_non_cloud_host_is_not_upgraded() {
        let url = derive_base_url(None, Some("myapp.example.com"), "http", 8080);
        assert_eq!(url, "http://myapp.example.com");
    }

    #[test]
    fn test_fallback_without_host_header() {
        let url = derive_base_url(None, None, "http", 9090);
        assert!(url.starts_with("http://"));
        assert!(url.ends_with(":9090"));
    }

    #[test]
    fn test_empty_host_header_falls_through() {
        let url = derive_base_url(None, Some(""), "http", 9090);
        assert!(url.ends_with(":9090"));
    }
}
