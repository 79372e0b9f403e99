//! Proxy Core (component C6): accept loop, CONNECT tunnel state machine,
//! host filter policy, and the CA & Leaf Certificate Mint (component C5)
//! that backs interception.
//!
//! - `server` - accept loop and per-connection dispatch, grounded on the
//!   teacher's `proxy/server.rs`
//! - `handler` - verb-based dispatch (CONNECT vs plain forwarding)
//! - `tunnel` - CONNECT upgrade, splice vs intercept
//! - `ca` - root CA load-or-create and per-host leaf minting
//! - `filter` - host include/exclude glob policy
//! - `tls` - TLS acceptor construction, `NoVerifier`

pub mod ca;
pub mod filter;
mod handler;
pub mod tls;
mod tunnel;

mod server;

pub use server::{ProxyCore, ProxyCoreConfig};
pub use tunnel::TunnelContext;

/// Strip `Proxy-Connection` and any header named in a `Connection` header's
/// value before a request is forwarded upstream, per RFC 7230 hop-by-hop
/// header semantics.
pub(crate) fn strip_hop_by_hop(headers: &[(String, String)]) -> Vec<(String, String)> {
    let connection_listed: Vec<String> = headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("connection"))
        .flat_map(|(_, v)| v.split(',').map(|s| s.trim().to_ascii_lowercase()))
        .collect();

    headers
        .iter()
        .filter(|(k, _)| {
            let lower = k.to_ascii_lowercase();
            lower != "proxy-connection" && lower != "connection" && !connection_listed.contains(&lower)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod hop_by_hop_tests {
    use super::strip_hop_by_hop;

    #[test]
    fn strips_proxy_connection_and_connection() {
        let headers = vec![
            ("Host".to_string(), "example.com".to_string()),
            ("Proxy-Connection".to_string(), "keep-alive".to_string()),
            ("Connection".to_string(), "keep-alive".to_string()),
        ];
        let stripped = strip_hop_by_hop(&headers);
        assert_eq!(stripped, vec![("Host".to_string(), "example.com".to_string())]);
    }

    #[test]
    fn strips_headers_named_in_connection_value() {
        let headers = vec![
            ("X-Custom".to_string(), "value".to_string()),
            ("Connection".to_string(), "X-Custom".to_string()),
        ];
        let stripped = strip_hop_by_hop(&headers);
        assert!(stripped.is_empty());
    }
}
