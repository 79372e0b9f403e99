//! `CONNECT` tunnel handling (component C6).
//!
//! The teacher never terminates TLS of its own — `proxy/tls.rs` only loads a
//! static certificate for its own HTTPS listener — so this module is new
//! relative to the teacher. The hyper upgrade idiom it uses
//! (`hyper::upgrade::on`) is grounded in `other_examples`' MITM proxy, which
//! drives the same `Upgraded` stream from the `rama` framework; here it is
//! wired to plain `hyper`/`tokio-rustls` to stay on the teacher's stack.

use crate::capture::{CaptureRing, CapturedRequest};
use crate::error::ProxyError;
use crate::proxy::ca::CaMint;
use crate::proxy::filter::HostFilter;
use crate::proxy::tls::acceptor_for_leaf;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::io::copy_bidirectional;
use tokio::net::TcpStream;
use tracing::{debug, warn};

pub struct TunnelContext {
    pub ca_mint: Arc<CaMint>,
    pub host_filter: Arc<HostFilter>,
    pub capture_ring: Arc<CaptureRing>,
    pub upstream: reqwest::Client,
}

/// Handle one accepted `CONNECT` request: reply `200 Connection established`,
/// take the upgraded duplex stream, and either splice it byte-for-byte to
/// the real upstream or terminate TLS locally and intercept every request
/// flowing through it.
pub async fn handle_connect(
    ctx: Arc<TunnelContext>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let target = req.uri().to_string();
    let host = target.split(':').next().unwrap_or(&target).to_string();

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                let should_intercept = ctx.host_filter.should_intercept(&host);
                let outcome = if should_intercept {
                    intercept_tunnel(Arc::clone(&ctx), upgraded, target.clone()).await
                } else {
                    splice_tunnel(upgraded, target.clone()).await
                };
                if let Err(e) = outcome {
                    warn!("tunnel to {target} ended with error: {e}");
                }
            }
            Err(e) => warn!("failed to upgrade CONNECT tunnel: {e}"),
        }
    });

    Ok(Response::builder()
        .status(200)
        .body(Full::new(Bytes::from_static(b"")))
        .expect("static response always builds"))
}

async fn splice_tunnel(
    upgraded: hyper::upgrade::Upgraded,
    target: String,
) -> Result<(), ProxyError> {
    let mut client_io = TokioIo::new(upgraded);
    let mut upstream = TcpStream::connect(&target).await?;
    copy_bidirectional(&mut client_io, &mut upstream).await?;
    Ok(())
}

async fn intercept_tunnel(
    ctx: Arc<TunnelContext>,
    upgraded: hyper::upgrade::Upgraded,
    target: String,
) -> Result<(), ProxyError> {
    let started = std::time::Instant::now();
    let host = target.split(':').next().unwrap_or(&target).to_string();

    let leaf = match ctx.ca_mint.leaf_for_host(&host) {
        Ok(leaf) => leaf,
        Err(e) => {
            warn!("failed to mint leaf certificate for {host}: {e}");
            record_mint_failure(&ctx, &host, started.elapsed());
            return Ok(());
        }
    };
    let acceptor = match acceptor_for_leaf(leaf.chain, leaf.key) {
        Ok(acceptor) => acceptor,
        Err(e) => {
            warn!("failed to build TLS acceptor for {host}: {e}");
            record_mint_failure(&ctx, &host, started.elapsed());
            return Ok(());
        }
    };

    let client_io = TokioIo::new(upgraded);
    let tls_stream = match acceptor.accept(client_io).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("TLS handshake with client failed for {host}: {e}");
            record_mint_failure(&ctx, &host, started.elapsed());
            return Ok(());
        }
    };
    let io = TokioIo::new(tls_stream);

    let ctx_for_service = Arc::clone(&ctx);
    let target_for_service = target.clone();
    let service = service_fn(move |req: Request<Incoming>| {
        let ctx = Arc::clone(&ctx_for_service);
        let target = target_for_service.clone();
        async move { forward_intercepted_request(ctx, target, req).await }
    });

    http1::Builder::new()
        .serve_connection(io, service)
        .await
        .map_err(|e| ProxyError::Connection(format!("intercepted connection error: {e}")))
}

/// Record a capture for a tunnel that never got past certificate minting or
/// the client TLS handshake, since no request/response pair ever existed.
fn record_mint_failure(ctx: &Arc<TunnelContext>, host: &str, duration: std::time::Duration) {
    ctx.capture_ring.push(CapturedRequest {
        id: uuid::Uuid::new_v4(),
        host: host.to_string(),
        is_https: true,
        method: String::new(),
        path: String::new(),
        request_headers: vec![],
        request_body: None,
        response_status: None,
        response_headers: vec![],
        response_body: None,
        duration,
        error: Some("tls-mint-failed".to_string()),
        captured_at: chrono::Utc::now(),
    });
}

async fn forward_intercepted_request(
    ctx: Arc<TunnelContext>,
    target: String,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let started = std::time::Instant::now();
    let method = req.method().clone();
    let path_and_query = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/").to_string();
    let request_headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
    let request_headers = crate::proxy::strip_hop_by_hop(&request_headers);
    let request_body = req.collect().await?.to_bytes();

    let host = target.split(':').next().unwrap_or(&target).to_string();
    let upstream_url = format!("https://{target}{path_and_query}");
    debug!("forwarding intercepted request to {upstream_url}");

    let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);
    let mut builder = ctx.upstream.request(reqwest_method, &upstream_url);
    for (name, value) in &request_headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder = builder.body(request_body.to_vec());

    let (response_status, response_headers, response_body) = match builder.send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let headers: Vec<(String, String)> = resp
                .headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                .collect();
            let body = resp.bytes().await.unwrap_or_default().to_vec();
            (status, headers, body)
        }
        Err(e) => {
            warn!("upstream forward to {upstream_url} failed: {e}");
            (502, vec![], Vec::new())
        }
    };

    let captured = CapturedRequest {
        id: uuid::Uuid::new_v4(),
        host,
        is_https: true,
        method: method.to_string(),
        path: path_and_query,
        request_headers,
        request_body: Some(request_body.to_vec()),
        response_status: Some(response_status),
        response_headers: response_headers.clone(),
        response_body: Some(response_body.clone()),
        duration: started.elapsed(),
        error: None,
        captured_at: chrono::Utc::now(),
    };
    ctx.capture_ring.push(captured);
    crate::metrics::record_proxy_request(method.as_str(), response_status);

    let mut response_builder = Response::builder().status(response_status);
    for (name, value) in &response_headers {
        response_builder = response_builder.header(name, value);
    }
    Ok(response_builder
        .body(Full::new(Bytes::from(response_body)))
        .expect("upstream-derived response always builds"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_host_is_split_from_port() {
        let target = "example.com:443".to_string();
        let host = target.split(':').next().unwrap_or(&target).to_string();
        assert_eq!(host, "example.com");
    }
}
