//! Request dispatch by HTTP verb (component C6): `CONNECT` goes to the
//! tunnel state machine, everything else is treated as a plain forward-proxy
//! request (used when a client points its HTTP, not HTTPS, traffic at
//! Currier directly).

use crate::capture::CapturedRequest;
use crate::proxy::tunnel::{handle_connect, TunnelContext};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::sync::Arc;

pub async fn dispatch(
    ctx: Arc<TunnelContext>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    if req.method() == Method::CONNECT {
        return handle_connect(ctx, req).await;
    }

    let started = std::time::Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let host = uri.host().unwrap_or_default().to_string();
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/").to_string();
    let headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
    let headers = crate::proxy::strip_hop_by_hop(&headers);
    let body = req.collect().await?.to_bytes();

    let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);
    let mut builder = ctx.upstream.request(reqwest_method, uri.to_string());
    for (name, value) in &headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder = builder.body(body.to_vec());

    let (status, response_headers, response_body) = match builder.send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let response_headers: Vec<(String, String)> = resp
                .headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                .collect();
            let response_body = resp.bytes().await.unwrap_or_default().to_vec();
            (status, response_headers, response_body)
        }
        Err(_) => (502, vec![], Vec::new()),
    };
    crate::metrics::record_proxy_request(method.as_str(), status);

    let captured = CapturedRequest {
        id: uuid::Uuid::new_v4(),
        host,
        is_https: false,
        method: method.to_string(),
        path,
        request_headers: headers,
        request_body: Some(body.to_vec()),
        response_status: Some(status),
        response_headers: response_headers.clone(),
        response_body: Some(response_body.clone()),
        duration: started.elapsed(),
        error: None,
        captured_at: chrono::Utc::now(),
    };
    ctx.capture_ring.push(captured);

    let mut response_builder = Response::builder().status(status);
    for (name, value) in &response_headers {
        response_builder = response_builder.header(name, value);
    }
    Ok(response_builder
        .body(Full::new(Bytes::from(response_body)))
        .expect("upstream-derived response always builds"))
}
