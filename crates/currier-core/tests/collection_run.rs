//! Integration tests for the collection runner and request executor,
//! placed at the crate's `tests/` root the way the teacher separates
//! integration coverage from its colocated `#[cfg(test)]` unit modules.

use bytes::Bytes;
use currier_core::model::{Collection, Item, RequestDefinition, TestDefinition};
use currier_core::runner::{no_cancellation, Runner};
use currier_core::Executor;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::TcpListener;
use uuid::Uuid;

/// Start a loopback server that replies `200 {"ok":true}` to every request
/// and return its address. Mirrors S4's "a server that returns 200 {"ok":true}".
async fn spawn_ok_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(|_req: Request<hyper::body::Incoming>| async move {
                    Ok::<_, hyper::Error>(
                        Response::builder()
                            .status(200)
                            .header("Content-Type", "application/json")
                            .body(Full::new(Bytes::from_static(b"{\"ok\":true}")))
                            .unwrap(),
                    )
                });
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });
    addr
}

fn request(name: &str, url: &str) -> RequestDefinition {
    RequestDefinition {
        id: Uuid::new_v4(),
        name: name.to_string(),
        protocol: "http".to_string(),
        method: "GET".to_string(),
        url: url.to_string(),
        headers: vec![],
        query: vec![],
        body: None,
        auth: None,
        pre_request_script: None,
        post_response_script: None,
        tests: vec![],
        timeout_ms: Some(5_000),
        verify_tls: None,
        follow_redirects: true,
        max_redirects: 10,
    }
}

#[tokio::test]
async fn run_reports_a_transport_error_for_an_unroutable_host() {
    let mut collection = Collection::new("smoke");
    collection
        .items
        .push(Item::Request(request("unreachable", "http://127.0.0.1:1")));

    let executor = Executor::new(true, Duration::from_secs(2));
    let runner = Runner::new(executor, Duration::from_secs(1), 2);

    let summary = runner.run(&collection, vec![], no_cancellation()).await;
    assert_eq!(summary.results.len(), 1);
    assert!(summary.results[0].error.is_some());
    assert!(summary.results[0].status.is_none());
}

#[tokio::test]
async fn pre_request_script_failure_does_not_run_the_request() {
    let mut collection = Collection::new("scripted");
    let mut req = request("broken-script", "http://127.0.0.1:1");
    req.pre_request_script = Some("throw new Error('boom');".to_string());
    collection.items.push(Item::Request(req));

    let executor = Executor::new(true, Duration::from_secs(2));
    let runner = Runner::new(executor, Duration::from_secs(1), 2);

    let summary = runner.run(&collection, vec![], no_cancellation()).await;
    assert_eq!(summary.results.len(), 1);
    assert!(summary.results[0].error.is_some());
    // Zero tests recorded for a run that failed before any test() call is
    // not counted as a failure at the aggregate level (see DESIGN.md, Open
    // Question (a)): tests_failed only counts tests that actually ran.
    assert_eq!(summary.tests_failed(), 0);
}

#[tokio::test]
async fn declarative_tests_are_evaluated_against_the_response() {
    let addr = spawn_ok_server().await;
    let mut collection = Collection::new("declarative");
    let mut req = request("ok-check", &format!("http://{addr}/ping"));
    req.tests = vec![
        TestDefinition { name: "status is 200".to_string(), expr: "pm.response.status === 200".to_string() },
        TestDefinition { name: "body says ok".to_string(), expr: "pm.response.json().ok === true".to_string() },
    ];
    collection.items.push(Item::Request(req));

    let executor = Executor::new(true, Duration::from_secs(5));
    let runner = Runner::new(executor, Duration::from_secs(2), 2);

    let summary = runner.run(&collection, vec![], no_cancellation()).await;
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.tests_passed(), 2);
    assert_eq!(summary.tests_failed(), 0);
}
