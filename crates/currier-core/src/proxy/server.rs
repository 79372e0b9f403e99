//! `ProxyCore` struct and main accept loop, grounded on the teacher's
//! `proxy/server.rs` (`TcpListener::accept` in a loop, `tokio::spawn` per
//! connection, `hyper::server::conn::http1` + `service_fn`). The proxy
//! listener itself is always plain HTTP — clients point their proxy
//! configuration at it and issue `CONNECT` for HTTPS targets, which is where
//! TLS interception (component C5/C6) actually happens, per connection.

use crate::capture::CaptureRing;
use crate::proxy::ca::CaMint;
use crate::proxy::filter::HostFilter;
use crate::proxy::handler::dispatch;
use crate::proxy::tunnel::TunnelContext;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

pub struct ProxyCoreConfig {
    pub listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub include_hosts: Vec<String>,
    pub exclude_hosts: Vec<String>,
    pub capture_capacity: usize,
    pub https_enabled: bool,
}

pub struct ProxyCore {
    listen_addr: SocketAddr,
    ctx: Arc<TunnelContext>,
}

impl ProxyCore {
    pub fn new(config: ProxyCoreConfig) -> Result<Self, anyhow::Error> {
        let ca_mint = CaMint::load_or_create(&config.data_dir)?;
        let host_filter = HostFilter::new(config.include_hosts, config.exclude_hosts, config.https_enabled);
        let capture_ring = CaptureRing::new(config.capture_capacity);

        let ctx = TunnelContext {
            ca_mint: Arc::new(ca_mint),
            host_filter: Arc::new(host_filter),
            capture_ring: Arc::new(capture_ring),
            upstream: reqwest::Client::builder().build()?,
        };

        Ok(Self {
            listen_addr: config.listen_addr,
            ctx: Arc::new(ctx),
        })
    }

    pub fn capture_ring(&self) -> Arc<CaptureRing> {
        Arc::clone(&self.ctx.capture_ring)
    }

    pub fn root_cert_pem(&self) -> String {
        self.ctx.ca_mint.root_cert_pem().to_string()
    }

    /// Bind the listener and return as soon as it's ready, handing back the
    /// bound address (useful when `listen_addr`'s port is `0`) alongside a
    /// handle to the accept loop, which keeps running independently until
    /// `shutdown` fires.
    pub async fn start(
        self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(SocketAddr, tokio::task::JoinHandle<Result<(), anyhow::Error>>), anyhow::Error> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        let bound_addr = listener.local_addr()?;
        info!("Currier proxy listening on http://{bound_addr}");

        let ctx = self.ctx;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, remote_addr) = accepted?;
                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let ctx = Arc::clone(&ctx);
                                async move { dispatch(ctx, req).await }
                            });
                            if let Err(err) = http1::Builder::new()
                                .serve_connection(io, service)
                                .with_upgrades()
                                .await
                            {
                                error!("connection from {remote_addr} ended with error: {err}");
                            }
                        });
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("proxy shutting down");
                            return Ok(());
                        }
                    }
                }
            }
        });

        Ok((bound_addr, handle))
    }

    /// Run the accept loop to completion, blocking until `shutdown` fires.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), anyhow::Error> {
        let (_addr, handle) = self.start(shutdown).await?;
        handle.await?
    }
}
