//! Typed errors for each component, following the library/application split:
//! modules return a `thiserror` enum, `currier-cli` collapses everything into
//! `anyhow::Result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script compilation failed: {0}")]
    Compile(String),
    #[error("script threw an uncaught exception: {0}")]
    Uncaught(String),
    #[error("script exceeded its time budget")]
    Timeout,
    #[error("script sandbox is poisoned and must be rebuilt")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("request build failed: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum CaError {
    #[error("certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid PEM material: {0}")]
    InvalidPem(String),
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),
    #[error("ca error: {0}")]
    Ca(#[from] CaError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection error: {0}")]
    Connection(String),
}
