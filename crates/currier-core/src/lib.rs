//! Currier's core library: a scripted HTTP client plus an intercepting
//! HTTPS proxy. See `SPEC_FULL.md` at the workspace root for the full
//! component breakdown; module names below follow that breakdown directly.

pub mod capture;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod model;
pub mod proxy;
pub mod runner;
pub mod scope;
pub mod scripting;
pub mod store;

pub use capture::{CaptureRing, CapturedRequest};
pub use executor::{Executor, ExecutedResponse};
pub use model::{AuthConfig, BodyConfig, Collection, Environment, Folder, RequestDefinition};
pub use proxy::{ProxyCore, ProxyCoreConfig};
pub use runner::{RunResult, RunSummary, Runner};
pub use scope::{Frame, Scope};
pub use store::FileStore;
