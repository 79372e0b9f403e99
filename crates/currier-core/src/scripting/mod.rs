//! Scripting sandbox (component C2).
//!
//! A single `boa_engine`-backed JavaScript engine exposes the `pm` host
//! object described by the external interface: request/response access and
//! mutation, variable scopes, base64/crypto helpers, `console.log`-style
//! logging, and a `test()`/`expect()` assertion surface. This generalizes the
//! teacher's `scripting::js_engine` (previously one of three interchangeable
//! fault-injection engines) into Currier's single always-on sandbox.

pub mod engine;
pub mod host;
pub mod pool;

pub use engine::{JsSandbox, ScriptContext, ScriptOutcome, TestResult};
pub use pool::ScriptSandboxPool;
