//! Collection Runner (component C4).
//!
//! Owns one `Executor` and one `ScriptSandboxPool` for the lifetime of a run
//! — mirroring the way the teacher's `ProxyServer` builds its long-lived
//! shared state once in `::new` and drives every request through it — and
//! walks the collection tree depth-first pre-order, running pre/post scripts
//! around each request exactly as `Collection::walk` yields them.

use crate::executor::Executor;
use crate::model::{AuthConfig, BodyConfig, Collection, RequestDefinition};
use crate::scope::{Frame, Scope};
use crate::scripting::engine::{RequestState, ScriptContext, TestResult};
use crate::scripting::ScriptSandboxPool;
use chrono::{DateTime, Utc};
use hyper::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;

pub struct RunResult {
    pub request_id: Uuid,
    pub name: String,
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub duration: Duration,
    pub tests: Vec<TestResult>,
    pub logs: Vec<String>,
    pub error: Option<String>,
}

pub struct RunSummary {
    pub results: Vec<RunResult>,
    pub total_requests: usize,
    pub executed: usize,
    pub requests_passed: usize,
    pub requests_failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_duration: Duration,
}

impl RunSummary {
    pub fn tests_passed(&self) -> usize {
        self.results.iter().flat_map(|r| &r.tests).filter(|t| t.passed).count()
    }

    pub fn tests_failed(&self) -> usize {
        self.results.iter().flat_map(|r| &r.tests).filter(|t| !t.passed).count()
    }
}

fn status_text_for(status: u16) -> Option<String> {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(str::to_string)
}

/// Extract a request body's un-interpolated raw template, so the sandbox
/// sees the same `{{var}}`-laden text the executor would otherwise
/// interpolate itself — avoiding double interpolation when a script reads or
/// rewrites `pm.request.body`.
fn body_to_raw_string(body: Option<&BodyConfig>) -> Option<String> {
    match body {
        None | Some(BodyConfig::None) => None,
        Some(BodyConfig::Raw { content, .. }) => Some(content.clone()),
        Some(BodyConfig::Json { value }) => Some(value.to_string()),
        Some(BodyConfig::FormUrlEncoded { fields }) => Some(
            fields
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&"),
        ),
    }
}

fn body_content_type(body: Option<&BodyConfig>) -> String {
    match body {
        None | Some(BodyConfig::None) => String::new(),
        Some(BodyConfig::Raw { content_type, .. }) => content_type.clone(),
        Some(BodyConfig::Json { .. }) => "application/json".to_string(),
        Some(BodyConfig::FormUrlEncoded { .. }) => "application/x-www-form-urlencoded".to_string(),
    }
}

pub struct Runner {
    executor: Executor,
    sandbox_pool: ScriptSandboxPool,
}

impl Runner {
    pub fn new(executor: Executor, script_timeout: Duration, max_concurrent_scripts: usize) -> Self {
        Self {
            executor,
            sandbox_pool: ScriptSandboxPool::new(max_concurrent_scripts, script_timeout),
        }
    }

    /// Run every request in `collection` depth-first pre-order against
    /// `environment_vars`. `cancel` is checked between requests so a caller
    /// can stop the run early without tearing down the runner.
    pub async fn run(
        &self,
        collection: &Collection,
        environment_vars: Vec<(String, String)>,
        mut cancel: watch::Receiver<bool>,
    ) -> RunSummary {
        let started = Instant::now();
        let started_at = Utc::now();
        let mut base_scope = Scope::new();
        base_scope.set(Frame::Builtin, "$currier", "true");
        base_scope.extend(Frame::Environment, environment_vars);
        base_scope.extend(Frame::Collection, collection.variables.clone().into_iter());

        let mut results = Vec::new();

        if let Some(script) = &collection.pre_request_script {
            self.run_collection_script(script, &mut base_scope).await;
        }

        for (folders, request) in collection.walk() {
            if *cancel.borrow() {
                break;
            }
            let mut scope = base_scope.clone();
            for folder in &folders {
                scope.extend(Frame::Collection, Vec::new());
                if let Some(script) = &folder.pre_request_script {
                    self.run_collection_script(script, &mut scope).await;
                }
            }

            // AuthConfig precedence: request > nearest enclosing folder > collection.
            let inherited_auth = folders
                .iter()
                .rev()
                .find_map(|folder| folder.auth.as_ref())
                .or(collection.auth.as_ref());

            let result = self.run_one(request, scope.clone(), inherited_auth).await;
            results.push(result);

            for folder in folders.iter().rev() {
                if let Some(script) = &folder.post_response_script {
                    self.run_collection_script(script, &mut scope).await;
                }
            }

            if cancel.has_changed().unwrap_or(false) {
                let _ = cancel.changed().await;
            }
        }

        if let Some(script) = &collection.post_response_script {
            self.run_collection_script(script, &mut base_scope).await;
        }

        crate::metrics::record_run_duration(&collection.name, started.elapsed().as_millis() as f64);

        let total_requests = results.len();
        let executed = results.iter().filter(|r| r.error.is_none()).count();
        let requests_passed = results
            .iter()
            .filter(|r| r.error.is_none() && r.tests.iter().all(|t| t.passed))
            .count();
        let requests_failed = total_requests - requests_passed;

        RunSummary {
            results,
            total_requests,
            executed,
            requests_passed,
            requests_failed,
            started_at,
            finished_at: Utc::now(),
            total_duration: started.elapsed(),
        }
    }

    async fn run_collection_script(&self, script: &str, scope: &mut Scope) {
        let ctx = ScriptContext::new(RequestState::default(), scope.clone());
        if let Ok(outcome) = self.sandbox_pool.run(script.to_string(), ctx).await {
            *scope = outcome.scope;
        }
    }

    async fn run_one(
        &self,
        request: &RequestDefinition,
        mut scope: Scope,
        inherited_auth: Option<&AuthConfig>,
    ) -> RunResult {
        let request_started = Instant::now();
        let mut logs = Vec::new();
        let mut tests = Vec::new();

        let mut request_state = RequestState {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            query: request.query.clone(),
            body: body_to_raw_string(request.body.as_ref()),
        };

        if let Some(script) = &request.pre_request_script {
            let ctx = ScriptContext::new(request_state.clone(), scope.clone());
            match self.sandbox_pool.run(script.clone(), ctx).await {
                Ok(outcome) => {
                    request_state = outcome.request;
                    scope = outcome.scope;
                    logs.extend(outcome.logs);
                    tests.extend(outcome.tests);
                }
                Err(e) => {
                    return RunResult {
                        request_id: request.id,
                        name: request.name.clone(),
                        method: request.method.clone(),
                        url: request.url.clone(),
                        status: None,
                        status_text: None,
                        duration: request_started.elapsed(),
                        tests,
                        logs,
                        error: Some(e.to_string()),
                    };
                }
            }
        }

        let mut effective = request.clone();
        effective.method = request_state.method.clone();
        effective.url = request_state.url.clone();
        effective.headers = request_state.headers.clone();
        effective.query = request_state.query.clone();
        effective.body = request_state.body.clone().map(|content| BodyConfig::Raw {
            content,
            content_type: body_content_type(request.body.as_ref()),
        });
        if effective.auth.is_none() {
            effective.auth = inherited_auth.cloned();
        }

        let response = match self.executor.send(&effective, &scope).await {
            Ok(response) => response,
            Err(e) => {
                return RunResult {
                    request_id: request.id,
                    name: request.name.clone(),
                    method: effective.method.clone(),
                    url: effective.url.clone(),
                    status: None,
                    status_text: None,
                    duration: request_started.elapsed(),
                    tests,
                    logs,
                    error: Some(e.to_string()),
                };
            }
        };

        let mut post_script = request.post_response_script.clone().unwrap_or_default();
        for test in &effective.tests {
            // Declarative `{name, expr}` tests run through the same
            // sandbox as scripted `pm.test()` calls, appended after any
            // user post-response script so script-derived variables are
            // visible to the declarative expression.
            post_script.push_str(&format!("\npm.test({:?}, () => ({}));", test.name, test.expr));
        }
        if !post_script.trim().is_empty() {
            let mut ctx = ScriptContext::new(request_state, scope.clone());
            ctx.response = Some(crate::scripting::engine::ResponseState {
                status: response.status,
                status_text: status_text_for(response.status).unwrap_or_default(),
                headers: response.headers.clone(),
                body: String::from_utf8(response.body.to_vec()).ok(),
                elapsed_ms: response.timing.total_ms,
            });
            if let Ok(outcome) = self.sandbox_pool.run(post_script, ctx).await {
                logs.extend(outcome.logs);
                tests.extend(outcome.tests);
            }
        }

        RunResult {
            request_id: request.id,
            name: request.name.clone(),
            method: effective.method.clone(),
            url: effective.url.clone(),
            status: Some(response.status),
            status_text: status_text_for(response.status),
            duration: request_started.elapsed(),
            tests,
            logs,
            error: None,
        }
    }
}

/// Convenience constructor used by tests and the CLI `run` subcommand to
/// build a cancellation channel that never fires.
pub fn no_cancellation() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

#[allow(dead_code)]
pub type SharedRunner = Arc<Runner>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_tests_across_requests() {
        let now = Utc::now();
        let results = vec![RunResult {
            request_id: Uuid::new_v4(),
            name: "a".into(),
            method: "GET".into(),
            url: "https://example.com".into(),
            status: Some(200),
            status_text: Some("OK".into()),
            duration: Duration::from_millis(1),
            tests: vec![
                TestResult { name: "t1".into(), passed: true, error: None },
                TestResult { name: "t2".into(), passed: false, error: Some("x".into()) },
            ],
            logs: vec![],
            error: None,
        }];
        let summary = RunSummary {
            total_requests: results.len(),
            executed: 1,
            requests_passed: 0,
            requests_failed: 1,
            started_at: now,
            finished_at: now,
            total_duration: Duration::from_millis(1),
            results,
        };
        assert_eq!(summary.tests_passed(), 1);
        assert_eq!(summary.tests_failed(), 1);
    }
}
