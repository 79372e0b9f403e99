//! Bounded pool that runs scripts off the async executor, generalizing the
//! teacher's `scripting/script_pool.rs` (which kept Rhai/Lua interpreter
//! state off the tokio reactor threads) to Currier's single JS sandbox.
//! Every script still gets a fresh `JsSandbox`/`Context` — pooling here
//! bounds *concurrency*, not interpreter reuse, since `boa_engine::Context`
//! is not `Send`.

use super::engine::{JsSandbox, ScriptContext, ScriptOutcome};
use crate::error::ScriptError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub struct ScriptSandboxPool {
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl ScriptSandboxPool {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub async fn run(&self, script: String, ctx: ScriptContext) -> Result<ScriptOutcome, ScriptError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");
        let timeout = self.timeout;

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let sandbox = JsSandbox::new(timeout);
            sandbox.run(&script, ctx)
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(_join_error) => Err(ScriptError::Poisoned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use crate::scripting::engine::RequestState;

    #[tokio::test]
    async fn runs_a_script_through_the_pool() {
        let pool = ScriptSandboxPool::new(2, Duration::from_secs(1));
        let ctx = ScriptContext::new(RequestState::default(), Scope::new());
        let outcome = pool
            .run("pm.setVariable('ran', 'yes');".to_string(), ctx)
            .await
            .unwrap();
        assert_eq!(outcome.scope.get("ran"), Some("yes"));
    }

    #[tokio::test]
    async fn bounds_concurrency_without_deadlocking() {
        let pool = Arc::new(ScriptSandboxPool::new(1, Duration::from_secs(1)));
        let mut handles = Vec::new();
        for i in 0..4 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                let ctx = ScriptContext::new(RequestState::default(), Scope::new());
                pool.run(format!("pm.setVariable('i', '{i}');"), ctx).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
    }
}
