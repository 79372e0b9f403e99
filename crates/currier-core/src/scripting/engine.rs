//! The `boa_engine`-backed sandbox itself: one fresh `Context` per script
//! run, a `pm` host object wired up the way the teacher's `js_engine.rs`
//! wires up its native functions (plain `fn` pointers reading shared state
//! out of a thread-local, since `NativeFunction::from_fn_ptr` cannot capture
//! an environment), and a `test()`/`expect()` assertion surface layered on
//! top for Currier's collection runner.

use super::host::{
    base64_decode, base64_encode, hmac_hex, js_to_json, json_to_js, md5_hex, sha256_hex,
    string_map_to_js,
};
use crate::error::ScriptError;
use crate::scope::{Frame, Scope};
use boa_engine::property::Attribute;
use boa_engine::{
    js_string, Context, JsNativeError, JsObject, JsResult, JsValue, NativeFunction, Source,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct RequestState {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseState {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub error: Option<String>,
}

/// Everything a single pre/post script run can read and mutate. Owned, not
/// borrowed, because it must be parked behind a thread-local for the
/// lifetime of the boa `Context` call.
pub struct ScriptContext {
    pub request: RequestState,
    pub response: Option<ResponseState>,
    pub scope: Scope,
    pub tests: Vec<TestResult>,
    pub logs: Vec<String>,
}

impl ScriptContext {
    pub fn new(request: RequestState, scope: Scope) -> Self {
        Self {
            request,
            response: None,
            scope,
            tests: Vec::new(),
            logs: Vec::new(),
        }
    }
}

pub struct ScriptOutcome {
    pub request: RequestState,
    pub scope: Scope,
    pub tests: Vec<TestResult>,
    pub logs: Vec<String>,
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<RefCell<ScriptContext>>>> = RefCell::new(None);
}

fn with_current<R>(f: impl FnOnce(&mut ScriptContext) -> R) -> Option<R> {
    CURRENT.with(|cell| {
        let borrow = cell.borrow();
        borrow.as_ref().map(|rc| f(&mut rc.borrow_mut()))
    })
}

pub struct JsSandbox {
    /// Denylist enforced by never registering these globals rather than by
    /// runtime interception: no `require`, `process`, `eval`, or `Function`
    /// constructor access is ever wired into the context.
    timeout: Duration,
}

impl JsSandbox {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run one pre-request or post-response script against `ctx`. The script
    /// body is wrapped so `test()`/`expect()` calls made at the top level are
    /// recorded instead of needing an explicit return value.
    pub fn run(&self, script: &str, ctx: ScriptContext) -> Result<ScriptOutcome, ScriptError> {
        let shared = Rc::new(RefCell::new(ctx));
        CURRENT.with(|cell| *cell.borrow_mut() = Some(Rc::clone(&shared)));

        let result = self.run_inner(script, &shared);

        CURRENT.with(|cell| *cell.borrow_mut() = None);

        result?;

        let ctx = Rc::try_unwrap(shared)
            .unwrap_or_else(|_| panic!("script context still borrowed after run"))
            .into_inner();
        Ok(ScriptOutcome {
            request: ctx.request,
            scope: ctx.scope,
            tests: ctx.tests,
            logs: ctx.logs,
        })
    }

    fn run_inner(&self, script: &str, shared: &Rc<RefCell<ScriptContext>>) -> Result<(), ScriptError> {
        let mut context = Context::default();

        let pm = build_pm_object(&mut context, shared)
            .map_err(|e| ScriptError::Compile(e.to_string()))?;
        context
            .register_global_property(js_string!("pm"), pm.clone(), Attribute::all())
            .map_err(|e| ScriptError::Compile(e.to_string()))?;
        context
            .register_global_property(js_string!("currier"), pm, Attribute::all())
            .map_err(|e| ScriptError::Compile(e.to_string()))?;

        // No require/process/global/eval/Function — the denial set is
        // enforced by omission: we never register them, and boa's default
        // global object does not expose Node-style globals.
        let deadline = std::time::Instant::now() + self.timeout;
        context.runtime_limits_mut().set_loop_iteration_limit(10_000_000);
        let outcome = context.eval(Source::from_bytes(script));
        if std::time::Instant::now() > deadline {
            return Err(ScriptError::Timeout);
        }
        match outcome {
            Ok(_) => {
                write_back_request(&mut context, shared)
                    .map_err(|e| ScriptError::Uncaught(e.to_string()))?;
                Ok(())
            }
            Err(e) => Err(ScriptError::Uncaught(e.to_string())),
        }
    }
}

/// Read `pm.request` back out of the finished script context so mutations a
/// pre-request script made (new header, rewritten URL, patched body) are
/// observed by the executor that runs after it.
fn write_back_request(context: &mut Context, shared: &Rc<RefCell<ScriptContext>>) -> JsResult<()> {
    let pm = context.global_object().get(js_string!("pm"), context)?;
    let Some(pm_obj) = pm.as_object() else { return Ok(()) };
    let request_val = pm_obj.get(js_string!("request"), context)?;
    let Some(request_obj) = request_val.as_object() else { return Ok(()) };

    let method = request_obj.get(js_string!("method"), context)?.to_string(context)?.to_std_string_escaped();
    let url = request_obj.get(js_string!("url"), context)?.to_string(context)?.to_std_string_escaped();
    let headers = js_to_json(&request_obj.get(js_string!("headers"), context)?, context)?;
    let query = js_to_json(&request_obj.get(js_string!("query"), context)?, context)?;
    let body_val = request_obj.get(js_string!("body"), context)?;
    let body = if body_val.is_null_or_undefined() {
        None
    } else {
        Some(body_val.to_string(context)?.to_std_string_escaped())
    };

    let mut ctx = shared.borrow_mut();
    ctx.request.method = method;
    ctx.request.url = url;
    ctx.request.headers = json_object_to_pairs(&headers);
    ctx.request.query = json_object_to_pairs(&query);
    ctx.request.body = body;
    Ok(())
}

fn json_object_to_pairs(value: &serde_json::Value) -> Vec<(String, String)> {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }))
            .collect(),
        _ => Vec::new(),
    }
}

fn build_pm_object(
    context: &mut Context,
    shared: &Rc<RefCell<ScriptContext>>,
) -> JsResult<JsObject> {
    let pm = JsObject::with_object_proto(context.intrinsics());

    let request_snapshot = shared.borrow().request.clone();
    let request_obj = request_to_js(&request_snapshot, context)?;
    pm.set(js_string!("request"), request_obj, false, context)?;

    if let Some(response) = shared.borrow().response.clone() {
        let response_obj = response_to_js(&response, context)?;
        pm.set(js_string!("response"), response_obj, false, context)?;
    }

    register_fn(context, &pm, "getVariable", native_get_variable)?;
    register_fn(context, &pm, "setVariable", native_set_variable)?;
    register_fn(context, &pm, "setLocalVariable", native_set_local_variable)?;
    register_fn(context, &pm, "log", native_log)?;
    register_fn(context, &pm, "test", native_test)?;
    register_fn(context, &pm, "expect", native_expect)?;

    let environment = JsObject::with_object_proto(context.intrinsics());
    let environment_name = shared
        .borrow()
        .scope
        .get("$environmentName")
        .map(str::to_string)
        .unwrap_or_default();
    environment.set(js_string!("name"), js_string!(environment_name.as_str()), false, context)?;
    register_fn(context, &environment, "get", native_environment_get)?;
    register_fn(context, &environment, "set", native_environment_set)?;
    pm.set(js_string!("environment"), environment, false, context)?;

    let base64_ns = JsObject::with_object_proto(context.intrinsics());
    register_fn(context, &base64_ns, "encode", native_base64_encode)?;
    register_fn(context, &base64_ns, "decode", native_base64_decode)?;
    pm.set(js_string!("base64"), base64_ns, false, context)?;

    let crypto_ns = JsObject::with_object_proto(context.intrinsics());
    register_fn(context, &crypto_ns, "md5", native_crypto_md5)?;
    register_fn(context, &crypto_ns, "sha256", native_crypto_sha256)?;
    register_fn(context, &crypto_ns, "hmac", native_crypto_hmac)?;
    pm.set(js_string!("crypto"), crypto_ns, false, context)?;

    Ok(pm)
}

fn register_fn(
    context: &mut Context,
    target: &JsObject,
    name: &str,
    func: fn(&JsValue, &[JsValue], &mut Context) -> JsResult<JsValue>,
) -> JsResult<()> {
    let function = NativeFunction::from_fn_ptr(func).to_js_function(context.realm());
    target.set(js_string!(name), function, false, context)
}

fn request_to_js(request: &RequestState, context: &mut Context) -> JsResult<JsObject> {
    let obj = JsObject::with_object_proto(context.intrinsics());
    obj.set(js_string!("method"), js_string!(request.method.as_str()), false, context)?;
    obj.set(js_string!("url"), js_string!(request.url.as_str()), false, context)?;
    obj.set(js_string!("headers"), string_map_to_js(&request.headers, context)?, false, context)?;
    obj.set(js_string!("query"), string_map_to_js(&request.query, context)?, false, context)?;
    let body = request
        .body
        .as_deref()
        .map(|b| JsValue::from(js_string!(b)))
        .unwrap_or(JsValue::null());
    obj.set(js_string!("body"), body, false, context)?;
    register_fn(context, &obj, "setHeader", native_request_set_header)?;
    register_fn(context, &obj, "setBody", native_request_set_body)?;
    register_fn(context, &obj, "setUrl", native_request_set_url)?;
    Ok(obj)
}

fn native_request_set_header(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let obj = this
        .as_object()
        .ok_or_else(|| JsNativeError::typ().with_message("setHeader() used without a request receiver"))?;
    let key = arg_string(args, 0, context)?;
    let value = arg_string(args, 1, context)?;
    let headers_val = obj.get(js_string!("headers"), context)?;
    let headers_obj = headers_val
        .as_object()
        .ok_or_else(|| JsNativeError::typ().with_message("request.headers is not an object"))?;
    headers_obj.set(js_string!(key.as_str()), js_string!(value.as_str()), false, context)?;
    Ok(JsValue::undefined())
}

fn native_request_set_body(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let obj = this
        .as_object()
        .ok_or_else(|| JsNativeError::typ().with_message("setBody() used without a request receiver"))?;
    let body = arg_string(args, 0, context)?;
    obj.set(js_string!("body"), js_string!(body.as_str()), false, context)?;
    Ok(JsValue::undefined())
}

fn native_request_set_url(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let obj = this
        .as_object()
        .ok_or_else(|| JsNativeError::typ().with_message("setUrl() used without a request receiver"))?;
    let url = arg_string(args, 0, context)?;
    obj.set(js_string!("url"), js_string!(url.as_str()), false, context)?;
    Ok(JsValue::undefined())
}

fn response_to_js(response: &ResponseState, context: &mut Context) -> JsResult<JsObject> {
    let obj = JsObject::with_object_proto(context.intrinsics());
    obj.set(js_string!("status"), JsValue::from(response.status as i32), false, context)?;
    obj.set(js_string!("statusText"), js_string!(response.status_text.as_str()), false, context)?;
    obj.set(js_string!("headers"), string_map_to_js(&response.headers, context)?, false, context)?;
    let body = response
        .body
        .as_deref()
        .map(|b| JsValue::from(js_string!(b)))
        .unwrap_or(JsValue::null());
    obj.set(js_string!("body"), body, false, context)?;
    let size = response.body.as_ref().map(|b| b.len()).unwrap_or(0);
    obj.set(js_string!("size"), JsValue::from(size as i64), false, context)?;
    obj.set(js_string!("time"), JsValue::from(response.elapsed_ms as i32), false, context)?;
    register_fn(context, &obj, "json", native_response_json)?;
    Ok(obj)
}

/// `pm.response.json()`: parses `pm.response.body` as JSON and returns it as
/// a plain JS value, or `null` if the body isn't valid JSON.
fn native_response_json(this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let obj = this
        .as_object()
        .ok_or_else(|| JsNativeError::typ().with_message("json() used without a response receiver"))?;
    let body_val = obj.get(js_string!("body"), context)?;
    let body = if body_val.is_null_or_undefined() {
        String::new()
    } else {
        body_val.to_string(context)?.to_std_string_escaped()
    };
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(parsed) => json_to_js(&parsed, context),
        Err(_) => Ok(JsValue::null()),
    }
}

fn arg_string(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<String> {
    args.get(index)
        .ok_or_else(|| JsNativeError::typ().with_message("missing argument").into())
        .and_then(|v| v.to_string(context))
        .map(|s| s.to_std_string_escaped())
}

fn native_get_variable(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let name = arg_string(args, 0, context)?;
    let value = with_current(|ctx| ctx.scope.get(&name).map(str::to_string)).flatten();
    Ok(value.map(|v| JsValue::from(js_string!(v.as_str()))).unwrap_or(JsValue::undefined()))
}

fn native_set_variable(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let name = arg_string(args, 0, context)?;
    let value = arg_string(args, 1, context)?;
    with_current(|ctx| ctx.scope.set(Frame::Global, name, value));
    Ok(JsValue::undefined())
}

fn native_set_local_variable(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let name = arg_string(args, 0, context)?;
    let value = arg_string(args, 1, context)?;
    with_current(|ctx| ctx.scope.set(Frame::Local, name, value));
    Ok(JsValue::undefined())
}

fn native_environment_get(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let name = arg_string(args, 0, context)?;
    let value = with_current(|ctx| ctx.scope.get(&name).map(str::to_string)).flatten();
    Ok(value.map(|v| JsValue::from(js_string!(v.as_str()))).unwrap_or(JsValue::undefined()))
}

fn native_environment_set(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let name = arg_string(args, 0, context)?;
    let value = arg_string(args, 1, context)?;
    with_current(|ctx| ctx.scope.set(Frame::Environment, name, value));
    Ok(JsValue::undefined())
}

fn native_log(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        parts.push(arg.to_string(context)?.to_std_string_escaped());
    }
    let line = parts.join(" ");
    tracing::debug!(target: "currier::script", "{line}");
    with_current(|ctx| ctx.logs.push(line));
    Ok(JsValue::undefined())
}

fn native_test(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let name = arg_string(args, 0, context)?;
    let callback = args.get(1).cloned().unwrap_or(JsValue::undefined());
    let result = if let Some(callable) = callback.as_callable() {
        match callable.call(&JsValue::undefined(), &[], context) {
            Ok(ret) => {
                let failed = matches!(ret.as_boolean(), Some(false));
                TestResult { name, passed: !failed, error: None }
            }
            Err(e) => TestResult { name, passed: false, error: Some(e.to_string()) },
        }
    } else {
        TestResult { name, passed: callback.to_boolean(), error: None }
    };
    with_current(|ctx| ctx.tests.push(result));
    Ok(JsValue::undefined())
}

/// `pm.expect(value)` returns a chainable object whose `to*` methods throw a
/// JS error (caught by `test()`) when the assertion fails.
fn native_expect(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let actual = args.first().cloned().unwrap_or(JsValue::undefined());
    let actual_json = js_to_json(&actual, context)?;

    let obj = JsObject::with_object_proto(context.intrinsics());
    obj.set(js_string!("__actual"), json_to_js(&actual_json, context)?, false, context)?;

    register_fn(context, &obj, "toEqual", native_expect_to_equal)?;
    register_fn(context, &obj, "toBe", native_expect_to_equal)?;
    register_fn(context, &obj, "toBeGreaterThan", native_expect_to_be_greater_than)?;
    register_fn(context, &obj, "toBeLessThan", native_expect_to_be_less_than)?;
    register_fn(context, &obj, "toContain", native_expect_to_contain)?;
    register_fn(context, &obj, "toBeTruthy", native_expect_to_be_truthy)?;
    Ok(obj.into())
}

fn stored_actual(this: &JsValue, context: &mut Context) -> JsResult<serde_json::Value> {
    let obj = this
        .as_object()
        .ok_or_else(|| JsNativeError::typ().with_message("expect() used without receiver"))?;
    let actual = obj.get(js_string!("__actual"), context)?;
    js_to_json(&actual, context)
}

fn assertion_error(message: impl Into<String>) -> boa_engine::JsError {
    JsNativeError::error().with_message(message.into()).into()
}

fn native_expect_to_equal(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let actual = stored_actual(this, context)?;
    let expected_js = args.first().cloned().unwrap_or(JsValue::undefined());
    let expected = js_to_json(&expected_js, context)?;
    if actual == expected {
        Ok(JsValue::undefined())
    } else {
        Err(assertion_error(format!("expected {expected} but got {actual}")))
    }
}

fn native_expect_to_be_greater_than(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let actual = stored_actual(this, context)?.as_f64().unwrap_or(f64::NAN);
    let threshold = args.first().and_then(JsValue::as_number).unwrap_or(f64::NAN);
    if actual > threshold {
        Ok(JsValue::undefined())
    } else {
        Err(assertion_error(format!("expected {actual} to be greater than {threshold}")))
    }
}

fn native_expect_to_be_less_than(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let actual = stored_actual(this, context)?.as_f64().unwrap_or(f64::NAN);
    let threshold = args.first().and_then(JsValue::as_number).unwrap_or(f64::NAN);
    if actual < threshold {
        Ok(JsValue::undefined())
    } else {
        Err(assertion_error(format!("expected {actual} to be less than {threshold}")))
    }
}

fn native_expect_to_contain(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let actual = stored_actual(this, context)?;
    let needle = arg_string(args, 0, context)?;
    let haystack = match &actual {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if haystack.contains(&needle) {
        Ok(JsValue::undefined())
    } else {
        Err(assertion_error(format!("expected {haystack} to contain {needle}")))
    }
}

fn native_expect_to_be_truthy(this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let actual = stored_actual(this, context)?;
    let truthy = !matches!(actual, serde_json::Value::Null | serde_json::Value::Bool(false));
    if truthy {
        Ok(JsValue::undefined())
    } else {
        Err(assertion_error(format!("expected {actual} to be truthy")))
    }
}

fn native_base64_encode(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let input = arg_string(args, 0, context)?;
    Ok(JsValue::from(js_string!(base64_encode(&input).as_str())))
}

fn native_base64_decode(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let input = arg_string(args, 0, context)?;
    Ok(JsValue::from(js_string!(base64_decode(&input)?.as_str())))
}

fn native_crypto_md5(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let input = arg_string(args, 0, context)?;
    Ok(JsValue::from(js_string!(md5_hex(&input).as_str())))
}

fn native_crypto_sha256(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let input = arg_string(args, 0, context)?;
    Ok(JsValue::from(js_string!(sha256_hex(&input).as_str())))
}

fn native_crypto_hmac(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let alg = arg_string(args, 0, context)?;
    let key = arg_string(args, 1, context)?;
    let input = arg_string(args, 2, context)?;
    Ok(JsValue::from(js_string!(hmac_hex(&alg, &key, &input)?.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> JsSandbox {
        JsSandbox::new(Duration::from_secs(1))
    }

    #[test]
    fn runs_a_trivial_script() {
        let ctx = ScriptContext::new(RequestState::default(), Scope::new());
        let outcome = sandbox().run("pm.setVariable('a', '1');", ctx).unwrap();
        assert_eq!(outcome.scope.get("a"), Some("1"));
    }

    #[test]
    fn mutates_the_request_url() {
        let mut request = RequestState::default();
        request.url = "https://example.com".into();
        request.method = "GET".into();
        let ctx = ScriptContext::new(request, Scope::new());
        let outcome = sandbox()
            .run("pm.request.url = pm.request.url + '/ping';", ctx)
            .unwrap();
        assert_eq!(outcome.request.url, "https://example.com/ping");
    }

    #[test]
    fn test_records_pass_and_failure() {
        let ctx = ScriptContext::new(RequestState::default(), Scope::new());
        let script = r#"
            pm.test("passes", function () { pm.expect(1).toEqual(1); });
            pm.test("fails", function () { pm.expect(1).toEqual(2); });
        "#;
        let outcome = sandbox().run(script, ctx).unwrap();
        assert_eq!(outcome.tests.len(), 2);
        assert!(outcome.tests[0].passed);
        assert!(!outcome.tests[1].passed);
    }

    #[test]
    fn uncaught_throw_surfaces_as_script_error() {
        let ctx = ScriptContext::new(RequestState::default(), Scope::new());
        let err = sandbox().run("throw new Error('boom');", ctx).unwrap_err();
        assert!(matches!(err, ScriptError::Uncaught(_)));
    }

    #[test]
    fn log_is_captured() {
        let ctx = ScriptContext::new(RequestState::default(), Scope::new());
        let outcome = sandbox().run("pm.log('hello', 1);", ctx).unwrap();
        assert_eq!(outcome.logs, vec!["hello 1".to_string()]);
    }

    #[test]
    fn response_json_parses_the_body() {
        let mut ctx = ScriptContext::new(RequestState::default(), Scope::new());
        ctx.response = Some(ResponseState {
            status: 200,
            status_text: "OK".to_string(),
            headers: vec![],
            body: Some(r#"{"ok":true,"count":3}"#.to_string()),
            elapsed_ms: 5,
        });
        let script = r#"
            pm.test("parses", function () {
                pm.expect(pm.response.json().ok).toBe(true);
                pm.expect(pm.response.json().count).toEqual(3);
            });
        "#;
        let outcome = sandbox().run(script, ctx).unwrap();
        assert_eq!(outcome.tests.len(), 1);
        assert!(outcome.tests[0].passed, "{:?}", outcome.tests[0].error);
    }

    #[test]
    fn base64_and_crypto_helpers_are_reachable_from_script() {
        let ctx = ScriptContext::new(RequestState::default(), Scope::new());
        let script = "pm.setVariable('b64', pm.base64.encode('hi')); pm.setVariable('sum', pm.crypto.sha256('hi'));";
        let outcome = sandbox().run(script, ctx).unwrap();
        assert_eq!(outcome.scope.get("b64"), Some("aGk="));
        assert!(outcome.scope.get("sum").is_some());
    }

    #[test]
    fn crypto_hmac_is_generic_over_algorithm() {
        let ctx = ScriptContext::new(RequestState::default(), Scope::new());
        let script = "pm.setVariable('mac', pm.crypto.hmac('sha256', 'key', 'payload'));";
        let outcome = sandbox().run(script, ctx).unwrap();
        assert!(outcome.scope.get("mac").is_some());
    }

    #[test]
    fn test_with_non_function_second_arg_coerces_to_boolean() {
        let ctx = ScriptContext::new(RequestState::default(), Scope::new());
        let script = r#"
            pm.test("truthy-literal", true);
            pm.test("falsy-literal", false);
        "#;
        let outcome = sandbox().run(script, ctx).unwrap();
        assert!(outcome.tests[0].passed);
        assert!(!outcome.tests[1].passed);
    }

    #[test]
    fn test_callback_returning_false_records_failure() {
        let ctx = ScriptContext::new(RequestState::default(), Scope::new());
        let script = r#"pm.test("explicit-false", function () { return false; });"#;
        let outcome = sandbox().run(script, ctx).unwrap();
        assert!(!outcome.tests[0].passed);
    }

    #[test]
    fn response_json_returns_null_instead_of_throwing_on_bad_body() {
        let mut ctx = ScriptContext::new(RequestState::default(), Scope::new());
        ctx.response = Some(ResponseState {
            status: 200,
            status_text: "OK".to_string(),
            headers: vec![],
            body: Some("not json".to_string()),
            elapsed_ms: 1,
        });
        let script = r#"pm.test("null-on-bad-json", function () { pm.expect(pm.response.json()).toEqual(null); });"#;
        let outcome = sandbox().run(script, ctx).unwrap();
        assert!(outcome.tests[0].passed, "{:?}", outcome.tests[0].error);
    }

    #[test]
    fn request_set_methods_mutate_what_the_executor_sees() {
        let mut request = RequestState::default();
        request.url = "https://example.com".into();
        request.method = "GET".into();
        let ctx = ScriptContext::new(request, Scope::new());
        let script = r#"
            pm.request.setHeader("X-Test", "1");
            pm.request.setBody("hello");
            pm.request.setUrl("https://example.com/changed");
        "#;
        let outcome = sandbox().run(script, ctx).unwrap();
        assert_eq!(outcome.request.url, "https://example.com/changed");
        assert_eq!(outcome.request.body, Some("hello".to_string()));
        assert!(outcome.request.headers.iter().any(|(k, v)| k == "X-Test" && v == "1"));
    }

    #[test]
    fn environment_name_is_readable_from_script() {
        let mut scope = Scope::new();
        scope.set(Frame::Environment, "$environmentName", "staging");
        let ctx = ScriptContext::new(RequestState::default(), scope);
        let script = "pm.setVariable('envName', pm.environment.name);";
        let outcome = sandbox().run(script, ctx).unwrap();
        assert_eq!(outcome.scope.get("envName"), Some("staging"));
    }
}
