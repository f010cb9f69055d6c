use async_trait::async_trait;
use flowrun::utils::clock::MonotonicClock;
use flowrun::utils::http_client::{HttpRequestSpec, HttpResponseData, HttpSend};
use flowrun::{
    EngineConfig, FlowrunError, RunStatus, StepStatus, WorkflowDefinition, WorkflowEngine,
};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// HTTP stub driven by a per-url script of outcomes; replays the last
/// entry once the script is exhausted.
enum Scripted {
    Respond { status: u16, body: serde_json::Value },
    Fail(String),
    Hang { delay_ms: u64 },
}

struct StubHttp {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
}

impl StubHttp {
    fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn script(&self, url: &str, outcomes: Vec<Scripted>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), outcomes.into());
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpSend for StubHttp {
    async fn send(&self, request: HttpRequestSpec) -> flowrun::Result<HttpResponseData> {
        self.calls.lock().unwrap().push(request.url.clone());
        let outcome = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&request.url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().map(|last| match last {
                    Scripted::Respond { status, body } => Scripted::Respond {
                        status: *status,
                        body: body.clone(),
                    },
                    Scripted::Fail(message) => Scripted::Fail(message.clone()),
                    Scripted::Hang { delay_ms } => Scripted::Hang {
                        delay_ms: *delay_ms,
                    },
                }),
                None => None,
            }
        };

        match outcome {
            Some(Scripted::Respond { status, body }) => Ok(HttpResponseData {
                status_code: status,
                headers: HashMap::from([(
                    "content-type".to_string(),
                    "application/json".to_string(),
                )]),
                body: body.to_string(),
            }),
            Some(Scripted::Fail(message)) => Err(FlowrunError::Transport(message)),
            Some(Scripted::Hang { delay_ms }) => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(HttpResponseData {
                    status_code: 200,
                    headers: HashMap::new(),
                    body: "late".to_string(),
                })
            }
            None => Ok(HttpResponseData {
                status_code: 200,
                headers: HashMap::new(),
                body: "{}".to_string(),
            }),
        }
    }
}

fn engine_with(stub: Arc<StubHttp>) -> WorkflowEngine {
    WorkflowEngine::with_collaborators(stub, Arc::new(MonotonicClock), EngineConfig::default())
}

fn definition(value: serde_json::Value) -> WorkflowDefinition {
    serde_json::from_value(value).expect("workflow definition should deserialize")
}

#[tokio::test]
async fn transport_failures_are_retried_until_success() {
    let stub = Arc::new(StubHttp::new());
    stub.script(
        "https://api/flaky",
        vec![
            Scripted::Fail("connection reset".into()),
            Scripted::Fail("connection reset".into()),
            Scripted::Respond {
                status: 200,
                body: json!({"ok": true}),
            },
        ],
    );
    let engine = engine_with(stub.clone());

    let workflow = definition(json!({
        "id": "wf-retry",
        "name": "Retry",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "http", "type": "http_request",
             "config": {"url": "https://api/flaky"},
             "retry": {"max_retries": 2, "delay_seconds": 0}},
            {"id": "end", "type": "end"},
        ],
        "edges": [
            {"from": "start", "to": "http"},
            {"from": "http", "to": "end"},
        ],
    }));

    let result = engine.execute(&workflow).await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.steps["http"].status, StepStatus::Success);
    assert_eq!(result.steps["http"].attempts, 3);
    assert_eq!(stub.call_count(), 3);
}

#[tokio::test]
async fn zero_retries_means_exactly_one_attempt() {
    let stub = Arc::new(StubHttp::new());
    stub.script(
        "https://api/down",
        vec![Scripted::Fail("connection refused".into())],
    );
    let engine = engine_with(stub.clone());

    let workflow = definition(json!({
        "id": "wf-one-shot",
        "name": "OneShot",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "http", "type": "http_request", "config": {"url": "https://api/down"}},
            {"id": "end", "type": "end"},
        ],
        "edges": [
            {"from": "start", "to": "http"},
            {"from": "http", "to": "end"},
        ],
    }));

    let result = engine.execute(&workflow).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.steps["http"].status, StepStatus::Failed);
    assert_eq!(result.steps["http"].attempts, 1);
    assert_eq!(stub.call_count(), 1);
    assert!(result.error.unwrap().contains("http"));
    // Downstream of the failure never ran.
    assert!(!result.steps.contains_key("end"));
}

#[tokio::test(start_paused = true)]
async fn zero_timeout_expires_on_the_first_attempt() {
    let stub = Arc::new(StubHttp::new());
    stub.script("https://api/slow", vec![Scripted::Hang { delay_ms: 1000 }]);
    let engine = engine_with(stub);

    let workflow = definition(json!({
        "id": "wf-timeout",
        "name": "Timeout",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "http", "type": "http_request",
             "config": {"url": "https://api/slow", "timeout": 0}},
            {"id": "end", "type": "end"},
        ],
        "edges": [
            {"from": "start", "to": "http"},
            {"from": "http", "to": "end"},
        ],
    }));

    let result = engine.execute(&workflow).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    let http = &result.steps["http"];
    assert_eq!(http.status, StepStatus::Failed);
    assert_eq!(http.attempts, 1);
    assert!(http.error.as_deref().unwrap().contains("timeout"));
}

#[tokio::test(start_paused = true)]
async fn per_attempt_timeout_is_retried_within_budget() {
    let stub = Arc::new(StubHttp::new());
    stub.script(
        "https://api/sluggish",
        vec![
            Scripted::Hang { delay_ms: 5000 },
            Scripted::Respond {
                status: 200,
                body: json!({"ok": true}),
            },
        ],
    );
    let engine = engine_with(stub.clone());

    let workflow = definition(json!({
        "id": "wf-timeout-retry",
        "name": "TimeoutRetry",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "http", "type": "http_request",
             "config": {"url": "https://api/sluggish", "timeout": 1},
             "retry": {"max_retries": 1, "delay_seconds": 0}},
            {"id": "end", "type": "end"},
        ],
        "edges": [
            {"from": "start", "to": "http"},
            {"from": "http", "to": "end"},
        ],
    }));

    let result = engine.execute(&workflow).await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.steps["http"].status, StepStatus::Success);
    assert_eq!(result.steps["http"].attempts, 2);
    assert_eq!(stub.call_count(), 2);
}

#[tokio::test]
async fn continue_on_error_routes_failure_edges_only() {
    let stub = Arc::new(StubHttp::new());
    stub.script(
        "https://api/down",
        vec![Scripted::Fail("connection refused".into())],
    );
    let engine = engine_with(stub);

    let workflow = definition(json!({
        "id": "wf-continue",
        "name": "Continue",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "http", "type": "http_request",
             "config": {"url": "https://api/down"},
             "error_handling": {"continue_on_error": true}},
            {"id": "recover", "type": "noop"},
            {"id": "normal", "type": "noop"},
            {"id": "end", "type": "end"},
        ],
        "edges": [
            {"from": "start", "to": "http"},
            {"from": "http", "to": "recover", "kind": "failure"},
            {"from": "http", "to": "normal", "kind": "success"},
            {"from": "recover", "to": "end"},
            {"from": "normal", "to": "end"},
        ],
    }));

    let result = engine.execute(&workflow).await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.steps["http"].status, StepStatus::Failed);
    assert!(result.steps.contains_key("recover"));
    assert!(!result.steps.contains_key("normal"));
    assert!(result.steps.contains_key("end"));
}

#[tokio::test]
async fn unrecovered_failure_halts_downstream_but_keeps_sibling_results() {
    let stub = Arc::new(StubHttp::new());
    stub.script(
        "https://api/down",
        vec![Scripted::Fail("connection refused".into())],
    );
    stub.script(
        "https://api/ok",
        vec![Scripted::Respond {
            status: 200,
            body: json!({"ok": true}),
        }],
    );
    let engine = engine_with(stub);

    let workflow = definition(json!({
        "id": "wf-halt",
        "name": "Halt",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "bad", "type": "http_request", "config": {"url": "https://api/down"}},
            {"id": "good", "type": "http_request", "config": {"url": "https://api/ok"}},
            {"id": "after_bad", "type": "noop"},
            {"id": "end", "type": "end"},
        ],
        "edges": [
            {"from": "start", "to": "bad"},
            {"from": "start", "to": "good"},
            {"from": "bad", "to": "after_bad"},
            {"from": "after_bad", "to": "end"},
            {"from": "good", "to": "end"},
        ],
    }));

    let result = engine.execute(&workflow).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.steps["bad"].status, StepStatus::Failed);
    // The sibling that was already in flight keeps its result.
    assert_eq!(result.steps["good"].status, StepStatus::Success);
    // Nothing downstream of the failed node ran.
    assert!(!result.steps.contains_key("after_bad"));
    assert!(!result.steps.contains_key("end"));
}
