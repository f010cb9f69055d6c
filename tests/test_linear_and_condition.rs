use async_trait::async_trait;
use flowrun::utils::clock::MonotonicClock;
use flowrun::utils::http_client::{HttpRequestSpec, HttpResponseData, HttpSend};
use flowrun::{EngineConfig, RunStatus, StepStatus, WorkflowDefinition, WorkflowEngine};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Deterministic HTTP stub: replies 200 with a fixed JSON body per url.
struct StubHttp {
    bodies: HashMap<String, serde_json::Value>,
    calls: Mutex<Vec<String>>,
}

impl StubHttp {
    fn new(bodies: &[(&str, serde_json::Value)]) -> Self {
        Self {
            bodies: bodies
                .iter()
                .map(|(url, body)| (url.to_string(), body.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl HttpSend for StubHttp {
    async fn send(&self, request: HttpRequestSpec) -> flowrun::Result<HttpResponseData> {
        self.calls.lock().unwrap().push(request.url.clone());
        let body = self
            .bodies
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| json!({"ok": true}));
        Ok(HttpResponseData {
            status_code: 200,
            headers: HashMap::from([(
                "content-type".to_string(),
                "application/json".to_string(),
            )]),
            body: body.to_string(),
        })
    }
}

fn engine_with(stub: Arc<StubHttp>) -> WorkflowEngine {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    WorkflowEngine::with_collaborators(stub, Arc::new(MonotonicClock), EngineConfig::default())
}

fn definition(value: serde_json::Value) -> WorkflowDefinition {
    serde_json::from_value(value).expect("workflow definition should deserialize")
}

#[tokio::test]
async fn linear_workflow_completes_with_http_outputs() -> anyhow::Result<()> {
    let stub = Arc::new(StubHttp::new(&[("https://api/ok", json!({"v": 1}))]));
    let engine = engine_with(stub.clone());

    let workflow = definition(json!({
        "id": "wf-linear",
        "name": "Linear",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "http", "type": "http_request", "config": {"url": "https://api/ok"}},
            {"id": "end", "type": "end"},
        ],
        "edges": [
            {"from": "start", "to": "http"},
            {"from": "http", "to": "end"},
        ],
    }));

    let result = engine.execute(&workflow).await?;

    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.error.is_none());
    assert_eq!(result.steps.len(), 3);

    let http = &result.steps["http"];
    assert_eq!(http.status, StepStatus::Success);
    assert_eq!(http.attempts, 1);
    assert_eq!(http.outputs["status_code"], json!(200));
    assert_eq!(http.outputs["result"], json!({"v": 1}));
    assert_eq!(http.outputs["url"], json!("https://api/ok"));
    assert_eq!(stub.calls.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn condition_routes_only_the_matching_branch() {
    let stub = Arc::new(StubHttp::new(&[("https://api/ok", json!({"v": 1}))]));
    let engine = engine_with(stub);

    let workflow = definition(json!({
        "id": "wf-branch",
        "name": "Branch",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "http", "type": "http_request", "config": {"url": "https://api/ok"}},
            {"id": "check", "type": "condition",
             "config": {"expression": "{{steps.http.outputs.status_code}} == 200"}},
            {"id": "succ", "type": "noop"},
            {"id": "fail", "type": "noop"},
            {"id": "end", "type": "end"},
        ],
        "edges": [
            {"from": "start", "to": "http"},
            {"from": "http", "to": "check"},
            {"from": "check", "to": "succ", "kind": "true"},
            {"from": "check", "to": "fail", "kind": "false"},
            {"from": "succ", "to": "end"},
            {"from": "fail", "to": "end"},
        ],
    }));

    let result = engine.execute(&workflow).await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.steps["check"].outputs["result"], json!(true));
    assert_eq!(result.steps["check"].outputs["branch"], json!("true"));
    assert!(result.steps.contains_key("succ"));
    // The untaken branch never appears in steps.
    assert!(!result.steps.contains_key("fail"));
    // The end node still fires once the skipped branch is accounted for.
    assert!(result.steps.contains_key("end"));
}

#[tokio::test]
async fn workflow_variables_feed_templates() {
    let stub = Arc::new(StubHttp::new(&[(
        "https://api.example.com/v1/users",
        json!({"users": []}),
    )]));
    let engine = engine_with(stub.clone());

    let workflow = definition(json!({
        "id": "wf-vars",
        "name": "Variables",
        "config": {"variables": {"host": "api.example.com", "version": "v1"}},
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "http", "type": "http_request",
             "config": {"url": "https://{{variables.host}}/{{variables.version}}/users"}},
            {"id": "end", "type": "end"},
        ],
        "edges": [
            {"from": "start", "to": "http"},
            {"from": "http", "to": "end"},
        ],
    }));

    let result = engine.execute(&workflow).await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(
        result.steps["http"].outputs["url"],
        json!("https://api.example.com/v1/users")
    );
    assert_eq!(
        stub.calls.lock().unwrap()[0],
        "https://api.example.com/v1/users"
    );
}

#[tokio::test]
async fn rerun_with_identical_stub_yields_identical_steps() {
    let workflow = definition(json!({
        "id": "wf-idem",
        "name": "Idempotent",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "http", "type": "http_request", "config": {"url": "https://api/ok"}},
            {"id": "check", "type": "condition",
             "config": {"expression": "{{steps.http.outputs.status_code}} == 200"}},
            {"id": "done", "type": "noop"},
            {"id": "end", "type": "end"},
        ],
        "edges": [
            {"from": "start", "to": "http"},
            {"from": "http", "to": "check"},
            {"from": "check", "to": "done", "kind": "true"},
            {"from": "done", "to": "end"},
        ],
    }));

    let mut runs = Vec::new();
    for _ in 0..2 {
        let stub = Arc::new(StubHttp::new(&[("https://api/ok", json!({"v": 1}))]));
        let engine = engine_with(stub);
        runs.push(engine.execute(&workflow).await.unwrap());
    }

    let strip_durations = |result: &flowrun::RunResult| -> HashMap<String, serde_json::Value> {
        result
            .steps
            .iter()
            .map(|(id, record)| {
                let mut value = serde_json::to_value(record).unwrap();
                value.as_object_mut().unwrap().remove("duration_ms");
                if let Some(outputs) = value
                    .get_mut("outputs")
                    .and_then(serde_json::Value::as_object_mut)
                {
                    outputs.remove("duration_ms");
                }
                (id.clone(), value)
            })
            .collect()
    };

    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(strip_durations(&runs[0]), strip_durations(&runs[1]));
}
