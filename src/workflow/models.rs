use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Immutable workflow definition as loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub config: WorkflowConfig,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Deadline applied to each scheduler level, in seconds. Falls back to
    /// the engine-level default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_timeout: Option<u64>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

fn default_level_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    End,
    HttpRequest,
    Condition,
    Loop,
    Fork,
    Path,
    Noop,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::HttpRequest => "http_request",
            NodeKind::Condition => "condition",
            NodeKind::Loop => "loop",
            NodeKind::Fork => "fork",
            NodeKind::Path => "path",
            NodeKind::Noop => "noop",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Type-specific configuration; templates are resolved against the
    /// execution context before the typed config is parsed.
    #[serde(default = "empty_config")]
    pub config: Value,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn empty_config() -> Value {
    Value::Object(serde_json::Map::new())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHandling {
    #[serde(default)]
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub delay_seconds: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            delay_seconds: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Success,
    Failure,
    True,
    False,
    Default,
}

impl Default for EdgeKind {
    fn default() -> Self {
        EdgeKind::Success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HttpMethod {
    #[serde(alias = "GET")]
    Get,
    #[serde(alias = "POST")]
    Post,
    #[serde(alias = "PUT")]
    Put,
    #[serde(alias = "DELETE")]
    Delete,
    #[serde(alias = "PATCH")]
    Patch,
}

impl Default for HttpMethod {
    fn default() -> Self {
        HttpMethod::Get
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Delete => write!(f, "DELETE"),
            HttpMethod::Patch => write!(f, "PATCH"),
        }
    }
}

/// Typed view of an `http_request` node's resolved config.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpRequestConfig {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    /// Per-attempt timeout in seconds.
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionConfig {
    pub expression: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoopNodeConfig {
    /// Template expression or literal array; must resolve to an array.
    pub items: Value,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default = "default_level_timeout")]
    pub level_timeout: u64,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_loop_workers")]
    pub max_workers: usize,
}

fn default_loop_workers() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForkNodeConfig {
    #[serde(default)]
    pub paths: Vec<ForkPath>,
    #[serde(default = "default_fork_workers")]
    pub max_workers: usize,
    /// Overall fork deadline in seconds.
    #[serde(default = "default_fork_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_nodes_per_path")]
    pub max_nodes_per_path: usize,
    #[serde(default = "default_max_total_nodes")]
    pub max_total_nodes: usize,
}

fn default_fork_workers() -> usize {
    5
}

fn default_fork_timeout() -> u64 {
    600
}

fn default_max_nodes_per_path() -> usize {
    50
}

fn default_max_total_nodes() -> usize {
    200
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForkPath {
    pub id: String,
    #[serde(default = "default_condition")]
    pub condition: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default = "default_level_timeout")]
    pub level_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathNodeConfig {
    #[serde(default = "default_condition")]
    pub condition: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default = "default_level_timeout")]
    pub level_timeout: u64,
}

fn default_condition() -> String {
    "true".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
    Cancelled,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
            StepStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal record of one executed node within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub status: StepStatus,
    pub outputs: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Timeout,
}

/// Final result of a workflow run, returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub steps: HashMap<String, StepRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}
