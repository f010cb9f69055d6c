use super::scheduler::DagScheduler;
use crate::{
    utils::{clock::Clock, http_client::{HttpRequestSpec, HttpSend}},
    workflow::{
        context::{ExecutionContext, ForkBudget, LoopFrame},
        errors::{FlowrunError, Result, TimeoutScope},
        expression,
        models::{
            ConditionConfig, Edge, ForkNodeConfig, HttpRequestConfig, LoopNodeConfig, Node,
            NodeKind, PathNodeConfig, StepRecord, StepStatus,
        },
        template::TemplateResolver,
    },
};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

/// Terminal result of one node execution, handed back to the scheduler.
pub struct StepOutcome {
    pub node_id: String,
    pub record: StepRecord,
    /// Branch taken by a condition node, used for true/false edge routing.
    pub branch: Option<bool>,
    /// Error to surface to the owning scheduler when the failure is not
    /// absorbed by `continue_on_error`.
    pub halt: Option<FlowrunError>,
}

/// What one successful `execute` pass produced. Control-flow nodes report
/// aggregated failures here (with their partial outputs) instead of through
/// `Err`, because those failures carry results and must not be retried.
struct ExecOutput {
    outputs: Value,
    branch: Option<bool>,
    skipped: bool,
    failure: Option<String>,
}

impl ExecOutput {
    fn success(outputs: Value) -> Self {
        Self {
            outputs,
            branch: None,
            skipped: false,
            failure: None,
        }
    }
}

/// Result of running one fork path or path-node sub-graph.
struct SubGraphRun {
    id: String,
    condition_met: bool,
    status: &'static str,
    steps: HashMap<String, StepRecord>,
    error: Option<String>,
}

/// Executes a single node: template resolution, per-attempt timeout, retry
/// with backoff delay, `continue_on_error` semantics, and per-type
/// dispatch. Cheap to clone; the scheduler clones it into every task.
#[derive(Clone)]
pub struct NodeRunner {
    http: Arc<dyn HttpSend>,
    clock: Arc<dyn Clock>,
    level_workers: usize,
}

impl NodeRunner {
    pub fn new(http: Arc<dyn HttpSend>, clock: Arc<dyn Clock>, level_workers: usize) -> Self {
        Self {
            http,
            clock,
            level_workers: level_workers.max(1),
        }
    }

    /// Boxed entry point so the scheduler can spawn it and control-flow
    /// executors can recurse through it without an infinite future type.
    pub fn run(
        &self,
        node: Node,
        ctx: ExecutionContext,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, StepOutcome> {
        let runner = self.clone();
        Box::pin(async move { runner.run_inner(node, ctx, cancel).await })
    }

    async fn run_inner(
        self,
        node: Node,
        ctx: ExecutionContext,
        cancel: CancellationToken,
    ) -> StepOutcome {
        let started = self.clock.now();
        tracing::info!(
            run_id = %ctx.run_id(),
            node_id = %node.id,
            node_type = %node.kind,
            "node started"
        );

        let allowed = node.retry.max_retries + 1;
        // Read from the raw config: the timed region below includes template
        // resolution, so the timeout cannot itself be a template.
        let per_attempt = node
            .config
            .get("timeout")
            .and_then(|v| v.as_f64())
            .map(Duration::from_secs_f64);

        let mut attempt = 0u32;
        let mut last_error: Option<FlowrunError> = None;
        let mut failed_outputs = Value::Object(Default::default());

        while attempt < allowed {
            attempt += 1;

            let pass = self.execute_once(&node, &ctx, &cancel);
            let result = match per_attempt {
                Some(limit) => match tokio::time::timeout(limit, pass).await {
                    Ok(inner) => inner,
                    Err(_elapsed) => {
                        tracing::warn!(
                            run_id = %ctx.run_id(),
                            node_id = %node.id,
                            attempt,
                            seconds = limit.as_secs_f64(),
                            "node attempt timed out"
                        );
                        Err(FlowrunError::Timeout {
                            scope: TimeoutScope::Node,
                            seconds: limit.as_secs_f64(),
                        })
                    }
                },
                None => pass.await,
            };

            match result {
                Ok(output) if output.failure.is_none() => {
                    let status = if output.skipped {
                        StepStatus::Skipped
                    } else {
                        StepStatus::Success
                    };
                    return StepOutcome {
                        node_id: node.id,
                        record: StepRecord {
                            status,
                            outputs: output.outputs,
                            error: None,
                            attempts: attempt,
                            duration_ms: self.elapsed_ms(started),
                        },
                        branch: output.branch,
                        halt: None,
                    };
                }
                Ok(output) => {
                    if cancel.is_cancelled() {
                        return self.cancelled_outcome(node.id, attempt, started);
                    }
                    // Aggregated sub-graph failure: carries partial outputs
                    // and is never retried.
                    failed_outputs = output.outputs;
                    last_error = Some(FlowrunError::NodeFailure {
                        node_id: node.id.clone(),
                        message: output.failure.unwrap_or_default(),
                    });
                    break;
                }
                Err(FlowrunError::Cancelled) => {
                    return self.cancelled_outcome(node.id, attempt, started);
                }
                Err(error) if cancel.is_cancelled() => {
                    tracing::debug!(
                        run_id = %ctx.run_id(),
                        node_id = %node.id,
                        error = %error,
                        "node cancelled mid-attempt"
                    );
                    return self.cancelled_outcome(node.id, attempt, started);
                }
                Err(error) if attempt < allowed && error.is_retryable() => {
                    tracing::warn!(
                        run_id = %ctx.run_id(),
                        node_id = %node.id,
                        attempt,
                        error = %error,
                        "node attempt failed - retrying"
                    );
                    last_error = Some(error);
                    if node.retry.delay_seconds > 0.0 {
                        tokio::time::sleep(Duration::from_secs_f64(node.retry.delay_seconds))
                            .await;
                    }
                }
                Err(error) => {
                    last_error = Some(error);
                    break;
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "node failed".to_string());
        tracing::warn!(
            run_id = %ctx.run_id(),
            node_id = %node.id,
            attempts = attempt,
            error = %message,
            continue_on_error = node.error_handling.continue_on_error,
            "node failed"
        );

        let halt = if node.error_handling.continue_on_error {
            None
        } else {
            Some(FlowrunError::NodeFailure {
                node_id: node.id.clone(),
                message: message.clone(),
            })
        };
        StepOutcome {
            node_id: node.id,
            record: StepRecord {
                status: StepStatus::Failed,
                outputs: failed_outputs,
                error: Some(message),
                attempts: attempt,
                duration_ms: self.elapsed_ms(started),
            },
            branch: None,
            halt,
        }
    }

    fn cancelled_outcome(
        &self,
        node_id: String,
        attempt: u32,
        started: std::time::Instant,
    ) -> StepOutcome {
        StepOutcome {
            node_id,
            record: StepRecord {
                status: StepStatus::Cancelled,
                outputs: Value::Object(Default::default()),
                error: Some("cancelled".to_string()),
                attempts: attempt,
                duration_ms: self.elapsed_ms(started),
            },
            branch: None,
            halt: None,
        }
    }

    fn elapsed_ms(&self, started: std::time::Instant) -> u64 {
        self.clock.now().duration_since(started).as_millis() as u64
    }

    async fn execute_once(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        if cancel.is_cancelled() {
            return Err(FlowrunError::Cancelled);
        }
        match node.kind {
            NodeKind::Start | NodeKind::End | NodeKind::Noop => {
                Ok(ExecOutput::success(json!({})))
            }
            NodeKind::HttpRequest => self.execute_http(node, ctx, cancel).await,
            NodeKind::Condition => self.execute_condition(node, ctx),
            NodeKind::Loop => self.execute_loop(node, ctx, cancel).await,
            NodeKind::Fork => self.execute_fork(node, ctx, cancel).await,
            NodeKind::Path => self.execute_path(node, ctx, cancel).await,
        }
    }

    async fn execute_http(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        let snapshot = ctx.snapshot();
        let resolved = TemplateResolver::new(&snapshot).resolve_value(&node.config)?;
        let config: HttpRequestConfig = serde_json::from_value(resolved)
            .map_err(|e| invalid_config(&node.id, node.kind, &e))?;

        let request = HttpRequestSpec {
            url: config.url.clone(),
            method: config.method.clone(),
            headers: config.headers,
            body: config.body,
            timeout: config.timeout.map(Duration::from_secs_f64),
            verify_ssl: config.verify_ssl,
        };

        let started = self.clock.now();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FlowrunError::Cancelled),
            sent = self.http.send(request) => sent?,
        };
        let duration_ms = self.elapsed_ms(started);

        let content_type = response
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
            .unwrap_or_default();
        let result = if content_type.contains("json") {
            serde_json::from_str(&response.body)
                .unwrap_or_else(|_| Value::String(response.body.clone()))
        } else {
            Value::String(response.body.clone())
        };

        // Non-2xx is still a delivered response; branching on the status
        // code is a condition node's job.
        Ok(ExecOutput::success(json!({
            "status_code": response.status_code,
            "headers": response.headers,
            "body": response.body,
            "result": result,
            "duration_ms": duration_ms,
            "url": config.url,
            "method": config.method.to_string(),
        })))
    }

    fn execute_condition(&self, node: &Node, ctx: &ExecutionContext) -> Result<ExecOutput> {
        let config: ConditionConfig = serde_json::from_value(node.config.clone())
            .map_err(|e| invalid_config(&node.id, node.kind, &e))?;
        let snapshot = ctx.snapshot();
        let substituted = TemplateResolver::new(&snapshot).resolve_to_string(&config.expression)?;
        let result = expression::evaluate_bool(&substituted)?;
        tracing::debug!(
            run_id = %ctx.run_id(),
            node_id = %node.id,
            expression = %substituted,
            result,
            "condition evaluated"
        );
        Ok(ExecOutput {
            outputs: json!({
                "result": result,
                "branch": if result { "true" } else { "false" },
            }),
            branch: Some(result),
            skipped: false,
            failure: None,
        })
    }

    async fn execute_loop(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        let config: LoopNodeConfig = serde_json::from_value(node.config.clone())
            .map_err(|e| invalid_config(&node.id, node.kind, &e))?;

        let snapshot = ctx.snapshot();
        let resolver = TemplateResolver::new(&snapshot);
        let items: Vec<Value> = match &config.items {
            Value::String(template) => match resolver.resolve_string(template)? {
                Value::Array(items) => items,
                other => {
                    return Err(FlowrunError::Validation(format!(
                        "loop '{}': items resolved to {} instead of an array",
                        node.id,
                        value_kind(&other)
                    )))
                }
            },
            Value::Array(raw) => raw
                .iter()
                .map(|item| resolver.resolve_value(item))
                .collect::<Result<_>>()?,
            other => {
                return Err(FlowrunError::Validation(format!(
                    "loop '{}': items must be an array or a template string, got {}",
                    node.id,
                    value_kind(other)
                )))
            }
        };

        let length = items.len();
        if length == 0 {
            return Ok(ExecOutput::success(json!({"iterations": [], "count": 0})));
        }

        let scheduler = DagScheduler::new(
            self.clone(),
            Duration::from_secs(config.level_timeout),
            self.level_workers,
            TimeoutScope::Level,
        );

        if config.parallel {
            self.run_loop_parallel(node, config, items, scheduler, ctx, cancel)
                .await
        } else {
            self.run_loop_sequential(node, config, items, scheduler, ctx, cancel)
                .await
        }
    }

    async fn run_loop_sequential(
        &self,
        node: &Node,
        config: LoopNodeConfig,
        items: Vec<Value>,
        scheduler: DagScheduler,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        let length = items.len();
        let mut iterations: Vec<Value> = Vec::with_capacity(length);
        let mut failure = None;

        for (index, item) in items.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(FlowrunError::Cancelled);
            }
            let iteration = ctx.child_scope().pushed(LoopFrame {
                item,
                index,
                length,
            });
            let run = scheduler
                .execute(&config.nodes, &config.edges, &iteration, cancel)
                .await;

            let steps = iteration.local_steps();
            merge_iteration_steps(ctx, &steps, index);
            iterations.push(serde_json::to_value(&steps)?);

            if let Err(error) = run {
                tracing::warn!(
                    run_id = %ctx.run_id(),
                    node_id = %node.id,
                    iteration = index,
                    error = %error,
                    "loop iteration failed"
                );
                failure = Some(error.to_string());
                break;
            }
        }

        Ok(ExecOutput {
            outputs: json!({"iterations": iterations, "count": iterations.len()}),
            branch: None,
            skipped: false,
            failure,
        })
    }

    async fn run_loop_parallel(
        &self,
        node: &Node,
        config: LoopNodeConfig,
        items: Vec<Value>,
        scheduler: DagScheduler,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        let length = items.len();
        let nodes = Arc::new(config.nodes);
        let edges = Arc::new(config.edges);
        let loop_cancel = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
        let mut in_flight: JoinSet<(usize, HashMap<String, StepRecord>, Result<()>)> =
            JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let iteration = ctx.child_scope().pushed(LoopFrame {
                item,
                index,
                length,
            });
            let scheduler = scheduler.clone();
            let nodes = nodes.clone();
            let edges = edges.clone();
            let iter_cancel = loop_cancel.clone();
            let permits = semaphore.clone();
            in_flight.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let run = scheduler
                    .execute(nodes.as_slice(), edges.as_slice(), &iteration, &iter_cancel)
                    .await;
                (index, iteration.local_steps(), run)
            });
        }

        let mut slots: Vec<Option<HashMap<String, StepRecord>>> = vec![None; length];
        let mut failure = None;
        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok((index, steps, run)) => {
                    slots[index] = Some(steps);
                    if let Err(error) = run {
                        tracing::warn!(
                            run_id = %ctx.run_id(),
                            node_id = %node.id,
                            iteration = index,
                            error = %error,
                            "loop iteration failed"
                        );
                        if failure.is_none() {
                            failure = Some(error.to_string());
                        }
                        loop_cancel.cancel();
                    }
                }
                Err(join_error) => {
                    if failure.is_none() {
                        failure = Some(format!("task join error: {join_error}"));
                    }
                    loop_cancel.cancel();
                }
            }
        }

        let mut iterations = Vec::with_capacity(length);
        for (index, slot) in slots.into_iter().enumerate() {
            let steps = slot.unwrap_or_default();
            merge_iteration_steps(ctx, &steps, index);
            iterations.push(serde_json::to_value(&steps)?);
        }

        Ok(ExecOutput {
            outputs: json!({"iterations": iterations, "count": iterations.len()}),
            branch: None,
            skipped: false,
            failure,
        })
    }

    async fn execute_fork(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        let config: ForkNodeConfig = serde_json::from_value(node.config.clone())
            .map_err(|e| invalid_config(&node.id, node.kind, &e))?;

        let total_paths = config.paths.len();
        if total_paths == 0 {
            return Ok(ExecOutput::success(json!({
                "type": "fork",
                "total_paths": 0,
                "paths_executed": 0,
                "paths": {},
            })));
        }

        let mut total_nodes = 0usize;
        for path in &config.paths {
            if path.nodes.len() > config.max_nodes_per_path {
                return Err(FlowrunError::BudgetExceeded(format!(
                    "fork '{}' path '{}' has {} nodes, cap is {}",
                    node.id,
                    path.id,
                    path.nodes.len(),
                    config.max_nodes_per_path
                )));
            }
            total_nodes += path.nodes.len();
        }
        if total_nodes > config.max_total_nodes {
            return Err(FlowrunError::BudgetExceeded(format!(
                "fork '{}' spans {total_nodes} nodes, cap is {}",
                node.id, config.max_total_nodes
            )));
        }
        if let Some(enclosing) = ctx.fork_budget() {
            enclosing.charge(total_nodes)?;
        }
        let budget = Arc::new(ForkBudget::new(config.max_total_nodes, ctx.fork_budget()));

        let fork_cancel = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(config.max_workers.min(total_paths).max(1)));
        let mut in_flight: JoinSet<SubGraphRun> = JoinSet::new();
        let mut path_ids = Vec::with_capacity(total_paths);

        for path in config.paths {
            path_ids.push(path.id.clone());
            let child = ctx.child_scope().with_fork_budget(budget.clone());
            let runner = self.clone();
            let path_cancel = fork_cancel.clone();
            let permits = semaphore.clone();
            in_flight.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                runner
                    .run_sub_graph(
                        path.id,
                        path.condition,
                        path.nodes,
                        path.edges,
                        path.level_timeout,
                        child,
                        path_cancel,
                    )
                    .await
            });
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(config.timeout);
        let mut results: HashMap<String, SubGraphRun> = HashMap::new();
        let mut join_failure: Option<String> = None;
        let mut timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, in_flight.join_next()).await {
                Ok(None) => break,
                Ok(Some(Ok(run))) => {
                    results.insert(run.id.clone(), run);
                }
                Ok(Some(Err(join_error))) => {
                    if join_failure.is_none() {
                        join_failure = Some(format!("task join error: {join_error}"));
                    }
                }
                Err(_elapsed) => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            tracing::warn!(
                run_id = %ctx.run_id(),
                node_id = %node.id,
                seconds = config.timeout,
                "fork timeout - cancelling outstanding paths"
            );
            fork_cancel.cancel();
            in_flight.shutdown().await;
        }

        let mut paths = serde_json::Map::new();
        let mut paths_executed = 0u64;
        let mut all_ok = join_failure.is_none();
        for id in &path_ids {
            match results.remove(id) {
                Some(run) => {
                    for (step_id, record) in &run.steps {
                        ctx.record_step(step_id, record.clone());
                    }
                    if matches!(run.status, "success" | "failed") {
                        paths_executed += 1;
                    }
                    if !matches!(run.status, "success" | "skipped") {
                        all_ok = false;
                    }
                    let mut entry = json!({
                        "condition_met": run.condition_met,
                        "status": run.status,
                        "nodes": steps_summary(&run.steps),
                    });
                    if let (Some(error), Some(object)) = (&run.error, entry.as_object_mut()) {
                        object.insert("error".to_string(), Value::String(error.clone()));
                    }
                    paths.insert(id.clone(), entry);
                }
                None => {
                    all_ok = false;
                    paths.insert(
                        id.clone(),
                        json!({
                            "condition_met": Value::Null,
                            "status": "cancelled",
                            "nodes": {},
                        }),
                    );
                }
            }
        }

        let outputs = json!({
            "type": "fork",
            "total_paths": total_paths,
            "paths_executed": paths_executed,
            "paths": paths,
        });
        let failure =
            (!all_ok).then(|| join_failure.unwrap_or_else(|| "one or more fork paths did not succeed".to_string()));
        Ok(ExecOutput {
            outputs,
            branch: None,
            skipped: false,
            failure,
        })
    }

    async fn execute_path(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        let config: PathNodeConfig = serde_json::from_value(node.config.clone())
            .map_err(|e| invalid_config(&node.id, node.kind, &e))?;

        let child = ctx.child_scope();
        let run = self
            .run_sub_graph(
                node.id.clone(),
                config.condition,
                config.nodes,
                config.edges,
                config.level_timeout,
                child,
                cancel.clone(),
            )
            .await;

        if !run.condition_met && run.status == "skipped" {
            return Ok(ExecOutput {
                outputs: json!({"condition_met": false, "status": "skipped"}),
                branch: None,
                skipped: true,
                failure: None,
            });
        }

        for (step_id, record) in &run.steps {
            ctx.record_step(step_id, record.clone());
        }

        let failure = (run.status != "success").then(|| {
            run.error
                .clone()
                .unwrap_or_else(|| format!("path sub-graph finished with status {}", run.status))
        });
        Ok(ExecOutput {
            outputs: json!({
                "condition_met": run.condition_met,
                "status": run.status,
                "nodes": steps_summary(&run.steps),
            }),
            branch: None,
            skipped: false,
            failure,
        })
    }

    /// Gate evaluation plus sub-scheduler invocation, shared by fork paths
    /// and standalone path nodes.
    #[allow(clippy::too_many_arguments)]
    async fn run_sub_graph(
        &self,
        id: String,
        condition: String,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        level_timeout: u64,
        child: ExecutionContext,
        cancel: CancellationToken,
    ) -> SubGraphRun {
        let met = {
            let snapshot = child.snapshot();
            TemplateResolver::new(&snapshot)
                .resolve_to_string(&condition)
                .and_then(|substituted| expression::evaluate_bool(&substituted))
        };
        let met = match met {
            Ok(met) => met,
            Err(error) => {
                return SubGraphRun {
                    id,
                    condition_met: false,
                    status: "failed",
                    steps: HashMap::new(),
                    error: Some(error.to_string()),
                }
            }
        };
        if !met {
            return SubGraphRun {
                id,
                condition_met: false,
                status: "skipped",
                steps: HashMap::new(),
                error: None,
            };
        }

        let scheduler = DagScheduler::new(
            self.clone(),
            Duration::from_secs(level_timeout),
            self.level_workers,
            TimeoutScope::Path,
        );
        let run = scheduler.execute(&nodes, &edges, &child, &cancel).await;
        let steps = child.local_steps();
        match run {
            Ok(()) => SubGraphRun {
                id,
                condition_met: true,
                status: "success",
                steps,
                error: None,
            },
            Err(error) => {
                let status = if cancel.is_cancelled() || matches!(error, FlowrunError::Cancelled) {
                    "cancelled"
                } else {
                    "failed"
                };
                SubGraphRun {
                    id,
                    condition_met: true,
                    status,
                    steps,
                    error: Some(error.to_string()),
                }
            }
        }
    }
}

fn invalid_config(node_id: &str, kind: NodeKind, error: &serde_json::Error) -> FlowrunError {
    FlowrunError::Validation(format!("node '{node_id}' has an invalid {kind} config: {error}"))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Iteration steps land in the parent context under composite keys so
/// concurrent iterations can never overwrite each other.
fn merge_iteration_steps(
    ctx: &ExecutionContext,
    steps: &HashMap<String, StepRecord>,
    index: usize,
) {
    for (step_id, record) in steps {
        ctx.record_step(&format!("{step_id}[{index}]"), record.clone());
    }
}

fn steps_summary(steps: &HashMap<String, StepRecord>) -> Value {
    let mut summary = serde_json::Map::with_capacity(steps.len());
    for (step_id, record) in steps {
        summary.insert(
            step_id.clone(),
            json!({"status": record.status, "output": record.outputs}),
        );
    }
    Value::Object(summary)
}
