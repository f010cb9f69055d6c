use super::node_executor::{NodeRunner, StepOutcome};
use crate::workflow::{
    context::ExecutionContext,
    errors::{FlowrunError, Result, TimeoutScope},
    models::{Edge, EdgeKind, Node, StepRecord, StepStatus},
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

/// Executes one (sub-)graph to completion with level-by-level dispatch.
///
/// The scheduler is a plain value parameterized by its worker bound and
/// per-level deadline; fork, path and loop executors build their own
/// instances over their enclosed sub-graphs. There is no global scheduler.
#[derive(Clone)]
pub struct DagScheduler {
    runner: NodeRunner,
    level_timeout: Duration,
    max_workers: usize,
    scope: TimeoutScope,
}

/// Routing verdict for one (source, target) pair: `None` until the source
/// reaches a terminal status, then whether any connecting edge is
/// traversable. Parallel success/failure edges from the same source count
/// as a single decision, which is what lets diamond joins fire.
type DecisionMap<'a> = HashMap<&'a str, HashMap<&'a str, Option<bool>>>;

impl DagScheduler {
    pub fn new(
        runner: NodeRunner,
        level_timeout: Duration,
        max_workers: usize,
        scope: TimeoutScope,
    ) -> Self {
        Self {
            runner,
            level_timeout,
            max_workers: max_workers.max(1),
            scope,
        }
    }

    pub async fn execute(
        &self,
        nodes: &[Node],
        edges: &[Edge],
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let node_map: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut out_edges: HashMap<&str, Vec<&Edge>> = HashMap::new();
        let mut decisions: DecisionMap = HashMap::new();
        for edge in edges {
            out_edges.entry(edge.from.as_str()).or_default().push(edge);
            decisions
                .entry(edge.to.as_str())
                .or_default()
                .entry(edge.from.as_str())
                .or_insert(None);
        }

        let mut remaining: HashSet<&str> = node_map.keys().copied().collect();
        let mut first_error: Option<FlowrunError> = None;

        while !remaining.is_empty() {
            if cancel.is_cancelled() {
                return Err(FlowrunError::Cancelled);
            }

            Self::cascade_skips(ctx, &mut remaining, &out_edges, &mut decisions);
            if remaining.is_empty() {
                break;
            }

            // A level is every not-yet-run node whose incoming decisions are
            // all resolved with at least one enabled.
            let ready: Vec<&Node> = nodes
                .iter()
                .filter(|n| remaining.contains(n.id.as_str()))
                .filter(|n| match decisions.get(n.id.as_str()) {
                    None => true,
                    Some(sources) => {
                        sources.values().all(|d| d.is_some())
                            && sources.values().any(|d| *d == Some(true))
                    }
                })
                .collect();

            if ready.is_empty() {
                return Err(FlowrunError::Internal(format!(
                    "scheduler stalled with {} unresolved nodes",
                    remaining.len()
                )));
            }

            let level_ids: Vec<String> = ready.iter().map(|n| n.id.clone()).collect();
            for id in &level_ids {
                remaining.remove(id.as_str());
            }
            tracing::debug!(
                run_id = %ctx.run_id(),
                nodes = level_ids.len(),
                "dispatching scheduler level"
            );

            let level_cancel = cancel.child_token();
            let semaphore = Arc::new(Semaphore::new(self.max_workers));
            let mut in_flight: JoinSet<StepOutcome> = JoinSet::new();
            for node in ready {
                let permits = semaphore.clone();
                let run = self
                    .runner
                    .run(node.clone(), ctx.clone(), level_cancel.clone());
                in_flight.spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    run.await
                });
            }

            let deadline = tokio::time::Instant::now() + self.level_timeout;
            let mut timed_out = false;
            loop {
                match tokio::time::timeout_at(deadline, in_flight.join_next()).await {
                    Ok(None) => break,
                    Ok(Some(Ok(outcome))) => {
                        Self::complete(ctx, outcome, &out_edges, &mut decisions, &mut first_error);
                    }
                    Ok(Some(Err(join_error))) => {
                        if first_error.is_none() {
                            first_error = Some(FlowrunError::Internal(format!(
                                "task join error: {join_error}"
                            )));
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
                    scope = %self.scope,
                    seconds = self.level_timeout.as_secs_f64(),
                    "level timeout - cancelling in-flight nodes"
                );
                level_cancel.cancel();
                in_flight.shutdown().await;
                for id in &level_ids {
                    if !ctx.has_step(id) {
                        ctx.record_step(
                            id,
                            StepRecord {
                                status: StepStatus::Cancelled,
                                outputs: serde_json::Value::Object(Default::default()),
                                error: Some("cancelled by level timeout".to_string()),
                                attempts: 0,
                                duration_ms: 0,
                            },
                        );
                    }
                }
                return Err(FlowrunError::Timeout {
                    scope: self.scope,
                    seconds: self.level_timeout.as_secs_f64(),
                });
            }

            if let Some(error) = first_error.take() {
                return Err(error);
            }
        }

        Ok(())
    }

    /// Remove nodes whose every incoming decision resolved disabled, and
    /// propagate the disablement through their outgoing edges. Skipped
    /// nodes never appear in `steps`.
    fn cascade_skips<'a>(
        ctx: &ExecutionContext,
        remaining: &mut HashSet<&'a str>,
        out_edges: &HashMap<&'a str, Vec<&'a Edge>>,
        decisions: &mut DecisionMap<'a>,
    ) {
        loop {
            let skipped: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|id| {
                    decisions.get(id).is_some_and(|sources| {
                        !sources.is_empty()
                            && sources.values().all(|d| d.is_some())
                            && !sources.values().any(|d| *d == Some(true))
                    })
                })
                .collect();
            if skipped.is_empty() {
                return;
            }
            for id in skipped {
                remaining.remove(id);
                tracing::debug!(
                    run_id = %ctx.run_id(),
                    node_id = %id,
                    "node skipped - no enabled incoming edge"
                );
                Self::disable_outgoing(id, out_edges, decisions);
            }
        }
    }

    fn disable_outgoing<'a>(
        id: &str,
        out_edges: &HashMap<&'a str, Vec<&'a Edge>>,
        decisions: &mut DecisionMap<'a>,
    ) {
        let Some(edges) = out_edges.get(id) else {
            return;
        };
        for edge in edges {
            let slot = decisions
                .entry(edge.to.as_str())
                .or_default()
                .entry(edge.from.as_str())
                .or_insert(None);
            if slot.is_none() {
                *slot = Some(false);
            }
        }
    }

    fn complete<'a>(
        ctx: &ExecutionContext,
        outcome: StepOutcome,
        out_edges: &HashMap<&'a str, Vec<&'a Edge>>,
        decisions: &mut DecisionMap<'a>,
        first_error: &mut Option<FlowrunError>,
    ) {
        let StepOutcome {
            node_id,
            record,
            branch,
            halt,
        } = outcome;
        let status = record.status;
        tracing::info!(
            run_id = %ctx.run_id(),
            node_id = %node_id,
            status = %status,
            attempts = record.attempts,
            "node finished"
        );
        ctx.record_step(&node_id, record);

        if let Some(error) = halt {
            if first_error.is_none() {
                *first_error = Some(error);
            }
        }

        if let Some(edges) = out_edges.get(node_id.as_str()) {
            for edge in edges {
                let enabled = edge_traversable(edge.kind, status, branch);
                let slot = decisions
                    .entry(edge.to.as_str())
                    .or_default()
                    .entry(edge.from.as_str())
                    .or_insert(None);
                *slot = Some(slot.unwrap_or(false) || enabled);
            }
        }
    }
}

/// Routing rule for a single edge given its source's terminal state. For
/// condition sources a `success` edge is the semantic equivalent of `true`.
fn edge_traversable(kind: EdgeKind, status: StepStatus, branch: Option<bool>) -> bool {
    match status {
        StepStatus::Success | StepStatus::Skipped => match kind {
            EdgeKind::Default => true,
            EdgeKind::Success => branch.unwrap_or(true),
            EdgeKind::True => branch == Some(true),
            EdgeKind::False => branch == Some(false),
            EdgeKind::Failure => false,
        },
        StepStatus::Failed => matches!(kind, EdgeKind::Failure | EdgeKind::Default),
        StepStatus::Cancelled => false,
    }
}
