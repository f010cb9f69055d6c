mod node_executor;
mod scheduler;

pub use node_executor::{NodeRunner, StepOutcome};
pub use scheduler::DagScheduler;

use crate::{
    config::EngineConfig,
    utils::{
        clock::{Clock, MonotonicClock},
        http_client::{HttpSend, ReqwestSender},
    },
    workflow::{
        context::ExecutionContext,
        errors::{FlowrunError, Result, TimeoutScope},
        models::{RunResult, RunStatus, WorkflowDefinition},
        validation::WorkflowValidator,
    },
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run driver: validates a workflow definition, seeds the execution
/// context and drives the top-level scheduler to a `RunResult`.
pub struct WorkflowEngine {
    runner: NodeRunner,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new() -> Result<Self> {
        Ok(Self::with_collaborators(
            Arc::new(ReqwestSender::new()?),
            Arc::new(MonotonicClock),
            EngineConfig::default(),
        ))
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::with_collaborators(
            Arc::new(ReqwestSender::new()?),
            Arc::new(MonotonicClock),
            EngineConfig::from_env()?,
        ))
    }

    /// Inject the HTTP and clock collaborators; tests use this to stub the
    /// network and assert on durations.
    pub fn with_collaborators(
        http: Arc<dyn HttpSend>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let runner = NodeRunner::new(http, clock.clone(), config.max_level_workers);
        Self {
            runner,
            clock,
            config,
        }
    }

    /// Execute a workflow with a generated run id.
    pub async fn execute(&self, definition: &WorkflowDefinition) -> Result<RunResult> {
        self.execute_with_run_id(definition, uuid::Uuid::new_v4().to_string())
            .await
    }

    /// Execute a workflow under a caller-supplied run id.
    ///
    /// Validation failures are the only `Err` surface; everything that
    /// happens after dispatch is reported through `RunResult::status`, with
    /// partial step outputs preserved.
    pub async fn execute_with_run_id(
        &self,
        definition: &WorkflowDefinition,
        run_id: String,
    ) -> Result<RunResult> {
        let report = WorkflowValidator::validate(definition)?;
        for warning in &report.warnings {
            tracing::warn!(
                workflow_id = %definition.id,
                run_id = %run_id,
                "{warning}"
            );
        }

        tracing::info!(
            workflow_id = %definition.id,
            workflow_name = %definition.name,
            run_id = %run_id,
            "starting workflow run"
        );

        let ctx = ExecutionContext::new(run_id.clone(), definition.config.variables.clone());
        let started = self.clock.now();
        let started_at = chrono::Utc::now();
        let cancel = CancellationToken::new();

        let level_timeout = definition
            .config
            .level_timeout
            .unwrap_or(self.config.default_level_timeout_seconds);
        let scheduler = DagScheduler::new(
            self.runner.clone(),
            Duration::from_secs(level_timeout),
            self.config.max_level_workers,
            TimeoutScope::Level,
        );

        let outcome = scheduler
            .execute(&definition.nodes, &definition.edges, &ctx, &cancel)
            .await;
        let duration_ms = self.clock.now().duration_since(started).as_millis() as u64;

        let (status, error) = match outcome {
            Ok(()) => (RunStatus::Completed, None),
            Err(error @ FlowrunError::Timeout { .. }) => {
                (RunStatus::Timeout, Some(error.to_string()))
            }
            Err(error) => (RunStatus::Failed, Some(error.to_string())),
        };

        tracing::info!(
            workflow_id = %definition.id,
            run_id = %run_id,
            status = ?status,
            duration_ms,
            "workflow run finished"
        );

        Ok(RunResult {
            run_id,
            status,
            duration_ms,
            steps: ctx.into_steps(),
            error,
            started_at,
        })
    }
}
