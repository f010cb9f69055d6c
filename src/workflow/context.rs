use crate::workflow::{
    errors::{FlowrunError, Result},
    models::StepRecord,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// One iteration frame pushed by a `loop` node, visible to all lexically
/// enclosed executions of that iteration's lineage.
#[derive(Debug, Clone)]
pub struct LoopFrame {
    pub item: Value,
    pub index: usize,
    pub length: usize,
}

/// Node-count budget charged by fork nodes. Budgets chain upward so a
/// nested fork's nodes count against every enclosing fork's cap.
#[derive(Debug)]
pub struct ForkBudget {
    limit: usize,
    used: AtomicUsize,
    parent: Option<Arc<ForkBudget>>,
}

impl ForkBudget {
    pub fn new(limit: usize, parent: Option<Arc<ForkBudget>>) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
            parent,
        }
    }

    /// Charge `count` nodes against this budget and every ancestor.
    pub fn charge(&self, count: usize) -> Result<()> {
        let used = self.used.fetch_add(count, Ordering::SeqCst) + count;
        if used > self.limit {
            return Err(FlowrunError::BudgetExceeded(format!(
                "{used} nodes charged against a cap of {}",
                self.limit
            )));
        }
        if let Some(parent) = &self.parent {
            parent.charge(count)?;
        }
        Ok(())
    }
}

/// Mutable per-run state shared between the scheduler and node executors.
///
/// Cloning is cheap: variables and the step map are shared, the loop-frame
/// stack is cloned so each execution lineage carries its own frames.
#[derive(Clone)]
pub struct ExecutionContext {
    run_id: Arc<str>,
    variables: Arc<HashMap<String, Value>>,
    steps: Arc<Mutex<HashMap<String, StepRecord>>>,
    /// Frozen view of the enclosing scope's steps, layered under local
    /// writes. Populated by `child_scope`.
    parent_steps: Option<Arc<HashMap<String, StepRecord>>>,
    loop_stack: Vec<LoopFrame>,
    fork_budget: Option<Arc<ForkBudget>>,
}

/// Copy-on-read view handed to the template evaluator so long-running
/// evaluations never hold the step mutex.
pub struct ContextSnapshot {
    pub variables: Arc<HashMap<String, Value>>,
    pub steps: HashMap<String, StepRecord>,
    pub loop_stack: Vec<LoopFrame>,
}

impl ContextSnapshot {
    pub fn current_frame(&self) -> Option<&LoopFrame> {
        self.loop_stack.last()
    }
}

impl ExecutionContext {
    pub fn new(run_id: String, variables: HashMap<String, Value>) -> Self {
        Self {
            run_id: run_id.into(),
            variables: Arc::new(variables),
            steps: Arc::new(Mutex::new(HashMap::new())),
            parent_steps: None,
            loop_stack: Vec::new(),
            fork_budget: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn record_step(&self, node_id: &str, record: StepRecord) {
        let mut steps = self.lock_steps();
        steps.insert(node_id.to_string(), record);
    }

    pub fn has_step(&self, node_id: &str) -> bool {
        self.lock_steps().contains_key(node_id)
            || self
                .parent_steps
                .as_ref()
                .is_some_and(|p| p.contains_key(node_id))
    }

    /// Steps recorded in this scope only, excluding inherited ones.
    pub fn local_steps(&self) -> HashMap<String, StepRecord> {
        self.lock_steps().clone()
    }

    /// Merged view of inherited and local steps.
    pub fn snapshot(&self) -> ContextSnapshot {
        let mut steps = self
            .parent_steps
            .as_ref()
            .map(|p| (**p).clone())
            .unwrap_or_default();
        steps.extend(self.lock_steps().clone());
        ContextSnapshot {
            variables: self.variables.clone(),
            steps,
            loop_stack: self.loop_stack.clone(),
        }
    }

    /// New scope whose reads see the parent's steps as of this instant and
    /// whose writes stay local until the owner merges them upward.
    pub fn child_scope(&self) -> Self {
        let frozen = Arc::new(self.snapshot().steps);
        Self {
            run_id: self.run_id.clone(),
            variables: self.variables.clone(),
            steps: Arc::new(Mutex::new(HashMap::new())),
            parent_steps: Some(frozen),
            loop_stack: self.loop_stack.clone(),
            fork_budget: self.fork_budget.clone(),
        }
    }

    pub fn pushed(mut self, frame: LoopFrame) -> Self {
        self.loop_stack.push(frame);
        self
    }

    pub fn fork_budget(&self) -> Option<Arc<ForkBudget>> {
        self.fork_budget.clone()
    }

    pub fn with_fork_budget(mut self, budget: Arc<ForkBudget>) -> Self {
        self.fork_budget = Some(budget);
        self
    }

    /// Consume the context and return its step map for the run result.
    pub fn into_steps(self) -> HashMap<String, StepRecord> {
        match Arc::try_unwrap(self.steps) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(|e| e.into_inner()),
            Err(shared) => shared.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }

    fn lock_steps(&self) -> std::sync::MutexGuard<'_, HashMap<String, StepRecord>> {
        self.steps.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::models::StepStatus;

    fn record(status: StepStatus) -> StepRecord {
        StepRecord {
            status,
            outputs: serde_json::json!({}),
            error: None,
            attempts: 1,
            duration_ms: 0,
        }
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let ctx = ExecutionContext::new("run".into(), HashMap::new());
        ctx.record_step("a", record(StepStatus::Success));
        let snap = ctx.snapshot();
        ctx.record_step("b", record(StepStatus::Success));
        assert!(snap.steps.contains_key("a"));
        assert!(!snap.steps.contains_key("b"));
    }

    #[test]
    fn child_scope_reads_parent_but_writes_locally() {
        let ctx = ExecutionContext::new("run".into(), HashMap::new());
        ctx.record_step("outer", record(StepStatus::Success));

        let child = ctx.child_scope();
        child.record_step("inner", record(StepStatus::Success));

        assert!(child.snapshot().steps.contains_key("outer"));
        assert!(child.local_steps().contains_key("inner"));
        assert!(!child.local_steps().contains_key("outer"));
        assert!(!ctx.snapshot().steps.contains_key("inner"));
    }

    #[test]
    fn loop_stack_is_per_lineage() {
        let ctx = ExecutionContext::new("run".into(), HashMap::new());
        let iter = ctx.clone().pushed(LoopFrame {
            item: serde_json::json!(1),
            index: 0,
            length: 3,
        });
        assert_eq!(iter.snapshot().current_frame().map(|f| f.index), Some(0));
        assert!(ctx.snapshot().current_frame().is_none());
    }

    #[test]
    fn fork_budget_chain_charges_ancestors() {
        let outer = Arc::new(ForkBudget::new(10, None));
        let inner = Arc::new(ForkBudget::new(10, Some(outer.clone())));
        assert!(inner.charge(6).is_ok());
        // Inner cap allows another 4, but the outer chain is already at 6.
        assert!(outer.charge(3).is_ok());
        assert!(inner.charge(4).is_err());
    }
}
