use thiserror::Error;

/// Where a deadline was enforced when a timeout fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutScope {
    Node,
    Level,
    Path,
    Fork,
}

impl std::fmt::Display for TimeoutScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutScope::Node => write!(f, "node"),
            TimeoutScope::Level => write!(f, "level"),
            TimeoutScope::Path => write!(f, "path"),
            TimeoutScope::Fork => write!(f, "fork"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FlowrunError {
    #[error("Workflow validation failed: {0}")]
    Validation(String),

    #[error("Template resolution failed: {0}")]
    TemplateResolve(String),

    #[error("Expression parse error: {0}")]
    ExpressionParse(String),

    #[error("Node '{node_id}' failed: {message}")]
    NodeFailure { node_id: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{scope} timeout after {seconds}s")]
    Timeout { scope: TimeoutScope, seconds: f64 },

    #[error("Fork budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowrunError {
    /// Whether another attempt may recover from this error.
    ///
    /// Template/expression errors are retryable because they can depend on
    /// step outputs that a transient upstream glitch corrupted; transport
    /// errors and per-node timeouts consume an attempt without exhausting
    /// the retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FlowrunError::TemplateResolve(_)
                | FlowrunError::ExpressionParse(_)
                | FlowrunError::Transport(_)
                | FlowrunError::Timeout {
                    scope: TimeoutScope::Node,
                    ..
                }
        )
    }
}

pub type Result<T> = std::result::Result<T, FlowrunError>;
