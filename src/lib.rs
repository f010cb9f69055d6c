pub mod config;
pub mod utils;
pub mod workflow;

pub use config::EngineConfig;
pub use workflow::engine::WorkflowEngine;
pub use workflow::errors::{FlowrunError, Result};
pub use workflow::models::{RunResult, RunStatus, StepStatus, WorkflowDefinition};
