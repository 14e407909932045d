/// Workflow Management Layer
///
/// This module handles workflow definitions, preparation, persistence, and
/// the hot-reload registry:
/// - Type definitions (Workflow, Step, SubStep, RetryPolicy, RunState)
/// - Graph validation and parent-count computation (prepare)
/// - SQLite persistence with sqlx
/// - Lock-free hot-reload registry using ArcSwap

// Core workflow type definitions
pub mod types;

// Graph compilation: validation, parent counts, root synthesis
pub mod prepare;

// SQLite persistence layer for workflow definitions
pub mod storage;

// Hot-reload registry using ArcSwap
pub mod registry;

// Re-export commonly used types
pub use prepare::{prepare, CompiledWorkflow, PrepareError};
pub use registry::StepRegistry;
pub use storage::WorkflowStorage;
pub use types::{
    CalloutMethod, CallbackConfig, RetryPolicy, RunContext, RunState, Step, SubStep,
    WebhookConfig, Workflow, ROOT_STEP,
};
