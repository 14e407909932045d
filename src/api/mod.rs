/// HTTP API Layer
///
/// REST endpoints for workflow management, run control (start, pause/stop,
/// scale groups), and external completion event intake.

pub mod events;
pub mod runs;
pub mod workflows;

use crate::runtime::engine::Engine;
use crate::runtime::events::EventHub;
use crate::state::StateStore;
use crate::workflow::registry::StepRegistry;
use crate::workflow::storage::WorkflowStorage;
use std::sync::Arc;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Workflow definition persistence
    pub storage: WorkflowStorage,
    /// Hot-reload registry of compiled workflows
    pub registry: Arc<StepRegistry>,
    /// Run-time engine state (run states, scale groups)
    pub store: Arc<StateStore>,
    /// Workflow run orchestrator
    pub engine: Arc<Engine>,
    /// Completion event hub for callback/webhook steps
    pub events: Arc<EventHub>,
}
