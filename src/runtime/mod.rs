/// Workflow Runtime Layer
///
/// Executes compiled workflows:
/// - Engine: recursive DAG executor with join barriers and eager fan-out
/// - CalloutDispatcher: outbound HTTP plus callback/webhook completion
/// - AdmissionController: scale-group concurrency bounds
/// - RunStateCoordinator: pause/stop gating
/// - EventHub: external completion event intake
/// - RunLog: run/step lifecycle records

pub mod admission;
pub mod coordinator;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod retry;
pub mod runlog;

pub use admission::{AdmissionController, AdmitTicket};
pub use coordinator::{Readiness, RunStateCoordinator};
pub use dispatcher::{CalloutDispatcher, OutcomeStatus, StepOutcome};
pub use engine::{Engine, RunOptions};
pub use error::EngineError;
pub use events::{callback_key, webhook_key, EventHub, StepEvent};
pub use runlog::{MemoryRunLog, RunLog, RunLogEntry, TracingRunLog};
