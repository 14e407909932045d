/// Stepway: HTTP-native workflow orchestration engine
///
/// This library provides a DAG-based workflow engine that executes steps as
/// outbound HTTP callouts with fan-out/fan-in joins, scale-group admission
/// control, pause/stop run coordination, and asynchronous callback/webhook
/// step completion.

// Core configuration and setup
pub mod config;

// Workflow management layer - definitions, preparation, storage, registry
pub mod workflow;

// Engine state layer - per-key serialized run-time state
pub mod state;

// Runtime execution layer - DAG engine, dispatcher, admission, coordination
pub mod runtime;

// HTTP API layer - REST endpoints for workflow and run management
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use config::Config;
pub use runtime::{Engine, EngineError, RunOptions};
pub use server::start_server;
pub use workflow::{Step, SubStep, Workflow};
