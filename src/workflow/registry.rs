/// Hot-reload step registry using ArcSwap
///
/// The registry is the step config store consulted by the engine: it maps
/// workflow names to compiled workflows (parent counts computed, root step
/// synthesized) and swaps the whole map pointer on update, so concurrent
/// runs keep executing against the snapshot they started with.

use crate::workflow::prepare::{prepare, CompiledWorkflow, PrepareError};
use crate::workflow::storage::WorkflowStorage;
use crate::workflow::types::Workflow;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

/// Lock-free registry of compiled workflows
#[derive(Debug, Default)]
pub struct StepRegistry {
    /// Atomic pointer to the workflow map; key is the workflow name
    workflows: ArcSwap<HashMap<String, Arc<CompiledWorkflow>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// Populate the registry from persistent storage at startup.
    ///
    /// Workflows that fail preparation are skipped with an error log rather
    /// than blocking startup for the rest.
    pub async fn init_from_storage(&self, storage: &WorkflowStorage) -> anyhow::Result<()> {
        let stored = storage.load_all_workflows().await?;
        let mut compiled = HashMap::new();

        for (name, workflow) in stored {
            match prepare(workflow) {
                Ok(c) => {
                    compiled.insert(name, Arc::new(c));
                }
                Err(e) => {
                    tracing::error!("❌ Skipping invalid stored workflow '{}': {}", name, e);
                }
            }
        }

        let count = compiled.len();
        self.workflows.store(Arc::new(compiled));
        tracing::info!("📊 Initialized step registry with {} workflows", count);

        Ok(())
    }

    /// Compile and install a workflow (hot-reload).
    ///
    /// Swaps a new registry snapshot in atomically; concurrent runs holding
    /// the previous snapshot are unaffected.
    pub fn install(&self, workflow: Workflow) -> Result<(), PrepareError> {
        let name = workflow.name.clone();
        let compiled = Arc::new(prepare(workflow)?);

        let current = self.workflows.load();
        let mut next = (**current).clone();
        next.insert(name.clone(), compiled);
        self.workflows.store(Arc::new(next));

        tracing::info!("🔥 Installed workflow: {}", name);
        Ok(())
    }

    /// Get a compiled workflow by name (lock-free read).
    pub fn get(&self, name: &str) -> Option<Arc<CompiledWorkflow>> {
        self.workflows.load().get(name).cloned()
    }

    /// List installed workflow names.
    pub fn names(&self) -> Vec<String> {
        self.workflows.load().keys().cloned().collect()
    }

    /// Remove a workflow from the registry.
    pub fn remove(&self, name: &str) {
        let current = self.workflows.load();
        let mut next = (**current).clone();

        if next.remove(name).is_some() {
            self.workflows.store(Arc::new(next));
            tracing::info!("🗑️ Removed workflow from registry: {}", name);
        }
    }
}
