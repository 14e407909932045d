/// DAG executor
///
/// Runs workflows by recursive step execution: a run starts at the synthetic
/// root step and every completed step eagerly fans out to its sub-steps as
/// spawned tasks, awaiting them all before the step itself returns. Children
/// with two or more required parents are gated behind the join barrier, so
/// exactly one parent fires each fan-in child.

use crate::config::EngineConfig;
use crate::runtime::admission::AdmissionController;
use crate::runtime::coordinator::{Readiness, RunStateCoordinator};
use crate::runtime::dispatcher::CalloutDispatcher;
use crate::runtime::error::EngineError;
use crate::runtime::events::EventHub;
use crate::runtime::runlog::RunLog;
use crate::state::StateStore;
use crate::workflow::registry::StepRegistry;
use crate::workflow::types::{RunContext, SubStep, ROOT_STEP};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Options for starting a workflow run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Number of loop iterations; 0 is treated as 1
    pub loop_count: u32,
    /// Cross-workflow grouping key sharing pause/stop control
    pub global_key: Option<String>,
    /// Orchestrator instance id; supplied for singleton semantics, minted
    /// fresh otherwise
    pub instance_id: Option<String>,
}

/// Workflow run orchestrator
pub struct Engine {
    registry: Arc<StepRegistry>,
    store: Arc<StateStore>,
    dispatcher: CalloutDispatcher,
    coordinator: RunStateCoordinator,
    admission: AdmissionController,
    runlog: Arc<dyn RunLog>,
}

impl Engine {
    pub fn new(
        registry: Arc<StepRegistry>,
        store: Arc<StateStore>,
        events: Arc<EventHub>,
        runlog: Arc<dyn RunLog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            dispatcher: CalloutDispatcher::new(store.clone(), events),
            coordinator: RunStateCoordinator::new(store.clone(), config.clone()),
            admission: AdmissionController::new(store.clone(), config),
            store,
            runlog,
        }
    }

    /// Validate and spawn a run in the background; returns the orchestrator
    /// instance id immediately.
    pub fn start(self: &Arc<Self>, workflow: &str, options: RunOptions) -> Result<String, EngineError> {
        if self.registry.get(workflow).is_none() {
            return Err(EngineError::WorkflowNotFound(workflow.to_string()));
        }

        let instance_id = options
            .instance_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let options = RunOptions {
            instance_id: Some(instance_id.clone()),
            ..options
        };

        let engine = self.clone();
        let workflow = workflow.to_string();
        tokio::spawn(async move {
            if let Err(e) = engine.run(&workflow, options).await {
                tracing::error!("Run of workflow '{}' failed to start: {}", workflow, e);
            }
        });

        Ok(instance_id)
    }

    /// Execute a workflow to completion, one root execution per loop
    /// iteration, each under a fresh run id.
    pub async fn run(self: &Arc<Self>, workflow: &str, options: RunOptions) -> Result<(), EngineError> {
        if self.registry.get(workflow).is_none() {
            return Err(EngineError::WorkflowNotFound(workflow.to_string()));
        }

        let instance_id = options
            .instance_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let loop_count = options.loop_count.max(1);

        for loop_index in 0..loop_count {
            let ctx = RunContext {
                workflow: workflow.to_string(),
                run_id: Uuid::new_v4().to_string(),
                instance_id: instance_id.clone(),
                global_key: options.global_key.clone(),
                loop_index,
                loop_count,
            };

            self.runlog.orchestration_start(&ctx);
            self.execute_step(ctx.clone(), ROOT_STEP, None).await;
            self.runlog.orchestration_end(&ctx);
        }

        Ok(())
    }

    /// Execute one step and its whole subtree; the returned future resolves
    /// once every transitively spawned descendant has finished.
    ///
    /// Errors never escape: a branch-stopping EngineError is logged as a
    /// run error (timeouts tagged distinctly) and the branch ends there.
    fn execute_step(
        self: &Arc<Self>,
        ctx: RunContext,
        step_number: i32,
        input: Option<String>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let engine = self.clone();
        Box::pin(async move {
            if let Err(e) = engine.run_step(&ctx, step_number, input.as_deref()).await {
                engine.runlog.run_error(&ctx, &e.to_string(), e.is_timeout());
            }
        })
    }

    async fn run_step(
        self: &Arc<Self>,
        ctx: &RunContext,
        step_number: i32,
        input: Option<&str>,
    ) -> Result<(), EngineError> {
        // Pause/stop gate ahead of every step
        if self.coordinator.wait_until_ready(ctx).await? == Readiness::Abandoned {
            return Err(EngineError::PauseAbandoned(ctx.workflow.clone()));
        }

        let compiled = self
            .registry
            .get(&ctx.workflow)
            .ok_or_else(|| EngineError::WorkflowNotFound(ctx.workflow.clone()))?;
        let step = compiled
            .step(step_number)
            .ok_or_else(|| EngineError::StepNotFound(ctx.workflow.clone(), step_number))?;

        self.runlog.step_start(ctx, step_number);

        let result = match &step.scale_group {
            Some(group) => {
                let ticket = self.admission.admit(group).await?;
                let result = self.dispatcher.dispatch(step, ctx, input).await;
                ticket.release().await;
                result
            }
            None => self.dispatcher.dispatch(step, ctx, input).await,
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.runlog.step_failed(ctx, step_number, &e.to_string());
                return Err(e);
            }
        };

        // Failed outcomes reach this point only when the step's stop flags
        // allow the branch to continue
        self.runlog
            .step_end(ctx, step_number, outcome.success, outcome.status_code);

        let successors: Vec<SubStep> = outcome
            .override_sub_steps
            .unwrap_or_else(|| step.sub_steps.clone());
        let child_input = if step.forward_response_data {
            outcome.content
        } else {
            None
        };

        let mut children = JoinSet::new();
        for sub in successors {
            if sub.required_parent_count >= 2 {
                match self
                    .store
                    .try_join(&ctx.run_id, sub.step_number, sub.required_parent_count)
                    .await
                {
                    // This parent is the last to arrive; the child fires
                    Ok(true) => {}
                    // Another parent will fire the child
                    Ok(false) => continue,
                    Err(e) => {
                        let err = EngineError::JoinBarrier(sub.step_number);
                        tracing::error!("Join barrier failed: {}", e);
                        self.runlog.run_error(ctx, &err.to_string(), false);
                        continue;
                    }
                }
            }
            children.spawn(self.execute_step(ctx.clone(), sub.step_number, child_input.clone()));
        }

        while children.join_next().await.is_some() {}
        Ok(())
    }
}
