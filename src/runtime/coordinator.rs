/// Run-state coordinator: the pause/stop gate ahead of every step
///
/// Before a step executes, both the workflow's run state and the run's
/// global-key run state (when set) are consulted. While either is Paused
/// the step waits, polling with a slowly growing interval; after the
/// horizon the branch is abandoned. Stopped is treated like Ready unless
/// configured to abandon the branch.

use crate::config::EngineConfig;
use crate::state::{StateStore, StoreError};
use crate::workflow::types::{RunContext, RunState};
use std::sync::Arc;
use std::time::Duration;

/// How a readiness wait concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Pause horizon elapsed, or Stopped with stop_abandons_branch set
    Abandoned,
}

/// Pause/stop gate over the state store's run-state keyspace
#[derive(Clone)]
pub struct RunStateCoordinator {
    store: Arc<StateStore>,
    config: EngineConfig,
}

impl RunStateCoordinator {
    pub fn new(store: Arc<StateStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Control key for a workflow's run state.
    pub fn workflow_key(workflow: &str) -> String {
        format!("workflow:{workflow}")
    }

    /// Control key for a global group's run state.
    pub fn group_key(key: &str) -> String {
        format!("group:{key}")
    }

    /// Block until neither control key reads Paused.
    ///
    /// Poll interval starts at pause_poll_initial, grows by the increment
    /// each iteration, and caps at pause_poll_max. The wait is bounded by
    /// pause_horizon; exceeding it abandons the branch.
    pub async fn wait_until_ready(&self, ctx: &RunContext) -> Result<Readiness, StoreError> {
        let started = tokio::time::Instant::now();
        let horizon = Duration::from_millis(self.config.pause_horizon_ms);
        let mut interval = Duration::from_millis(self.config.pause_poll_initial_ms);
        let increment = Duration::from_millis(self.config.pause_poll_increment_ms);
        let max_interval = Duration::from_millis(self.config.pause_poll_max_ms);

        loop {
            match self.read_states(ctx).await? {
                (RunState::Paused, _) | (_, Some(RunState::Paused)) => {}
                (RunState::Stopped, _) | (_, Some(RunState::Stopped))
                    if self.config.stop_abandons_branch =>
                {
                    tracing::info!(
                        workflow = %ctx.workflow,
                        run_id = %ctx.run_id,
                        "Run state is stopped, abandoning branch"
                    );
                    return Ok(Readiness::Abandoned);
                }
                _ => return Ok(Readiness::Ready),
            }

            if started.elapsed() >= horizon {
                tracing::warn!(
                    workflow = %ctx.workflow,
                    run_id = %ctx.run_id,
                    "Pause wait exceeded horizon, abandoning branch"
                );
                return Ok(Readiness::Abandoned);
            }

            tracing::debug!(
                workflow = %ctx.workflow,
                run_id = %ctx.run_id,
                "Paused, next run-state check in {:?}",
                interval
            );
            tokio::time::sleep(interval).await;
            interval = (interval + increment).min(max_interval);
        }
    }

    /// Read the workflow run state and, when the run carries a global key,
    /// that key's run state as well.
    async fn read_states(
        &self,
        ctx: &RunContext,
    ) -> Result<(RunState, Option<RunState>), StoreError> {
        let workflow_key = Self::workflow_key(&ctx.workflow);
        match &ctx.global_key {
            Some(global) => {
                let group_key = Self::group_key(global);
                let (wf, grp) = tokio::join!(
                    self.store.run_state(&workflow_key),
                    self.store.run_state(&group_key)
                );
                Ok((wf?, Some(grp?)))
            }
            None => Ok((self.store.run_state(&workflow_key).await?, None)),
        }
    }
}
