/// Run lifecycle logging
///
/// The engine reports run and step lifecycle transitions through the RunLog
/// trait rather than calling tracing directly, so tests can capture the exact
/// sequence of records. TracingRunLog is the production impl; MemoryRunLog
/// collects entries for assertions.

use crate::workflow::types::RunContext;
use std::sync::Mutex;

/// Lifecycle record sink for runs and steps
pub trait RunLog: Send + Sync {
    fn orchestration_start(&self, ctx: &RunContext);
    fn orchestration_end(&self, ctx: &RunContext);
    fn step_start(&self, ctx: &RunContext, step: i32);
    fn step_end(&self, ctx: &RunContext, step: i32, success: bool, status_code: Option<u16>);
    fn step_failed(&self, ctx: &RunContext, step: i32, message: &str);
    fn run_error(&self, ctx: &RunContext, message: &str, timeout: bool);
}

/// Default run log emitting structured tracing events
#[derive(Debug, Default)]
pub struct TracingRunLog;

impl RunLog for TracingRunLog {
    fn orchestration_start(&self, ctx: &RunContext) {
        tracing::info!(
            workflow = %ctx.workflow,
            run_id = %ctx.run_id,
            loop_index = ctx.loop_index,
            "🔥 Orchestration started"
        );
    }

    fn orchestration_end(&self, ctx: &RunContext) {
        tracing::info!(
            workflow = %ctx.workflow,
            run_id = %ctx.run_id,
            loop_index = ctx.loop_index,
            "✅ Orchestration finished"
        );
    }

    fn step_start(&self, ctx: &RunContext, step: i32) {
        tracing::info!(workflow = %ctx.workflow, run_id = %ctx.run_id, step, "Step started");
    }

    fn step_end(&self, ctx: &RunContext, step: i32, success: bool, status_code: Option<u16>) {
        tracing::info!(
            workflow = %ctx.workflow,
            run_id = %ctx.run_id,
            step,
            success,
            status_code,
            "Step finished"
        );
    }

    fn step_failed(&self, ctx: &RunContext, step: i32, message: &str) {
        tracing::warn!(
            workflow = %ctx.workflow,
            run_id = %ctx.run_id,
            step,
            "❌ Step failed: {}",
            message
        );
    }

    fn run_error(&self, ctx: &RunContext, message: &str, timeout: bool) {
        tracing::error!(
            workflow = %ctx.workflow,
            run_id = %ctx.run_id,
            timeout,
            "❌ Run error: {}",
            message
        );
    }
}

/// One captured lifecycle record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunLogEntry {
    OrchestrationStart {
        run_id: String,
    },
    OrchestrationEnd {
        run_id: String,
    },
    StepStart {
        run_id: String,
        step: i32,
    },
    StepEnd {
        run_id: String,
        step: i32,
        success: bool,
        status_code: Option<u16>,
    },
    StepFailed {
        run_id: String,
        step: i32,
        message: String,
    },
    RunError {
        run_id: String,
        message: String,
        timeout: bool,
    },
}

/// In-memory run log for tests
#[derive(Debug, Default)]
pub struct MemoryRunLog {
    entries: Mutex<Vec<RunLogEntry>>,
}

impl MemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<RunLogEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Step numbers of StepEnd records, in completion order.
    pub fn completed_steps(&self) -> Vec<i32> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                RunLogEntry::StepEnd { step, .. } => Some(*step),
                _ => None,
            })
            .collect()
    }

    fn push(&self, entry: RunLogEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

impl RunLog for MemoryRunLog {
    fn orchestration_start(&self, ctx: &RunContext) {
        self.push(RunLogEntry::OrchestrationStart {
            run_id: ctx.run_id.clone(),
        });
    }

    fn orchestration_end(&self, ctx: &RunContext) {
        self.push(RunLogEntry::OrchestrationEnd {
            run_id: ctx.run_id.clone(),
        });
    }

    fn step_start(&self, ctx: &RunContext, step: i32) {
        self.push(RunLogEntry::StepStart {
            run_id: ctx.run_id.clone(),
            step,
        });
    }

    fn step_end(&self, ctx: &RunContext, step: i32, success: bool, status_code: Option<u16>) {
        self.push(RunLogEntry::StepEnd {
            run_id: ctx.run_id.clone(),
            step,
            success,
            status_code,
        });
    }

    fn step_failed(&self, ctx: &RunContext, step: i32, message: &str) {
        self.push(RunLogEntry::StepFailed {
            run_id: ctx.run_id.clone(),
            step,
            message: message.to_string(),
        });
    }

    fn run_error(&self, ctx: &RunContext, message: &str, timeout: bool) {
        self.push(RunLogEntry::RunError {
            run_id: ctx.run_id.clone(),
            message: message.to_string(),
            timeout,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RunContext {
        RunContext {
            workflow: "wf".to_string(),
            run_id: "r1".to_string(),
            instance_id: "i1".to_string(),
            global_key: None,
            loop_index: 0,
            loop_count: 1,
        }
    }

    #[test]
    fn memory_log_preserves_order() {
        let log = MemoryRunLog::new();
        let ctx = ctx();
        log.orchestration_start(&ctx);
        log.step_start(&ctx, 1);
        log.step_end(&ctx, 1, true, Some(200));
        log.orchestration_end(&ctx);

        assert_eq!(log.completed_steps(), vec![1]);
        assert_eq!(log.entries().len(), 4);
        assert!(matches!(
            log.entries()[0],
            RunLogEntry::OrchestrationStart { .. }
        ));
    }
}
