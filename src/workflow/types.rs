/// Core workflow type definitions
///
/// Defines the fundamental structures for workflows, steps, and run control as
/// stored in SQLite and executed by the runtime. Steps form a DAG: each step
/// lists its sub-steps (children), and the prepare pass computes how many
/// parents each child must wait for before it may fire.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved step number for the synthetic root step of every run.
///
/// The root step has no callout; its sub-steps are all steps with zero
/// required parents, so executing the root fans out the whole workflow.
pub const ROOT_STEP: i32 = -1;

/// A complete workflow definition containing steps and their fan-out edges
///
/// Workflows are stored as JSON in SQLite and compiled (`prepare`) into
/// execution-ready form with parent counts and a synthetic root step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow name (e.g., "order-fulfilment")
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Steps in this workflow; numbers must be unique and non-negative
    pub steps: Vec<Step>,
}

/// A single step in the workflow DAG
///
/// Each step performs one outbound HTTP callout against the downstream
/// micro-service and then fans out to its sub-steps. Completion is either
/// inline (the HTTP response), or asynchronous via a callback or webhook
/// event raised later by an external party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Step number, unique within the workflow (root sentinel is -1)
    pub number: i32,
    /// Opaque step label for logs and webhook addressing
    pub step_id: String,
    /// Callout URL template; `{workflow}`, `{run_id}` and `{step}` are
    /// substituted at dispatch time. None makes this a container step
    /// (no callout, synthesized success).
    #[serde(default)]
    pub callout_url: Option<String>,
    /// HTTP method for the callout
    #[serde(default)]
    pub method: CalloutMethod,
    /// Timeout for the callout request itself, in seconds
    #[serde(default = "default_callout_timeout")]
    pub callout_timeout_secs: u64,
    /// Children of this step with their computed required-parent counts
    #[serde(default)]
    pub sub_steps: Vec<SubStep>,
    /// Optional retry envelope wrapping the whole dispatch
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    /// Optional callback completion: wait for an event keyed by
    /// (action, orchestrator instance id) after the callout returns
    #[serde(default)]
    pub callback: Option<CallbackConfig>,
    /// Optional webhook completion: wait for an event keyed by
    /// (webhook id, step key) after the callout is issued
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    /// Optional scale group bounding concurrent in-flight executions
    /// of every step sharing this id
    #[serde(default)]
    pub scale_group: Option<String>,
    /// When true, a failed callout/callback stops this branch instead of
    /// continuing to sub-steps
    #[serde(default)]
    pub stop_on_action_failed: bool,
    /// When true, a failed webhook completion stops this branch
    #[serde(default)]
    pub stop_on_webhook_failed: bool,
    /// When true, the callout response content is forwarded to sub-steps
    #[serde(default)]
    pub forward_response_data: bool,
}

fn default_callout_timeout() -> u64 {
    30
}

/// HTTP method for step callouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CalloutMethod {
    Get,
    #[default]
    Post,
}

/// Edge from a step to one of its children
///
/// `required_parent_count` is computed by the prepare pass (the number of
/// steps listing this child as a sub-step); authors may leave it at zero.
/// A child requiring two or more parents only fires once the join barrier
/// has seen all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubStep {
    pub step_number: i32,
    #[serde(default)]
    pub required_parent_count: u32,
}

impl SubStep {
    pub fn new(step_number: i32) -> Self {
        Self {
            step_number,
            required_parent_count: 0,
        }
    }
}

/// Exponential-backoff retry envelope wrapping one dispatch attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry, in seconds
    pub delay_secs: u64,
    /// Ceiling on the per-retry delay, in seconds
    pub max_delay_secs: u64,
    /// Maximum number of retries (attempts = retries + 1)
    pub max_retries: u32,
    /// Multiplier applied to the delay per retry
    pub backoff_coefficient: f64,
    /// Overall deadline across all attempts, in seconds
    pub timeout_secs: u64,
}

/// Callback completion configuration
///
/// The downstream service acknowledges the callout inline, then later
/// raises an event keyed by (action, orchestrator instance id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    pub action: String,
    pub timeout_secs: u64,
}

/// Webhook completion configuration
///
/// The step completes when an external party raises an event keyed by
/// (webhook id, step key). The event may name an action; `action_sub_steps`
/// maps action names to replacement successor lists for dynamic handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub id: String,
    pub timeout_secs: u64,
    #[serde(default)]
    pub action_sub_steps: HashMap<String, Vec<SubStep>>,
}

/// Pause/stop control state, kept per workflow name and per global key
///
/// Created lazily as Ready on first read; mutated through the control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Ready,
    Paused,
    Stopped,
}

/// Runtime identity of one run (one loop iteration of a started workflow)
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Workflow name
    pub workflow: String,
    /// Unique run identifier, fresh per loop iteration
    pub run_id: String,
    /// Orchestrator instance identifier; callbacks are addressed to it
    pub instance_id: String,
    /// Optional cross-workflow grouping key sharing pause/stop control
    pub global_key: Option<String>,
    /// Current loop iteration (0-based)
    pub loop_index: u32,
    /// Total loop iterations requested
    pub loop_count: u32,
}

impl RunContext {
    /// Render a callout URL template against this run.
    pub fn render_url(&self, template: &str, step_number: i32) -> String {
        template
            .replace("{workflow}", &self.workflow)
            .replace("{run_id}", &self.run_id)
            .replace("{step}", &step_number.to_string())
    }

    /// Key addressing one step instance within this run, used for webhook
    /// completion events and the observability counters.
    pub fn step_key(&self, step_number: i32) -> String {
        format!("{}:{}", self.run_id, step_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RunContext {
        RunContext {
            workflow: "billing".to_string(),
            run_id: "r-42".to_string(),
            instance_id: "i-1".to_string(),
            global_key: None,
            loop_index: 0,
            loop_count: 1,
        }
    }

    #[test]
    fn render_url_substitutes_placeholders() {
        let url = ctx().render_url("http://svc/{workflow}/{run_id}/step/{step}", 7);
        assert_eq!(url, "http://svc/billing/r-42/step/7");
    }

    #[test]
    fn render_url_leaves_plain_urls_alone() {
        let url = ctx().render_url("http://svc/fixed", 7);
        assert_eq!(url, "http://svc/fixed");
    }

    #[test]
    fn run_state_defaults_to_ready() {
        assert_eq!(RunState::default(), RunState::Ready);
    }

    #[test]
    fn step_definition_roundtrips_through_json() {
        let json = r#"{
            "number": 3,
            "step_id": "charge-card",
            "callout_url": "http://svc/charge",
            "method": "GET",
            "sub_steps": [{"step_number": 4}],
            "scale_group": "payments",
            "stop_on_action_failed": true
        }"#;
        let step: Step = serde_json::from_str(json).unwrap();
        assert_eq!(step.number, 3);
        assert_eq!(step.method, CalloutMethod::Get);
        assert_eq!(step.callout_timeout_secs, 30);
        assert_eq!(step.sub_steps, vec![SubStep::new(4)]);
        assert!(step.stop_on_action_failed);
        assert!(!step.stop_on_webhook_failed);
        assert!(step.retry.is_none());
    }
}
