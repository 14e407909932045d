/// Callout dispatcher: one step's outbound HTTP work plus completion
///
/// A step dispatch is one of three variants chosen from step config:
/// - Inline: await the HTTP response; 2xx is success, 201 captures the
///   Location header as the step content
/// - Callback: HTTP call, then wait for an event keyed by the callback
///   action and the orchestrator instance id
/// - Webhook: HTTP call, then wait for an event keyed by the webhook id
///   and this step instance; the event may override the successor list
///
/// Failures and timeouts normally produce failed outcomes so the engine can
/// keep fanning out; the step's stop-on-failure flags escalate them into
/// EngineError and the branch stops. A retry policy wraps the entire
/// variant, so a callback wait that times out is retried from the callout.

use crate::runtime::error::EngineError;
use crate::runtime::events::{callback_key, webhook_key, EventHub, StepEvent};
use crate::runtime::retry::{with_retry, Retryable};
use crate::state::StateStore;
use crate::workflow::types::{CalloutMethod, RunContext, Step, SubStep};
use std::sync::Arc;
use std::time::Duration;

/// How a dispatch concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// Callout (and completion event, if any) succeeded
    Completed,
    /// Callout returned non-2xx, or the completion event reported failure
    ActionFailed,
    /// Callout, completion wait, or retry deadline timed out
    TimedOut,
    /// Transport-level failure reaching the downstream service
    Faulted,
}

/// Result of dispatching one step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub success: bool,
    pub status: OutcomeStatus,
    pub status_code: Option<u16>,
    /// Response content forwarded to sub-steps when the step asks for it
    pub content: Option<String>,
    /// Webhook-provided replacement for the step's static successor list
    pub override_sub_steps: Option<Vec<SubStep>>,
    /// Action named by the completion event, if any
    pub event_action: Option<String>,
    /// Whether the outcome was produced by the completion-event stage, as
    /// opposed to the callout itself; decides which stop flag applies
    pub from_event: bool,
}

impl StepOutcome {
    pub fn completed(status_code: Option<u16>, content: Option<String>) -> Self {
        Self {
            success: true,
            status: OutcomeStatus::Completed,
            status_code,
            content,
            override_sub_steps: None,
            event_action: None,
            from_event: false,
        }
    }

    pub fn failed(status: OutcomeStatus, status_code: Option<u16>) -> Self {
        Self {
            success: false,
            status,
            status_code,
            content: None,
            override_sub_steps: None,
            event_action: None,
            from_event: false,
        }
    }
}

impl Retryable for StepOutcome {
    fn should_retry(&self) -> bool {
        !self.success
    }
}

/// Outbound HTTP + completion-event dispatch for steps
#[derive(Clone)]
pub struct CalloutDispatcher {
    client: reqwest::Client,
    store: Arc<StateStore>,
    events: Arc<EventHub>,
}

impl CalloutDispatcher {
    pub fn new(store: Arc<StateStore>, events: Arc<EventHub>) -> Self {
        Self {
            client: reqwest::Client::new(),
            store,
            events,
        }
    }

    /// Dispatch a step: retry envelope around the variant, then stop-flag
    /// escalation on a failed final outcome.
    pub async fn dispatch(
        &self,
        step: &Step,
        ctx: &RunContext,
        input: Option<&str>,
    ) -> Result<StepOutcome, EngineError> {
        let outcome = match &step.retry {
            Some(policy) => with_retry(policy, || self.dispatch_once(step, ctx, input))
                .await
                .unwrap_or_else(|| {
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        step = step.number,
                        "Retry deadline elapsed for step dispatch"
                    );
                    StepOutcome::failed(OutcomeStatus::TimedOut, None)
                }),
            None => self.dispatch_once(step, ctx, input).await,
        };

        if outcome.success {
            return Ok(outcome);
        }
        self.escalate(step, outcome)
    }

    /// Apply the step's stop-on-failure flags to a failed outcome.
    ///
    /// The flags are stage-scoped: a failure of the callout itself is an
    /// action failure governed by stop_on_action_failed on every variant;
    /// only failures of the completion-event wait fall under the variant's
    /// own flag (stop_on_webhook_failed, or stop_on_action_failed again
    /// for callbacks).
    fn escalate(&self, step: &Step, outcome: StepOutcome) -> Result<StepOutcome, EngineError> {
        if !outcome.from_event {
            if step.stop_on_action_failed {
                return Err(match outcome.status {
                    OutcomeStatus::TimedOut => EngineError::CalloutTimeout(step.number),
                    _ => EngineError::CalloutFailed(
                        step.number,
                        outcome
                            .status_code
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "transport error".to_string()),
                    ),
                });
            }
            return Ok(outcome);
        }

        if let Some(webhook) = &step.webhook {
            if step.stop_on_webhook_failed {
                return Err(match outcome.status {
                    OutcomeStatus::TimedOut => {
                        EngineError::WebhookTimeout(webhook.id.clone(), step.number)
                    }
                    _ => EngineError::WebhookActionFailed(webhook.id.clone(), step.number),
                });
            }
            return Ok(outcome);
        }

        if let (Some(cb), true) = (&step.callback, step.stop_on_action_failed) {
            return Err(match outcome.status {
                OutcomeStatus::TimedOut => {
                    EngineError::CallbackTimeout(cb.action.clone(), step.number)
                }
                _ => EngineError::CallbackActionFailed(cb.action.clone(), step.number),
            });
        }
        Ok(outcome)
    }

    /// One attempt of the full variant, bracketed by the in-progress counter.
    async fn dispatch_once(&self, step: &Step, ctx: &RunContext, input: Option<&str>) -> StepOutcome {
        let counted = match self.store.incr_in_progress(&ctx.run_id, step.number).await {
            Ok(_) => true,
            Err(e) => {
                // Counter is observability only; dispatch anyway
                tracing::error!("In-progress increment failed: {}", e);
                false
            }
        };

        let outcome = self.run_variant(step, ctx, input).await;

        if counted {
            if let Err(e) = self.store.decr_in_progress(&ctx.run_id, step.number).await {
                tracing::error!("In-progress decrement failed: {}", e);
            }
        }

        outcome
    }

    async fn run_variant(&self, step: &Step, ctx: &RunContext, input: Option<&str>) -> StepOutcome {
        let callout = self.callout(step, ctx, input).await;

        if let Some(webhook) = &step.webhook {
            if !callout.success {
                return callout;
            }
            let key = webhook_key(&webhook.id, &ctx.step_key(step.number));
            let mut outcome = self
                .await_event(&key, webhook.timeout_secs, step, ctx)
                .await;
            // The event may name an action mapped to a replacement
            // successor list, unless it carried one explicitly
            if outcome.success && outcome.override_sub_steps.is_none() {
                if let Some(action) = &outcome.event_action {
                    outcome.override_sub_steps = webhook.action_sub_steps.get(action).cloned();
                }
            }
            return outcome;
        }

        if let Some(callback) = &step.callback {
            if !callout.success {
                return callout;
            }
            let key = callback_key(&callback.action, &ctx.instance_id);
            return self
                .await_event(&key, callback.timeout_secs, step, ctx)
                .await;
        }

        callout
    }

    /// Issue the step's HTTP callout and classify the response.
    async fn callout(&self, step: &Step, ctx: &RunContext, input: Option<&str>) -> StepOutcome {
        let url = match &step.callout_url {
            Some(template) => ctx.render_url(template, step.number),
            // Container step: no callout, synthesized success
            None => return StepOutcome::completed(None, None),
        };

        let request = match step.method {
            CalloutMethod::Get => self.client.get(&url),
            CalloutMethod::Post => self.client.post(&url).json(&serde_json::json!({
                "workflow": ctx.workflow,
                "run_id": ctx.run_id,
                "instance_id": ctx.instance_id,
                "step": step.number,
                "step_id": step.step_id,
                "loop_index": ctx.loop_index,
                "input": input,
            })),
        };

        let response = request
            .timeout(Duration::from_secs(step.callout_timeout_secs))
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                let code = status.as_u16();
                if !status.is_success() {
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        step = step.number,
                        "Callout to {} returned {}",
                        url,
                        code
                    );
                    return StepOutcome::failed(OutcomeStatus::ActionFailed, Some(code));
                }

                // 201 hands back the created resource location as content
                let content = if code == 201 {
                    response
                        .headers()
                        .get(reqwest::header::LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                } else if step.forward_response_data {
                    response.text().await.ok().filter(|t| !t.is_empty())
                } else {
                    None
                };

                StepOutcome::completed(Some(code), content)
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(run_id = %ctx.run_id, step = step.number, "Callout to {} timed out", url);
                StepOutcome::failed(OutcomeStatus::TimedOut, None)
            }
            Err(e) => {
                tracing::warn!(run_id = %ctx.run_id, step = step.number, "Callout to {} failed: {}", url, e);
                StepOutcome::failed(OutcomeStatus::Faulted, None)
            }
        }
    }

    /// Wait for an external completion event under `key`.
    async fn await_event(
        &self,
        key: &str,
        timeout_secs: u64,
        step: &Step,
        ctx: &RunContext,
    ) -> StepOutcome {
        match self
            .events
            .wait(key, Duration::from_secs(timeout_secs))
            .await
        {
            Some(StepEvent {
                success: true,
                status_code,
                action,
                sub_steps,
                ..
            }) => StepOutcome {
                success: true,
                status: OutcomeStatus::Completed,
                status_code,
                content: None,
                override_sub_steps: sub_steps,
                event_action: action,
                from_event: true,
            },
            Some(StepEvent {
                success: false,
                status_code,
                message,
                ..
            }) => {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    step = step.number,
                    "Completion event '{}' reported failure: {}",
                    key,
                    message.as_deref().unwrap_or("no detail")
                );
                StepOutcome {
                    from_event: true,
                    ..StepOutcome::failed(OutcomeStatus::ActionFailed, status_code)
                }
            }
            None => {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    step = step.number,
                    "Completion event '{}' timed out after {}s",
                    key,
                    timeout_secs
                );
                StepOutcome {
                    from_event: true,
                    ..StepOutcome::failed(OutcomeStatus::TimedOut, None)
                }
            }
        }
    }
}
