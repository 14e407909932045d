/// Engine error taxonomy
///
/// Errors that terminate a branch of a run. Failed callouts and unsuccessful
/// completion events normally produce failed step outcomes, not errors; they
/// only escalate into this taxonomy when the step's stop-on-failure flags
/// demand the branch stop.

use crate::state::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("callout timed out for step {0}")]
    CalloutTimeout(i32),
    #[error("callout failed for step {0}: {1}")]
    CalloutFailed(i32, String),
    #[error("callback action '{0}' reported failure for step {1}")]
    CallbackActionFailed(String, i32),
    #[error("callback action '{0}' timed out for step {1}")]
    CallbackTimeout(String, i32),
    #[error("webhook '{0}' reported failure for step {1}")]
    WebhookActionFailed(String, i32),
    #[error("webhook '{0}' timed out for step {1}")]
    WebhookTimeout(String, i32),
    #[error("join barrier unavailable for step {0}")]
    JoinBarrier(i32),
    #[error("scale group '{0}' admission abandoned after horizon")]
    AdmissionAbandoned(String),
    #[error("run abandoned while paused (workflow '{0}')")]
    PauseAbandoned(String),
    #[error(transparent)]
    StateStore(#[from] StoreError),
    #[error("step {1} not found in workflow '{0}'")]
    StepNotFound(String, i32),
    #[error("workflow '{0}' not found")]
    WorkflowNotFound(String),
}

impl EngineError {
    /// Whether this error is a timeout, for distinct run-error tagging.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            EngineError::CalloutTimeout(_)
                | EngineError::CallbackTimeout(_, _)
                | EngineError::WebhookTimeout(_, _)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classification() {
        assert!(EngineError::CalloutTimeout(3).is_timeout());
        assert!(EngineError::CallbackTimeout("approve".into(), 3).is_timeout());
        assert!(EngineError::WebhookTimeout("wh-1".into(), 3).is_timeout());
        assert!(!EngineError::CalloutFailed(3, "500".into()).is_timeout());
        assert!(!EngineError::AdmissionAbandoned("g".into()).is_timeout());
    }
}
