/// Completion event hub for callback and webhook steps
///
/// Steps that complete asynchronously register a one-shot waiter under a
/// string key; the HTTP event intake raises the matching event when the
/// external party reports completion. Keys:
/// - callback: `callback:{action}:{instance_id}`
/// - webhook:  `webhook:{webhook_id}:{run_id}:{step}` (plus `:{action}`
///   when the intake names one)

use crate::workflow::types::SubStep;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

/// Completion event raised by an external party
#[derive(Debug, Clone, Default)]
pub struct StepEvent {
    pub success: bool,
    pub status_code: Option<u16>,
    pub message: Option<String>,
    /// Action named by the intake; webhook steps resolve it against their
    /// action_sub_steps map
    pub action: Option<String>,
    /// Explicit successor override: replaces the step's static sub-step
    /// list for this completion only
    pub sub_steps: Option<Vec<SubStep>>,
}

impl StepEvent {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// One-shot waiter map for completion events
#[derive(Debug, Default)]
pub struct EventHub {
    waiters: Mutex<HashMap<String, oneshot::Sender<StepEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the event under `key`, up to `timeout`.
    ///
    /// Returns None on timeout; the stale waiter is cleaned out so a late
    /// raise reports unmatched instead of completing a dead registration.
    pub async fn wait(&self, key: &str, timeout: Duration) -> Option<StepEvent> {
        let rx = {
            let mut waiters = self.waiters.lock().await;
            let (tx, rx) = oneshot::channel();
            // A re-registration under the same key drops the older waiter
            if waiters.insert(key.to_string(), tx).is_some() {
                tracing::warn!("Replaced stale event waiter for key '{}'", key);
            }
            rx
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(event)) => Some(event),
            _ => {
                self.waiters.lock().await.remove(key);
                None
            }
        }
    }

    /// Raise an event; returns false when nobody was waiting under `key`.
    pub async fn raise(&self, key: &str, event: StepEvent) -> bool {
        let waiter = self.waiters.lock().await.remove(key);
        match waiter {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                tracing::warn!("Event raised with no waiter for key '{}'", key);
                false
            }
        }
    }
}

/// Key for a callback completion event.
pub fn callback_key(action: &str, instance_id: &str) -> String {
    format!("callback:{action}:{instance_id}")
}

/// Key for a webhook completion event.
pub fn webhook_key(webhook_id: &str, step_key: &str) -> String {
    format!("webhook:{webhook_id}:{step_key}")
}
