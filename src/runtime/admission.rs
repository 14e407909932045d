/// Scale-group admission control
///
/// Bounds how many step executions of a scale group run concurrently.
/// A full group is polled with a slowly growing interval; capacity is
/// re-read periodically so operators can widen a group while callers are
/// queued. Admission past the horizon is abandoned with an error.

use crate::config::EngineConfig;
use crate::runtime::error::EngineError;
use crate::state::{Admission, StateStore};
use std::sync::Arc;
use std::time::Duration;

/// A counted admission that must be released exactly once
///
/// Unlimited groups (capacity 0) hand out uncounted tickets whose release
/// is a no-op.
#[derive(Debug)]
pub struct AdmitTicket {
    store: Arc<StateStore>,
    group: String,
    counted: bool,
}

impl AdmitTicket {
    /// Release the admission. Callers release on every path out of a
    /// dispatch, success or failure.
    pub async fn release(self) {
        if !self.counted {
            return;
        }
        if let Err(e) = self.store.release(&self.group).await {
            tracing::error!("Failed to release scale group '{}': {}", self.group, e);
        }
    }
}

/// Poll-based admission gate over the state store's scale-group counters
#[derive(Clone)]
pub struct AdmissionController {
    store: Arc<StateStore>,
    config: EngineConfig,
}

impl AdmissionController {
    pub fn new(store: Arc<StateStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Wait for a slot in `group`.
    ///
    /// Poll interval starts at admission_poll_initial, grows by the
    /// increment per iteration, caps at admission_poll_max. Every
    /// capacity_recheck_every-th iteration re-reads the group's capacity.
    /// Exceeding admission_horizon yields AdmissionAbandoned.
    pub async fn admit(&self, group: &str) -> Result<AdmitTicket, EngineError> {
        let started = tokio::time::Instant::now();
        let horizon = Duration::from_millis(self.config.admission_horizon_ms);
        let mut interval = Duration::from_millis(self.config.admission_poll_initial_ms);
        let increment = Duration::from_millis(self.config.admission_poll_increment_ms);
        let max_interval = Duration::from_millis(self.config.admission_poll_max_ms);
        // A zero recheck interval would divide by zero below
        let recheck_every = self.config.capacity_recheck_every.max(1);
        let mut iteration: u32 = 0;

        loop {
            match self.store.try_acquire(group).await? {
                Admission::Admitted => {
                    return Ok(AdmitTicket {
                        store: self.store.clone(),
                        group: group.to_string(),
                        counted: true,
                    });
                }
                Admission::Unlimited => {
                    return Ok(AdmitTicket {
                        store: self.store.clone(),
                        group: group.to_string(),
                        counted: false,
                    });
                }
                Admission::Full => {}
            }

            if started.elapsed() >= horizon {
                tracing::warn!("Admission to scale group '{}' exceeded horizon", group);
                return Err(EngineError::AdmissionAbandoned(group.to_string()));
            }

            iteration += 1;
            if iteration % recheck_every == 0 {
                let max = self.store.capacity(group).await?;
                tracing::debug!("Scale group '{}' still full (capacity {})", group, max);
            }

            tokio::time::sleep(interval).await;
            interval = (interval + increment).min(max_interval);
        }
    }
}
