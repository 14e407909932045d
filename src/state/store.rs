/// Per-key serialized state store
///
/// A key-addressed store where every key is owned by its own lightweight
/// actor task: operations against one key are queued on the actor's channel
/// and processed strictly one at a time, while different keys proceed fully
/// concurrently. This per-key serialization is the correctness foundation
/// for the join barrier and the scale-group counters - no shared mutable
/// memory, no locks around the values themselves.
///
/// Keyspaces:
/// - join counters, keyed by (run id, step number)
/// - scale groups (capacity + in-process count), keyed by group id
/// - run states, keyed by workflow name or global key
/// - step in-progress counters (observability only), keyed by (run id, step)

use crate::workflow::types::RunState;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Store failure: the key's actor is gone or never answered.
///
/// Callers treat this conservatively (branch does not fire, step is not
/// admitted) rather than crashing the run.
#[derive(Debug, Clone, Error)]
#[error("state store operation failed for key '{key}'")]
pub struct StoreError {
    pub key: String,
}

/// Outcome of a scale-group admission probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Capacity available; the in-process count was incremented
    Admitted,
    /// Group is at capacity; nothing was changed
    Full,
    /// Group has no capacity limit (max = 0); admitted without counting
    Unlimited,
}

/// Key into the store; the variant fixes the keyspace and the value shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum StateKey {
    Join { run_id: String, step: i32 },
    Scale { group: String },
    Run { key: String },
    InProgress { run_id: String, step: i32 },
}

impl StateKey {
    fn describe(&self) -> String {
        match self {
            StateKey::Join { run_id, step } => format!("join:{run_id}:{step}"),
            StateKey::Scale { group } => format!("scale:{group}"),
            StateKey::Run { key } => format!("run:{key}"),
            StateKey::InProgress { run_id, step } => format!("inprogress:{run_id}:{step}"),
        }
    }

    fn initial_value(&self) -> StateValue {
        match self {
            StateKey::Join { .. } | StateKey::InProgress { .. } => StateValue::Counter(0),
            StateKey::Scale { .. } => StateValue::Scale {
                max: 0,
                in_process: 0,
            },
            StateKey::Run { .. } => StateValue::Run(RunState::default()),
        }
    }
}

/// The single mutable value owned by one key's actor
#[derive(Debug)]
enum StateValue {
    Counter(u32),
    Scale { max: u32, in_process: u32 },
    Run(RunState),
}

/// Request messages processed one at a time by a key's actor
enum StateRequest {
    /// Join-barrier countdown latch: the Nth arrival answers true without
    /// incrementing; earlier arrivals increment and answer false.
    TryJoin {
        required: u32,
        reply: oneshot::Sender<bool>,
    },
    /// Scale-group admission probe (increment iff below capacity)
    TryAcquire { reply: oneshot::Sender<Admission> },
    /// Scale-group release (saturating decrement)
    Release { reply: oneshot::Sender<()> },
    SetCapacity {
        max: u32,
        reply: oneshot::Sender<()>,
    },
    Capacity { reply: oneshot::Sender<u32> },
    ReadRun { reply: oneshot::Sender<RunState> },
    SetRun {
        state: RunState,
        reply: oneshot::Sender<()>,
    },
    Increment { reply: oneshot::Sender<u32> },
    Decrement { reply: oneshot::Sender<u32> },
}

/// Key-addressed store with one actor task per key
///
/// Actors are spawned lazily on first access; the key map itself is only
/// touched to look up or register a channel sender, never to mutate values.
#[derive(Debug, Default)]
pub struct StateStore {
    cells: RwLock<HashMap<StateKey, mpsc::Sender<StateRequest>>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }

    /// Join barrier: record one parent completion for (run, step).
    ///
    /// Returns true exactly once per key: for the arrival that makes the
    /// count reach `required`. The counter is left one short of `required`
    /// so the latch cannot fire twice for the same run.
    pub async fn try_join(
        &self,
        run_id: &str,
        step: i32,
        required: u32,
    ) -> Result<bool, StoreError> {
        let key = StateKey::Join {
            run_id: run_id.to_string(),
            step,
        };
        self.request(&key, |reply| StateRequest::TryJoin { required, reply })
            .await
    }

    /// Probe a scale group for admission.
    pub async fn try_acquire(&self, group: &str) -> Result<Admission, StoreError> {
        let key = StateKey::Scale {
            group: group.to_string(),
        };
        self.request(&key, |reply| StateRequest::TryAcquire { reply })
            .await
    }

    /// Release one previously counted admission.
    pub async fn release(&self, group: &str) -> Result<(), StoreError> {
        let key = StateKey::Scale {
            group: group.to_string(),
        };
        self.request(&key, |reply| StateRequest::Release { reply })
            .await
    }

    /// Set a scale group's maximum concurrent instances (0 = unlimited).
    pub async fn set_capacity(&self, group: &str, max: u32) -> Result<(), StoreError> {
        let key = StateKey::Scale {
            group: group.to_string(),
        };
        self.request(&key, |reply| StateRequest::SetCapacity { max, reply })
            .await
    }

    /// Read a scale group's configured capacity.
    pub async fn capacity(&self, group: &str) -> Result<u32, StoreError> {
        let key = StateKey::Scale {
            group: group.to_string(),
        };
        self.request(&key, |reply| StateRequest::Capacity { reply })
            .await
    }

    /// Read the run state for a control key (lazily Ready).
    pub async fn run_state(&self, control_key: &str) -> Result<RunState, StoreError> {
        let key = StateKey::Run {
            key: control_key.to_string(),
        };
        self.request(&key, |reply| StateRequest::ReadRun { reply })
            .await
    }

    /// Set the run state for a control key.
    pub async fn set_run_state(
        &self,
        control_key: &str,
        state: RunState,
    ) -> Result<(), StoreError> {
        let key = StateKey::Run {
            key: control_key.to_string(),
        };
        self.request(&key, |reply| StateRequest::SetRun { state, reply })
            .await
    }

    /// Observability: count a dispatch in flight for (run, step).
    pub async fn incr_in_progress(&self, run_id: &str, step: i32) -> Result<u32, StoreError> {
        let key = StateKey::InProgress {
            run_id: run_id.to_string(),
            step,
        };
        self.request(&key, |reply| StateRequest::Increment { reply })
            .await
    }

    /// Observability: dispatch finished for (run, step).
    pub async fn decr_in_progress(&self, run_id: &str, step: i32) -> Result<u32, StoreError> {
        let key = StateKey::InProgress {
            run_id: run_id.to_string(),
            step,
        };
        self.request(&key, |reply| StateRequest::Decrement { reply })
            .await
    }

    /// Send one request to the key's actor and await the reply.
    async fn request<T>(
        &self,
        key: &StateKey,
        make: impl FnOnce(oneshot::Sender<T>) -> StateRequest,
    ) -> Result<T, StoreError> {
        let sender = self.cell(key).await;
        let (reply_tx, reply_rx) = oneshot::channel();

        let err = || StoreError {
            key: key.describe(),
        };

        sender.send(make(reply_tx)).await.map_err(|_| err())?;
        reply_rx.await.map_err(|_| err())
    }

    /// Get or lazily spawn the actor for a key.
    async fn cell(&self, key: &StateKey) -> mpsc::Sender<StateRequest> {
        // Fast path: actor already exists
        {
            let cells = self.cells.read().await;
            if let Some(sender) = cells.get(key) {
                return sender.clone();
            }
        }

        let mut cells = self.cells.write().await;
        // Double-check: another task may have spawned it meanwhile
        if let Some(sender) = cells.get(key) {
            return sender.clone();
        }

        let (tx, rx) = mpsc::channel(32);
        let value = key.initial_value();
        tokio::spawn(run_cell(value, rx));
        cells.insert(key.clone(), tx.clone());

        tracing::trace!("Spawned state cell for key '{}'", key.describe());
        tx
    }
}

/// Actor loop: one value, requests applied strictly in arrival order.
async fn run_cell(mut value: StateValue, mut rx: mpsc::Receiver<StateRequest>) {
    while let Some(request) = rx.recv().await {
        apply(&mut value, request);
    }
}

fn apply(value: &mut StateValue, request: StateRequest) {
    match (request, value) {
        (StateRequest::TryJoin { required, reply }, StateValue::Counter(count)) => {
            // Countdown latch: the final parent sees true and the stored
            // count stays one short of the requirement.
            if *count + 1 >= required {
                let _ = reply.send(true);
            } else {
                *count += 1;
                let _ = reply.send(false);
            }
        }
        (StateRequest::TryAcquire { reply }, StateValue::Scale { max, in_process }) => {
            let admission = if *max == 0 {
                Admission::Unlimited
            } else if *in_process < *max {
                *in_process += 1;
                Admission::Admitted
            } else {
                Admission::Full
            };
            let _ = reply.send(admission);
        }
        (StateRequest::Release { reply }, StateValue::Scale { in_process, .. }) => {
            *in_process = in_process.saturating_sub(1);
            let _ = reply.send(());
        }
        (StateRequest::SetCapacity { max, reply }, StateValue::Scale { max: current, .. }) => {
            *current = max;
            let _ = reply.send(());
        }
        (StateRequest::Capacity { reply }, StateValue::Scale { max, .. }) => {
            let _ = reply.send(*max);
        }
        (StateRequest::ReadRun { reply }, StateValue::Run(state)) => {
            let _ = reply.send(*state);
        }
        (StateRequest::SetRun { state, reply }, StateValue::Run(current)) => {
            *current = state;
            let _ = reply.send(());
        }
        (StateRequest::Increment { reply }, StateValue::Counter(count)) => {
            *count += 1;
            let _ = reply.send(*count);
        }
        (StateRequest::Decrement { reply }, StateValue::Counter(count)) => {
            *count = count.saturating_sub(1);
            let _ = reply.send(*count);
        }
        // Key variants fix the value shape, so these arms are unreachable;
        // dropping the reply surfaces a StoreError at the caller.
        (_, value) => {
            tracing::error!("State cell received request for mismatched value {value:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_barrier_fires_exactly_once() {
        let store = StateStore::new();

        // Three parents; only the last arrival gets true
        assert!(!store.try_join("r1", 4, 3).await.unwrap());
        assert!(!store.try_join("r1", 4, 3).await.unwrap());
        assert!(store.try_join("r1", 4, 3).await.unwrap());
    }

    #[tokio::test]
    async fn join_barrier_is_per_run_and_step() {
        let store = StateStore::new();

        assert!(!store.try_join("r1", 4, 2).await.unwrap());
        // Different run and different step keys are independent latches
        assert!(!store.try_join("r2", 4, 2).await.unwrap());
        assert!(!store.try_join("r1", 5, 2).await.unwrap());
        assert!(store.try_join("r1", 4, 2).await.unwrap());
    }

    #[tokio::test]
    async fn join_barrier_exactly_once_under_concurrency() {
        let store = std::sync::Arc::new(StateStore::new());
        let required = 16u32;

        let mut tasks = Vec::new();
        for _ in 0..required {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.try_join("race", 9, required).await.unwrap()
            }));
        }

        let mut fired = 0;
        for task in tasks {
            if task.await.unwrap() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
    }

    #[tokio::test]
    async fn scale_group_counts_up_to_capacity() {
        let store = StateStore::new();
        store.set_capacity("g", 2).await.unwrap();

        assert_eq!(store.try_acquire("g").await.unwrap(), Admission::Admitted);
        assert_eq!(store.try_acquire("g").await.unwrap(), Admission::Admitted);
        assert_eq!(store.try_acquire("g").await.unwrap(), Admission::Full);

        store.release("g").await.unwrap();
        assert_eq!(store.try_acquire("g").await.unwrap(), Admission::Admitted);
    }

    #[tokio::test]
    async fn zero_capacity_means_unlimited() {
        let store = StateStore::new();

        for _ in 0..10 {
            assert_eq!(store.try_acquire("g").await.unwrap(), Admission::Unlimited);
        }
        assert_eq!(store.capacity("g").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn capacity_can_change_while_counted() {
        let store = StateStore::new();
        store.set_capacity("g", 1).await.unwrap();
        assert_eq!(store.try_acquire("g").await.unwrap(), Admission::Admitted);

        store.set_capacity("g", 2).await.unwrap();
        assert_eq!(store.try_acquire("g").await.unwrap(), Admission::Admitted);
        assert_eq!(store.try_acquire("g").await.unwrap(), Admission::Full);
    }

    #[tokio::test]
    async fn release_never_underflows() {
        let store = StateStore::new();
        store.set_capacity("g", 1).await.unwrap();

        store.release("g").await.unwrap();
        store.release("g").await.unwrap();
        assert_eq!(store.try_acquire("g").await.unwrap(), Admission::Admitted);
        assert_eq!(store.try_acquire("g").await.unwrap(), Admission::Full);
    }

    #[tokio::test]
    async fn run_state_defaults_to_ready_on_first_read() {
        let store = StateStore::new();
        assert_eq!(store.run_state("wf:billing").await.unwrap(), RunState::Ready);

        store
            .set_run_state("wf:billing", RunState::Paused)
            .await
            .unwrap();
        assert_eq!(
            store.run_state("wf:billing").await.unwrap(),
            RunState::Paused
        );
        // Other keys are untouched
        assert_eq!(store.run_state("gk:batch").await.unwrap(), RunState::Ready);
    }

    #[tokio::test]
    async fn in_progress_counter_tracks_and_saturates() {
        let store = StateStore::new();

        assert_eq!(store.incr_in_progress("r1", 2).await.unwrap(), 1);
        assert_eq!(store.incr_in_progress("r1", 2).await.unwrap(), 2);
        assert_eq!(store.decr_in_progress("r1", 2).await.unwrap(), 1);
        assert_eq!(store.decr_in_progress("r1", 2).await.unwrap(), 0);
        assert_eq!(store.decr_in_progress("r1", 2).await.unwrap(), 0);
    }
}
