/// Engine State Layer
///
/// Key-addressed run-time state (join counters, scale groups, run states,
/// in-progress counters) with per-key serialized access.

pub mod store;

pub use store::{Admission, StateStore, StoreError};
