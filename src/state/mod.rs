//! State management.
//!
//! This module provides persistent state for applied resources: their last
//! applied data, provider outputs, dependency edges and a short run history,
//! plus advisory locking around runs.

mod local;
mod lock;
mod store;
mod types;

pub use local::{DEFAULT_STATE_PATH, LocalStateStore};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use store::StateStore;
pub use types::{HistoryEntry, ResourceState, RunKind, STATE_VERSION, State};
