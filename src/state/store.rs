//! State store trait definition.

use async_trait::async_trait;

use super::lock::LockInfo;
use super::types::State;
use crate::error::Result;

/// Persistence backend for [`State`], with advisory locking.
///
/// Implement this for remote backends; [`LocalStateStore`](super::LocalStateStore)
/// keeps state in a JSON file.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state. Returns `None` if none was saved yet.
    async fn load(&self) -> Result<Option<State>>;

    /// Saves the state, replacing what was there.
    async fn save(&self, state: &State) -> Result<()>;

    /// Deletes the state and any lock.
    async fn delete(&self) -> Result<()>;

    /// Checks if state exists.
    async fn exists(&self) -> Result<bool>;

    /// Acquires the lock. An empty `holder` gets a generated identifier.
    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo>;

    /// Releases the lock if `lock_id` still owns it.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Gets current lock information, expired or not.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Checks if an unexpired lock is held.
    async fn is_locked(&self) -> Result<bool>;

    /// Removes any lock regardless of owner.
    async fn force_unlock(&self) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl StateStore for Box<dyn StateStore> {
    async fn load(&self) -> Result<Option<State>> {
        (**self).load().await
    }

    async fn save(&self, state: &State) -> Result<()> {
        (**self).save(state).await
    }

    async fn delete(&self) -> Result<()> {
        (**self).delete().await
    }

    async fn exists(&self) -> Result<bool> {
        (**self).exists().await
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        (**self).acquire_lock(holder).await
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        (**self).release_lock(lock_id).await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        (**self).get_lock_info().await
    }

    async fn is_locked(&self) -> Result<bool> {
        (**self).is_locked().await
    }

    async fn force_unlock(&self) -> Result<()> {
        (**self).force_unlock().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
