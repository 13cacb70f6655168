//! JSON file state backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Result, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
use super::store::StateStore;
use super::types::{STATE_VERSION, State};

/// Default state file location, relative to the working directory.
pub const DEFAULT_STATE_PATH: &str = ".keystone/state.json";

const LOCK_FILE: &str = "state.lock";

/// State kept in a local JSON file, with a lock file next to it.
#[derive(Debug, Clone)]
pub struct LocalStateStore {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalStateStore {
    /// Creates a store for the given state file.
    #[must_use]
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let lock_path = state_path
            .parent()
            .map_or_else(|| PathBuf::from(LOCK_FILE), |dir| dir.join(LOCK_FILE));
        Self {
            state_path,
            lock_path,
        }
    }

    /// Creates a store keeping `state.json` inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("state.json"))
    }

    /// Path of the state file.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn ensure_parent(&self) -> Result<()> {
        if let Some(dir) = self.state_path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.exists()
        {
            debug!("Creating state directory: {}", dir.display());
            fs::create_dir_all(dir)
                .await
                .map_err(|e| StateError::write(format!("cannot create {}: {e}", dir.display())))?;
        }
        Ok(())
    }

    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.lock_path)
            .await
            .map_err(|e| corrupted(format!("cannot read lock file: {e}")))?;
        let info = serde_json::from_str(&content)
            .map_err(|e| corrupted(format!("cannot parse lock file: {e}")))?;
        Ok(Some(info))
    }

    async fn write_lock_file(&self, info: &LockInfo) -> Result<()> {
        self.ensure_parent().await?;
        let content = serde_json::to_vec_pretty(info)
            .map_err(|e| StateError::serialization(format!("lock: {e}")))?;
        write_synced(&self.lock_path, &content)
            .await
            .map_err(|e| lock_failed(format!("cannot write lock file: {e}")))?;
        Ok(())
    }

    async fn delete_lock_file(&self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path)
                .await
                .map_err(|e| lock_failed(format!("cannot delete lock file: {e}")))?;
        }
        Ok(())
    }
}

impl Default for LocalStateStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_PATH)
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<State>> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        info!("Loading state from: {}", self.state_path.display());
        let content = fs::read_to_string(&self.state_path)
            .await
            .map_err(|e| corrupted(format!("cannot read state file: {e}")))?;
        let state: State = serde_json::from_str(&content)
            .map_err(|e| corrupted(format!("cannot parse state file: {e}")))?;

        if state.version != STATE_VERSION {
            return Err(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: state.version,
            }
            .into());
        }
        Ok(Some(state))
    }

    async fn save(&self, state: &State) -> Result<()> {
        self.ensure_parent().await?;
        info!(resources = state.len(), "Saving state to: {}", self.state_path.display());

        let content = serde_json::to_vec_pretty(state)
            .map_err(|e| StateError::serialization(format!("state: {e}")))?;

        // Write-then-rename so a crash never leaves a truncated file.
        let temp_path = self.state_path.with_extension("json.tmp");
        write_synced(&temp_path, &content)
            .await
            .map_err(|e| StateError::write(format!("{}: {e}", temp_path.display())))?;
        fs::rename(&temp_path, &self.state_path)
            .await
            .map_err(|e| StateError::write(format!("cannot replace state file: {e}")))?;

        debug!("State saved");
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        if self.state_path.exists() {
            info!("Deleting state file: {}", self.state_path.display());
            fs::remove_file(&self.state_path)
                .await
                .map_err(|e| StateError::write(format!("cannot delete state file: {e}")))?;
        }
        self.delete_lock_file().await
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.state_path.exists())
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock_file().await? {
            if !existing.is_expired() {
                return Err(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }
                .into());
            }
            warn!(holder = %existing.holder, "Taking over expired state lock");
        }

        let holder = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };
        let info = LockInfo::new(&holder);
        self.write_lock_file(&info).await?;

        info!(
            "Acquired state lock {} (expires in {LOCK_EXPIRY_SECS}s)",
            info.lock_id
        );
        Ok(info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        match self.read_lock_file().await? {
            Some(existing) if existing.lock_id == lock_id => {
                self.delete_lock_file().await?;
                info!("Released state lock {lock_id}");
            }
            Some(existing) => {
                debug!("Lock {lock_id} no longer held; current lock is {}", existing.lock_id);
            }
            None => {}
        }
        Ok(())
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        self.read_lock_file().await
    }

    async fn is_locked(&self) -> Result<bool> {
        Ok(self
            .read_lock_file()
            .await?
            .is_some_and(|info| !info.is_expired()))
    }

    async fn force_unlock(&self) -> Result<()> {
        warn!("Force-removing state lock at {}", self.lock_path.display());
        self.delete_lock_file().await
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

async fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(content).await?;
    file.sync_all().await
}

fn corrupted(message: String) -> StateError {
    StateError::Corrupted { message }
}

fn lock_failed(message: String) -> StateError {
    StateError::LockFailed { message }
}
