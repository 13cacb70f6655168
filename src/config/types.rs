//! Engine configuration types.
//!
//! These structs map to `keystone.yaml`:
//!
//! ```yaml
//! concurrency: 4
//! state:
//!   path: .keystone/state.json
//! import:
//!   enabled: true
//!   workspace_id: ws_main
//! lock:
//!   holder: ci-runner
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::executor::DEFAULT_CONCURRENCY;
use crate::state::DEFAULT_STATE_PATH;

/// Root engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum operations in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// State storage.
    #[serde(default)]
    pub state: StateConfig,
    /// Import matching.
    #[serde(default)]
    pub import: ImportConfig,
    /// State locking.
    #[serde(default)]
    pub lock: LockConfig,
}

/// State storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    /// Path of the local state file.
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

/// Import matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ImportConfig {
    /// Offer unmanaged remote resources with matching names for import.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Workspace recorded in import metadata.
    #[serde(default)]
    pub workspace_id: Option<String>,
}

/// State lock configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Lock holder name; generated from host and process when absent.
    #[serde(default)]
    pub holder: Option<String>,
}

const fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_PATH)
}

const fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            state: StateConfig::default(),
            import: ImportConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workspace_id: None,
        }
    }
}

impl EngineConfig {
    /// Workspace recorded in import metadata; empty when unset.
    #[must_use]
    pub fn workspace_id(&self) -> &str {
        self.import.workspace_id.as_deref().unwrap_or_default()
    }

    /// Lock holder name; empty means "generate one".
    #[must_use]
    pub fn lock_holder(&self) -> &str {
        self.lock.holder.as_deref().unwrap_or_default()
    }
}
