//! Engine configuration.
//!
//! - Parsing `keystone.yaml`, `.env` and `KEYSTONE_*` overrides
//! - Validating configuration values and graph documents
//! - Fingerprinting target graphs for change detection

mod hash;
mod parser;
mod types;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_CONCURRENCY, ENV_IMPORT_ENABLED, ENV_STATE_PATH,
    ENV_WORKSPACE_ID, apply_env_overrides, find_config_file,
};
pub use types::{EngineConfig, ImportConfig, LockConfig, StateConfig};
pub use validator::{ConfigValidator, MAX_CONCURRENCY, ValidationError, ValidationResult};
