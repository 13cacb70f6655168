//! Error types for the Keystone reconciliation engine.
//!
//! Each concern (graph construction, planning, reference resolution, provider
//! calls, state persistence, configuration, execution) has its own error enum.
//! [`KeystoneError`] wraps them all for callers that only need a single type.

use std::path::PathBuf;
use thiserror::Error;

use crate::graph::Urn;

/// The main error type for the Keystone engine.
#[derive(Debug, Error)]
pub enum KeystoneError {
    /// Resource graph errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Property reference resolution errors.
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Provider errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Execution errors.
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    /// Reporter errors (prompting, rendering).
    #[error("Reporter error: {0}")]
    Reporter(String),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Resource graph errors.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A URN string could not be parsed.
    #[error("Invalid URN '{urn}': expected '<type>:<id>'")]
    InvalidUrn {
        /// The offending string.
        urn: String,
    },

    /// A graph document could not be decoded.
    #[error("Malformed graph document: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },

    /// The dependency relation contains a cycle.
    #[error("Circular dependency detected: {}", format_cycle(.members))]
    CircularDependency {
        /// URNs participating in the cycle.
        members: Vec<Urn>,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A graph handed to the planner is not a DAG.
    #[error("Cannot plan over a cyclic {graph} graph: {source}")]
    CyclicDependency {
        /// Which graph ("source" or "target") is cyclic.
        graph: &'static str,
        /// The underlying graph error.
        source: GraphError,
    },

    /// A diff references a resource missing from the graph it came from.
    #[error("Resource {urn} is listed in the diff but missing from the {graph} graph")]
    MissingResource {
        /// The missing URN.
        urn: Urn,
        /// Which graph was consulted.
        graph: &'static str,
    },
}

/// Property reference resolution errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The referenced resource has no output in the running state.
    #[error("Reference to {urn} cannot be resolved: no output recorded in state")]
    MissingOutput {
        /// The referenced URN.
        urn: Urn,
    },

    /// The referenced output property does not exist.
    #[error("Output of {urn} has no property '{property}'")]
    MissingProperty {
        /// The referenced URN.
        urn: Urn,
        /// The requested property.
        property: String,
    },

    /// The referenced output property is not representable as a string.
    #[error("Output property '{property}' of {urn} is not a scalar")]
    NotScalar {
        /// The referenced URN.
        urn: Urn,
        /// The requested property.
        property: String,
    },

    /// A reference restored from state names a resolver nobody registered.
    #[error("No resolver registered for kind '{kind}' (reference to {urn})")]
    UnknownResolver {
        /// The referenced URN.
        urn: Urn,
        /// The resolver kind.
        kind: String,
    },

    /// A custom resolver rejected the raw output.
    #[error("Resolver '{kind}' failed for {urn}: {message}")]
    ResolverFailed {
        /// The referenced URN.
        urn: Urn,
        /// The resolver kind.
        kind: String,
        /// Resolver message.
        message: String,
    },
}

/// Errors returned by providers for a single logical operation.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    /// The remote call failed.
    #[error("{operation} {resource_type} '{id}' failed: {message}")]
    Remote {
        /// Operation name (create, update, ...).
        operation: String,
        /// Resource type.
        resource_type: String,
        /// Local resource ID.
        id: String,
        /// Error message from the remote side.
        message: String,
    },

    /// The provider does not support the requested operation.
    #[error("Provider does not support {operation} for {resource_type}")]
    Unsupported {
        /// Operation name.
        operation: String,
        /// Resource type.
        resource_type: String,
    },

    /// The provider could not list remote resources.
    #[error("Failed to list remote resources: {message}")]
    Listing {
        /// Description of the failure.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State file not found.
    #[error("State file not found: {path}")]
    NotFound {
        /// Path to the missing state file.
        path: PathBuf,
    },

    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Writing state to the backend failed.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },

    /// A state entry could not be turned back into a resource.
    #[error("Invalid state entry {urn}: {message}")]
    InvalidEntry {
        /// URN of the entry.
        urn: String,
        /// Description of the problem.
        message: String,
    },
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// An environment override holds an unusable value.
    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnvVar {
        /// Name of the variable.
        name: String,
        /// The rejected value.
        value: String,
    },
}

/// A single operation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    /// Resource the operation targeted.
    pub urn: Urn,
    /// Human description of the operation (e.g. `create event:e1`).
    pub description: String,
    /// Why it did not succeed.
    pub reason: FailureReason,
}

/// Why an operation did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The operation ran and failed.
    Failed(String),
    /// The operation was not run because a dependency did not succeed.
    Skipped {
        /// The dependency that failed or was skipped.
        blocked_by: Urn,
    },
    /// The run was cancelled before the operation started.
    Cancelled,
}

/// Execution errors.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// One or more operations failed during apply; dependents were skipped.
    #[error("{} of {total} operations did not complete: {}", .failures.len(), format_failures(.failures))]
    OperationsFailed {
        /// Total number of planned operations.
        total: usize,
        /// Every failed, skipped or abandoned operation.
        failures: Vec<OperationFailure>,
    },

    /// One or more deletions failed during destroy.
    #[error("{} of {total} deletions failed: {}", .failures.len(), format_failures(.failures))]
    DestroyFailed {
        /// Total number of planned deletions.
        total: usize,
        /// Every failed deletion.
        failures: Vec<OperationFailure>,
    },

    /// The scheduler lost track of a worker task.
    #[error("Worker task terminated abnormally: {message}")]
    WorkerLost {
        /// Join error description.
        message: String,
    },
}

/// Result type alias for Keystone operations.
pub type Result<T> = std::result::Result<T, KeystoneError>;

impl KeystoneError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if retrying the whole run might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::State(StateError::LockFailed { .. } | StateError::LockedByOther { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates a remote call error.
    #[must_use]
    pub fn remote(
        operation: impl Into<String>,
        resource_type: impl Into<String>,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Remote {
            operation: operation.into(),
            resource_type: resource_type.into(),
            id: id.into(),
            message: message.into(),
        }
    }
}

impl ApplyError {
    /// Returns every operation that did not succeed.
    #[must_use]
    pub fn failures(&self) -> &[OperationFailure] {
        match self {
            Self::OperationsFailed { failures, .. } | Self::DestroyFailed { failures, .. } => {
                failures
            }
            Self::WorkerLost { .. } => &[],
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(message) => write!(f, "failed: {message}"),
            Self::Skipped { blocked_by } => write!(f, "skipped: dependency {blocked_by} did not complete"),
            Self::Cancelled => write!(f, "abandoned: run was cancelled"),
        }
    }
}

fn format_cycle(members: &[Urn]) -> String {
    members
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_failures(failures: &[OperationFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.description, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}
