//! Persisted state types.
//!
//! State records, per resource, the data that was last applied and the output
//! the provider returned. It is the source graph for the next run and the only
//! place resolved reference values come from during a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StateError;
use crate::graph::{
    Graph, ImportMetadata, PropertyMap, Resource, ResourceData, ResourceOutput, StoredPayload,
    Urn,
};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of history entries kept.
const MAX_HISTORY: usize = 100;

/// The complete persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// State format version.
    pub version: String,
    /// Fingerprint of the last applied target graph.
    #[serde(default)]
    pub last_applied_hash: String,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Per-resource entries.
    #[serde(default)]
    pub resources: BTreeMap<Urn, ResourceState>,
    /// Recent runs, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// State of a single applied resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Local resource ID.
    pub id: String,
    /// Applied data in property form. References keep their target and the
    /// value they resolved to.
    pub input: PropertyMap,
    /// Kind of the typed payload `input` was produced from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_kind: Option<String>,
    /// Provider output, including the raw output custom resolvers read.
    #[serde(default)]
    pub output: ResourceOutput,
    /// Remote object this resource was linked to, if imported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportMetadata>,
    /// URNs this resource depended on when applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Urn>,
    /// When this entry was last written.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Kind of run.
    pub operation: RunKind,
    /// Fingerprint of the target graph.
    pub graph_hash: String,
    /// Operations that succeeded.
    pub succeeded: usize,
    /// Operations that failed, were skipped or abandoned.
    pub failed: usize,
    /// Optional error summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Kinds of runs recorded in history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Reconcile towards a target graph.
    Apply,
    /// Delete everything in state.
    Destroy,
}

impl State {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            last_applied_hash: String::new(),
            last_updated: Utc::now(),
            resources: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    /// Gets the entry for `urn`.
    #[must_use]
    pub fn get(&self, urn: &Urn) -> Option<&ResourceState> {
        self.resources.get(urn)
    }

    /// Gets the recorded output for `urn`.
    #[must_use]
    pub fn output_for(&self, urn: &Urn) -> Option<&ResourceOutput> {
        self.resources.get(urn).map(|r| &r.output)
    }

    /// Records a successfully applied resource.
    ///
    /// `resource` is stored as given; resolve its references first. An
    /// existing import link is kept unless `resource` carries its own.
    pub fn record_applied(&mut self, resource: &Resource, output: ResourceOutput, dependencies: Vec<Urn>) {
        let data = resource.data();
        let import = resource.import_metadata().cloned().or_else(|| {
            self.resources
                .get(resource.urn())
                .and_then(|entry| entry.import.clone())
        });
        let entry = ResourceState {
            resource_type: resource.resource_type().to_string(),
            id: resource.id().to_string(),
            input: data.properties().into_owned(),
            payload_kind: data.opaque_kind().map(str::to_string),
            output,
            import,
            dependencies,
            updated_at: Utc::now(),
        };
        self.resources.insert(resource.urn().clone(), entry);
        self.last_updated = Utc::now();
    }

    /// Removes the entry for `urn`.
    pub fn remove(&mut self, urn: &Urn) -> Option<ResourceState> {
        let result = self.resources.remove(urn);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Adds a history entry, dropping the oldest beyond the cap.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Number of resources in state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if no resources are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Rebuilds the last applied graph, edges included.
    ///
    /// Typed payloads come back as [`StoredPayload`]s.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry's key disagrees with its type and ID.
    pub fn to_graph(&self) -> Result<Graph, StateError> {
        let mut graph = Graph::new();
        for (urn, entry) in &self.resources {
            if *urn != Urn::new(&entry.resource_type, &entry.id) {
                return Err(StateError::InvalidEntry {
                    urn: urn.to_string(),
                    message: format!(
                        "entry describes {}:{} instead",
                        entry.resource_type, entry.id
                    ),
                });
            }
            let data = match &entry.payload_kind {
                Some(kind) => ResourceData::Opaque(Box::new(StoredPayload::new(
                    kind.clone(),
                    entry.input.clone(),
                ))),
                None => ResourceData::Structured(entry.input.clone()),
            };
            let mut resource = Resource::with_data(&entry.resource_type, &entry.id, data);
            if let Some(import) = &entry.import {
                resource = resource.with_import(import.clone());
            }
            graph.add_dependencies(urn, &entry.dependencies);
            graph.add_resource(resource);
        }
        Ok(graph)
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryEntry {
    /// Creates a history entry.
    #[must_use]
    pub fn new(operation: RunKind, graph_hash: &str, succeeded: usize, failed: usize) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            graph_hash: graph_hash.to_string(),
            succeeded,
            failed,
            error: None,
        }
    }

    /// Attaches an error summary.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}
