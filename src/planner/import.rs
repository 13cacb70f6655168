//! Name-based matching of new resources against unmanaged remote ones.
//!
//! When a workspace already holds objects that were created outside this
//! tool, declaring a resource with the same type and name should link to the
//! existing object instead of creating a duplicate.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::graph::{Graph, ImportMetadata, PropertyMap, Urn};

use super::diff::Diff;

/// A provider-typed remote object that can report its display name.
pub trait NamedRemote: fmt::Debug + Send + Sync {
    /// The object's name, if it has one.
    fn name(&self) -> Option<&str>;
}

/// Payload of an unmanaged remote object.
#[derive(Debug, Clone)]
pub enum RemoteData {
    /// Generic properties; the name is the `"name"` key.
    Properties(PropertyMap),
    /// Provider-typed object.
    Typed(Arc<dyn NamedRemote>),
    /// No payload.
    Empty,
}

/// A remote object not tracked in state.
#[derive(Debug, Clone)]
pub struct UnmanagedResource {
    /// Resource type.
    pub resource_type: String,
    /// Remote ID.
    pub remote_id: String,
    /// Remote payload.
    pub data: RemoteData,
}

impl UnmanagedResource {
    /// Creates an unmanaged resource with generic properties.
    #[must_use]
    pub fn new(resource_type: &str, remote_id: &str, data: PropertyMap) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            remote_id: remote_id.to_string(),
            data: RemoteData::Properties(data),
        }
    }

    /// The object's name; empty when it has none.
    #[must_use]
    pub fn name(&self) -> String {
        match &self.data {
            RemoteData::Properties(map) => map
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            RemoteData::Typed(remote) => remote.name().unwrap_or_default().to_string(),
            RemoteData::Empty => String::new(),
        }
    }
}

/// A proposed link between a new local resource and a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportCandidate {
    /// The local resource that would otherwise be created.
    pub local_urn: Urn,
    /// The matching remote object.
    pub remote_id: String,
    /// The shared name.
    pub remote_name: String,
    /// The shared type.
    pub resource_type: String,
}

impl fmt::Display for ImportCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} '{}' ({})",
            self.local_urn, self.resource_type, self.remote_name, self.remote_id
        )
    }
}

/// Unmanaged remote objects indexed by `(type, name)`.
#[derive(Debug, Default)]
pub struct ImportIndex {
    entries: BTreeMap<(String, String), String>,
}

impl ImportIndex {
    /// Indexes `resources`.
    ///
    /// Nameless objects are skipped. When several objects of one type share a
    /// name, the lexicographically lowest remote ID wins.
    #[must_use]
    pub fn build(resources: &[UnmanagedResource]) -> Self {
        let mut entries: BTreeMap<(String, String), String> = BTreeMap::new();
        for resource in resources {
            let name = resource.name();
            if name.is_empty() {
                continue;
            }
            entries
                .entry((resource.resource_type.clone(), name))
                .and_modify(|current| {
                    if resource.remote_id < *current {
                        current.clone_from(&resource.remote_id);
                    }
                })
                .or_insert_with(|| resource.remote_id.clone());
        }
        debug!(entries = entries.len(), "built import index");
        Self { entries }
    }

    /// Remote ID registered for `(resource_type, name)`.
    #[must_use]
    pub fn lookup(&self, resource_type: &str, name: &str) -> Option<&str> {
        self.entries
            .get(&(resource_type.to_string(), name.to_string()))
            .map(String::as_str)
    }

    /// Number of indexed names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Offers an import candidate for each new resource whose type and name match
/// an indexed remote object.
///
/// Resources that already carry import metadata are not offered again.
#[must_use]
pub fn match_candidates(diff: &Diff, target: &Graph, index: &ImportIndex) -> Vec<ImportCandidate> {
    diff.new_resources
        .iter()
        .filter_map(|urn| target.get_resource(urn))
        .filter(|resource| resource.import_metadata().is_none())
        .filter_map(|resource| {
            let name = resource.display_name()?;
            let remote_id = index.lookup(resource.resource_type(), &name)?;
            Some(ImportCandidate {
                local_urn: resource.urn().clone(),
                remote_id: remote_id.to_string(),
                remote_name: name,
                resource_type: resource.resource_type().to_string(),
            })
        })
        .collect()
}

/// Lists every matched candidate in `diff.importable_resources`, confirmed
/// or not. Only new resources are added.
pub fn mark_importable(diff: &mut Diff, candidates: &[ImportCandidate]) {
    for candidate in candidates {
        let urn = &candidate.local_urn;
        if diff.new_resources.contains(urn) && !diff.importable_resources.contains(urn) {
            diff.importable_resources.push(urn.clone());
        }
    }
}

/// Injects import metadata for each confirmed candidate into `target`.
///
/// Returns the number of resources updated.
pub fn apply_imports(target: &mut Graph, confirmed: &[ImportCandidate], workspace_id: &str) -> usize {
    let mut applied = 0;
    for candidate in confirmed {
        let metadata = ImportMetadata {
            remote_id: candidate.remote_id.clone(),
            workspace_id: workspace_id.to_string(),
        };
        if target.set_import_metadata(&candidate.local_urn, metadata) {
            info!(urn = %candidate.local_urn, remote_id = %candidate.remote_id, "linked to existing remote resource");
            applied += 1;
        }
    }
    applied
}
