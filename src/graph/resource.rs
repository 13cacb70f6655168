//! Resources and their payloads.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::ResolveError;
use crate::planner::{PropertyDiffs, compare_maps};

use super::property::{PropertyMap, PropertyRef, collect_ref_targets, visit_refs_mut};
use super::urn::Urn;

/// Marks a resource as a link to an existing remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMetadata {
    /// ID of the existing remote object.
    pub remote_id: String,
    /// Workspace the remote object lives in.
    pub workspace_id: String,
}

/// A provider-specific payload that does not fit the generic property model.
///
/// The engine never inspects a typed payload directly: it persists the
/// payload's property form, asks the payload to diff itself against the
/// previously persisted form, and resolves the references it exposes.
pub trait TypedPayload: fmt::Debug + Send + Sync {
    /// Stable name of the payload kind; persisted alongside its properties.
    fn kind(&self) -> &str;

    /// Property form used for persistence and rendering. References are kept.
    fn to_properties(&self) -> PropertyMap;

    /// Per-property differences against the previously persisted form.
    fn diff_against(&self, previous: &PropertyMap) -> PropertyDiffs {
        compare_maps(previous, &self.to_properties())
    }

    /// Visits every embedded reference.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `visit`.
    fn visit_refs_mut(
        &mut self,
        visit: &mut dyn FnMut(&mut PropertyRef) -> Result<(), ResolveError>,
    ) -> Result<(), ResolveError>;

    /// Clones the payload behind a fresh box.
    fn clone_box(&self) -> Box<dyn TypedPayload>;
}

impl Clone for Box<dyn TypedPayload> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A typed payload restored from persisted state.
///
/// The original payload type is not known when state is loaded, so the
/// persisted property form stands in for it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPayload {
    kind: String,
    properties: PropertyMap,
}

impl StoredPayload {
    /// Wraps a persisted payload.
    #[must_use]
    pub const fn new(kind: String, properties: PropertyMap) -> Self {
        Self { kind, properties }
    }
}

impl TypedPayload for StoredPayload {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn to_properties(&self) -> PropertyMap {
        self.properties.clone()
    }

    fn visit_refs_mut(
        &mut self,
        visit: &mut dyn FnMut(&mut PropertyRef) -> Result<(), ResolveError>,
    ) -> Result<(), ResolveError> {
        visit_refs_mut(&mut self.properties, visit)
    }

    fn clone_box(&self) -> Box<dyn TypedPayload> {
        Box::new(self.clone())
    }
}

/// A resource's desired (or last applied) configuration.
#[derive(Debug, Clone)]
pub enum ResourceData {
    /// Generic, map-shaped data; diffed key by key.
    Structured(PropertyMap),
    /// Provider-typed data; diffed by the payload itself.
    Opaque(Box<dyn TypedPayload>),
}

impl ResourceData {
    /// Property form of the data.
    #[must_use]
    pub fn properties(&self) -> Cow<'_, PropertyMap> {
        match self {
            Self::Structured(map) => Cow::Borrowed(map),
            Self::Opaque(payload) => Cow::Owned(payload.to_properties()),
        }
    }

    /// Kind of the typed payload, if opaque.
    #[must_use]
    pub fn opaque_kind(&self) -> Option<&str> {
        match self {
            Self::Structured(_) => None,
            Self::Opaque(payload) => Some(payload.kind()),
        }
    }

    /// Visits every embedded reference.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `visit`.
    pub fn visit_refs_mut(
        &mut self,
        visit: &mut dyn FnMut(&mut PropertyRef) -> Result<(), ResolveError>,
    ) -> Result<(), ResolveError> {
        match self {
            Self::Structured(map) => visit_refs_mut(map, visit),
            Self::Opaque(payload) => payload.visit_refs_mut(visit),
        }
    }

    /// URNs referenced anywhere in the data.
    #[must_use]
    pub fn ref_targets(&self) -> BTreeSet<Urn> {
        let mut targets = BTreeSet::new();
        collect_ref_targets(&self.properties(), &mut targets);
        targets
    }
}

impl Default for ResourceData {
    fn default() -> Self {
        Self::Structured(PropertyMap::new())
    }
}

/// A single managed resource.
#[derive(Debug, Clone)]
pub struct Resource {
    urn: Urn,
    data: ResourceData,
    import_metadata: Option<ImportMetadata>,
}

impl Resource {
    /// Creates a resource with generic property data.
    #[must_use]
    pub fn new(resource_type: &str, id: &str, data: PropertyMap) -> Self {
        Self::with_data(resource_type, id, ResourceData::Structured(data))
    }

    /// Creates a resource carrying a typed payload.
    #[must_use]
    pub fn opaque(resource_type: &str, id: &str, payload: Box<dyn TypedPayload>) -> Self {
        Self::with_data(resource_type, id, ResourceData::Opaque(payload))
    }

    /// Creates a resource from either data representation.
    #[must_use]
    pub fn with_data(resource_type: &str, id: &str, data: ResourceData) -> Self {
        Self {
            urn: Urn::new(resource_type, id),
            data,
            import_metadata: None,
        }
    }

    /// Marks the resource as a link to an existing remote object.
    #[must_use]
    pub fn with_import(mut self, metadata: ImportMetadata) -> Self {
        self.import_metadata = Some(metadata);
        self
    }

    /// The resource's URN.
    #[must_use]
    pub const fn urn(&self) -> &Urn {
        &self.urn
    }

    /// The resource type.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        self.urn.resource_type()
    }

    /// The local resource ID.
    #[must_use]
    pub fn id(&self) -> &str {
        self.urn.id()
    }

    /// The resource data.
    #[must_use]
    pub const fn data(&self) -> &ResourceData {
        &self.data
    }

    /// Mutable access to the resource data.
    pub fn data_mut(&mut self) -> &mut ResourceData {
        &mut self.data
    }

    /// Import metadata, if the resource links to an existing remote object.
    #[must_use]
    pub const fn import_metadata(&self) -> Option<&ImportMetadata> {
        self.import_metadata.as_ref()
    }

    /// Sets or replaces the import metadata.
    pub fn set_import_metadata(&mut self, metadata: ImportMetadata) {
        self.import_metadata = Some(metadata);
    }

    /// The `name` property, if present and a string.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        self.data
            .properties()
            .get("name")
            .and_then(|v| v.as_str().map(str::to_string))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.urn)
    }
}
