//! Resource graph model.
//!
//! This module provides:
//! - URNs, the canonical `"<type>:<id>"` resource address
//! - Property values and forward references to other resources' outputs
//! - Resources with generic or provider-typed data
//! - The dependency graph and its serialized document form

mod document;
mod graph;
mod property;
mod resource;
mod urn;

pub use document::{GraphDocument, ResourceDocument};
pub use graph::Graph;
pub use property::{
    OutputResolver, PropertyMap, PropertyRef, PropertyValue, RefAccessor, ResolverResult,
    ResourceOutput, collect_ref_targets, map_from_json, map_to_json, materialize_map,
    visit_refs_mut,
};
pub use resource::{ImportMetadata, Resource, ResourceData, StoredPayload, TypedPayload};
pub use urn::Urn;
