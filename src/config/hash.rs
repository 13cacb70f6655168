//! Graph fingerprinting for change detection.
//!
//! The fingerprint of the last applied target graph is stored in state, so
//! `state show` can tell whether a graph document matches what was applied.

use sha2::{Digest, Sha256};

use crate::graph::{Graph, GraphDocument, Resource, map_to_json};

/// Hasher for computing graph fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a fingerprint of the whole graph: every resource's data,
    /// import link and dependency edges.
    ///
    /// Resources are visited in URN order and object keys are sorted, so the
    /// fingerprint does not depend on declaration order.
    #[must_use]
    pub fn hash_graph(&self, graph: &Graph) -> String {
        let mut hasher = Sha256::new();
        for doc in GraphDocument::from_graph(graph).resources {
            hasher.update(doc.resource_type.as_bytes());
            hasher.update([0]);
            hasher.update(doc.id.as_bytes());
            hasher.update([0]);
            hasher.update(doc.data.to_string().as_bytes());
            if let Some(import) = &doc.import {
                hasher.update(import.remote_id.as_bytes());
                hasher.update(import.workspace_id.as_bytes());
            }
            for dep in &doc.depends_on {
                hasher.update(dep.as_bytes());
                hasher.update([0]);
            }
            hasher.update([0xff]);
        }
        hex::encode(hasher.finalize())
    }

    /// Computes a fingerprint of a single resource's data.
    #[must_use]
    pub fn hash_resource(&self, resource: &Resource) -> String {
        let mut hasher = Sha256::new();
        hasher.update(resource.urn().as_str().as_bytes());
        hasher.update(map_to_json(&resource.data().properties()).to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns the first 12 characters of a fingerprint, for display.
    #[must_use]
    pub fn short_hash(hash: &str) -> &str {
        hash.get(..12).unwrap_or(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ImportMetadata, PropertyMap, PropertyValue, Urn};

    fn resource(id: &str, name: &str) -> Resource {
        let mut props = PropertyMap::new();
        props.insert("name".into(), PropertyValue::from(name));
        Resource::new("event", id, props)
    }

    #[test]
    fn test_hash_deterministic_across_insertion_order() {
        let hasher = ConfigHasher::new();
        let mut a = Graph::new();
        a.add_resource(resource("e1", "Signup"));
        a.add_resource(resource("e2", "Login"));
        let mut b = Graph::new();
        b.add_resource(resource("e2", "Login"));
        b.add_resource(resource("e1", "Signup"));

        assert_eq!(hasher.hash_graph(&a), hasher.hash_graph(&b));
        assert_eq!(hasher.hash_graph(&a).len(), 64);
    }

    #[test]
    fn test_hash_changes_with_data_edges_and_import() {
        let hasher = ConfigHasher::new();
        let mut graph = Graph::new();
        graph.add_resource(resource("e1", "Signup"));
        graph.add_resource(resource("e2", "Login"));
        let base = hasher.hash_graph(&graph);

        let mut renamed = graph.clone();
        renamed.add_resource(resource("e1", "Sign up"));
        assert_ne!(base, hasher.hash_graph(&renamed));

        let mut edged = graph.clone();
        edged.add_dependency(&Urn::new("event", "e2"), &Urn::new("event", "e1"));
        assert_ne!(base, hasher.hash_graph(&edged));

        let mut imported = graph.clone();
        imported.set_import_metadata(
            &Urn::new("event", "e1"),
            ImportMetadata {
                remote_id: String::from("ev_9"),
                workspace_id: String::from("ws"),
            },
        );
        assert_ne!(base, hasher.hash_graph(&imported));
    }

    #[test]
    fn test_hash_resource() {
        let hasher = ConfigHasher::new();
        assert_eq!(
            hasher.hash_resource(&resource("e1", "Signup")),
            hasher.hash_resource(&resource("e1", "Signup"))
        );
        assert_ne!(
            hasher.hash_resource(&resource("e1", "Signup")),
            hasher.hash_resource(&resource("e2", "Signup"))
        );
        assert_eq!(ConfigHasher::short_hash("abc"), "abc");
        assert_eq!(ConfigHasher::short_hash(&"a".repeat(64)).len(), 12);
    }
}
