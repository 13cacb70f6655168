//! Serialized graph documents.
//!
//! A loader-independent JSON form of a target graph, used by the CLI to
//! preview plans offline:
//!
//! ```json
//! {
//!   "resources": [
//!     { "type": "event", "id": "e1", "data": { "name": "Signed Up" } },
//!     {
//!       "type": "tracking-plan",
//!       "id": "tp1",
//!       "data": { "events": [{ "$ref": "event:e1", "property": "id" }] },
//!       "depends_on": ["source:web"]
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::GraphError;

use super::graph::Graph;
use super::property::{map_from_json, map_to_json};
use super::resource::{ImportMetadata, Resource};
use super::urn::Urn;

/// Top-level graph document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Declared resources.
    #[serde(default)]
    pub resources: Vec<ResourceDocument>,
}

/// One declared resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDocument {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Local ID.
    pub id: String,
    /// Property data; references use the `$ref` encoding.
    #[serde(default = "empty_object")]
    pub data: Value,
    /// Explicit dependencies, as URN strings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Link to an existing remote object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportMetadata>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl GraphDocument {
    /// Reads a document from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path).map_err(|e| GraphError::Malformed {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        serde_json::from_str(&content).map_err(|e| GraphError::Malformed {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Builds a graph from the document.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed data, references or dependency URNs.
    pub fn into_graph(self) -> Result<Graph, GraphError> {
        let mut graph = Graph::new();
        for doc in self.resources {
            if doc.resource_type.is_empty() || doc.resource_type.contains(':') || doc.id.is_empty()
            {
                return Err(GraphError::InvalidUrn {
                    urn: format!("{}:{}", doc.resource_type, doc.id),
                });
            }
            let mut resource = Resource::new(&doc.resource_type, &doc.id, map_from_json(doc.data)?);
            if let Some(import) = doc.import {
                resource = resource.with_import(import);
            }
            let urn = resource.urn().clone();
            for dep in &doc.depends_on {
                graph.add_dependency(&urn, &Urn::parse(dep)?);
            }
            graph.add_resource(resource);
        }
        Ok(graph)
    }

    /// Renders a graph as a document. Explicit and implicit edges are both
    /// written to `depends_on`.
    #[must_use]
    pub fn from_graph(graph: &Graph) -> Self {
        let resources = graph
            .resources()
            .map(|resource| ResourceDocument {
                resource_type: resource.resource_type().to_string(),
                id: resource.id().to_string(),
                data: map_to_json(&resource.data().properties()),
                depends_on: graph
                    .dependencies(resource.urn())
                    .map(ToString::to_string)
                    .collect(),
                import: resource.import_metadata().cloned(),
            })
            .collect();
        Self { resources }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_to_graph() {
        let doc: GraphDocument = serde_json::from_value(json!({
            "resources": [
                {"type": "event", "id": "e1", "data": {"name": "Signed Up"}},
                {"type": "source", "id": "web"},
                {
                    "type": "tracking-plan",
                    "id": "tp1",
                    "data": {"events": [{"$ref": "event:e1", "property": "id"}]},
                    "depends_on": ["source:web"],
                    "import": {"remote_id": "tp_1", "workspace_id": "ws"}
                }
            ]
        }))
        .unwrap();

        let graph = doc.into_graph().unwrap();
        let tp1 = Urn::new("tracking-plan", "tp1");
        assert_eq!(graph.len(), 3);
        let deps: Vec<_> = graph.dependencies(&tp1).map(Urn::as_str).collect();
        assert_eq!(deps, vec!["event:e1", "source:web"]);
        assert_eq!(
            graph.get_resource(&tp1).unwrap().import_metadata().unwrap().remote_id,
            "tp_1"
        );
    }

    #[test]
    fn test_invalid_dependency_rejected() {
        let doc: GraphDocument = serde_json::from_value(json!({
            "resources": [{"type": "event", "id": "e1", "depends_on": ["bogus"]}]
        }))
        .unwrap();
        assert!(matches!(doc.into_graph(), Err(GraphError::InvalidUrn { .. })));
    }

    #[test]
    fn test_graph_round_trip_preserves_edges() {
        let doc: GraphDocument = serde_json::from_value(json!({
            "resources": [
                {"type": "event", "id": "e1"},
                {"type": "event", "id": "e2", "depends_on": ["event:e1"]}
            ]
        }))
        .unwrap();
        let graph = doc.into_graph().unwrap();
        let rendered = GraphDocument::from_graph(&graph);
        assert_eq!(rendered.resources[1].depends_on, vec!["event:e1"]);
    }
}
