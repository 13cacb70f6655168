//! The resource dependency graph.

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

use crate::error::GraphError;

use super::resource::{ImportMetadata, Resource};
use super::urn::Urn;

/// Resources keyed by URN plus the dependency relation between them.
///
/// `dependencies[a]` holds every URN `a` depends on; `dependents` is its
/// transpose. Edges may name URNs that are not (yet) in the graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    resources: BTreeMap<Urn, Resource>,
    dependencies: BTreeMap<Urn, BTreeSet<Urn>>,
    dependents: BTreeMap<Urn, BTreeSet<Urn>>,
}

impl Graph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a resource.
    ///
    /// Every reference embedded in the resource's data becomes a dependency
    /// edge. Edges recorded earlier for the same URN are kept.
    pub fn add_resource(&mut self, resource: Resource) {
        let urn = resource.urn().clone();
        for target in resource.data().ref_targets() {
            if target != urn {
                self.add_dependency(&urn, &target);
            }
        }
        trace!(%urn, "graph upsert");
        self.resources.insert(urn, resource);
    }

    /// Records that `from` depends on `to`.
    pub fn add_dependency(&mut self, from: &Urn, to: &Urn) {
        self.dependencies
            .entry(from.clone())
            .or_default()
            .insert(to.clone());
        self.dependents
            .entry(to.clone())
            .or_default()
            .insert(from.clone());
    }

    /// Records that `from` depends on each URN in `to`.
    pub fn add_dependencies<'a>(&mut self, from: &Urn, to: impl IntoIterator<Item = &'a Urn>) {
        for target in to {
            self.add_dependency(from, target);
        }
    }

    /// Looks up a resource.
    #[must_use]
    pub fn get_resource(&self, urn: &Urn) -> Option<&Resource> {
        self.resources.get(urn)
    }

    /// Looks up a resource for modification.
    pub fn get_resource_mut(&mut self, urn: &Urn) -> Option<&mut Resource> {
        self.resources.get_mut(urn)
    }

    /// Returns true if the graph holds `urn`.
    #[must_use]
    pub fn contains(&self, urn: &Urn) -> bool {
        self.resources.contains_key(urn)
    }

    /// All resources, in URN order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// All URNs, in order.
    pub fn urns(&self) -> impl Iterator<Item = &Urn> {
        self.resources.keys()
    }

    /// Resources of a single type, in URN order.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .values()
            .filter(move |r| r.resource_type() == resource_type)
    }

    /// Direct dependencies of `urn`.
    pub fn dependencies(&self, urn: &Urn) -> impl Iterator<Item = &Urn> {
        self.dependencies.get(urn).into_iter().flatten()
    }

    /// Direct dependents of `urn`.
    pub fn dependents(&self, urn: &Urn) -> impl Iterator<Item = &Urn> {
        self.dependents.get(urn).into_iter().flatten()
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if the graph has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Attaches import metadata to an existing node, keeping its edges.
    ///
    /// Returns false if `urn` is not in the graph.
    pub fn set_import_metadata(&mut self, urn: &Urn, metadata: ImportMetadata) -> bool {
        self.resources.get_mut(urn).is_some_and(|resource| {
            resource.set_import_metadata(metadata);
            true
        })
    }

    /// Checks that the dependency relation has no cycles.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CircularDependency`] naming the members of one
    /// cycle, in URN order.
    pub fn validate_acyclic(&self) -> Result<(), GraphError> {
        let mut dag: DiGraphMap<&Urn, ()> = DiGraphMap::new();
        for urn in self.resources.keys() {
            dag.add_node(urn);
        }
        for (from, targets) in &self.dependencies {
            for to in targets {
                dag.add_edge(from, to, ());
            }
        }

        if toposort(&dag, None).is_ok() {
            return Ok(());
        }

        let cycle = tarjan_scc(&dag)
            .into_iter()
            .find(|scc| scc.len() > 1 || scc.first().is_some_and(|n| dag.contains_edge(*n, *n)))
            .unwrap_or_default();
        let mut members: Vec<Urn> = cycle.into_iter().cloned().collect();
        members.sort();
        Err(GraphError::CircularDependency { members })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PropertyMap, PropertyRef, PropertyValue};

    fn urn(s: &str) -> Urn {
        Urn::parse(s).unwrap()
    }

    fn plan_referencing(ids: &[&str]) -> Resource {
        let mut data = PropertyMap::new();
        data.insert("name".into(), "plan".into());
        let refs = ids
            .iter()
            .map(|id| PropertyValue::Ref(PropertyRef::property(Urn::new("event", id), "id")))
            .collect::<Vec<_>>();
        data.insert("events".into(), PropertyValue::List(refs));
        Resource::new("tracking-plan", "tp1", data)
    }

    #[test]
    fn test_implicit_edges_from_refs() {
        let mut graph = Graph::new();
        graph.add_resource(plan_referencing(&["e1", "e2"]));

        let deps: Vec<_> = graph.dependencies(&urn("tracking-plan:tp1")).collect();
        assert_eq!(deps, vec![&urn("event:e1"), &urn("event:e2")]);
        let dependents: Vec<_> = graph.dependents(&urn("event:e1")).collect();
        assert_eq!(dependents, vec![&urn("tracking-plan:tp1")]);
    }

    #[test]
    fn test_upsert_replaces_resource() {
        let mut graph = Graph::new();
        graph.add_resource(Resource::new("event", "e1", PropertyMap::new()));
        let mut data = PropertyMap::new();
        data.insert("name".into(), "Signed Up".into());
        graph.add_resource(Resource::new("event", "e1", data));

        assert_eq!(graph.len(), 1);
        assert_eq!(
            graph.get_resource(&urn("event:e1")).and_then(Resource::display_name),
            Some(String::from("Signed Up"))
        );
    }

    #[test]
    fn test_filter_by_type() {
        let mut graph = Graph::new();
        graph.add_resource(Resource::new("event", "e1", PropertyMap::new()));
        graph.add_resource(Resource::new("event", "e2", PropertyMap::new()));
        graph.add_resource(Resource::new("property", "p1", PropertyMap::new()));

        assert_eq!(graph.resources_of_type("event").count(), 2);
        assert_eq!(graph.resources_of_type("source").count(), 0);
    }

    #[test]
    fn test_set_import_metadata_keeps_edges() {
        let mut graph = Graph::new();
        graph.add_resource(plan_referencing(&["e1"]));
        let tp1 = urn("tracking-plan:tp1");

        assert!(graph.set_import_metadata(
            &tp1,
            ImportMetadata {
                remote_id: String::from("tp_9"),
                workspace_id: String::from("ws"),
            }
        ));
        assert!(graph.get_resource(&tp1).unwrap().import_metadata().is_some());
        assert_eq!(graph.dependencies(&tp1).count(), 1);
        assert!(!graph.set_import_metadata(&urn("event:nope"), ImportMetadata {
            remote_id: String::new(),
            workspace_id: String::new(),
        }));
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = Graph::new();
        for id in ["a", "b", "c"] {
            graph.add_resource(Resource::new("event", id, PropertyMap::new()));
        }
        graph.add_dependency(&urn("event:a"), &urn("event:b"));
        graph.add_dependency(&urn("event:b"), &urn("event:c"));
        assert!(graph.validate_acyclic().is_ok());

        graph.add_dependency(&urn("event:c"), &urn("event:a"));
        let err = graph.validate_acyclic().unwrap_err();
        let GraphError::CircularDependency { members } = err else {
            panic!("expected cycle error");
        };
        assert_eq!(members, vec![urn("event:a"), urn("event:b"), urn("event:c")]);
    }

    #[test]
    fn test_dangling_edge_allowed() {
        let mut graph = Graph::new();
        graph.add_dependency(&urn("event:a"), &urn("event:missing"));
        assert!(graph.is_empty());
        assert!(graph.validate_acyclic().is_ok());
    }
}
