//! Turning a diff into an ordered operation list.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::error::PlanError;
use crate::graph::{Graph, Resource, Urn};

use super::diff::Diff;

/// Kind of change an operation applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Create a new remote resource (or link to an existing one).
    Create,
    /// Update an existing remote resource.
    Update,
    /// Delete a remote resource.
    Delete,
}

/// A single planned change. Immutable once scheduled.
#[derive(Debug, Clone)]
pub struct Operation {
    /// What to do.
    pub operation_type: OperationType,
    /// The resource as declared (create/update) or last applied (delete).
    pub resource: Resource,
}

impl Operation {
    /// URN of the affected resource.
    #[must_use]
    pub const fn urn(&self) -> &Urn {
        self.resource.urn()
    }

    /// Returns true for a create that links to an existing remote object.
    #[must_use]
    pub const fn is_import(&self) -> bool {
        matches!(self.operation_type, OperationType::Create)
            && self.resource.import_metadata().is_some()
    }

    /// Short description, e.g. `create event:e1`.
    #[must_use]
    pub fn description(&self) -> String {
        if self.is_import() {
            format!("import {}", self.urn())
        } else {
            format!("{} {}", self.operation_type, self.urn())
        }
    }
}

/// Operation counts for a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    /// Creates that make a new remote object.
    pub creates: usize,
    /// Creates that link to an existing remote object.
    pub imports: usize,
    /// Updates.
    pub updates: usize,
    /// Deletes.
    pub deletes: usize,
}

impl PlanSummary {
    /// Counts the operations in `operations`.
    #[must_use]
    pub fn of(operations: &[Operation]) -> Self {
        let mut summary = Self::default();
        for op in operations {
            match op.operation_type {
                OperationType::Create if op.is_import() => summary.imports += 1,
                OperationType::Create => summary.creates += 1,
                OperationType::Update => summary.updates += 1,
                OperationType::Delete => summary.deletes += 1,
            }
        }
        summary
    }

    /// Total number of operations.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.creates + self.imports + self.updates + self.deletes
    }
}

/// Builds the operation list for `diff`.
///
/// Creates come first, then updates, each ordered so that a resource follows
/// every in-set dependency in `target`. Deletes come last, ordered so that a
/// resource precedes every in-set dependency it had in `source`.
///
/// # Errors
///
/// Returns an error if either graph is cyclic or the diff names a resource
/// missing from the graph it came from.
pub fn plan(diff: &Diff, source: &Graph, target: &Graph) -> Result<Vec<Operation>, PlanError> {
    source
        .validate_acyclic()
        .map_err(|e| PlanError::CyclicDependency {
            graph: "source",
            source: e,
        })?;
    target
        .validate_acyclic()
        .map_err(|e| PlanError::CyclicDependency {
            graph: "target",
            source: e,
        })?;

    let updated: Vec<Urn> = diff.updated_resources.keys().cloned().collect();
    let mut deletes = topological_order(&diff.removed_resources, source);
    deletes.reverse();

    let mut operations = Vec::with_capacity(diff.total_changes());
    for urn in topological_order(&diff.new_resources, target) {
        operations.push(operation(OperationType::Create, &urn, target, "target")?);
    }
    for urn in topological_order(&updated, target) {
        operations.push(operation(OperationType::Update, &urn, target, "target")?);
    }
    for urn in deletes {
        operations.push(operation(OperationType::Delete, &urn, source, "source")?);
    }

    debug!(operations = operations.len(), "plan built");
    Ok(operations)
}

fn operation(
    operation_type: OperationType,
    urn: &Urn,
    graph: &Graph,
    graph_name: &'static str,
) -> Result<Operation, PlanError> {
    let resource = graph
        .get_resource(urn)
        .cloned()
        .ok_or_else(|| PlanError::MissingResource {
            urn: urn.clone(),
            graph: graph_name,
        })?;
    Ok(Operation {
        operation_type,
        resource,
    })
}

/// Depth-first topological order of `set`, following only edges whose target
/// is also in `set`. Ties keep the input order.
fn topological_order(set: &[Urn], graph: &Graph) -> Vec<Urn> {
    let members: BTreeSet<&Urn> = set.iter().collect();
    let mut visited = BTreeSet::new();
    let mut order = Vec::with_capacity(set.len());
    for urn in set {
        visit(urn, graph, &members, &mut visited, &mut order);
    }
    order
}

fn visit<'a>(
    urn: &'a Urn,
    graph: &'a Graph,
    members: &BTreeSet<&Urn>,
    visited: &mut BTreeSet<&'a Urn>,
    order: &mut Vec<Urn>,
) {
    if !visited.insert(urn) {
        return;
    }
    for dep in graph.dependencies(urn) {
        if members.contains(dep) {
            visit(dep, graph, members, visited, order);
        }
    }
    order.push(urn.clone());
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total() == 0 {
            return write!(f, "No changes required");
        }
        write!(
            f,
            "{} to create, {} to import, {} to update, {} to delete",
            self.creates, self.imports, self.updates, self.deletes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ImportMetadata, PropertyMap, PropertyRef, PropertyValue};
    use crate::planner::compute_diff;

    fn named(name: &str) -> PropertyMap {
        let mut m = PropertyMap::new();
        m.insert("name".into(), name.into());
        m
    }

    fn tracking_plan() -> Resource {
        let mut data = named("Main");
        data.insert(
            "rules".into(),
            PropertyValue::List(vec![
                PropertyRef::property(Urn::new("event", "e1"), "id").into(),
                PropertyRef::property(Urn::new("property", "p1"), "id").into(),
            ]),
        );
        Resource::new("tracking-plan", "tp1", data)
    }

    fn scenario_graph() -> Graph {
        let mut g = Graph::new();
        // Inserted dependent-first so ordering can't come from insertion.
        g.add_resource(tracking_plan());
        g.add_resource(Resource::new("event", "e1", named("Signed Up")));
        g.add_resource(Resource::new("property", "p1", named("plan_tier")));
        g
    }

    fn urns(ops: &[Operation]) -> Vec<String> {
        ops.iter().map(Operation::description).collect()
    }

    #[test]
    fn test_creates_follow_dependencies() {
        let target = scenario_graph();
        let diff = compute_diff(&Graph::new(), &target);
        let ops = plan(&diff, &Graph::new(), &target).unwrap();

        assert_eq!(
            urns(&ops),
            vec!["create event:e1", "create property:p1", "create tracking-plan:tp1"]
        );
    }

    #[test]
    fn test_deletes_precede_dependencies() {
        let source = scenario_graph();
        let diff = compute_diff(&source, &Graph::new());
        let ops = plan(&diff, &source, &Graph::new()).unwrap();

        assert_eq!(ops[0].description(), "delete tracking-plan:tp1");
        assert_eq!(ops.len(), 3);
        assert!(ops.iter().all(|o| o.operation_type == OperationType::Delete));
    }

    #[test]
    fn test_delete_order_mirrors_create_order() {
        let g = scenario_graph();
        let creates = plan(&compute_diff(&Graph::new(), &g), &Graph::new(), &g).unwrap();
        let deletes = plan(&compute_diff(&g, &Graph::new()), &g, &Graph::new()).unwrap();

        let mut created: Vec<_> = creates.iter().map(|o| o.urn().clone()).collect();
        created.reverse();
        let deleted: Vec<_> = deletes.iter().map(|o| o.urn().clone()).collect();
        assert_eq!(created, deleted);
    }

    #[test]
    fn test_mixed_plan_groups_by_kind() {
        let mut source = Graph::new();
        source.add_resource(Resource::new("event", "old", named("Old")));
        source.add_resource(Resource::new("event", "e1", named("Signed Up")));
        let mut target = Graph::new();
        target.add_resource(Resource::new("event", "e1", named("Signed Up v2")));
        target.add_resource(
            Resource::new("event", "e2", named("Linked")).with_import(ImportMetadata {
                remote_id: String::from("ev_2"),
                workspace_id: String::from("ws"),
            }),
        );

        let diff = compute_diff(&source, &target);
        let ops = plan(&diff, &source, &target).unwrap();
        assert_eq!(
            urns(&ops),
            vec!["import event:e2", "update event:e1", "delete event:old"]
        );
        assert_eq!(
            PlanSummary::of(&ops),
            PlanSummary {
                creates: 0,
                imports: 1,
                updates: 1,
                deletes: 1,
            }
        );
    }

    #[test]
    fn test_out_of_set_dependencies_ignored() {
        let mut source = Graph::new();
        source.add_resource(Resource::new("event", "e1", named("Signed Up")));
        let mut target = scenario_graph();
        target.add_resource(Resource::new("event", "e1", named("Signed Up")));

        let diff = compute_diff(&source, &target);
        let ops = plan(&diff, &source, &target).unwrap();
        assert_eq!(urns(&ops), vec!["create property:p1", "create tracking-plan:tp1"]);
    }

    #[test]
    fn test_cycle_fails_planning() {
        let mut target = Graph::new();
        target.add_resource(Resource::new("event", "a", PropertyMap::new()));
        target.add_resource(Resource::new("event", "b", PropertyMap::new()));
        target.add_dependency(&Urn::new("event", "a"), &Urn::new("event", "b"));
        target.add_dependency(&Urn::new("event", "b"), &Urn::new("event", "a"));

        let diff = compute_diff(&Graph::new(), &target);
        let err = plan(&diff, &Graph::new(), &target).unwrap_err();
        assert!(matches!(err, PlanError::CyclicDependency { graph: "target", .. }));
    }

    #[test]
    fn test_empty_diff_plans_nothing() {
        let g = scenario_graph();
        let ops = plan(&compute_diff(&g, &g), &g, &g).unwrap();
        assert!(ops.is_empty());
        assert_eq!(PlanSummary::of(&ops).to_string(), "No changes required");
    }
}
