//! Diff engine for comparing the last applied graph against the desired one.
//!
//! Every URN in either graph lands in exactly one of four buckets: new,
//! removed, updated or unmodified. New resources that link, or can be
//! linked by name, to a remote object are also listed as importable.

use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::graph::{Graph, PropertyMap, PropertyValue, Resource, ResourceData, Urn};

/// Difference for a single property path.
///
/// `None` means the path is absent on that side.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDiff {
    /// Value in the source (last applied) graph.
    pub source: Option<PropertyValue>,
    /// Value in the target (desired) graph.
    pub target: Option<PropertyValue>,
}

/// Property differences keyed by path (`name`, `rules[1].event`).
pub type PropertyDiffs = BTreeMap<String, PropertyDiff>;

/// Difference for a single updated resource.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    /// The updated resource.
    pub urn: Urn,
    /// Per-property differences; never empty.
    pub properties: PropertyDiffs,
}

/// Complete diff between two graphs.
#[derive(Debug, Clone, Default)]
pub struct Diff {
    /// In target only.
    pub new_resources: Vec<Urn>,
    /// In source only.
    pub removed_resources: Vec<Urn>,
    /// In both, with differing data.
    pub updated_resources: BTreeMap<Urn, ResourceDiff>,
    /// In both, with equal data.
    pub unmodified_resources: Vec<Urn>,
    /// New resources that link to an existing remote object: those carrying
    /// import metadata, plus name-matched candidates added by
    /// [`mark_importable`](super::mark_importable).
    pub importable_resources: Vec<Urn>,
}

/// Computes the diff from `source` (last applied) to `target` (desired).
#[must_use]
pub fn compute_diff(source: &Graph, target: &Graph) -> Diff {
    let mut diff = Diff::default();

    for resource in target.resources() {
        let urn = resource.urn();
        match source.get_resource(urn) {
            None => {
                debug!(%urn, "new resource");
                diff.new_resources.push(urn.clone());
                if resource.import_metadata().is_some() {
                    diff.importable_resources.push(urn.clone());
                }
            }
            Some(previous) => {
                let properties = compare_resources(previous, resource);
                if properties.is_empty() {
                    diff.unmodified_resources.push(urn.clone());
                } else {
                    debug!(%urn, changed = properties.len(), "updated resource");
                    diff.updated_resources.insert(
                        urn.clone(),
                        ResourceDiff {
                            urn: urn.clone(),
                            properties,
                        },
                    );
                }
            }
        }
    }

    for urn in source.urns() {
        if !target.contains(urn) {
            debug!(%urn, "removed resource");
            diff.removed_resources.push(urn.clone());
        }
    }

    diff
}

fn compare_resources(previous: &Resource, desired: &Resource) -> PropertyDiffs {
    match desired.data() {
        ResourceData::Opaque(payload) => payload.diff_against(&previous.data().properties()),
        ResourceData::Structured(map) => compare_maps(&previous.data().properties(), map),
    }
}

/// Compares two property maps key by key.
#[must_use]
pub fn compare_maps(source: &PropertyMap, target: &PropertyMap) -> PropertyDiffs {
    let mut out = PropertyDiffs::new();
    compare_map_at("", source, target, &mut out);
    out
}

fn compare_map_at(prefix: &str, source: &PropertyMap, target: &PropertyMap, out: &mut PropertyDiffs) {
    for (key, source_value) in source {
        let path = join_key(prefix, key);
        match target.get(key) {
            Some(target_value) => compare_values(path, source_value, target_value, out),
            None => {
                out.insert(
                    path,
                    PropertyDiff {
                        source: Some(source_value.clone()),
                        target: None,
                    },
                );
            }
        }
    }
    for (key, target_value) in target {
        if !source.contains_key(key) {
            out.insert(
                join_key(prefix, key),
                PropertyDiff {
                    source: None,
                    target: Some(target_value.clone()),
                },
            );
        }
    }
}

fn compare_values(path: String, source: &PropertyValue, target: &PropertyValue, out: &mut PropertyDiffs) {
    match (source, target) {
        (PropertyValue::Map(a), PropertyValue::Map(b)) => compare_map_at(&path, a, b, out),
        (PropertyValue::List(a), PropertyValue::List(b)) if a.len() == b.len() => {
            for (i, (x, y)) in a.iter().zip(b).enumerate() {
                compare_values(format!("{path}[{i}]"), x, y, out);
            }
        }
        (a, b) if a == b => {}
        (a, b) => {
            out.insert(
                path,
                PropertyDiff {
                    source: Some(a.clone()),
                    target: Some(b.clone()),
                },
            );
        }
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

impl Diff {
    /// Returns true if any resource is new, removed or updated.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.new_resources.is_empty()
            || !self.removed_resources.is_empty()
            || !self.updated_resources.is_empty()
    }

    /// Number of resources needing an operation.
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.new_resources.len() + self.removed_resources.len() + self.updated_resources.len()
    }
}

impl fmt::Display for PropertyDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source, &self.target) {
            (Some(a), Some(b)) => write!(f, "{a} -> {b}"),
            (None, Some(b)) => write!(f, "(absent) -> {b}"),
            (Some(a), None) => write!(f, "{a} -> (absent)"),
            (None, None) => write!(f, "(absent)"),
        }
    }
}

impl fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.urn)?;
        for (i, path) in self.properties.keys().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{path}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::graph::{ImportMetadata, PropertyRef, TypedPayload, map_from_json};
    use serde_json::json;

    fn map(value: serde_json::Value) -> PropertyMap {
        map_from_json(value).unwrap()
    }

    fn graph(resources: Vec<Resource>) -> Graph {
        let mut g = Graph::new();
        for r in resources {
            g.add_resource(r);
        }
        g
    }

    #[test]
    fn test_four_way_partition() {
        let source = graph(vec![
            Resource::new("event", "kept", map(json!({"name": "a"}))),
            Resource::new("event", "changed", map(json!({"name": "b"}))),
            Resource::new("event", "gone", map(json!({"name": "c"}))),
        ]);
        let target = graph(vec![
            Resource::new("event", "kept", map(json!({"name": "a"}))),
            Resource::new("event", "changed", map(json!({"name": "B"}))),
            Resource::new("event", "fresh", map(json!({"name": "d"}))),
            Resource::new("event", "linked", map(json!({"name": "e"}))).with_import(ImportMetadata {
                remote_id: String::from("ev_9"),
                workspace_id: String::from("ws"),
            }),
        ]);

        let diff = compute_diff(&source, &target);
        assert_eq!(diff.new_resources, vec![Urn::new("event", "fresh"), Urn::new("event", "linked")]);
        assert_eq!(diff.importable_resources, vec![Urn::new("event", "linked")]);
        assert_eq!(diff.removed_resources, vec![Urn::new("event", "gone")]);
        assert_eq!(diff.unmodified_resources, vec![Urn::new("event", "kept")]);
        assert_eq!(diff.updated_resources.len(), 1);
        assert_eq!(diff.total_changes(), 4);

        let changed = &diff.updated_resources[&Urn::new("event", "changed")];
        assert_eq!(
            changed.properties["name"],
            PropertyDiff {
                source: Some("b".into()),
                target: Some("B".into()),
            }
        );
    }

    #[test]
    fn test_absence_is_symmetric() {
        let a = map(json!({"name": "x", "description": "only here"}));
        let b = map(json!({"name": "x"}));

        let forward = compare_maps(&a, &b);
        let backward = compare_maps(&b, &a);
        assert_eq!(forward["description"].target, None);
        assert_eq!(backward["description"].source, None);
        assert_eq!(forward.len(), 1);
        assert_eq!(backward.len(), 1);
    }

    #[test]
    fn test_null_handling() {
        let both_null = compare_maps(&map(json!({"v": null})), &map(json!({"v": null})));
        assert!(both_null.is_empty());

        let null_vs_value = compare_maps(&map(json!({"v": null})), &map(json!({"v": 3})));
        assert_eq!(null_vs_value["v"].source, Some(PropertyValue::Null));
        assert_eq!(null_vs_value["v"].target, Some(PropertyValue::Int(3)));
    }

    #[test]
    fn test_list_length_mismatch_reports_whole_list() {
        let diffs = compare_maps(&map(json!({"tags": ["a", "b"]})), &map(json!({"tags": ["a"]})));
        assert_eq!(diffs.len(), 1);
        assert!(diffs.contains_key("tags"));
    }

    #[test]
    fn test_nested_paths() {
        let diffs = compare_maps(
            &map(json!({"rules": [{"name": "r0"}, {"name": "r1", "config": {"strict": true}}]})),
            &map(json!({"rules": [{"name": "r0"}, {"name": "r1b", "config": {"strict": false}}]})),
        );
        let keys: Vec<_> = diffs.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["rules[1].config.strict", "rules[1].name"]);
    }

    #[test]
    fn test_refs_compare_by_target_not_value() {
        let mut resolved = PropertyRef::property(Urn::new("event", "e1"), "id");
        resolved.set_resolved(String::from("ev_1"));
        let unresolved = PropertyRef::property(Urn::new("event", "e1"), "id");
        let other = PropertyRef::property(Urn::new("event", "e2"), "id");

        let mut a = PropertyMap::new();
        a.insert("event".into(), resolved.into());
        let mut b = PropertyMap::new();
        b.insert("event".into(), unresolved.into());
        let mut c = PropertyMap::new();
        c.insert("event".into(), other.into());

        assert!(compare_maps(&a, &b).is_empty());
        assert_eq!(compare_maps(&a, &c).len(), 1);
    }

    #[test]
    fn test_unchanged_graph_is_idempotent() {
        let g = graph(vec![
            Resource::new("event", "e1", map(json!({"name": "a", "tags": [1, 2]}))),
            Resource::new("property", "p1", map(json!({"name": "b", "nested": {"k": null}}))),
        ]);
        let diff = compute_diff(&g, &g.clone());
        assert!(!diff.has_changes());
        assert_eq!(diff.unmodified_resources.len(), 2);
    }

    #[derive(Debug, Clone)]
    struct VersionedPayload {
        version: i64,
        label: String,
    }

    impl TypedPayload for VersionedPayload {
        fn kind(&self) -> &str {
            "versioned"
        }

        fn to_properties(&self) -> PropertyMap {
            let mut m = PropertyMap::new();
            m.insert("version".into(), self.version.into());
            m.insert("label".into(), self.label.clone().into());
            m
        }

        // Only the version is significant remotely.
        fn diff_against(&self, previous: &PropertyMap) -> PropertyDiffs {
            let mut out = PropertyDiffs::new();
            let current = PropertyValue::Int(self.version);
            if previous.get("version") != Some(&current) {
                out.insert(
                    String::from("version"),
                    PropertyDiff {
                        source: previous.get("version").cloned(),
                        target: Some(current),
                    },
                );
            }
            out
        }

        fn visit_refs_mut(
            &mut self,
            _visit: &mut dyn FnMut(&mut PropertyRef) -> Result<(), ResolveError>,
        ) -> Result<(), ResolveError> {
            Ok(())
        }

        fn clone_box(&self) -> Box<dyn TypedPayload> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_opaque_payload_uses_its_own_diff() {
        let payload = |version, label: &str| {
            Box::new(VersionedPayload {
                version,
                label: label.to_string(),
            })
        };
        let source = graph(vec![Resource::opaque("custom", "c1", payload(1, "old"))]);

        let relabelled = graph(vec![Resource::opaque("custom", "c1", payload(1, "new"))]);
        assert!(!compute_diff(&source, &relabelled).has_changes());

        let bumped = graph(vec![Resource::opaque("custom", "c1", payload(2, "old"))]);
        let diff = compute_diff(&source, &bumped);
        assert_eq!(diff.updated_resources.len(), 1);
    }
}
