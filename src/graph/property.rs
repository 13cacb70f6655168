//! Property values, forward references and provider outputs.
//!
//! Resource data is a tree of [`PropertyValue`]s. Any node in that tree may be
//! a [`PropertyRef`]: a placeholder for another resource's output that only
//! becomes known once that resource has been applied.
//!
//! Values round-trip through `serde_json::Value`. A reference is encoded as an
//! object with a `"$ref"` key:
//!
//! ```json
//! { "$ref": "event:e1", "property": "id", "value": "ev_123" }
//! { "$ref": "category:c1", "resolver": "category-remote-id" }
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map as JsonMap, Number, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{GraphError, ResolveError};

use super::urn::Urn;

/// A property bag, ordered by key.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

const REF_KEY: &str = "$ref";
const REF_PROPERTY_KEY: &str = "property";
const REF_RESOLVER_KEY: &str = "resolver";
const REF_VALUE_KEY: &str = "value";

/// A single value in a resource's property tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Explicit null.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating point scalar.
    Float(f64),
    /// String scalar.
    String(String),
    /// Ordered list.
    List(Vec<PropertyValue>),
    /// Nested map.
    Map(PropertyMap),
    /// Forward reference to another resource's output.
    Ref(PropertyRef),
}

/// What a provider hands back after creating, updating or importing a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    /// Generic output properties (e.g. the generated remote `id`).
    #[serde(default)]
    pub properties: PropertyMap,
    /// Provider-specific raw output, consumed by custom resolvers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// Result of a custom output resolver.
pub type ResolverResult = std::result::Result<String, Box<dyn std::error::Error + Send + Sync>>;

/// Extracts a reference value from a resource's output.
///
/// Implemented per provider or resource kind when the referenced value is not
/// a plain output property.
pub trait OutputResolver: Send + Sync {
    /// Stable name of this resolver; persisted with the reference.
    fn kind(&self) -> &str;

    /// Computes the referenced value from the target's output.
    fn resolve(&self, output: &ResourceOutput) -> ResolverResult;
}

/// How a reference extracts its value from the target's output.
#[derive(Clone)]
pub enum RefAccessor {
    /// A named output property.
    Property(String),
    /// A custom resolver, identified by kind.
    ///
    /// `resolver` is `None` for references restored from persisted state until
    /// they are re-bound through a resolver registry.
    Resolver {
        /// Resolver kind.
        kind: String,
        /// Bound implementation, if any.
        resolver: Option<Arc<dyn OutputResolver>>,
    },
}

/// A forward reference to another resource's output.
#[derive(Debug, Clone)]
pub struct PropertyRef {
    urn: Urn,
    accessor: RefAccessor,
    value: Option<String>,
}

impl PropertyRef {
    /// References a named output property of `urn`.
    #[must_use]
    pub fn property(urn: Urn, property: impl Into<String>) -> Self {
        Self {
            urn,
            accessor: RefAccessor::Property(property.into()),
            value: None,
        }
    }

    /// References `urn` through a custom resolver.
    #[must_use]
    pub fn with_resolver(urn: Urn, resolver: Arc<dyn OutputResolver>) -> Self {
        Self {
            urn,
            accessor: RefAccessor::Resolver {
                kind: resolver.kind().to_string(),
                resolver: Some(resolver),
            },
            value: None,
        }
    }

    /// The referenced resource.
    #[must_use]
    pub const fn urn(&self) -> &Urn {
        &self.urn
    }

    /// How the value is extracted.
    #[must_use]
    pub const fn accessor(&self) -> &RefAccessor {
        &self.accessor
    }

    /// Whether a value has been resolved.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.value.is_some()
    }

    /// The resolved value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Records the resolved value.
    pub fn set_resolved(&mut self, value: String) {
        self.value = Some(value);
    }

    /// Binds an implementation to a resolver reference restored from state.
    pub fn bind_resolver(&mut self, implementation: Arc<dyn OutputResolver>) {
        if let RefAccessor::Resolver { resolver, .. } = &mut self.accessor {
            *resolver = Some(implementation);
        }
    }

    fn to_json(&self) -> Value {
        let mut object = JsonMap::new();
        object.insert(REF_KEY.to_string(), Value::String(self.urn.to_string()));
        match &self.accessor {
            RefAccessor::Property(property) => {
                object.insert(REF_PROPERTY_KEY.to_string(), Value::String(property.clone()));
            }
            RefAccessor::Resolver { kind, .. } => {
                object.insert(REF_RESOLVER_KEY.to_string(), Value::String(kind.clone()));
            }
        }
        if let Some(value) = &self.value {
            object.insert(REF_VALUE_KEY.to_string(), Value::String(value.clone()));
        }
        Value::Object(object)
    }

    fn from_json(object: &JsonMap<String, Value>) -> Result<Self, GraphError> {
        let urn = object
            .get(REF_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("`$ref` must be a URN string"))?;
        let urn = Urn::parse(urn)?;

        let property = object.get(REF_PROPERTY_KEY).and_then(Value::as_str);
        let kind = object.get(REF_RESOLVER_KEY).and_then(Value::as_str);
        let accessor = match (property, kind) {
            (Some(property), None) => RefAccessor::Property(property.to_string()),
            (None, Some(kind)) => RefAccessor::Resolver {
                kind: kind.to_string(),
                resolver: None,
            },
            _ => {
                return Err(malformed(format!(
                    "reference to {urn} needs exactly one of `property` or `resolver`"
                )));
            }
        };

        Ok(Self {
            urn,
            accessor,
            value: object
                .get(REF_VALUE_KEY)
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Two references are equal when they point at the same output, whether or
/// not either has been resolved yet.
impl PartialEq for PropertyRef {
    fn eq(&self, other: &Self) -> bool {
        self.urn == other.urn && self.accessor == other.accessor
    }
}

impl PartialEq for RefAccessor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Property(a), Self::Property(b)) => a == b,
            (Self::Resolver { kind: a, .. }, Self::Resolver { kind: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for RefAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(property) => f.debug_tuple("Property").field(property).finish(),
            Self::Resolver { kind, resolver } => f
                .debug_struct("Resolver")
                .field("kind", kind)
                .field("bound", &resolver.is_some())
                .finish(),
        }
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.accessor {
            RefAccessor::Property(property) => write!(f, "${{{}.{property}}}", self.urn),
            RefAccessor::Resolver { kind, .. } => write!(f, "${{{}#{kind}}}", self.urn),
        }
    }
}

impl PropertyValue {
    /// Returns the string slice if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested map if this is a map.
    #[must_use]
    pub const fn as_map(&self) -> Option<&PropertyMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the reference if this is a reference.
    #[must_use]
    pub const fn as_property_ref(&self) -> Option<&PropertyRef> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Short name of the variant, used in diff rendering.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Ref(_) => "ref",
        }
    }

    /// Renders a scalar as a string; `None` for null, lists, maps and refs.
    #[must_use]
    pub fn to_scalar_string(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(s.clone()),
            Self::Null | Self::List(_) | Self::Map(_) | Self::Ref(_) => None,
        }
    }

    /// Returns a copy with every resolved reference replaced by its value.
    ///
    /// Unresolved references are kept as they are.
    #[must_use]
    pub fn materialize(&self) -> Self {
        match self {
            Self::Ref(r) => r
                .value()
                .map_or_else(|| self.clone(), |v| Self::String(v.to_string())),
            Self::List(items) => Self::List(items.iter().map(Self::materialize).collect()),
            Self::Map(map) => Self::Map(materialize_map(map)),
            other => other.clone(),
        }
    }

    /// Converts to a JSON value, encoding references as `$ref` objects.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Number((*i).into()),
            Self::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => map_to_json(map),
            Self::Ref(r) => r.to_json(),
        }
    }

    /// Converts from a JSON value.
    ///
    /// Arrays of objects become lists of maps, so documents decoded from a
    /// generic format compare exactly like natively built values.
    ///
    /// # Errors
    ///
    /// Returns an error if a `$ref` object is malformed.
    pub fn from_json(value: Value) -> Result<Self, GraphError> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(object) if object.contains_key(REF_KEY) => {
                Self::Ref(PropertyRef::from_json(&object)?)
            }
            Value::Object(object) => Self::Map(map_from_json_object(object)?),
        })
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ref(r) => match r.value() {
                Some(value) => write!(f, "{r} (= {value:?})"),
                None => write!(f, "{r}"),
            },
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PropertyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(value).map_err(serde::de::Error::custom)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<PropertyRef> for PropertyValue {
    fn from(value: PropertyRef) -> Self {
        Self::Ref(value)
    }
}

impl From<PropertyMap> for PropertyValue {
    fn from(value: PropertyMap) -> Self {
        Self::Map(value)
    }
}

impl From<Vec<Self>> for PropertyValue {
    fn from(value: Vec<Self>) -> Self {
        Self::List(value)
    }
}

impl ResourceOutput {
    /// Creates an output from generic properties.
    #[must_use]
    pub const fn new(properties: PropertyMap) -> Self {
        Self {
            properties,
            raw: None,
        }
    }

    /// Attaches a provider-specific raw output.
    #[must_use]
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Looks up a generic output property.
    #[must_use]
    pub fn get(&self, property: &str) -> Option<&PropertyValue> {
        self.properties.get(property)
    }
}

/// Visits every reference in `map`, depth first, in key order.
///
/// # Errors
///
/// Stops at and returns the first error produced by `visit`.
pub fn visit_refs_mut(
    map: &mut PropertyMap,
    visit: &mut dyn FnMut(&mut PropertyRef) -> Result<(), ResolveError>,
) -> Result<(), ResolveError> {
    for value in map.values_mut() {
        visit_value_refs_mut(value, visit)?;
    }
    Ok(())
}

fn visit_value_refs_mut(
    value: &mut PropertyValue,
    visit: &mut dyn FnMut(&mut PropertyRef) -> Result<(), ResolveError>,
) -> Result<(), ResolveError> {
    match value {
        PropertyValue::Ref(r) => visit(r),
        PropertyValue::List(items) => {
            for item in items {
                visit_value_refs_mut(item, visit)?;
            }
            Ok(())
        }
        PropertyValue::Map(map) => visit_refs_mut(map, visit),
        _ => Ok(()),
    }
}

/// Collects the URNs referenced anywhere in `map`.
pub fn collect_ref_targets(map: &PropertyMap, targets: &mut BTreeSet<Urn>) {
    for value in map.values() {
        collect_value_targets(value, targets);
    }
}

fn collect_value_targets(value: &PropertyValue, targets: &mut BTreeSet<Urn>) {
    match value {
        PropertyValue::Ref(r) => {
            targets.insert(r.urn().clone());
        }
        PropertyValue::List(items) => {
            for item in items {
                collect_value_targets(item, targets);
            }
        }
        PropertyValue::Map(map) => collect_ref_targets(map, targets),
        _ => {}
    }
}

/// Returns a copy of `map` with resolved references replaced by their values.
#[must_use]
pub fn materialize_map(map: &PropertyMap) -> PropertyMap {
    map.iter()
        .map(|(k, v)| (k.clone(), v.materialize()))
        .collect()
}

/// Converts a property map to a JSON object.
#[must_use]
pub fn map_to_json(map: &PropertyMap) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

/// Converts a JSON object to a property map.
///
/// # Errors
///
/// Returns an error if `value` is not an object or contains a malformed
/// reference.
pub fn map_from_json(value: Value) -> Result<PropertyMap, GraphError> {
    match value {
        Value::Object(object) => map_from_json_object(object),
        other => Err(malformed(format!(
            "expected an object, found {}",
            json_type_name(&other)
        ))),
    }
}

fn map_from_json_object(object: JsonMap<String, Value>) -> Result<PropertyMap, GraphError> {
    object
        .into_iter()
        .map(|(k, v)| PropertyValue::from_json(v).map(|v| (k, v)))
        .collect()
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn malformed(message: impl Into<String>) -> GraphError {
    GraphError::Malformed {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ref_json_round_trip() {
        let mut r = PropertyRef::property(Urn::new("event", "e1"), "id");
        r.set_resolved(String::from("ev_123"));
        let value = PropertyValue::Ref(r);

        let json = value.to_json();
        assert_eq!(json, json!({"$ref": "event:e1", "property": "id", "value": "ev_123"}));

        let back = PropertyValue::from_json(json).unwrap();
        let back = back.as_property_ref().unwrap();
        assert_eq!(back.urn().as_str(), "event:e1");
        assert_eq!(back.value(), Some("ev_123"));
    }

    #[test]
    fn test_resolver_ref_restores_unbound() {
        let value =
            PropertyValue::from_json(json!({"$ref": "category:c1", "resolver": "remote-id"}))
                .unwrap();
        let r = value.as_property_ref().unwrap();
        match r.accessor() {
            RefAccessor::Resolver { kind, resolver } => {
                assert_eq!(kind, "remote-id");
                assert!(resolver.is_none());
            }
            RefAccessor::Property(_) => panic!("expected resolver accessor"),
        }
    }

    #[test]
    fn test_malformed_ref_rejected() {
        let both = json!({"$ref": "event:e1", "property": "id", "resolver": "x"});
        assert!(PropertyValue::from_json(both).is_err());
        let bad_urn = json!({"$ref": "nonsense", "property": "id"});
        assert!(PropertyValue::from_json(bad_urn).is_err());
    }

    #[test]
    fn test_array_of_objects_becomes_list_of_maps() {
        let value = PropertyValue::from_json(json!([{"name": "a"}, {"name": "b", "n": 2}])).unwrap();
        let PropertyValue::List(items) = value else {
            panic!("expected list");
        };
        assert!(items.iter().all(|i| i.as_map().is_some()));
        assert_eq!(
            items[1].as_map().unwrap().get("n"),
            Some(&PropertyValue::Int(2))
        );
    }

    #[test]
    fn test_visit_refs_nested_in_list_of_maps() {
        let mut map = map_from_json(json!({
            "rules": [
                {"event": {"$ref": "event:e1", "property": "id"}},
                {"event": {"$ref": "event:e2", "property": "id"}}
            ],
            "name": "plan"
        }))
        .unwrap();

        let mut seen = Vec::new();
        visit_refs_mut(&mut map, &mut |r| {
            seen.push(r.urn().to_string());
            r.set_resolved(format!("{}-remote", r.urn().id()));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["event:e1", "event:e2"]);

        let materialized = materialize_map(&map);
        assert_eq!(
            map_to_json(&materialized),
            json!({
                "name": "plan",
                "rules": [{"event": "e1-remote"}, {"event": "e2-remote"}]
            })
        );
    }

    #[test]
    fn test_collect_ref_targets() {
        let map = map_from_json(json!({
            "a": {"$ref": "event:e1", "property": "id"},
            "b": [{"$ref": "property:p1", "property": "id"}]
        }))
        .unwrap();
        let mut targets = BTreeSet::new();
        collect_ref_targets(&map, &mut targets);
        assert_eq!(targets.len(), 2);
        assert!(targets.contains(&Urn::new("property", "p1")));
    }

    #[test]
    fn test_scalar_strings() {
        assert_eq!(PropertyValue::Int(7).to_scalar_string().as_deref(), Some("7"));
        assert_eq!(PropertyValue::Bool(true).to_scalar_string().as_deref(), Some("true"));
        assert_eq!(PropertyValue::Null.to_scalar_string(), None);
    }
}
