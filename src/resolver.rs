//! Resolving forward references against the running state.
//!
//! Before a payload goes to a provider, every [`PropertyRef`] in it is looked
//! up in state: a named output property is read directly, a resolver reference
//! runs its resolver over the target's output. The value is cached on the
//! reference, so the payload persisted afterwards remembers it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

use crate::error::ResolveError;
use crate::graph::{OutputResolver, PropertyRef, RefAccessor, ResourceData};
use crate::state::State;

/// Resolver implementations by kind.
///
/// References restored from state only remember their resolver's kind; this
/// registry supplies the implementation again. Built once per run and shared.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn OutputResolver>>,
}

impl ResolverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resolver` under its kind, replacing any previous one.
    pub fn register(&mut self, resolver: Arc<dyn OutputResolver>) {
        self.resolvers.insert(resolver.kind().to_string(), resolver);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, resolver: Arc<dyn OutputResolver>) -> Self {
        self.register(resolver);
        self
    }

    /// Looks up a resolver by kind.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<Arc<dyn OutputResolver>> {
        self.resolvers.get(kind).cloned()
    }

    /// Number of registered resolvers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.resolvers.keys().collect();
        kinds.sort();
        f.debug_struct("ResolverRegistry").field("kinds", &kinds).finish()
    }
}

/// Resolves every reference in `data` against `state`.
///
/// # Errors
///
/// Fails on the first reference whose target has no output, whose property
/// is missing or not a scalar, or whose resolver is unknown or fails.
pub fn resolve_data(
    data: &mut ResourceData,
    state: &State,
    registry: &ResolverRegistry,
) -> Result<(), ResolveError> {
    data.visit_refs_mut(&mut |r| resolve_ref(r, state, registry))
}

/// Resolves a single reference against `state`.
///
/// # Errors
///
/// See [`resolve_data`].
pub fn resolve_ref(
    reference: &mut PropertyRef,
    state: &State,
    registry: &ResolverRegistry,
) -> Result<(), ResolveError> {
    let urn = reference.urn().clone();
    let output = state
        .output_for(&urn)
        .ok_or_else(|| ResolveError::MissingOutput { urn: urn.clone() })?;

    let (value, rebind) = match reference.accessor() {
        RefAccessor::Property(property) => {
            let value = output
                .get(property)
                .ok_or_else(|| ResolveError::MissingProperty {
                    urn: urn.clone(),
                    property: property.clone(),
                })?
                .to_scalar_string()
                .ok_or_else(|| ResolveError::NotScalar {
                    urn: urn.clone(),
                    property: property.clone(),
                })?;
            (value, None)
        }
        RefAccessor::Resolver { kind, resolver } => {
            let (implementation, rebind) = match resolver {
                Some(bound) => (Arc::clone(bound), None),
                None => {
                    let found = registry.get(kind).ok_or_else(|| ResolveError::UnknownResolver {
                        urn: urn.clone(),
                        kind: kind.clone(),
                    })?;
                    (Arc::clone(&found), Some(found))
                }
            };
            let value = implementation
                .resolve(output)
                .map_err(|e| ResolveError::ResolverFailed {
                    urn: urn.clone(),
                    kind: kind.clone(),
                    message: e.to_string(),
                })?;
            (value, rebind)
        }
    };

    if let Some(implementation) = rebind {
        reference.bind_resolver(implementation);
    }
    trace!(%urn, "resolved reference");
    reference.set_resolved(value);
    Ok(())
}
