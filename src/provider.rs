//! Collaborator interfaces for the remote side and for graph loading.
//!
//! A provider performs single logical operations against a remote SaaS API.
//! The engine treats each call as a black box that succeeds or fails.

use async_trait::async_trait;

use crate::error::{ProviderError, Result};
use crate::graph::{Graph, ImportMetadata, ResourceData, ResourceOutput};
use crate::planner::UnmanagedResource;

/// Remote operations for every resource type a project declares.
///
/// Every payload handed to a provider has its references resolved.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Creates a remote resource.
    async fn create(
        &self,
        id: &str,
        resource_type: &str,
        data: &ResourceData,
    ) -> std::result::Result<ResourceOutput, ProviderError>;

    /// Updates a remote resource from `previous` to `data`.
    async fn update(
        &self,
        id: &str,
        resource_type: &str,
        data: &ResourceData,
        previous: &ResourceData,
        previous_output: &ResourceOutput,
    ) -> std::result::Result<ResourceOutput, ProviderError>;

    /// Deletes a remote resource last applied with `data`.
    async fn delete(
        &self,
        id: &str,
        resource_type: &str,
        data: &ResourceData,
        output: &ResourceOutput,
    ) -> std::result::Result<(), ProviderError>;

    /// Links a declared resource to an existing remote object, bringing the
    /// remote object in line with `data`.
    async fn import(
        &self,
        id: &str,
        resource_type: &str,
        data: &ResourceData,
        metadata: &ImportMetadata,
    ) -> std::result::Result<ResourceOutput, ProviderError> {
        let _ = (id, data, metadata);
        Err(ProviderError::Unsupported {
            operation: String::from("import"),
            resource_type: resource_type.to_string(),
        })
    }

    /// Lists remote objects that are not tracked in state.
    async fn list_unmanaged(&self) -> std::result::Result<Vec<UnmanagedResource>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Produces the desired graph, already validated.
pub trait Loader {
    /// Loads the target graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the declarations cannot be loaded.
    fn load(&self) -> Result<Graph>;
}

/// A loader over a graph built in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    graph: Graph,
}

impl StaticLoader {
    /// Wraps `graph`.
    #[must_use]
    pub const fn new(graph: Graph) -> Self {
        Self { graph }
    }
}

impl Loader for StaticLoader {
    fn load(&self) -> Result<Graph> {
        Ok(self.graph.clone())
    }
}
