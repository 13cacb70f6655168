//! Sync orchestration.
//!
//! Ties the pieces together for one run: lock state, rebuild the last applied
//! graph, diff it against the target, offer name-matched imports, plan,
//! confirm, execute, and persist whatever succeeded.

use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigHasher, EngineConfig};
use crate::error::{KeystoneError, Result};
use crate::executor::{ExecutionMode, ExecutionReport, Executor};
use crate::graph::{Graph, Urn};
use crate::planner::{
    Diff, ImportCandidate, ImportIndex, Operation, PlanSummary, apply_imports, compute_diff,
    mark_importable, match_candidates, plan,
};
use crate::provider::{Loader, Provider};
use crate::reporter::Reporter;
use crate::resolver::ResolverRegistry;
use crate::state::{HistoryEntry, RunKind, State, StateStore, generate_holder_id};

/// How a run ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// The target already matches state.
    NoChanges,
    /// The plan was not confirmed; nothing ran.
    Rejected,
    /// Every planned operation succeeded.
    Applied,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// How the run ended.
    pub status: SyncStatus,
    /// Planned operation counts.
    pub summary: PlanSummary,
    /// Resources linked to existing remote objects by name.
    pub imported: usize,
    /// Per-operation results; empty unless operations ran.
    pub report: ExecutionReport,
}

impl SyncOutcome {
    fn idle(status: SyncStatus, summary: PlanSummary, imported: usize) -> Self {
        Self {
            status,
            summary,
            imported,
            report: ExecutionReport::default(),
        }
    }
}

/// A computed but not executed plan.
#[derive(Debug, Clone)]
pub struct Preview {
    /// Differences between state and target.
    pub diff: Diff,
    /// Operations that would run, in order.
    pub operations: Vec<Operation>,
}

/// Computes the plan for `target` against `state` without touching the
/// provider or the store.
///
/// # Errors
///
/// Returns an error if state cannot be rebuilt as a graph or planning fails.
pub fn preview(state: &State, target: &Graph) -> Result<Preview> {
    let source = state.to_graph()?;
    let diff = compute_diff(&source, target);
    let operations = plan(&diff, &source, target)?;
    Ok(Preview { diff, operations })
}

/// Reconciles remote resources with a target graph.
pub struct ProjectSyncer {
    store: Arc<dyn StateStore>,
    provider: Arc<dyn Provider>,
    reporter: Arc<dyn Reporter>,
    resolvers: Arc<ResolverRegistry>,
    config: EngineConfig,
    cancel: CancellationToken,
    hasher: ConfigHasher,
}

impl fmt::Debug for ProjectSyncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectSyncer")
            .field("backend", &self.store.backend_type())
            .field("config", &self.config)
            .field("resolvers", &self.resolvers)
            .finish_non_exhaustive()
    }
}

impl ProjectSyncer {
    /// Creates a syncer with default configuration and no resolvers.
    #[must_use]
    pub fn new(
        store: Arc<dyn StateStore>,
        provider: Arc<dyn Provider>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            store,
            provider,
            reporter,
            resolvers: Arc::new(ResolverRegistry::new()),
            config: EngineConfig::default(),
            cancel: CancellationToken::new(),
            hasher: ConfigHasher::new(),
        }
    }

    /// Uses `config` for concurrency, import and lock settings.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `resolvers` to re-bind resolver references restored from state.
    #[must_use]
    pub fn with_resolvers(mut self, resolvers: Arc<ResolverRegistry>) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Uses `token` to cancel runs in progress.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels runs in progress.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Loads the target graph and syncs to it.
    ///
    /// # Errors
    ///
    /// See [`sync`](Self::sync).
    pub async fn sync_from(&self, loader: &dyn Loader) -> Result<SyncOutcome> {
        let target = loader.load()?;
        self.sync(target).await
    }

    /// Brings remote resources in line with `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, state cannot be loaded
    /// or saved, planning fails, or any operation does not succeed. In the
    /// last case state still records every operation that did.
    pub async fn sync(&self, target: Graph) -> Result<SyncOutcome> {
        self.locked(target, ExecutionMode::Apply).await
    }

    /// Deletes every resource recorded in state, dependents first. Every
    /// deletion is attempted even if some fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, state cannot be loaded
    /// or saved, or any deletion fails.
    pub async fn destroy(&self) -> Result<SyncOutcome> {
        self.locked(Graph::new(), ExecutionMode::Destroy).await
    }

    async fn locked(&self, target: Graph, mode: ExecutionMode) -> Result<SyncOutcome> {
        let holder = match self.config.lock_holder() {
            "" => generate_holder_id(),
            holder => holder.to_string(),
        };
        let lock = self.store.acquire_lock(&holder).await?;
        debug!(lock_id = %lock.lock_id, "State lock acquired");

        let result = self.run(target, mode).await;

        if let Err(e) = self.store.release_lock(&lock.lock_id).await {
            warn!("Failed to release state lock: {e}");
        }
        if let Err(e) = &result {
            error!("Sync failed: {e}");
        }
        result
    }

    async fn run(&self, mut target: Graph, mode: ExecutionMode) -> Result<SyncOutcome> {
        let state = self.store.load().await?.unwrap_or_default();
        let source = state.to_graph()?;
        info!(
            managed = source.len(),
            declared = target.len(),
            ?mode,
            "Starting sync"
        );

        let mut diff = compute_diff(&source, &target);
        let (imported, candidates) = if mode == ExecutionMode::Apply {
            self.offer_imports(&diff, &mut target).await?
        } else {
            (0, Vec::new())
        };
        if imported > 0 {
            diff = compute_diff(&source, &target);
        }
        mark_importable(&mut diff, &candidates);

        let operations = plan(&diff, &source, &target)?;
        let summary = PlanSummary::of(&operations);
        self.reporter.report_plan(&diff, &operations).await?;

        if operations.is_empty() {
            info!("No changes required");
            return Ok(SyncOutcome::idle(SyncStatus::NoChanges, summary, imported));
        }
        if !self.reporter.confirm_apply(&operations).await? {
            info!("Plan not confirmed; nothing was changed");
            return Ok(SyncOutcome::idle(SyncStatus::Rejected, summary, imported));
        }

        let graph_hash = self.hasher.hash_graph(&target);
        let shared = Arc::new(Mutex::new(state));
        let executor = Executor::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.reporter),
            Arc::clone(&self.resolvers),
        )
        .with_concurrency(self.config.concurrency)
        .with_cancellation(self.cancel.clone());
        let executed = executor
            .execute(&operations, &source, &target, Arc::clone(&shared), mode)
            .await;

        // Persist whatever completed, even if the scheduler itself failed.
        let mut state = shared.lock().await.clone();
        let (report, failure) = match executed {
            Ok(report) => {
                let failure = report.error(mode).map(KeystoneError::from);
                (report, failure)
            }
            Err(e) => (ExecutionReport::default(), Some(KeystoneError::from(e))),
        };

        if mode == ExecutionMode::Apply {
            refresh_dependencies(&mut state, &target, &diff.unmodified_resources);
        }
        if failure.is_none() {
            state.last_applied_hash = match mode {
                ExecutionMode::Apply => graph_hash.clone(),
                ExecutionMode::Destroy => String::new(),
            };
        }

        let kind = match mode {
            ExecutionMode::Apply => RunKind::Apply,
            ExecutionMode::Destroy => RunKind::Destroy,
        };
        let mut entry = HistoryEntry::new(
            kind,
            &graph_hash,
            report.succeeded.len(),
            report.failures.len(),
        );
        if let Some(e) = &failure {
            entry = entry.with_error(e.to_string());
        }
        state.add_history(entry);
        self.store.save(&state).await?;
        info!(resources = state.len(), "State saved");

        match failure {
            Some(e) => Err(e),
            None => Ok(SyncOutcome {
                status: SyncStatus::Applied,
                summary,
                imported,
                report,
            }),
        }
    }

    /// Offers name-matched imports and links the confirmed ones in `target`.
    /// Returns the number linked and every candidate offered.
    async fn offer_imports(
        &self,
        diff: &Diff,
        target: &mut Graph,
    ) -> Result<(usize, Vec<ImportCandidate>)> {
        if !self.config.import.enabled || diff.new_resources.is_empty() {
            return Ok((0, Vec::new()));
        }

        let unmanaged = self.provider.list_unmanaged().await?;
        let index = ImportIndex::build(&unmanaged);
        let candidates = match_candidates(diff, target, &index);
        if candidates.is_empty() {
            debug!(unmanaged = unmanaged.len(), "No import candidates");
            return Ok((0, candidates));
        }

        info!(candidates = candidates.len(), "Found import candidates");
        let confirmed = self.reporter.confirm_imports(&candidates).await?;
        let imported = apply_imports(target, &confirmed, self.config.workspace_id());
        if imported > 0 {
            info!(imported, "Linked resources to existing remote objects");
        }
        Ok((imported, candidates))
    }
}

/// Records current target edges on unmodified entries. Entries that were
/// created or updated already carry them; failed ones keep the old edges.
fn refresh_dependencies(state: &mut State, target: &Graph, unmodified: &[Urn]) {
    for urn in unmodified {
        if let Some(entry) = state.resources.get_mut(urn) {
            entry.dependencies = target.dependencies(urn).cloned().collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PropertyMap, PropertyValue, Resource, ResourceOutput, Urn};

    fn named(resource_type: &str, id: &str, name: &str) -> Resource {
        let mut props = PropertyMap::new();
        props.insert("name".into(), PropertyValue::from(name));
        Resource::new(resource_type, id, props)
    }

    #[test]
    fn test_preview_against_empty_state() {
        let mut target = Graph::new();
        target.add_resource(named("event", "e1", "Signup"));

        let preview = preview(&State::new(), &target).unwrap();
        assert_eq!(preview.diff.new_resources.len(), 1);
        assert_eq!(preview.operations.len(), 1);
        assert_eq!(preview.operations[0].description(), "create event:e1");
    }

    #[test]
    fn test_preview_unchanged_is_empty() {
        let resource = named("event", "e1", "Signup");
        let mut state = State::new();
        state.record_applied(&resource, ResourceOutput::default(), vec![]);
        let mut target = Graph::new();
        target.add_resource(resource);

        let preview = preview(&state, &target).unwrap();
        assert!(!preview.diff.has_changes());
        assert!(preview.operations.is_empty());
    }

    #[test]
    fn test_refresh_dependencies_only_touches_unmodified() {
        let mut state = State::new();
        state.record_applied(&named("event", "e1", "a"), ResourceOutput::default(), vec![]);
        state.record_applied(
            &named("plan", "p1", "b"),
            ResourceOutput::default(),
            vec![Urn::new("event", "e9")],
        );

        let mut target = Graph::new();
        target.add_resource(named("event", "e1", "a"));
        target.add_resource(named("event", "e2", "c"));
        target.add_resource(named("plan", "p1", "b2"));
        target.add_dependency(&Urn::new("event", "e1"), &Urn::new("event", "e2"));
        target.add_dependency(&Urn::new("plan", "p1"), &Urn::new("event", "e2"));

        // p1 was planned for an update that did not succeed.
        refresh_dependencies(&mut state, &target, &[Urn::new("event", "e1")]);
        assert_eq!(
            state.get(&Urn::new("event", "e1")).unwrap().dependencies,
            vec![Urn::new("event", "e2")]
        );
        assert_eq!(
            state.get(&Urn::new("plan", "p1")).unwrap().dependencies,
            vec![Urn::new("event", "e9")]
        );
    }
}
