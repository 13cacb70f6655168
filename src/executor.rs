//! Concurrent, dependency-aware execution of planned operations.
//!
//! Each operation waits for the operations it depends on: creates and updates
//! on the planned creates/updates of their target-graph dependencies, deletes
//! on every planned operation of their source-graph dependents, so an update
//! that drops a reference settles before the referenced resource goes. Up to
//! `concurrency` operations run at once; with a concurrency of one they run
//! in planned order.
//!
//! In apply mode a failure skips every operation that transitively depends on
//! it while independent branches keep going. In destroy mode every deletion is
//! attempted regardless.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{ApplyError, FailureReason, OperationFailure};
use crate::graph::{Graph, ResourceData, Urn};
use crate::planner::{Operation, OperationType};
use crate::provider::Provider;
use crate::reporter::Reporter;
use crate::resolver::{ResolverRegistry, resolve_data};
use crate::state::State;

/// Default number of operations in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// How failures propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Skip dependents of failed operations.
    Apply,
    /// Attempt every operation.
    Destroy,
}

/// Outcome of an execution run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// Number of operations handed to the executor.
    pub total: usize,
    /// Resources whose operation succeeded, in planned order.
    pub succeeded: Vec<Urn>,
    /// Operations that failed, were skipped or abandoned, in planned order.
    pub failures: Vec<OperationFailure>,
}

impl ExecutionReport {
    /// Returns true if every operation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The aggregate error for this report, if anything did not succeed.
    #[must_use]
    pub fn error(&self, mode: ExecutionMode) -> Option<ApplyError> {
        if self.failures.is_empty() {
            return None;
        }
        let failures = self.failures.clone();
        Some(match mode {
            ExecutionMode::Apply => ApplyError::OperationsFailed {
                total: self.total,
                failures,
            },
            ExecutionMode::Destroy => ApplyError::DestroyFailed {
                total: self.total,
                failures,
            },
        })
    }
}

/// Runs operations against a provider, updating state as they complete.
#[derive(Clone)]
pub struct Executor {
    provider: Arc<dyn Provider>,
    reporter: Arc<dyn Reporter>,
    resolvers: Arc<ResolverRegistry>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("concurrency", &self.concurrency)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Creates an executor with the default concurrency.
    #[must_use]
    pub fn new(
        provider: Arc<dyn Provider>,
        reporter: Arc<dyn Reporter>,
        resolvers: Arc<ResolverRegistry>,
    ) -> Self {
        Self {
            provider,
            reporter,
            resolvers,
            concurrency: DEFAULT_CONCURRENCY,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the maximum number of operations in flight (at least one).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Uses `token` to stop scheduling new operations.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs `operations`.
    ///
    /// `source` and `target` supply the dependency edges; `state` is updated
    /// after each successful operation and is what references resolve
    /// against. Per-operation failures are collected in the report.
    ///
    /// # Errors
    ///
    /// Returns an error only if the scheduler loses a worker task.
    pub async fn execute(
        &self,
        operations: &[Operation],
        source: &Graph,
        target: &Graph,
        state: Arc<Mutex<State>>,
        mode: ExecutionMode,
    ) -> Result<ExecutionReport, ApplyError> {
        info!(
            operations = operations.len(),
            concurrency = self.concurrency,
            ?mode,
            "Executing plan"
        );

        let mut schedule = Schedule::new(operations, source, target);
        let worker = Worker {
            provider: Arc::clone(&self.provider),
            resolvers: Arc::clone(&self.resolvers),
            state,
        };
        let mut running = JoinSet::new();

        loop {
            while running.len() < self.concurrency && !self.cancel.is_cancelled() {
                let Some(index) = schedule.ready.pop_first() else {
                    break;
                };
                schedule.status[index] = OpStatus::Running;
                self.reporter.operation_started(&operations[index]);

                let task = Task::new(&operations[index], source, target);
                let worker = worker.clone();
                running.spawn(async move {
                    // Inner task so a panicking worker still reports its index.
                    let outcome = tokio::spawn(worker.run(task)).await;
                    (index, outcome)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (index, outcome) = joined.map_err(|e| ApplyError::WorkerLost {
                message: e.to_string(),
            })?;
            let result = outcome.unwrap_or_else(|e| {
                Err(FailureReason::Failed(format!(
                    "worker terminated abnormally: {e}"
                )))
            });
            schedule.settle(index, result, mode, operations, self.reporter.as_ref());
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            warn!("Execution cancelled; abandoning pending operations");
        }
        schedule.abandon_unsettled(cancelled, operations, self.reporter.as_ref());

        let report = schedule.into_report(operations);
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failures.len(),
            "Execution finished"
        );
        Ok(report)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum OpStatus {
    Pending,
    Ready,
    Running,
    Done(Result<(), FailureReason>),
}

/// Scheduler bookkeeping, indexed by position in the plan.
struct Schedule {
    status: Vec<OpStatus>,
    waiting_on: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    ready: BTreeSet<usize>,
}

impl Schedule {
    fn new(operations: &[Operation], source: &Graph, target: &Graph) -> Self {
        let count = operations.len();
        let index: HashMap<&Urn, usize> = operations
            .iter()
            .enumerate()
            .map(|(i, op)| (op.urn(), i))
            .collect();

        let mut waiting_on = vec![0; count];
        let mut dependents = vec![Vec::new(); count];
        for (i, op) in operations.iter().enumerate() {
            let is_delete = op.operation_type == OperationType::Delete;
            let edges: Vec<&Urn> = if is_delete {
                source.dependents(op.urn()).collect()
            } else {
                target.dependencies(op.urn()).collect()
            };
            for urn in edges {
                let Some(&j) = index.get(urn) else {
                    continue;
                };
                // Creates and updates never wait on deletes.
                let counts = is_delete || operations[j].operation_type != OperationType::Delete;
                if j != i && counts {
                    waiting_on[i] += 1;
                    dependents[j].push(i);
                }
            }
        }

        let ready: BTreeSet<usize> = (0..count).filter(|&i| waiting_on[i] == 0).collect();
        let mut status = vec![OpStatus::Pending; count];
        for &i in &ready {
            status[i] = OpStatus::Ready;
        }
        debug!(ready = ready.len(), total = count, "Schedule built");

        Self {
            status,
            waiting_on,
            dependents,
            ready,
        }
    }

    fn settle(
        &mut self,
        index: usize,
        result: Result<(), FailureReason>,
        mode: ExecutionMode,
        operations: &[Operation],
        reporter: &dyn Reporter,
    ) {
        let failed = result.is_err();
        reporter.operation_completed(&operations[index], result.as_ref().map(|_| ()));
        self.status[index] = OpStatus::Done(result);

        for dependent in self.dependents[index].clone() {
            if failed && mode == ExecutionMode::Apply {
                self.skip(dependent, operations[index].urn(), operations, reporter);
                continue;
            }
            self.waiting_on[dependent] = self.waiting_on[dependent].saturating_sub(1);
            if self.waiting_on[dependent] == 0 && self.status[dependent] == OpStatus::Pending {
                self.status[dependent] = OpStatus::Ready;
                self.ready.insert(dependent);
            }
        }
    }

    /// Skips `start` and everything that transitively waits on it.
    fn skip(&mut self, start: usize, blocked_by: &Urn, operations: &[Operation], reporter: &dyn Reporter) {
        let mut stack = vec![(start, blocked_by.clone())];
        while let Some((index, blocked_by)) = stack.pop() {
            if !matches!(self.status[index], OpStatus::Pending | OpStatus::Ready) {
                continue;
            }
            self.ready.remove(&index);
            debug!(urn = %operations[index].urn(), %blocked_by, "Skipping operation");
            let reason = FailureReason::Skipped { blocked_by };
            reporter.operation_completed(&operations[index], Err(&reason));
            self.status[index] = OpStatus::Done(Err(reason));
            for &dependent in &self.dependents[index] {
                stack.push((dependent, operations[index].urn().clone()));
            }
        }
    }

    fn abandon_unsettled(&mut self, cancelled: bool, operations: &[Operation], reporter: &dyn Reporter) {
        for (index, status) in self.status.iter_mut().enumerate() {
            if matches!(status, OpStatus::Pending | OpStatus::Ready) {
                let reason = if cancelled {
                    FailureReason::Cancelled
                } else {
                    FailureReason::Failed(String::from("dependencies never settled"))
                };
                reporter.operation_completed(&operations[index], Err(&reason));
                *status = OpStatus::Done(Err(reason));
            }
        }
        self.ready.clear();
    }

    fn into_report(self, operations: &[Operation]) -> ExecutionReport {
        let mut report = ExecutionReport {
            total: operations.len(),
            ..ExecutionReport::default()
        };
        for (op, status) in operations.iter().zip(self.status) {
            match status {
                OpStatus::Done(Ok(())) => report.succeeded.push(op.urn().clone()),
                OpStatus::Done(Err(reason)) => report.failures.push(OperationFailure {
                    urn: op.urn().clone(),
                    description: op.description(),
                    reason,
                }),
                // Unreachable once the join set is drained.
                OpStatus::Pending | OpStatus::Ready | OpStatus::Running => {}
            }
        }
        report
    }
}

/// Everything a worker needs for one operation.
struct Task {
    operation: Operation,
    /// Last applied data, for updates.
    previous: Option<ResourceData>,
    /// Dependencies recorded in state on success.
    dependencies: Vec<Urn>,
}

impl Task {
    fn new(operation: &Operation, source: &Graph, target: &Graph) -> Self {
        let urn = operation.urn();
        let (previous, dependencies) = match operation.operation_type {
            OperationType::Update => (
                source.get_resource(urn).map(|r| r.data().clone()),
                target.dependencies(urn).cloned().collect(),
            ),
            OperationType::Create => (None, target.dependencies(urn).cloned().collect()),
            OperationType::Delete => (None, Vec::new()),
        };
        Self {
            operation: operation.clone(),
            previous,
            dependencies,
        }
    }
}

#[derive(Clone)]
struct Worker {
    provider: Arc<dyn Provider>,
    resolvers: Arc<ResolverRegistry>,
    state: Arc<Mutex<State>>,
}

impl Worker {
    #[instrument(
        name = "operation",
        skip_all,
        fields(urn = %task.operation.urn(), kind = %task.operation.operation_type)
    )]
    async fn run(self, task: Task) -> Result<(), FailureReason> {
        let Task {
            operation,
            previous,
            dependencies,
        } = task;
        let mut resource = operation.resource;

        let (previous, previous_output) = {
            let state = self.state.lock().await;
            resolve_data(resource.data_mut(), &state, &self.resolvers).map_err(failed)?;
            let previous = match previous {
                Some(mut data) => {
                    resolve_data(&mut data, &state, &self.resolvers).map_err(failed)?;
                    Some(data)
                }
                None => None,
            };
            let output = state.output_for(resource.urn()).cloned().unwrap_or_default();
            (previous, output)
        };

        let id = resource.id();
        let resource_type = resource.resource_type();
        match operation.operation_type {
            OperationType::Create => {
                let output = match resource.import_metadata() {
                    Some(metadata) => {
                        debug!(remote_id = %metadata.remote_id, "Importing existing remote resource");
                        self.provider
                            .import(id, resource_type, resource.data(), metadata)
                            .await
                    }
                    None => self.provider.create(id, resource_type, resource.data()).await,
                }
                .map_err(failed)?;
                self.state
                    .lock()
                    .await
                    .record_applied(&resource, output, dependencies);
            }
            OperationType::Update => {
                let previous = previous.unwrap_or_default();
                let output = self
                    .provider
                    .update(id, resource_type, resource.data(), &previous, &previous_output)
                    .await
                    .map_err(failed)?;
                self.state
                    .lock()
                    .await
                    .record_applied(&resource, output, dependencies);
            }
            OperationType::Delete => {
                self.provider
                    .delete(id, resource_type, resource.data(), &previous_output)
                    .await
                    .map_err(failed)?;
                self.state.lock().await.remove(resource.urn());
            }
        }

        info!("Operation succeeded");
        Ok(())
    }
}

fn failed(error: impl fmt::Display) -> FailureReason {
    warn!(%error, "Operation failed");
    FailureReason::Failed(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::graph::{PropertyMap, PropertyRef, PropertyValue, Resource, ResourceOutput};
    use crate::planner::{compute_diff, plan};
    use crate::provider::MockProvider;
    use crate::reporter::NoopReporter;
    use async_trait::async_trait;
    use std::time::Duration;

    fn named(name: &str) -> PropertyMap {
        let mut m = PropertyMap::new();
        m.insert("name".into(), name.into());
        m
    }

    fn id_output(id: &str) -> ResourceOutput {
        let mut m = PropertyMap::new();
        m.insert("id".into(), format!("remote-{id}").into());
        ResourceOutput::new(m)
    }

    /// e1 and p1 are independent; tp1 references both.
    fn scenario_graph() -> Graph {
        let mut g = Graph::new();
        g.add_resource(Resource::new("event", "e1", named("Signed Up")));
        g.add_resource(Resource::new("property", "p1", named("plan_tier")));
        let mut tp = named("Main");
        tp.insert(
            "rules".into(),
            PropertyValue::List(vec![
                PropertyRef::property(Urn::new("event", "e1"), "id").into(),
                PropertyRef::property(Urn::new("property", "p1"), "id").into(),
            ]),
        );
        g.add_resource(Resource::new("tracking-plan", "tp1", tp));
        g
    }

    fn executor(provider: impl Provider + 'static, concurrency: usize) -> Executor {
        Executor::new(
            Arc::new(provider),
            Arc::new(NoopReporter),
            Arc::new(ResolverRegistry::new()),
        )
        .with_concurrency(concurrency)
    }

    /// Last applied: tp1 references e1. Desired: tp1 references e2, e1 gone.
    fn repointed_graphs() -> (Graph, Graph, State) {
        let tracking_plan = |event: &str| {
            let mut data = named("Main");
            data.insert(
                "event".into(),
                PropertyRef::property(Urn::new("event", event), "id").into(),
            );
            Resource::new("tracking-plan", "tp1", data)
        };

        let mut source = Graph::new();
        source.add_resource(Resource::new("event", "e1", named("Signed Up")));
        source.add_resource(tracking_plan("e1"));
        let mut state = State::new();
        for resource in source.resources() {
            state.record_applied(resource, id_output(resource.id()), Vec::new());
        }

        let mut target = Graph::new();
        target.add_resource(Resource::new("event", "e2", named("Signed Up v2")));
        target.add_resource(tracking_plan("e2"));
        (source, target, state)
    }

    /// Records the order of calls; succeeds for everything.
    #[derive(Default)]
    struct RecordingProvider {
        calls: std::sync::Mutex<Vec<String>>,
        create_delay: Duration,
    }

    impl RecordingProvider {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        async fn create(
            &self,
            id: &str,
            _resource_type: &str,
            _data: &ResourceData,
        ) -> Result<ResourceOutput, ProviderError> {
            tokio::time::sleep(self.create_delay).await;
            self.record(format!("create {id}"));
            Ok(id_output(id))
        }

        async fn update(
            &self,
            id: &str,
            _resource_type: &str,
            _data: &ResourceData,
            _previous: &ResourceData,
            _previous_output: &ResourceOutput,
        ) -> Result<ResourceOutput, ProviderError> {
            self.record(format!("update {id}"));
            Ok(id_output(id))
        }

        async fn delete(
            &self,
            id: &str,
            _resource_type: &str,
            _data: &ResourceData,
            _output: &ResourceOutput,
        ) -> Result<(), ProviderError> {
            self.record(format!("delete {id}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sequential_run_follows_plan_order() {
        let target = scenario_graph();
        let source = Graph::new();
        let ops = plan(&compute_diff(&source, &target), &source, &target).unwrap();
        let provider = Arc::new(RecordingProvider::default());
        let state = Arc::new(Mutex::new(State::new()));

        let exec = Executor::new(
            Arc::clone(&provider) as Arc<dyn Provider>,
            Arc::new(NoopReporter),
            Arc::new(ResolverRegistry::new()),
        )
        .with_concurrency(1);
        let report = exec
            .execute(&ops, &source, &target, Arc::clone(&state), ExecutionMode::Apply)
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(
            *provider.calls.lock().unwrap(),
            vec!["create e1", "create p1", "create tp1"]
        );
        let state = state.lock().await;
        assert_eq!(state.len(), 3);
        let stored = &state.get(&Urn::new("tracking-plan", "tp1")).unwrap().input;
        let PropertyValue::List(rules) = &stored["rules"] else {
            panic!("expected list");
        };
        assert_eq!(rules[0].as_property_ref().unwrap().value(), Some("remote-e1"));
        assert_eq!(rules[1].as_property_ref().unwrap().value(), Some("remote-p1"));
    }

    #[tokio::test]
    async fn test_apply_failure_skips_dependents_not_siblings() {
        let target = scenario_graph();
        let source = Graph::new();
        let ops = plan(&compute_diff(&source, &target), &source, &target).unwrap();

        let mut provider = MockProvider::new();
        provider
            .expect_create()
            .withf(|id, _, _| id == "e1")
            .times(1)
            .returning(|id, t, _| Err(ProviderError::remote("create", t, id, "boom")));
        provider
            .expect_create()
            .withf(|id, _, _| id == "p1")
            .times(1)
            .returning(|id, _, _| Ok(id_output(id)));

        let state = Arc::new(Mutex::new(State::new()));
        let report = executor(provider, 4)
            .execute(&ops, &source, &target, Arc::clone(&state), ExecutionMode::Apply)
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec![Urn::new("property", "p1")]);
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(report.failures[0].reason, FailureReason::Failed(_)));
        assert_eq!(
            report.failures[1].reason,
            FailureReason::Skipped {
                blocked_by: Urn::new("event", "e1")
            }
        );
        assert!(matches!(
            report.error(ExecutionMode::Apply),
            Some(ApplyError::OperationsFailed { total: 3, .. })
        ));

        let state = state.lock().await;
        assert_eq!(state.len(), 1);
        assert!(state.get(&Urn::new("property", "p1")).is_some());
    }

    #[tokio::test]
    async fn test_destroy_attempts_every_deletion() {
        let source = scenario_graph();
        let mut state = State::new();
        for resource in source.resources() {
            state.record_applied(resource, id_output(resource.id()), Vec::new());
        }
        let target = Graph::new();
        let ops = plan(&compute_diff(&source, &target), &source, &target).unwrap();

        let mut provider = MockProvider::new();
        provider
            .expect_delete()
            .times(3)
            .returning(|id, t, _, _| {
                if id == "tp1" {
                    Err(ProviderError::remote("delete", t, id, "in use"))
                } else {
                    Ok(())
                }
            });

        let state = Arc::new(Mutex::new(state));
        let report = executor(provider, 2)
            .execute(&ops, &source, &target, Arc::clone(&state), ExecutionMode::Destroy)
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].urn, Urn::new("tracking-plan", "tp1"));
        assert!(matches!(
            report.error(ExecutionMode::Destroy),
            Some(ApplyError::DestroyFailed { total: 3, .. })
        ));
        let state = state.lock().await;
        assert_eq!(state.len(), 1);
        assert!(state.get(&Urn::new("tracking-plan", "tp1")).is_some());
    }

    #[tokio::test]
    async fn test_delete_waits_for_update_that_drops_the_reference() {
        let (source, target, state) = repointed_graphs();
        let ops = plan(&compute_diff(&source, &target), &source, &target).unwrap();
        let planned: Vec<_> = ops.iter().map(Operation::description).collect();
        assert_eq!(
            planned,
            ["create event:e2", "update tracking-plan:tp1", "delete event:e1"]
        );

        let provider = Arc::new(RecordingProvider {
            create_delay: Duration::from_millis(50),
            ..RecordingProvider::default()
        });
        let state = Arc::new(Mutex::new(state));
        let report = Executor::new(
            Arc::clone(&provider) as Arc<dyn Provider>,
            Arc::new(NoopReporter),
            Arc::new(ResolverRegistry::new()),
        )
        .with_concurrency(4)
        .execute(&ops, &source, &target, Arc::clone(&state), ExecutionMode::Apply)
        .await
        .unwrap();

        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(
            *provider.calls.lock().unwrap(),
            vec!["create e2", "update tp1", "delete e1"]
        );
        let state = state.lock().await;
        assert_eq!(state.len(), 2);
        assert!(state.get(&Urn::new("event", "e1")).is_none());
    }

    #[tokio::test]
    async fn test_failed_update_skips_delete_it_was_holding() {
        let (source, target, state) = repointed_graphs();
        let ops = plan(&compute_diff(&source, &target), &source, &target).unwrap();

        let mut provider = MockProvider::new();
        provider
            .expect_create()
            .times(1)
            .returning(|id, _, _| Ok(id_output(id)));
        provider
            .expect_update()
            .times(1)
            .returning(|id, t, _, _, _| Err(ProviderError::remote("update", t, id, "rejected")));
        provider.expect_delete().never();

        let state = Arc::new(Mutex::new(state));
        let report = executor(provider, 4)
            .execute(&ops, &source, &target, Arc::clone(&state), ExecutionMode::Apply)
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec![Urn::new("event", "e2")]);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].urn, Urn::new("tracking-plan", "tp1"));
        assert_eq!(
            report.failures[1].reason,
            FailureReason::Skipped {
                blocked_by: Urn::new("tracking-plan", "tp1")
            }
        );
        assert!(state.lock().await.get(&Urn::new("event", "e1")).is_some());
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nothing() {
        let target = scenario_graph();
        let source = Graph::new();
        let ops = plan(&compute_diff(&source, &target), &source, &target).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let state = Arc::new(Mutex::new(State::new()));
        let report = executor(MockProvider::new(), 4)
            .with_cancellation(token)
            .execute(&ops, &source, &target, Arc::clone(&state), ExecutionMode::Apply)
            .await
            .unwrap();

        assert!(report.succeeded.is_empty());
        assert_eq!(report.failures.len(), 3);
        assert!(report.failures.iter().all(|f| f.reason == FailureReason::Cancelled));
        assert!(state.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_reference_fails_operation() {
        let mut target = Graph::new();
        let mut data = PropertyMap::new();
        data.insert(
            "event".into(),
            PropertyRef::property(Urn::new("event", "ghost"), "id").into(),
        );
        target.add_resource(Resource::new("tracking-plan", "tp1", data));
        let source = Graph::new();
        let ops = plan(&compute_diff(&source, &target), &source, &target).unwrap();

        let state = Arc::new(Mutex::new(State::new()));
        let report = executor(MockProvider::new(), 1)
            .execute(&ops, &source, &target, state, ExecutionMode::Apply)
            .await
            .unwrap();

        let FailureReason::Failed(message) = &report.failures[0].reason else {
            panic!("expected failure");
        };
        assert!(message.contains("event:ghost"));
    }

    #[tokio::test]
    async fn test_import_calls_provider_import() {
        let mut target = Graph::new();
        target.add_resource(
            Resource::new("category", "canvas", named("Canvas")).with_import(
                crate::graph::ImportMetadata {
                    remote_id: String::from("cat_123"),
                    workspace_id: String::from("ws"),
                },
            ),
        );
        let source = Graph::new();
        let ops = plan(&compute_diff(&source, &target), &source, &target).unwrap();

        let mut provider = MockProvider::new();
        provider
            .expect_import()
            .withf(|_, _, _, meta| meta.remote_id == "cat_123")
            .times(1)
            .returning(|_, _, _, meta| Ok(id_output(&meta.remote_id)));

        let state = Arc::new(Mutex::new(State::new()));
        let report = executor(provider, 1)
            .execute(&ops, &source, &target, Arc::clone(&state), ExecutionMode::Apply)
            .await
            .unwrap();

        assert!(report.is_success());
        let state = state.lock().await;
        let entry = state.get(&Urn::new("category", "canvas")).unwrap();
        assert_eq!(entry.import.as_ref().unwrap().remote_id, "cat_123");
    }
}
