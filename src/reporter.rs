//! Progress reporting and interactive confirmation.

use async_trait::async_trait;

use crate::error::{FailureReason, Result};
use crate::planner::{Diff, ImportCandidate, Operation};

/// Receives plan previews, confirmation prompts and execution events.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Shows the diff and the operations about to run.
    async fn report_plan(&self, diff: &Diff, operations: &[Operation]) -> Result<()>;

    /// Asks whether to run `operations`. `false` aborts the run cleanly.
    async fn confirm_apply(&self, operations: &[Operation]) -> Result<bool>;

    /// Asks which import candidates to accept.
    async fn confirm_imports(&self, candidates: &[ImportCandidate]) -> Result<Vec<ImportCandidate>>;

    /// An operation was handed to a worker.
    fn operation_started(&self, operation: &Operation);

    /// An operation settled. Skipped and abandoned operations are reported
    /// here without a matching start event.
    fn operation_completed(&self, operation: &Operation, result: std::result::Result<(), &FailureReason>);
}

/// Reports nothing and approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

#[async_trait]
impl Reporter for NoopReporter {
    async fn report_plan(&self, _diff: &Diff, _operations: &[Operation]) -> Result<()> {
        Ok(())
    }

    async fn confirm_apply(&self, _operations: &[Operation]) -> Result<bool> {
        Ok(true)
    }

    async fn confirm_imports(&self, candidates: &[ImportCandidate]) -> Result<Vec<ImportCandidate>> {
        Ok(candidates.to_vec())
    }

    fn operation_started(&self, _operation: &Operation) {}

    fn operation_completed(&self, _operation: &Operation, _result: std::result::Result<(), &FailureReason>) {}
}
