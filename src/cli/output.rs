//! Output formatting and the interactive terminal reporter.

use async_trait::async_trait;
use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ConfigHasher, ValidationResult};
use crate::error::{FailureReason, KeystoneError, Result};
use crate::planner::{Diff, ImportCandidate, Operation, OperationType, PlanSummary};
use crate::reporter::Reporter;
use crate::state::{LockInfo, State};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    format: OutputFormat,
}

/// Plan operation row for table display.
#[derive(Tabled)]
struct OperationRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Name")]
    name: String,
}

/// Managed resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "URN")]
    urn: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Imported")]
    imported: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

/// Import candidate row for table display.
#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "Local")]
    local: String,
    #[tabled(rename = "Remote ID")]
    remote_id: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a plan. `detailed` adds per-property changes for updates.
    #[must_use]
    pub fn format_plan(&self, diff: &Diff, operations: &[Operation], detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::new(diff, operations)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(diff, operations, detailed),
        }
    }

    fn format_plan_text(diff: &Diff, operations: &[Operation], detailed: bool) -> String {
        if operations.is_empty() {
            return format!("{} No changes required - resources are up to date.\n", "✓".green());
        }

        let mut output = String::from("\nPlan\n\n");
        let rows: Vec<OperationRow> = operations
            .iter()
            .enumerate()
            .map(|(i, op)| OperationRow {
                index: i + 1,
                action: Self::format_action(op),
                resource: op.urn().to_string(),
                name: op.resource.display_name().unwrap_or_default(),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed && !diff.updated_resources.is_empty() {
            output.push_str("\nChanges:\n");
            for resource_diff in diff.updated_resources.values() {
                let _ = writeln!(output, "  {}", resource_diff.urn.to_string().yellow());
                for (path, change) in &resource_diff.properties {
                    let _ = writeln!(output, "    {path}: {change}");
                }
            }
        }

        let summary = PlanSummary::of(operations);
        let _ = write!(
            output,
            "\nPlan: {} to create, {} to import, {} to update, {} to delete\n",
            summary.creates.to_string().green(),
            summary.imports.to_string().cyan(),
            summary.updates.to_string().yellow(),
            summary.deletes.to_string().red()
        );
        output
    }

    /// Formats a state summary.
    #[must_use]
    pub fn format_state(&self, state: &State) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::from("\nState\n\n");
                let _ = writeln!(output, "   Version: {}", state.version);
                let hash = if state.last_applied_hash.is_empty() {
                    String::from("(none)")
                } else {
                    ConfigHasher::short_hash(&state.last_applied_hash).to_string()
                };
                let _ = writeln!(output, "   Graph hash: {hash}");
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Resources: {}", state.len());

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.failed == 0 {
                            "✓".green()
                        } else {
                            "✗".red()
                        };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({} succeeded, {} failed)",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.succeeded,
                            entry.failed
                        );
                    }
                }
                output
            }
        }
    }

    /// Formats the managed resources, optionally restricted to one type.
    #[must_use]
    pub fn format_resources(&self, state: &State, resource_type: Option<&str>) -> String {
        let entries = state
            .resources
            .iter()
            .filter(|(_, entry)| resource_type.is_none_or(|t| entry.resource_type == t));

        match self.format {
            OutputFormat::Json => {
                let list: Vec<ResourceJson<'_>> = entries
                    .map(|(urn, entry)| ResourceJson {
                        urn: urn.as_str(),
                        resource_type: &entry.resource_type,
                        remote_id: entry.import.as_ref().map(|i| i.remote_id.as_str()),
                        dependencies: entry.dependencies.iter().map(|d| d.as_str()).collect(),
                    })
                    .collect();
                serde_json::to_string_pretty(&list).unwrap_or_default()
            }
            OutputFormat::Text => {
                let rows: Vec<ResourceRow> = entries
                    .map(|(urn, entry)| ResourceRow {
                        urn: urn.to_string(),
                        resource_type: entry.resource_type.clone(),
                        imported: entry
                            .import
                            .as_ref()
                            .map_or_else(String::new, |i| i.remote_id.clone()),
                        updated: entry.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                    })
                    .collect();
                if rows.is_empty() {
                    return String::from("No managed resources.\n");
                }
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "valid": result.is_valid(),
                "errors": result.errors.iter().map(|e| serde_json::json!({
                    "field": e.field,
                    "message": e.message,
                })).collect::<Vec<_>>(),
                "warnings": result.warnings,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Configuration is valid", "✓".green());
                } else {
                    let _ = writeln!(output, "{} Configuration is invalid:", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "  - {}: {}", error.field, error.message);
                    }
                }
                if show_warnings && !result.warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "  - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats lock information.
    #[must_use]
    pub fn format_lock(&self, lock: &LockInfo) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(lock).unwrap_or_default(),
            OutputFormat::Text => format!("{} State locked: {lock}\n", "🔒".yellow()),
        }
    }

    /// Formats an operation's action with color.
    fn format_action(op: &Operation) -> String {
        if op.is_import() {
            return "<import".cyan().to_string();
        }
        match op.operation_type {
            OperationType::Create => "+create".green().to_string(),
            OperationType::Update => "~update".yellow().to_string(),
            OperationType::Delete => "-delete".red().to_string(),
        }
    }
}

#[derive(Serialize)]
struct PlanJson<'a> {
    summary: PlanSummary,
    operations: Vec<OperationJson<'a>>,
    importable: &'a [crate::graph::Urn],
    unmodified: usize,
}

#[derive(Serialize)]
struct OperationJson<'a> {
    action: OperationType,
    import: bool,
    urn: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    changed: Vec<&'a str>,
}

impl<'a> PlanJson<'a> {
    fn new(diff: &'a Diff, operations: &'a [Operation]) -> Self {
        Self {
            summary: PlanSummary::of(operations),
            operations: operations
                .iter()
                .map(|op| OperationJson {
                    action: op.operation_type,
                    import: op.is_import(),
                    urn: op.urn().as_str(),
                    changed: diff
                        .updated_resources
                        .get(op.urn())
                        .filter(|_| op.operation_type == OperationType::Update)
                        .map(|d| d.properties.keys().map(String::as_str).collect())
                        .unwrap_or_default(),
                })
                .collect(),
            importable: &diff.importable_resources,
            unmodified: diff.unmodified_resources.len(),
        }
    }
}

#[derive(Serialize)]
struct ResourceJson<'a> {
    urn: &'a str,
    #[serde(rename = "type")]
    resource_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_id: Option<&'a str>,
    dependencies: Vec<&'a str>,
}

/// Reporter printing to the terminal and prompting on stdin.
///
/// With `auto_approve`, every prompt is answered yes.
#[derive(Debug)]
pub struct TerminalReporter {
    formatter: OutputFormatter,
    auto_approve: bool,
    detailed: bool,
}

impl TerminalReporter {
    /// Creates a reporter that prompts before applying and importing.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self {
            formatter: OutputFormatter::new(format),
            auto_approve: false,
            detailed: false,
        }
    }

    /// Answers every prompt with yes.
    #[must_use]
    pub const fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    /// Shows per-property changes in plans.
    #[must_use]
    pub const fn with_detailed(mut self, detailed: bool) -> Self {
        self.detailed = detailed;
        self
    }

    async fn prompt(&self, question: String) -> Result<bool> {
        if self.auto_approve {
            return Ok(true);
        }
        tokio::task::spawn_blocking(move || -> Result<bool> {
            eprint!("{question} [y/N]: ");
            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;
            Ok(is_affirmative(&input))
        })
        .await
        .map_err(|e| KeystoneError::Reporter(format!("prompt task failed: {e}")))?
    }
}

/// Returns true for `y` or `yes`, in any case.
#[must_use]
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl Reporter for TerminalReporter {
    async fn report_plan(&self, diff: &Diff, operations: &[Operation]) -> Result<()> {
        eprintln!("{}", self.formatter.format_plan(diff, operations, self.detailed));
        Ok(())
    }

    async fn confirm_apply(&self, operations: &[Operation]) -> Result<bool> {
        let approved = self
            .prompt(format!("Apply {} operation(s)?", operations.len()))
            .await?;
        if !approved {
            eprintln!("Apply cancelled.");
        }
        Ok(approved)
    }

    async fn confirm_imports(&self, candidates: &[ImportCandidate]) -> Result<Vec<ImportCandidate>> {
        let rows: Vec<CandidateRow> = candidates
            .iter()
            .map(|c| CandidateRow {
                local: c.local_urn.to_string(),
                remote_id: c.remote_id.clone(),
                name: c.remote_name.clone(),
            })
            .collect();
        eprintln!(
            "\nExisting remote resources match {} declared resource(s):\n{}",
            candidates.len(),
            Table::new(rows)
        );

        let accepted = self
            .prompt(String::from("Import these instead of creating new ones?"))
            .await?;
        Ok(if accepted { candidates.to_vec() } else { Vec::new() })
    }

    fn operation_started(&self, operation: &Operation) {
        eprintln!("  {} {}", "…".dimmed(), operation.description());
    }

    fn operation_completed(&self, operation: &Operation, result: std::result::Result<(), &FailureReason>) {
        match result {
            Ok(()) => eprintln!("  {} {}", "✓".green(), operation.description()),
            Err(reason @ FailureReason::Failed(_)) => {
                eprintln!("  {} {} ({reason})", "✗".red(), operation.description());
            }
            Err(reason) => {
                eprintln!("  {} {} ({reason})", "-".yellow(), operation.description());
            }
        }
    }
}
