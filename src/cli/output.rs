//! Output formatting for CLI commands.
//!
//! Every formatter returns a `String` so the caller decides where it goes.

use colored::Colorize;
use serde_json::Value;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ConfigHasher, ValidationResult};
use crate::planner::{FieldDiff, OperationPlan, PlannedAction};
use crate::resources::ResourceKind;
use crate::schema::OperationSelector;
use crate::state::StateDocument;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug, Clone, Copy)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Fields")]
    fields: String,
}

/// Field difference row for table display.
#[derive(Tabled)]
struct DiffRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Actual")]
    actual: String,
    #[tabled(rename = "Desired")]
    desired: String,
    #[tabled(rename = "Resolved by")]
    selector: String,
}

/// Resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "UID")]
    uid: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

/// State record row for table display.
#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Resource")]
    path: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Hash")]
    fingerprint: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Applied")]
    applied_at: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats an operation plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &OperationPlan) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::from(plan)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &OperationPlan) -> String {
        if plan.is_empty() {
            return format!(
                "{} {}: no changes required\n",
                "✓".green(),
                plan.resource
            );
        }

        let mut output = String::new();
        let _ = writeln!(output, "\nPlan for {}", plan.resource.to_string().bold());

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, action)| PlanActionRow {
                index: i + 1,
                action: Self::format_action(action),
                fields: match action {
                    PlannedAction::Create => "-".to_string(),
                    PlannedAction::Update { diffs, .. } => Self::truncate(
                        &diffs
                            .iter()
                            .map(|d| d.path.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                        60,
                    ),
                },
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        // A create reports no diffs worth showing.
        if plan.exists && !plan.diffs.is_empty() {
            let rows: Vec<DiffRow> = plan.diffs.iter().map(DiffRow::from).collect();
            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let updates = plan.actions.len() - usize::from(plan.creates());
        let _ = writeln!(
            output,
            "\nPlan: {} to create, {} to update",
            usize::from(plan.creates()).to_string().green(),
            updates.to_string().yellow()
        );

        output
    }

    /// Formats manifest validation results.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, count: usize) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "resources": count,
                    "errors": result
                        .errors
                        .iter()
                        .map(|e| serde_json::json!({ "field": e.field, "message": e.message }))
                        .collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} {count} resource(s) valid", "✓".green());
                } else {
                    let _ = writeln!(
                        output,
                        "{} {} error(s) in {count} resource(s):",
                        "✗".red(),
                        result.errors.len()
                    );
                    for issue in &result.errors {
                        let _ = writeln!(output, "   - {}: {}", issue.field, issue.message);
                    }
                }
                for warning in &result.warnings {
                    let _ = writeln!(output, "{} {warning}", "⚠".yellow());
                }
                output
            }
        }
    }

    /// Formats the result of a converged apply.
    #[must_use]
    pub fn format_apply(&self, plan: &OperationPlan, attempts: u32, apply_id: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "status": "converged",
                    "resource": plan.resource.path(),
                    "attempts": attempts,
                    "apply_id": apply_id,
                    "plan": PlanJson::from(plan),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let what = if plan.creates() {
                    "created"
                } else if plan.is_empty() {
                    "unchanged"
                } else {
                    "updated"
                };
                format!(
                    "{} {} {what} ({attempts} attempt(s), apply {apply_id})\n",
                    "✓".green(),
                    plan.resource
                )
            }
        }
    }

    /// Formats a list of resources, each serialized to its wire tree.
    #[must_use]
    pub fn format_resources(&self, kind: ResourceKind, resources: &[Value]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(resources).unwrap_or_default(),
            OutputFormat::Text => {
                if resources.is_empty() {
                    return format!("No {kind} resources found.\n");
                }

                let field = |r: &Value, name: &str| {
                    r.get(name)
                        .and_then(Value::as_str)
                        .unwrap_or("-")
                        .to_string()
                };
                let rows: Vec<ResourceRow> = resources
                    .iter()
                    .map(|r| ResourceRow {
                        name: field(r, "name"),
                        state: Self::format_resource_state(&field(r, "state")),
                        uid: Self::truncate(&field(r, "uid"), 12),
                        updated: field(r, "updateTime"),
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                let _ = writeln!(output, "\n{} {kind} resource(s)", resources.len());
                output
            }
        }
    }

    /// Formats a single resource tree.
    #[must_use]
    pub fn format_resource(&self, resource: &Value) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(resource).unwrap_or_default(),
            OutputFormat::Text => serde_yaml::to_string(resource).unwrap_or_default(),
        }
    }

    /// Formats local state.
    #[must_use]
    pub fn format_state(&self, state: &StateDocument) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(output, "\nState (version {})", state.version);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Resources: {}\n", state.len());

                if !state.is_empty() {
                    let hasher = ConfigHasher::new();
                    let rows: Vec<RecordRow> = state
                        .records
                        .values()
                        .map(|r| RecordRow {
                            path: r.path.clone(),
                            kind: r.kind.to_string(),
                            fingerprint: hasher.short_hash(&r.fingerprint),
                            attempts: r.attempts,
                            applied_at: r.applied_at.format("%Y-%m-%d %H:%M").to_string(),
                        })
                        .collect();
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let _ = writeln!(
                            output,
                            "     {} {} {}",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.path
                        );
                    }
                }

                output
            }
        }
    }

    fn format_action(action: &PlannedAction) -> String {
        match action {
            PlannedAction::Create => "+create".green().to_string(),
            PlannedAction::Update { operation, .. } => {
                format!("~{}", operation.name).yellow().to_string()
            }
        }
    }

    fn format_resource_state(state: &str) -> String {
        match state {
            "RUNNING" => state.green().to_string(),
            "PROVISIONING" | "RECONCILING" | "STOPPING" => state.yellow().to_string(),
            "ERROR" | "DEGRADED" => state.red().to_string(),
            _ => state.dimmed().to_string(),
        }
    }

    /// Truncates a string to at most `max_len` characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", &"✓".green().to_string(), message)
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        self.message("error", &"✗".red().to_string(), message)
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        self.message("warning", &"⚠".yellow().to_string(), message)
    }

    fn message(&self, status: &str, glyph: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{glyph} {message}"),
        }
    }
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl From<&FieldDiff> for DiffRow {
    fn from(diff: &FieldDiff) -> Self {
        let selector = match diff.operation {
            OperationSelector::RequiresRecreate => "recreate".red().to_string(),
            other => other.to_string(),
        };
        Self {
            path: diff.path.clone(),
            actual: OutputFormatter::truncate(&display_value(diff.actual.as_ref()), 30),
            desired: OutputFormatter::truncate(&display_value(diff.desired.as_ref()), 30),
            selector,
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson {
    resource: String,
    exists: bool,
    actions: Vec<ActionJson>,
    diffs: Vec<DiffJson>,
}

#[derive(serde::Serialize)]
struct ActionJson {
    action: String,
    fields: Vec<String>,
}

#[derive(serde::Serialize)]
struct DiffJson {
    path: String,
    actual: Option<Value>,
    desired: Option<Value>,
    operation: String,
}

impl From<&OperationPlan> for PlanJson {
    fn from(plan: &OperationPlan) -> Self {
        Self {
            resource: plan.resource.path(),
            exists: plan.exists,
            actions: plan
                .actions
                .iter()
                .map(|a| match a {
                    PlannedAction::Create => ActionJson {
                        action: "create".to_string(),
                        fields: Vec::new(),
                    },
                    PlannedAction::Update { operation, diffs } => ActionJson {
                        action: operation.name.to_string(),
                        fields: diffs.iter().map(|d| d.path.clone()).collect(),
                    },
                })
                .collect(),
            diffs: plan
                .diffs
                .iter()
                .map(|d| DiffJson {
                    path: d.path.clone(),
                    actual: d.actual.clone(),
                    desired: d.desired.clone(),
                    operation: d.operation.to_string(),
                })
                .collect(),
        }
    }
}
