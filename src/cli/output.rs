//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{StackConfig, ValidationResult};
use crate::engine::PreparedStack;
use crate::model::{NodeId, Stack};
use crate::plan::DeploymentPlan;
use crate::state::DeploymentRecord;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    format: OutputFormat,
}

/// Creation order row for table display.
#[derive(Tabled)]
struct OrderRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Wave")]
    wave: usize,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "After")]
    after: String,
}

/// Realized node row for table display.
#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Outputs")]
    outputs: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the creation order of a prepared stack.
    #[must_use]
    pub fn format_order(&self, stack: &Stack, prepared: &PreparedStack, show_waves: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&OrderJson::new(stack, prepared)),
            OutputFormat::Text => Self::format_order_text(stack, prepared, show_waves),
        }
    }

    fn format_order_text(stack: &Stack, prepared: &PreparedStack, show_waves: bool) -> String {
        let mut output = String::new();

        let _ = writeln!(
            output,
            "\n{} {}/{}",
            "Creation order".bold(),
            stack.name(),
            stack.environment()
        );
        let _ = writeln!(output, "   Config hash: {}\n", short(&prepared.config_hash));

        let rows: Vec<OrderRow> = prepared
            .order
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, id)| OrderRow {
                index: i + 1,
                wave: prepared.order.wave_of(id).map_or(0, |w| w + 1),
                resource: id.to_string(),
                kind: stack.node(id).map(|n| n.kind().to_string()).unwrap_or_default(),
                after: join(prepared.graph.dependencies_of(id)),
            })
            .collect();

        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if show_waves {
            output.push('\n');
            for (i, wave) in prepared.order.waves().iter().enumerate() {
                let _ = writeln!(output, "   Wave {}: {}", i + 1, join(wave.iter()));
            }
        }

        if !prepared.graph.access_rules().is_empty() {
            output.push_str("\nAccess rules (bound after realization):\n");
            for rule in prepared.graph.access_rules() {
                let _ = writeln!(output, "   {rule}");
            }
        }

        output
    }

    /// Formats a deployment plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan) -> String {
        match self.format {
            OutputFormat::Json => plan.to_json().unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &DeploymentPlan) -> String {
        if plan.is_empty() {
            return format!("{} Empty stack - nothing to realize.\n", "✓".green());
        }

        let mut output = String::new();

        let _ = writeln!(
            output,
            "\n{} {}/{} ({})",
            "Deployment plan".bold(),
            plan.stack,
            plan.environment,
            plan.id
        );
        let _ = writeln!(output, "   Provider: {}", plan.provider);
        let _ = writeln!(output, "   Config hash: {}\n", short(&plan.config_hash));

        let rows: Vec<NodeRow> = plan
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| NodeRow {
                index: i + 1,
                resource: node.identity.to_string(),
                kind: node.kind.to_string(),
                outputs: truncate(&node.outputs.keys().cloned().collect::<Vec<_>>().join(", "), 60),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if !plan.security.is_empty() {
            output.push_str("\nIngress rules:\n");
            for (target, group) in plan.security.groups() {
                for rule in &group.ingress {
                    let _ = writeln!(
                        output,
                        "   {} {target} ({}) <- {} ({}) {}",
                        "+".green(),
                        group.group_id,
                        rule.source,
                        rule.source_group_id,
                        rule.permission
                    );
                }
            }
        }

        let _ = write!(
            output,
            "\n{} {} resources realized, {} ingress rules bound\n",
            "✓".green(),
            plan.len(),
            plan.security.ingress_count()
        );

        output
    }

    /// Formats a stored deployment record.
    #[must_use]
    pub fn format_record(&self, record: &DeploymentRecord, show_history: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(record),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = writeln!(
                    output,
                    "\n{} {}/{}\n",
                    "Deployment record".bold(),
                    record.stack,
                    record.environment
                );
                let _ = writeln!(output, "   Version: {}", record.version);
                let _ = writeln!(output, "   Last updated: {}", record.last_updated);

                match &record.latest {
                    Some(plan) => {
                        let _ = writeln!(output, "   Latest plan: {} ({})", plan.id, short(&plan.config_hash));
                        output.push_str(&Self::format_plan_text(plan));
                    }
                    None => output.push_str("   No successful deployment yet.\n"),
                }

                if show_history && !record.history.is_empty() {
                    let _ = writeln!(output, "\n   History ({}):", record.history.len());
                    for entry in record.history.iter().rev() {
                        let status = if entry.success { "✓".green() } else { "✗".red() };
                        let _ = write!(
                            output,
                            "     {status} {} {} ({} resources)",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            short(&entry.config_hash),
                            entry.resources
                        );
                        if let Some(error) = &entry.error {
                            let _ = write!(output, " - {}", truncate(error, 80));
                        }
                        output.push('\n');
                    }
                }

                output
            }
        }
    }

    /// Formats a validation result with a short stack summary.
    #[must_use]
    pub fn format_validation(&self, config: &StackConfig, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "stack": config.stack.name,
                "environment": config.stack.environment,
                "resources": config.resources.len(),
                "access_rules": config.access_rules.len(),
                "valid": result.is_valid(),
                "warnings": result.warnings,
            })),
            OutputFormat::Text => {
                let mut output = format!("{} Stack file is valid\n", "✓".green());

                if show_warnings && !result.warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                let _ = writeln!(output, "\nStack summary:");
                let _ = writeln!(output, "   Stack: {}", config.stack.name);
                let _ = writeln!(output, "   Environment: {}", config.stack.environment);
                let _ = writeln!(output, "   Resources: {}", config.resources.len());
                let _ = writeln!(output, "   Access rules: {}", config.access_rules.len());
                output
            }
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn short(hash: &str) -> &str {
    &hash[..8.min(hash.len())]
}

fn join<'a>(ids: impl IntoIterator<Item = &'a NodeId>) -> String {
    ids.into_iter().map(NodeId::as_str).collect::<Vec<_>>().join(", ")
}

/// Truncates a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

// JSON serialization helpers

#[derive(Serialize)]
struct OrderJson {
    stack: String,
    environment: String,
    config_hash: String,
    order: Vec<OrderEntryJson>,
    waves: Vec<Vec<NodeId>>,
    access_rules: Vec<String>,
}

#[derive(Serialize)]
struct OrderEntryJson {
    identity: NodeId,
    kind: String,
    depends_on: Vec<NodeId>,
}

impl OrderJson {
    fn new(stack: &Stack, prepared: &PreparedStack) -> Self {
        Self {
            stack: stack.name().to_string(),
            environment: stack.environment().to_string(),
            config_hash: prepared.config_hash.clone(),
            order: prepared
                .order
                .nodes()
                .iter()
                .map(|id| OrderEntryJson {
                    identity: id.clone(),
                    kind: stack.node(id).map(|n| n.kind().to_string()).unwrap_or_default(),
                    depends_on: prepared.graph.dependencies_of(id).into_iter().cloned().collect(),
                })
                .collect(),
            waves: prepared.order.waves(),
            access_rules: prepared.graph.access_rules().iter().map(ToString::to_string).collect(),
        }
    }
}
