//! Report rendering

use anyhow::{anyhow, Context, Result};
use std::str::FromStr;

use crate::models::ComplianceReport;

/// Report export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Human-readable text
    Text,
    /// Markdown format
    Markdown,
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            "text" | "txt" => Ok(ExportFormat::Text),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => Err(anyhow!("Unsupported export format: {}", other)),
        }
    }
}

/// Export report in specified format
pub fn export_report(report: &ComplianceReport, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(report).context("Failed to serialize report to JSON"),
        ExportFormat::Yaml => serde_yaml::to_string(report).context("Failed to serialize report to YAML"),
        ExportFormat::Text => Ok(format_text_report(report)),
        ExportFormat::Markdown => Ok(format_markdown_report(report)),
    }
}

fn format_text_report(report: &ComplianceReport) -> String {
    let mut output = String::new();
    let summary = &report.summary;
    let compliance = &report.compliance;

    output.push_str("=== Carelog - Compliance Report ===\n\n");
    output.push_str(&format!(
        "Period: {} to {}\n",
        report.period.start.format("%Y-%m-%d %H:%M:%S UTC"),
        report.period.end.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("Generated: {}\n\n", report.period.generated_at.format("%Y-%m-%d %H:%M:%S UTC")));

    output.push_str("=== SUMMARY ===\n");
    output.push_str(&format!("Total Accesses: {}\n", summary.total_accesses));
    output.push_str(&format!("Unique Actors: {}\n", summary.unique_actors));
    output.push_str(&format!("Emergency Accesses: {}\n", summary.emergency_access_count));
    if !summary.access_type_counts.is_empty() {
        output.push_str("By Type:\n");
        for (audit_type, count) in &summary.access_type_counts {
            output.push_str(&format!("  {}: {}\n", audit_type, count));
        }
    }
    if !summary.access_by_role.is_empty() {
        output.push_str("By Role:\n");
        for (role, count) in &summary.access_by_role {
            output.push_str(&format!("  {}: {}\n", role, count));
        }
    }

    output.push_str("\n=== COMPLIANCE ===\n");
    output.push_str(&format!(
        "Risk Score: {} ({})\n",
        compliance.risk_score.score,
        compliance.risk_score.level.as_str()
    ));
    output.push_str(&format!("Violations: {}\n", compliance.violations.len()));
    for score in &compliance.control_scores {
        output.push_str(&format!(
            "  {}: {:.1} ({})\n",
            score.control.as_str(),
            score.score,
            score.rating.as_str()
        ));
    }

    if !report.suspicious_patterns.is_empty() {
        output.push_str("\n=== SUSPICIOUS PATTERNS ===\n");
        for pattern in &report.suspicious_patterns {
            output.push_str(&format!(
                "- [{}] {} {}: {}\n",
                pattern.severity.as_str(),
                pattern.kind.as_str(),
                pattern.actor_id,
                pattern.description
            ));
        }
    }

    if !report.recommendations.is_empty() {
        output.push_str("\n=== RECOMMENDATIONS ===\n");
        for rec in &report.recommendations {
            output.push_str(&format!("- {}\n", rec));
        }
    }

    output
}

fn format_markdown_report(report: &ComplianceReport) -> String {
    let mut output = String::new();
    let summary = &report.summary;
    let compliance = &report.compliance;

    output.push_str("# Carelog - Compliance Report\n\n");
    output.push_str(&format!(
        "**Period:** {} to {}\n",
        report.period.start.format("%Y-%m-%d %H:%M:%S UTC"),
        report.period.end.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!(
        "**Generated:** {}\n\n",
        report.period.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    output.push_str("## Summary\n\n");
    output.push_str("| Metric | Value |\n");
    output.push_str("|--------|-------|\n");
    output.push_str(&format!("| Total Accesses | {} |\n", summary.total_accesses));
    output.push_str(&format!("| Unique Actors | {} |\n", summary.unique_actors));
    output.push_str(&format!("| Emergency Accesses | {} |\n", summary.emergency_access_count));
    output.push_str(&format!(
        "| Risk Score | {} ({}) |\n\n",
        compliance.risk_score.score,
        compliance.risk_score.level.as_str()
    ));

    output.push_str("## Controls\n\n");
    output.push_str("| Control | Score | Rating | Violations |\n");
    output.push_str("|---------|-------|--------|------------|\n");
    for score in &compliance.control_scores {
        output.push_str(&format!(
            "| {} | {:.1} | {} | {} |\n",
            score.control.as_str(),
            score.score,
            score.rating.as_str(),
            score.violations
        ));
    }

    if !report.suspicious_patterns.is_empty() {
        output.push_str("\n## Suspicious Patterns\n\n");
        for pattern in &report.suspicious_patterns {
            output.push_str(&format!(
                "- **{}** `{}`: {}\n",
                pattern.kind.as_str(),
                pattern.actor_id,
                pattern.description
            ));
        }
    }

    if !report.recommendations.is_empty() {
        output.push_str("\n## Recommendations\n\n");
        for rec in &report.recommendations {
            output.push_str(&format!("- {}\n", rec));
        }
    }

    output
}
