use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use super::patterns::detect_suspicious_patterns;
use crate::adapters::{AuditQuery, AuditStore};
use crate::cache::{BoundedCache, CacheStats};
use crate::clock::SharedClock;
use crate::configuration::{PatternThresholds, ReportConfig};
use crate::error::{ComplianceError, Result};
use crate::models::{
    AuditLogEntry, ComplianceControl, ComplianceReport, ComplianceSection, ControlRating, ControlScore,
    ReportPeriod, ReportSummary, RiskInputs, RiskScore, Validators, ViolationRecord,
};

/// Filters applied when building a report
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportOptions {
    /// Restrict the report to one actor
    pub actor_id: Option<String>,
    /// Run suspicious-pattern detection
    pub detect_patterns: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            actor_id: None,
            detect_patterns: true,
        }
    }
}

type ReportKey = (DateTime<Utc>, DateTime<Utc>, ReportOptions);

/// Builds compliance reports from the audit trail
pub struct ComplianceAnalyzer {
    store: Arc<dyn AuditStore>,
    clock: SharedClock,
    thresholds: PatternThresholds,
    config: ReportConfig,
    reports: Mutex<BoundedCache<ReportKey, ComplianceReport>>,
}

impl ComplianceAnalyzer {
    pub fn new(store: Arc<dyn AuditStore>, clock: SharedClock) -> Self {
        let config = ReportConfig::default();
        Self {
            store,
            clock,
            thresholds: PatternThresholds::default(),
            reports: Mutex::new(BoundedCache::new(config.cache_capacity)),
            config,
        }
    }

    pub fn with_thresholds(mut self, thresholds: PatternThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Replace report settings; resets the report cache
    pub fn with_report_config(mut self, config: ReportConfig) -> Self {
        self.reports = Mutex::new(BoundedCache::new(config.cache_capacity));
        self.config = config;
        self
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.reports.lock().map(|c| c.stats()).unwrap_or_default()
    }

    /// Report over `[start, end]`.
    ///
    /// Windows that closed before "now" cannot gain entries, so their
    /// reports are memoized. Open windows are always recomputed.
    pub async fn generate_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: ReportOptions,
    ) -> Result<ComplianceReport> {
        Validators::ordered_range(&start, &end, "end")?;

        let now = self.clock.now();
        let cacheable = end < now;
        let key: ReportKey = (start, end, options.clone());

        if cacheable {
            if let Some(report) = self.reports.lock().ok().and_then(|mut c| c.get(&key)) {
                tracing::debug!(start = %start, end = %end, "Serving cached compliance report");
                return Ok(report);
            }
        }

        let mut query = AuditQuery::between(start, end);
        query.actor_id = options.actor_id.clone();
        let entries = self.store.query(&query).await?;

        let period = ReportPeriod {
            start,
            end,
            generated_at: now,
        };
        let thresholds = self.thresholds.clone();
        let config = self.config.clone();
        let detect_patterns = options.detect_patterns;

        let report = tokio::task::spawn_blocking(move || {
            build_report(&entries, period, &thresholds, &config, detect_patterns)
        })
        .await
        .map_err(|e| ComplianceError::Computation(e.to_string()))?;

        tracing::info!(
            start = %start,
            end = %end,
            entries = report.summary.total_accesses,
            risk_score = report.compliance.risk_score.score,
            risk_level = report.compliance.risk_score.level.as_str(),
            "Compliance report generated"
        );

        if cacheable {
            if let Ok(mut cache) = self.reports.lock() {
                cache.insert(key, report.clone());
            }
        }

        Ok(report)
    }
}

/// Compute a report over already-fetched entries
pub fn build_report(
    entries: &[AuditLogEntry],
    period: ReportPeriod,
    thresholds: &PatternThresholds,
    config: &ReportConfig,
    detect_patterns: bool,
) -> ComplianceReport {
    let summary = summarize(entries);
    let compliance = assess(entries);
    let suspicious_patterns = if detect_patterns {
        detect_suspicious_patterns(entries, thresholds)
    } else {
        Vec::new()
    };

    let mut report = ComplianceReport {
        period,
        summary,
        compliance,
        suspicious_patterns,
        recommendations: Vec::new(),
    };
    report.recommendations = recommendations(&report, config);
    report
}

fn bump(map: &mut BTreeMap<String, u64>, key: impl Into<String>) {
    *map.entry(key.into()).or_insert(0) += 1;
}

fn summarize(entries: &[AuditLogEntry]) -> ReportSummary {
    let mut summary = ReportSummary {
        total_accesses: entries.len() as u64,
        ..Default::default()
    };
    let mut actors = BTreeSet::new();

    for entry in entries {
        actors.insert(entry.actor_id.as_str());
        bump(&mut summary.access_type_counts, entry.audit_type.as_str());
        bump(&mut summary.access_by_role, entry.actor_role.as_str());
        bump(&mut summary.access_by_location, entry.access_location.as_str());

        let device = &entry.device_info;
        bump(&mut summary.device_breakdown, if device.mobile { "mobile" } else { "desktop" });
        bump(&mut summary.device_breakdown, format!("browser:{}", device.browser));
        bump(&mut summary.device_breakdown, format!("os:{}", device.os));

        if entry.is_emergency_access {
            summary.emergency_access_count += 1;
        }
    }

    summary.unique_actors = actors.len() as u64;
    summary
}

fn assess(entries: &[AuditLogEntry]) -> ComplianceSection {
    let total = entries.len() as u64;
    let mut violations = Vec::new();
    let mut violations_by_type = BTreeMap::new();
    let mut inputs = RiskInputs::default();

    for entry in entries {
        if entry.is_violation() {
            // Violations recorded without a control count against access control
            let control = entry.control.unwrap_or(ComplianceControl::AccessControl);
            bump(&mut violations_by_type, control.as_str());
            violations.push(ViolationRecord {
                entry_id: entry.id.clone(),
                timestamp: entry.timestamp,
                actor_id: entry.actor_id.clone(),
                severity: entry.severity,
                control,
            });
        }
        if entry.is_high_severity_violation() {
            inputs.high_severity_violations += 1;
        }
        if entry.is_emergency_access {
            inputs.emergency_accesses += 1;
        }
        if entry.is_failed_login() {
            inputs.failed_logins += 1;
        }
    }

    let control_scores = ComplianceControl::ALL
        .iter()
        .map(|control| {
            let count = violations_by_type.get(control.as_str()).copied().unwrap_or(0);
            ControlScore::compute(*control, count, total)
        })
        .collect();

    ComplianceSection {
        violations,
        violations_by_type,
        control_scores,
        risk_score: RiskScore::compute(inputs),
    }
}

fn recommendations(report: &ComplianceReport, config: &ReportConfig) -> Vec<String> {
    let mut recommendations = Vec::new();
    let compliance = &report.compliance;

    if !compliance.violations.is_empty() {
        recommendations.push(format!(
            "Review {} policy violation(s), {} of them high severity, and document corrective action",
            compliance.violations.len(),
            compliance.risk_score.inputs.high_severity_violations
        ));
    }

    for score in &compliance.control_scores {
        if score.rating == ControlRating::Poor {
            recommendations.push(format!(
                "Control '{}' scored {:.1}; schedule a remediation review",
                score.control.as_str(),
                score.score
            ));
        }
    }

    if report.summary.emergency_access_count > 0 {
        recommendations.push(format!(
            "Verify documented justification for {} emergency access event(s)",
            report.summary.emergency_access_count
        ));
    }

    if compliance.risk_score.inputs.failed_logins > 0 {
        recommendations.push(format!(
            "Investigate {} failed login attempt(s) for credential misuse",
            compliance.risk_score.inputs.failed_logins
        ));
    }

    if report.summary.total_accesses > config.high_volume_threshold {
        recommendations.push(format!(
            "Access volume of {} exceeds {}; confirm access is limited to the minimum necessary",
            report.summary.total_accesses, config.high_volume_threshold
        ));
    }

    if !report.suspicious_patterns.is_empty() {
        recommendations.push(format!(
            "Follow up on {} suspicious access pattern(s) with the actors' supervisors",
            report.suspicious_patterns.len()
        ));
    }

    recommendations
}
