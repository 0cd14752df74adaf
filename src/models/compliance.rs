//! Compliance report structures and scoring rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::audit::{ComplianceControl, SecuritySeverity};

/// Rating bucket for a per-control score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControlRating {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ControlRating {
    pub fn from_score(score: f64) -> Self {
        if score > 95.0 {
            ControlRating::Excellent
        } else if score > 85.0 {
            ControlRating::Good
        } else if score > 70.0 {
            ControlRating::Fair
        } else {
            ControlRating::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlRating::Excellent => "excellent",
            ControlRating::Good => "good",
            ControlRating::Fair => "fair",
            ControlRating::Poor => "poor",
        }
    }
}

/// Score for one compliance control
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlScore {
    pub control: ComplianceControl,
    /// 0.0 to 100.0
    pub score: f64,
    pub rating: ControlRating,
    pub violations: u64,
}

impl ControlScore {
    /// `max(0, 100 - violations / total * 100)`; an empty window scores 100
    pub fn compute(control: ComplianceControl, violations: u64, total: u64) -> Self {
        let score = if total == 0 {
            100.0
        } else {
            (100.0 - (violations as f64 / total as f64) * 100.0).max(0.0)
        };

        Self {
            control,
            score,
            rating: ControlRating::from_score(score),
            violations,
        }
    }
}

/// Aggregate risk bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        if score < 20 {
            RiskLevel::Low
        } else if score < 50 {
            RiskLevel::Medium
        } else if score < 80 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Counts feeding the aggregate risk score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RiskInputs {
    pub high_severity_violations: u64,
    pub emergency_accesses: u64,
    pub failed_logins: u64,
}

/// Aggregate risk score, capped at 100
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskScore {
    pub score: u32,
    pub level: RiskLevel,
    pub inputs: RiskInputs,
}

impl RiskScore {
    pub const MAX: u32 = 100;

    /// `min(100, high×10 + emergency×5 + failed_logins×2)`, saturating
    pub fn compute(inputs: RiskInputs) -> Self {
        let raw = inputs
            .high_severity_violations
            .saturating_mul(10)
            .saturating_add(inputs.emergency_accesses.saturating_mul(5))
            .saturating_add(inputs.failed_logins.saturating_mul(2));
        let score = raw.min(u64::from(Self::MAX)) as u32;

        Self {
            score,
            level: RiskLevel::from_score(score),
            inputs,
        }
    }
}

/// Reporting window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

/// Access statistics over the window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReportSummary {
    pub total_accesses: u64,
    pub unique_actors: u64,
    pub access_type_counts: BTreeMap<String, u64>,
    pub access_by_role: BTreeMap<String, u64>,
    pub access_by_location: BTreeMap<String, u64>,
    pub emergency_access_count: u64,
    /// Keyed by "mobile"/"desktop", "browser:<name>" and "os:<name>"
    pub device_breakdown: BTreeMap<String, u64>,
}

/// A policy violation surfaced in a report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViolationRecord {
    pub entry_id: String,
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub severity: Option<SecuritySeverity>,
    pub control: ComplianceControl,
}

/// Compliance findings over the window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceSection {
    pub violations: Vec<ViolationRecord>,
    /// Violation counts keyed by control name
    pub violations_by_type: BTreeMap<String, u64>,
    pub control_scores: Vec<ControlScore>,
    pub risk_score: RiskScore,
}

/// Heuristic anomaly kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    OffHoursAccess,
    RapidPatientAccess,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::OffHoursAccess => "off_hours_access",
            PatternKind::RapidPatientAccess => "rapid_patient_access",
        }
    }
}

/// A flagged access pattern for one actor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuspiciousPattern {
    pub kind: PatternKind,
    pub actor_id: String,
    /// Off-hours entries, or distinct patients in the window
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub severity: SecuritySeverity,
    pub description: String,
}

/// Derived, read-only compliance report; recomputed per request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceReport {
    pub period: ReportPeriod,
    pub summary: ReportSummary,
    pub compliance: ComplianceSection,
    pub suspicious_patterns: Vec<SuspiciousPattern>,
    pub recommendations: Vec<String>,
}
