//! Compliance analyzer
//!
//! Reads a window of the audit trail back from the store and derives
//! summary statistics, per-control scores, an aggregate risk score and
//! suspicious access patterns. Reports are computed on demand and never
//! stored as a source of truth.

pub mod analyzer;
pub mod export;
pub mod patterns;

pub use analyzer::{build_report, ComplianceAnalyzer, ReportOptions};
pub use export::{export_report, ExportFormat};
pub use patterns::detect_suspicious_patterns;
