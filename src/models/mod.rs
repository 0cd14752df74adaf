//! Data models for the compliance core
//!
//! This module contains the data structures shared by the audit logger,
//! agreement lifecycle manager and compliance analyzer.
//!
//! All persisted models are:
//! - Serializable with serde (snake_case on the wire)
//! - Attributed to an `Actor`
//! - Encrypted where they carry PHI or contract terms

pub mod actor;
pub mod agreement;
pub mod audit;
pub mod compliance;
pub mod encryption;
pub mod validation;

// Re-export main types for convenience
pub use actor::{AccessMethod, Actor, ClientContext, Role};
pub use agreement::{
    AgreementDiff, AgreementSnapshot, AgreementStatus, Associate, BusinessAssociateAgreement,
    RevisionRecord,
};
pub use audit::{
    AccessAction, AuditLogEntry, AuditType, ComplianceControl, DeviceInfo, RetentionPolicy,
    SecuritySeverity, Sensitivity,
};
pub use compliance::{
    ComplianceReport, ComplianceSection, ControlRating, ControlScore, PatternKind, ReportPeriod,
    ReportSummary, RiskInputs, RiskLevel, RiskScore, SuspiciousPattern, ViolationRecord,
};
pub use encryption::{EncryptedPayload, EncryptionError, KeyManager};
pub use validation::{ValidationError, Validators};

use uuid::Uuid;

/// Generate a new UUID for model IDs
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
