use serde::{Deserialize, Serialize};
use chrono::{DateTime, Months, Utc};
use std::fmt;

use crate::models::actor::{AccessMethod, Role};

/// Kinds of auditable activity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AuditType {
    DocumentAccess,
    DocumentDownload,
    DocumentUpload,
    DocumentDelete,
    DocumentModify,
    DocumentShare,
    ConsentAccepted,
    ConsentRevoked,
    PolicyViolation,
    LoginSuccess,
    LoginFailure,
    Logout,
    BaaCreated,
    BaaUpdated,
    BaaTerminated,
    PatientRecordAccess,
    PatientRecordModify,
    EmergencyAccess,
}

impl AuditType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditType::DocumentAccess => "document_access",
            AuditType::DocumentDownload => "document_download",
            AuditType::DocumentUpload => "document_upload",
            AuditType::DocumentDelete => "document_delete",
            AuditType::DocumentModify => "document_modify",
            AuditType::DocumentShare => "document_share",
            AuditType::ConsentAccepted => "consent_accepted",
            AuditType::ConsentRevoked => "consent_revoked",
            AuditType::PolicyViolation => "policy_violation",
            AuditType::LoginSuccess => "login_success",
            AuditType::LoginFailure => "login_failure",
            AuditType::Logout => "logout",
            AuditType::BaaCreated => "baa_created",
            AuditType::BaaUpdated => "baa_updated",
            AuditType::BaaTerminated => "baa_terminated",
            AuditType::PatientRecordAccess => "patient_record_access",
            AuditType::PatientRecordModify => "patient_record_modify",
            AuditType::EmergencyAccess => "emergency_access",
        }
    }

    /// Business Associate Agreement lifecycle events
    pub fn is_agreement_event(&self) -> bool {
        matches!(self, AuditType::BaaCreated | AuditType::BaaUpdated | AuditType::BaaTerminated)
    }
}

impl fmt::Display for AuditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Security event severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SecuritySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SecuritySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecuritySeverity::Low => "low",
            SecuritySeverity::Medium => "medium",
            SecuritySeverity::High => "high",
            SecuritySeverity::Critical => "critical",
        }
    }

    /// Severities that weigh on the aggregate risk score
    pub fn is_high(&self) -> bool {
        matches!(self, SecuritySeverity::High | SecuritySeverity::Critical)
    }
}

/// HIPAA technical safeguard a violation is attributed to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceControl {
    AccessControl,
    AuditLogging,
    DataIntegrity,
    TransmissionSecurity,
}

impl ComplianceControl {
    pub const ALL: [ComplianceControl; 4] = [
        ComplianceControl::AccessControl,
        ComplianceControl::AuditLogging,
        ComplianceControl::DataIntegrity,
        ComplianceControl::TransmissionSecurity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceControl::AccessControl => "access_control",
            ComplianceControl::AuditLogging => "audit_logging",
            ComplianceControl::DataIntegrity => "data_integrity",
            ComplianceControl::TransmissionSecurity => "transmission_security",
        }
    }
}

/// Data sensitivity of an accessed resource
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Public,
    Internal,
    #[default]
    Confidential,
    Restricted,
}

impl Sensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::Public => "public",
            Sensitivity::Internal => "internal",
            Sensitivity::Confidential => "confidential",
            Sensitivity::Restricted => "restricted",
        }
    }
}

/// Operation performed on a tracked resource
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    View,
    Download,
    Upload,
    Delete,
    Modify,
    Share,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::View => "view",
            AccessAction::Download => "download",
            AccessAction::Upload => "upload",
            AccessAction::Delete => "delete",
            AccessAction::Modify => "modify",
            AccessAction::Share => "share",
        }
    }
}

/// Coarse device classification derived from the client signature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    pub browser: String,
    pub os: String,
    pub mobile: bool,
}

impl DeviceInfo {
    pub fn unknown() -> Self {
        Self {
            browser: "unknown".to_string(),
            os: "unknown".to_string(),
            mobile: false,
        }
    }
}

/// Minimum retention for audit records, in years.
///
/// Defaults follow HIPAA documentation rules: six years for ordinary
/// records, seven for agreement records, ten for violations and emergency
/// access.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetentionPolicy {
    pub default_years: u32,
    pub agreement_years: u32,
    pub extended_years: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            default_years: 6,
            agreement_years: 7,
            extended_years: 10,
        }
    }
}

impl RetentionPolicy {
    /// Retention period for an entry type
    pub fn years_for(&self, audit_type: AuditType, emergency: bool) -> u32 {
        if emergency || matches!(audit_type, AuditType::PolicyViolation | AuditType::EmergencyAccess) {
            self.extended_years
        } else if audit_type.is_agreement_event() {
            self.agreement_years
        } else {
            self.default_years
        }
    }

    /// Calendar date before which an entry must not be deleted.
    ///
    /// Years are added as calendar months, so Feb 29 maps to Feb 28 in a
    /// non-leap target year. Periods past the representable range saturate.
    pub fn expires_at(&self, audit_type: AuditType, emergency: bool, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let years = self.years_for(audit_type, emergency);
        years
            .checked_mul(12)
            .and_then(|months| timestamp.checked_add_months(Months::new(months)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Immutable record of one significant action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    /// Unique identifier for this audit entry
    pub id: String,

    /// When the action occurred
    pub timestamp: DateTime<Utc>,

    /// Kind of action
    #[serde(rename = "type")]
    pub audit_type: AuditType,

    /// User who performed the action
    pub actor_id: String,

    pub actor_role: Role,

    /// Action details, encrypted with the key manager
    pub encrypted_details: String,

    /// Timestamp + randomness + client fingerprint
    pub session_id: String,

    pub ip_address: Option<String>,

    /// Whether `ip_address` is syntactically valid (not whether it is trusted)
    pub ip_valid: bool,

    pub device_info: DeviceInfo,

    pub access_location: String,

    pub access_method: AccessMethod,

    pub is_emergency_access: bool,

    /// Earliest instant at which deletion is permitted
    pub retention_expires_at: DateTime<Utc>,

    /// Identifier of the deployment that produced the entry
    pub system_id: String,

    /// Document or record identifier, when the action targeted one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Patient whose data was touched, for access-pattern analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,

    /// Severity of a policy violation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<SecuritySeverity>,

    /// Control a policy violation concerns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<ComplianceControl>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<Sensitivity>,

    /// Permission the access required (recorded, not enforced)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_permission: Option<String>,
}

impl AuditLogEntry {
    pub fn is_violation(&self) -> bool {
        self.audit_type == AuditType::PolicyViolation
    }

    pub fn is_failed_login(&self) -> bool {
        self.audit_type == AuditType::LoginFailure
    }

    /// Violations with high or critical severity
    pub fn is_high_severity_violation(&self) -> bool {
        self.is_violation() && self.severity.map(|s| s.is_high()).unwrap_or(false)
    }
}
