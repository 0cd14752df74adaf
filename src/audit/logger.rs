use chrono::{DateTime, Utc};
use ring::rand::SystemRandom;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use super::{device, session};
use crate::adapters::AuditStore;
use crate::clock::SharedClock;
use crate::models::{
    generate_id, AccessAction, AccessMethod, Actor, AuditLogEntry, AuditType, ComplianceControl,
    EncryptionError, KeyManager, RetentionPolicy, SecuritySeverity, Sensitivity,
};

/// Location recorded when the client did not report one
pub const UNKNOWN_LOCATION: &str = "unknown";

/// Proof that an entry reached the audit store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReceipt {
    pub entry_id: String,
    pub audit_type: AuditType,
    pub session_id: String,
    pub retention_expires_at: DateTime<Utc>,
}

/// An entry that was built but could not be stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDropped {
    pub entry_id: String,
    pub audit_type: AuditType,
    pub actor_id: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Result of handing an entry to the audit store.
///
/// `Err` means the store rejected the entry; the calling operation carries
/// on regardless. Cryptographic failures never appear here, they are
/// returned as the outer error of the logging call.
pub type AuditOutcome = Result<AuditReceipt, AuditDropped>;

/// Plaintext analysis attributes stored beside the encrypted details
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryAttributes {
    pub resource_id: Option<String>,
    pub patient_id: Option<String>,
    pub severity: Option<SecuritySeverity>,
    pub control: Option<ComplianceControl>,
    pub sensitivity: Option<Sensitivity>,
    pub required_permission: Option<String>,
    pub emergency: bool,
}

/// What kind of record an access targeted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[default]
    Document,
    PatientRecord,
}

/// Extra context for `track_access`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessRequest {
    pub kind: ResourceKind,
    pub patient_id: Option<String>,
    pub sensitivity: Sensitivity,
    /// Permission the access needed; recorded for later review, never enforced
    pub required_permission: Option<String>,
    /// Break-glass access outside normal authorization
    pub emergency: bool,
    /// Free-form details merged into the encrypted payload
    pub extra: JsonValue,
}

/// Login lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginEvent {
    Success,
    Failure,
    Logout,
}

impl LoginEvent {
    fn audit_type(&self) -> AuditType {
        match self {
            LoginEvent::Success => AuditType::LoginSuccess,
            LoginEvent::Failure => AuditType::LoginFailure,
            LoginEvent::Logout => AuditType::Logout,
        }
    }
}

/// Builds attributed, encrypted audit entries and hands them to the store
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    keys: Arc<KeyManager>,
    clock: SharedClock,
    retention: RetentionPolicy,
    system_id: String,
    rng: SystemRandom,
    diagnostics: Option<UnboundedSender<AuditDropped>>,
}

impl AuditLogger {
    pub fn new(
        store: Arc<dyn AuditStore>,
        keys: Arc<KeyManager>,
        clock: SharedClock,
        system_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            keys,
            clock,
            retention: RetentionPolicy::default(),
            system_id: system_id.into(),
            rng: SystemRandom::new(),
            diagnostics: None,
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Forward every dropped entry to `sender`
    pub fn with_diagnostics(mut self, sender: UnboundedSender<AuditDropped>) -> Self {
        self.diagnostics = Some(sender);
        self
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Record an action with no extra analysis attributes
    pub async fn create_entry<T: Serialize + ?Sized>(
        &self,
        audit_type: AuditType,
        details: &T,
        actor: &Actor,
    ) -> Result<AuditOutcome, EncryptionError> {
        self.create_entry_with(audit_type, details, actor, EntryAttributes::default())
            .await
    }

    /// Record an action.
    ///
    /// Store failures come back as `Ok(Err(AuditDropped))`; encryption
    /// failures as `Err`.
    pub async fn create_entry_with<T: Serialize + ?Sized>(
        &self,
        audit_type: AuditType,
        details: &T,
        actor: &Actor,
        attributes: EntryAttributes,
    ) -> Result<AuditOutcome, EncryptionError> {
        let entry = self.build_entry(audit_type, details, actor, attributes)?;

        match self.store.append(&entry).await {
            Ok(()) => {
                tracing::debug!(
                    entry_id = %entry.id,
                    audit_type = %entry.audit_type,
                    actor_id = %entry.actor_id,
                    "Audit entry recorded"
                );
                Ok(Ok(AuditReceipt {
                    entry_id: entry.id,
                    audit_type: entry.audit_type,
                    session_id: entry.session_id,
                    retention_expires_at: entry.retention_expires_at,
                }))
            }
            Err(e) => {
                let dropped = AuditDropped {
                    entry_id: entry.id,
                    audit_type: entry.audit_type,
                    actor_id: entry.actor_id,
                    timestamp: entry.timestamp,
                    reason: e.to_string(),
                };
                tracing::warn!(
                    entry_id = %dropped.entry_id,
                    audit_type = %dropped.audit_type,
                    actor_id = %dropped.actor_id,
                    error = %e,
                    "Audit store rejected entry; continuing"
                );
                if let Some(sender) = &self.diagnostics {
                    // A closed receiver only means nobody is listening
                    let _ = sender.send(dropped.clone());
                }
                Ok(Err(dropped))
            }
        }
    }

    /// Record access to a document or patient record
    pub async fn track_access(
        &self,
        resource_id: &str,
        action: AccessAction,
        actor: &Actor,
        request: AccessRequest,
    ) -> Result<AuditOutcome, EncryptionError> {
        let audit_type = access_type(action, request.kind, request.emergency);
        let details = json!({
            "resource_id": resource_id,
            "resource_kind": request.kind,
            "action": action.as_str(),
            "sensitivity": request.sensitivity.as_str(),
            "required_permission": request.required_permission,
            "extra": request.extra,
        });

        let attributes = EntryAttributes {
            resource_id: Some(resource_id.to_string()),
            patient_id: request.patient_id,
            sensitivity: Some(request.sensitivity),
            required_permission: request.required_permission,
            emergency: request.emergency,
            ..Default::default()
        };

        self.create_entry_with(audit_type, &details, actor, attributes).await
    }

    /// Record a policy violation against a compliance control
    pub async fn record_violation<T: Serialize + ?Sized>(
        &self,
        control: ComplianceControl,
        severity: SecuritySeverity,
        details: &T,
        actor: &Actor,
    ) -> Result<AuditOutcome, EncryptionError> {
        if severity.is_high() {
            tracing::warn!(
                actor_id = %actor.id,
                control = control.as_str(),
                severity = severity.as_str(),
                "Policy violation recorded"
            );
        }

        let attributes = EntryAttributes {
            severity: Some(severity),
            control: Some(control),
            ..Default::default()
        };
        self.create_entry_with(AuditType::PolicyViolation, details, actor, attributes)
            .await
    }

    /// Record a login, failed login or logout
    pub async fn record_login(
        &self,
        event: LoginEvent,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<AuditOutcome, EncryptionError> {
        let details = json!({ "reason": reason });
        self.create_entry(event.audit_type(), &details, actor).await
    }

    /// Decrypt an entry's details
    pub fn read_details<T: DeserializeOwned>(&self, entry: &AuditLogEntry) -> Result<T, EncryptionError> {
        self.keys.decrypt(&entry.encrypted_details)
    }

    fn build_entry<T: Serialize + ?Sized>(
        &self,
        audit_type: AuditType,
        details: &T,
        actor: &Actor,
        attributes: EntryAttributes,
    ) -> Result<AuditLogEntry, EncryptionError> {
        let timestamp = self.clock.now();
        let client = &actor.client;
        let emergency = attributes.emergency || audit_type == AuditType::EmergencyAccess;

        let encrypted_details = self.keys.encrypt(details)?;
        let session_id = session::session_id(&self.rng, timestamp, client)?;

        Ok(AuditLogEntry {
            id: generate_id(),
            timestamp,
            audit_type,
            actor_id: actor.id.clone(),
            actor_role: actor.role.clone(),
            encrypted_details,
            session_id,
            ip_address: client.ip_address.clone(),
            ip_valid: session::ip_is_valid(client.ip_address.as_deref()),
            device_info: device::classify(client.user_agent.as_deref()),
            access_location: client
                .access_location
                .clone()
                .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
            access_method: client.access_method.clone().unwrap_or(AccessMethod::Web),
            is_emergency_access: emergency,
            retention_expires_at: self.retention.expires_at(audit_type, emergency, timestamp),
            system_id: self.system_id.clone(),
            resource_id: attributes.resource_id,
            patient_id: attributes.patient_id,
            severity: attributes.severity,
            control: attributes.control,
            sensitivity: attributes.sensitivity,
            required_permission: attributes.required_permission,
        })
    }
}

fn access_type(action: AccessAction, kind: ResourceKind, emergency: bool) -> AuditType {
    if emergency {
        return AuditType::EmergencyAccess;
    }

    match (kind, action) {
        (ResourceKind::PatientRecord, AccessAction::View | AccessAction::Download | AccessAction::Share) => {
            AuditType::PatientRecordAccess
        }
        (ResourceKind::PatientRecord, _) => AuditType::PatientRecordModify,
        (ResourceKind::Document, AccessAction::View) => AuditType::DocumentAccess,
        (ResourceKind::Document, AccessAction::Download) => AuditType::DocumentDownload,
        (ResourceKind::Document, AccessAction::Upload) => AuditType::DocumentUpload,
        (ResourceKind::Document, AccessAction::Delete) => AuditType::DocumentDelete,
        (ResourceKind::Document, AccessAction::Modify) => AuditType::DocumentModify,
        (ResourceKind::Document, AccessAction::Share) => AuditType::DocumentShare,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::tests::UnavailableAuditStore;
    use crate::adapters::{AuditQuery, InMemoryAuditStore};
    use crate::clock::FixedClock;
    use crate::models::{ClientContext, Role};
    use chrono::TimeZone;
    use tokio::sync::mpsc;

    const TEST_ITERATIONS: u32 = 1000;

    fn keys() -> Arc<KeyManager> {
        Arc::new(KeyManager::single("audit-secret", b"audit-salt", TEST_ITERATIONS).unwrap())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 13, 45, 0).unwrap()
    }

    fn logger(store: Arc<dyn AuditStore>) -> AuditLogger {
        AuditLogger::new(store, keys(), Arc::new(FixedClock::new(t0())), "portal-test")
    }

    fn nurse() -> Actor {
        Actor::new("nurse-7", Role::Nurse).with_client(ClientContext {
            ip_address: Some("192.168.10.4".to_string()),
            user_agent: Some(
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1"
                    .to_string(),
            ),
            access_location: Some("ward-3".to_string()),
            access_method: Some(AccessMethod::Mobile),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_create_entry_populates_attribution() {
        let store = InMemoryAuditStore::new();
        let logger = logger(Arc::new(store.clone()));

        let outcome = logger
            .create_entry(AuditType::ConsentAccepted, &json!({"form": "npp-2024"}), &nurse())
            .await
            .unwrap();
        let receipt = outcome.unwrap();

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.id, receipt.entry_id);
        assert_eq!(entry.timestamp, t0());
        assert_eq!(entry.actor_role, Role::Nurse);
        assert!(entry.ip_valid);
        assert!(entry.device_info.mobile);
        assert_eq!(entry.device_info.os, "ios");
        assert_eq!(entry.access_location, "ward-3");
        assert_eq!(entry.access_method, AccessMethod::Mobile);
        assert_eq!(entry.system_id, "portal-test");
        assert_eq!(entry.retention_expires_at, Utc.with_ymd_and_hms(2030, 5, 17, 13, 45, 0).unwrap());
        assert!(!entry.encrypted_details.contains("npp-2024"));

        let details: JsonValue = logger.read_details(entry).unwrap();
        assert_eq!(details["form"], "npp-2024");
    }

    #[tokio::test]
    async fn test_violation_keeps_ten_years() {
        let store = InMemoryAuditStore::new();
        let logger = logger(Arc::new(store.clone()));

        let receipt = logger
            .record_violation(
                ComplianceControl::AccessControl,
                SecuritySeverity::High,
                &json!({"rule": "minimum_necessary"}),
                &nurse(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(receipt.retention_expires_at, Utc.with_ymd_and_hms(2034, 5, 17, 13, 45, 0).unwrap());
        let entry = &store.entries()[0];
        assert!(entry.is_high_severity_violation());
        assert_eq!(entry.control, Some(ComplianceControl::AccessControl));
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed_and_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let logger = logger(Arc::new(UnavailableAuditStore)).with_diagnostics(tx);

        let outcome = logger
            .create_entry(AuditType::DocumentAccess, &json!({"doc": "lab-1"}), &nurse())
            .await
            .expect("store failure must not surface as an error");

        let dropped = outcome.unwrap_err();
        assert_eq!(dropped.audit_type, AuditType::DocumentAccess);
        assert!(dropped.reason.contains("offline"));
        assert_eq!(rx.recv().await, Some(dropped));
    }

    #[tokio::test]
    async fn test_encryption_failure_propagates() {
        let store = InMemoryAuditStore::new();
        let logger = logger(Arc::new(store.clone()));

        let mut bad = std::collections::HashMap::new();
        bad.insert(vec![1u8], "non-string keys cannot be JSON");

        let result = logger.create_entry(AuditType::DocumentAccess, &bad, &nurse()).await;
        assert!(matches!(result, Err(EncryptionError::SerializationError { .. })));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_track_access_types_and_attributes() {
        let store = InMemoryAuditStore::new();
        let logger = logger(Arc::new(store.clone()));

        logger
            .track_access(
                "chart-12",
                AccessAction::View,
                &nurse(),
                AccessRequest {
                    kind: ResourceKind::PatientRecord,
                    patient_id: Some("patient-12".to_string()),
                    sensitivity: Sensitivity::Restricted,
                    required_permission: Some("chart:read".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        logger
            .track_access("report.pdf", AccessAction::Download, &nurse(), AccessRequest::default())
            .await
            .unwrap()
            .unwrap();

        let entries = store.entries();
        assert_eq!(entries[0].audit_type, AuditType::PatientRecordAccess);
        assert_eq!(entries[0].patient_id.as_deref(), Some("patient-12"));
        assert_eq!(entries[0].sensitivity, Some(Sensitivity::Restricted));
        assert_eq!(entries[0].required_permission.as_deref(), Some("chart:read"));
        assert_eq!(entries[1].audit_type, AuditType::DocumentDownload);
        assert_eq!(entries[1].resource_id.as_deref(), Some("report.pdf"));
    }

    #[tokio::test]
    async fn test_emergency_access_is_flagged() {
        let store = InMemoryAuditStore::new();
        let logger = logger(Arc::new(store.clone()));

        logger
            .track_access(
                "chart-9",
                AccessAction::View,
                &nurse(),
                AccessRequest {
                    kind: ResourceKind::PatientRecord,
                    emergency: true,
                    extra: json!({"justification": "code blue"}),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        let entry = &store.entries()[0];
        assert_eq!(entry.audit_type, AuditType::EmergencyAccess);
        assert!(entry.is_emergency_access);
        assert_eq!(entry.retention_expires_at, Utc.with_ymd_and_hms(2034, 5, 17, 13, 45, 0).unwrap());
    }

    #[tokio::test]
    async fn test_record_login_events() {
        let store = InMemoryAuditStore::new();
        let logger = logger(Arc::new(store.clone()));
        let actor = Actor::new("dr-house", Role::Provider);

        logger.record_login(LoginEvent::Failure, &actor, Some("bad password")).await.unwrap().unwrap();
        logger.record_login(LoginEvent::Success, &actor, None).await.unwrap().unwrap();

        let failures = store
            .query(&AuditQuery::default().with_types(vec![AuditType::LoginFailure]))
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].access_location, UNKNOWN_LOCATION);
        assert!(!failures[0].ip_valid);
    }
}
