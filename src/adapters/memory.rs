//! In-memory adapters (not persistent, for tests and embedding)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

use super::{
    AgreementStore, AuditQuery, AuditStore, Notification, NotificationDispatcher, StoreError,
};
use crate::models::{AgreementSnapshot, AuditLogEntry, BusinessAssociateAgreement};

/// Audit trail held in a vector, append order preserved
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditStore {
    entries: Arc<Mutex<Vec<AuditLogEntry>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing entries
    pub fn with_entries(entries: Vec<AuditLogEntry>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored entry
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.push(entry.clone());
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let mut matched: Vec<AuditLogEntry> = entries.iter().filter(|e| query.matches(e)).cloned().collect();
        matched.sort_by_key(|e| e.timestamp);
        Ok(matched)
    }
}

#[derive(Debug, Default)]
struct AgreementTables {
    current: HashMap<String, BusinessAssociateAgreement>,
    snapshots: HashMap<String, Vec<AgreementSnapshot>>,
}

impl AgreementTables {
    fn record_snapshot(&mut self, agreement: &BusinessAssociateAgreement) {
        let taken_at = agreement
            .revision_history
            .last()
            .map(|r| r.timestamp)
            .unwrap_or(agreement.effective_date);
        self.snapshots
            .entry(agreement.id.clone())
            .or_default()
            .push(agreement.snapshot(taken_at));
    }
}

/// Agreement store keeping every persisted version as a snapshot
#[derive(Debug, Clone, Default)]
pub struct InMemoryAgreementStore {
    tables: Arc<RwLock<AgreementTables>>,
}

impl InMemoryAgreementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.current.len()
    }
}

#[async_trait]
impl AgreementStore for InMemoryAgreementStore {
    async fn insert(&self, agreement: &BusinessAssociateAgreement) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.current.contains_key(&agreement.id) {
            return Err(StoreError::AlreadyExists { id: agreement.id.clone() });
        }
        tables.current.insert(agreement.id.clone(), agreement.clone());
        tables.record_snapshot(agreement);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<BusinessAssociateAgreement>, StoreError> {
        Ok(self.tables.read().await.current.get(id).cloned())
    }

    async fn update(&self, agreement: &BusinessAssociateAgreement) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.current.contains_key(&agreement.id) {
            return Err(StoreError::NotFound { id: agreement.id.clone() });
        }
        tables.current.insert(agreement.id.clone(), agreement.clone());
        tables.record_snapshot(agreement);
        Ok(())
    }

    async fn expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BusinessAssociateAgreement>, StoreError> {
        let tables = self.tables.read().await;
        let mut expiring: Vec<BusinessAssociateAgreement> = tables
            .current
            .values()
            .filter(|a| a.expiration_date >= from && a.expiration_date <= to)
            .cloned()
            .collect();
        expiring.sort_by_key(|a| a.expiration_date);
        Ok(expiring)
    }

    async fn snapshots(&self, id: &str) -> Result<Vec<AgreementSnapshot>, StoreError> {
        Ok(self.tables.read().await.snapshots.get(id).cloned().unwrap_or_default())
    }
}

/// Dispatcher that keeps every notification it is handed
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn dispatch(&self, notification: &Notification) -> Result<(), StoreError> {
        let mut sent = self.sent.lock().map_err(|_| StoreError::Poisoned)?;
        sent.push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{
        AccessMethod, AgreementStatus, AuditType, DeviceInfo, RetentionPolicy, RevisionRecord, Role,
        Actor,
    };
    use chrono::{Duration, TimeZone};

    /// Minimal entry for store and analyzer tests
    pub(crate) fn sample_entry(actor: &str, audit_type: AuditType, timestamp: DateTime<Utc>) -> AuditLogEntry {
        AuditLogEntry {
            id: crate::models::generate_id(),
            timestamp,
            audit_type,
            actor_id: actor.to_string(),
            actor_role: Role::Nurse,
            encrypted_details: String::new(),
            session_id: "session".to_string(),
            ip_address: None,
            ip_valid: false,
            device_info: DeviceInfo::unknown(),
            access_location: "unknown".to_string(),
            access_method: AccessMethod::Web,
            is_emergency_access: false,
            retention_expires_at: RetentionPolicy::default().expires_at(audit_type, false, timestamp),
            system_id: "test".to_string(),
            resource_id: None,
            patient_id: None,
            severity: None,
            control: None,
            sensitivity: None,
            required_permission: None,
        }
    }

    /// Audit store that rejects every write
    pub(crate) struct UnavailableAuditStore;

    #[async_trait]
    impl AuditStore for UnavailableAuditStore {
        async fn append(&self, _entry: &AuditLogEntry) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("audit database offline".to_string()))
        }

        async fn query(&self, _query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError> {
            Err(StoreError::Unavailable("audit database offline".to_string()))
        }
    }

    fn agreement(id: &str, expiration: DateTime<Utc>) -> BusinessAssociateAgreement {
        let admin = Actor::new("admin", Role::Admin);
        BusinessAssociateAgreement {
            id: id.to_string(),
            associate_id: "BA1".to_string(),
            associate_name: "Acme".to_string(),
            effective_date: expiration - Duration::days(365),
            expiration_date: expiration,
            status: AgreementStatus::Pending,
            encrypted_terms: "1:abc".to_string(),
            version: 1,
            revision_history: vec![RevisionRecord::new(&admin, "created", expiration - Duration::days(365))],
        }
    }

    #[tokio::test]
    async fn test_audit_store_append_and_query() {
        let store = InMemoryAuditStore::new();
        let t = Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap();

        store.append(&sample_entry("u1", AuditType::LoginSuccess, t + Duration::hours(1))).await.unwrap();
        store.append(&sample_entry("u1", AuditType::Logout, t)).await.unwrap();
        store.append(&sample_entry("u2", AuditType::Logout, t)).await.unwrap();

        let all = store.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].timestamp <= all[2].timestamp);

        let u1 = store.query(&AuditQuery::default().for_actor("u1")).await.unwrap();
        assert_eq!(u1.len(), 2);
        assert_eq!(u1[0].audit_type, AuditType::Logout);
    }

    #[tokio::test]
    async fn test_agreement_store_rejects_duplicates_and_unknown_updates() {
        let store = InMemoryAgreementStore::new();
        let expiry = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let baa = agreement("baa-1", expiry);

        store.insert(&baa).await.unwrap();
        assert!(matches!(store.insert(&baa).await, Err(StoreError::AlreadyExists { .. })));

        let ghost = agreement("baa-404", expiry);
        assert!(matches!(store.update(&ghost).await, Err(StoreError::NotFound { .. })));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_agreement_store_snapshots_every_version() {
        let store = InMemoryAgreementStore::new();
        let expiry = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut baa = agreement("baa-1", expiry);
        store.insert(&baa).await.unwrap();

        let admin = Actor::new("admin", Role::Admin);
        let revision = RevisionRecord::new(&admin, "status_changed", expiry - Duration::days(300))
            .with_transition(AgreementStatus::Pending, AgreementStatus::Active);
        baa.apply_transition(AgreementStatus::Active, revision);
        store.update(&baa).await.unwrap();

        let snapshots = store.snapshots("baa-1").await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].status, AgreementStatus::Pending);
        assert_eq!(snapshots[1].version, 2);
        assert!(store.snapshots("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expiring_between() {
        let store = InMemoryAgreementStore::new();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        store.insert(&agreement("soon", now + Duration::days(10))).await.unwrap();
        store.insert(&agreement("later", now + Duration::days(90))).await.unwrap();
        store.insert(&agreement("past", now - Duration::days(1))).await.unwrap();

        let expiring = store.expiring_between(now, now + Duration::days(30)).await.unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].id, "soon");
    }

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        let notification = Notification::AgreementExpiration {
            associate_id: "BA1".to_string(),
            agreement_id: "baa-1".to_string(),
            expiration_date: Utc::now(),
        };
        notifier.dispatch(&notification).await.unwrap();
        assert_eq!(notifier.sent(), vec![notification]);
    }
}
