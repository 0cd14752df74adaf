use chrono::{DateTime, Duration, Months, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::adapters::{AgreementStore, Notification, NotificationDispatcher};
use crate::audit::{AccessRequest, AuditLogger, AuditOutcome, EntryAttributes};
use crate::clock::SharedClock;
use crate::configuration::AgreementConfig;
use crate::error::{ComplianceError, Result};
use crate::models::{
    generate_id, AccessAction, Actor, AgreementDiff, AgreementStatus, Associate, AuditType,
    BusinessAssociateAgreement, RevisionRecord, Sensitivity, ValidationError, Validators,
};

/// Longest associate name accepted
pub const MAX_ASSOCIATE_NAME: usize = 200;

/// Manages Business Associate Agreements through their lifecycle.
///
/// Every mutation runs validate, transition-check, persist, then audit, in
/// that order. The audit entry is written after the store accepted the
/// change, so a crash in between leaves the change unaudited.
pub struct AgreementManager {
    store: Arc<dyn AgreementStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    audit: Arc<AuditLogger>,
    clock: SharedClock,
    config: AgreementConfig,
}

impl AgreementManager {
    pub fn new(
        store: Arc<dyn AgreementStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        audit: Arc<AuditLogger>,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            notifier,
            audit,
            clock,
            config: AgreementConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AgreementConfig) -> Self {
        self.config = config;
        self
    }

    /// Create a Pending agreement effective now, running for the default term
    pub async fn create(
        &self,
        associate: &Associate,
        terms: &str,
        actor: &Actor,
    ) -> Result<BusinessAssociateAgreement> {
        self.create_with_schedule(associate, terms, None, None, actor).await
    }

    /// Create a Pending agreement with explicit dates
    pub async fn create_with_schedule(
        &self,
        associate: &Associate,
        terms: &str,
        effective_date: Option<DateTime<Utc>>,
        expiration_date: Option<DateTime<Utc>>,
        actor: &Actor,
    ) -> Result<BusinessAssociateAgreement> {
        Validators::not_empty(&associate.id, "associate_id")?;
        Validators::not_empty(&associate.name, "associate_name")?;
        Validators::string_length(&associate.name, "associate_name", None, Some(MAX_ASSOCIATE_NAME))?;
        Validators::not_empty(terms, "terms")?;

        let now = self.clock.now();
        let effective_date = effective_date.unwrap_or(now);
        let expiration_date = match expiration_date {
            Some(date) => date,
            None => self.default_expiration(effective_date),
        };
        Validators::ordered_range(&effective_date, &expiration_date, "expiration_date")?;

        self.require_admin(actor, "create agreements")?;

        let agreement = BusinessAssociateAgreement {
            id: generate_id(),
            associate_id: associate.id.clone(),
            associate_name: associate.name.clone(),
            effective_date,
            expiration_date,
            status: AgreementStatus::Pending,
            encrypted_terms: self.audit.keys().encrypt(terms)?,
            version: 1,
            revision_history: vec![RevisionRecord::new(actor, "created", now)],
        };

        self.store.insert(&agreement).await?;

        tracing::info!(
            agreement_id = %agreement.id,
            associate_id = %agreement.associate_id,
            actor_id = %actor.id,
            "Agreement created"
        );

        let details = json!({
            "agreement_id": agreement.id,
            "associate_id": agreement.associate_id,
            "associate_name": agreement.associate_name,
            "effective_date": agreement.effective_date,
            "expiration_date": agreement.expiration_date,
            "version": agreement.version,
        });
        let outcome = self
            .audit
            .create_entry_with(AuditType::BaaCreated, &details, actor, resource(&agreement))
            .await?;
        note_dropped(&agreement, outcome);

        Ok(agreement)
    }

    /// Move an agreement to `new_status`.
    ///
    /// Read-then-write with no version guard: two admins racing on the same
    /// agreement both read the same state, and the store keeps whichever
    /// write lands last.
    pub async fn update_status(
        &self,
        id: &str,
        new_status: AgreementStatus,
        actor: &Actor,
    ) -> Result<BusinessAssociateAgreement> {
        self.transition(id, new_status, None, actor, AuditType::BaaUpdated).await
    }

    /// End an agreement with a reason; allowed from any non-terminal status
    pub async fn terminate(
        &self,
        id: &str,
        reason: &str,
        actor: &Actor,
    ) -> Result<BusinessAssociateAgreement> {
        Validators::not_empty(reason, "reason")?;
        self.transition(
            id,
            AgreementStatus::Terminated,
            Some(reason.to_string()),
            actor,
            AuditType::BaaTerminated,
        )
        .await
    }

    /// Notify about every live agreement expiring within the notice window.
    ///
    /// A failed notification is logged and skipped; the rest still go out.
    pub async fn check_expirations(&self) -> Result<Vec<BusinessAssociateAgreement>> {
        let now = self.clock.now();
        let horizon = Duration::try_days(i64::from(self.config.expiration_notice_days))
            .and_then(|window| now.checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let expiring: Vec<BusinessAssociateAgreement> = self
            .store
            .expiring_between(now, horizon)
            .await?
            .into_iter()
            .filter(|a| !a.status.is_terminal())
            .collect();

        for agreement in &expiring {
            let notification = Notification::AgreementExpiration {
                associate_id: agreement.associate_id.clone(),
                agreement_id: agreement.id.clone(),
                expiration_date: agreement.expiration_date,
            };
            if let Err(e) = self.notifier.dispatch(&notification).await {
                tracing::warn!(
                    agreement_id = %agreement.id,
                    error = %e,
                    "Failed to dispatch expiration notice"
                );
            }
        }

        tracing::info!(count = expiring.len(), horizon = %horizon, "Expiration check complete");
        Ok(expiring)
    }

    pub async fn get(&self, id: &str) -> Result<BusinessAssociateAgreement> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ComplianceError::NotFound { id: id.to_string() })
    }

    /// Revision records, oldest first
    pub async fn revision_history(&self, id: &str) -> Result<Vec<RevisionRecord>> {
        Ok(self.get(id).await?.revision_history)
    }

    /// Compare two persisted versions of an agreement
    pub async fn diff_versions(&self, id: &str, from_version: u32, to_version: u32) -> Result<AgreementDiff> {
        if from_version >= to_version {
            return Err(ValidationError::OutOfRange {
                field: "to_version".to_string(),
                reason: format!("must be greater than from_version {}", from_version),
            }
            .into());
        }

        let agreement = self.get(id).await?;
        let snapshots = self.store.snapshots(id).await?;
        let find = |version: u32| {
            snapshots
                .iter()
                .find(|s| s.version == version)
                .ok_or_else(|| ComplianceError::NotFound { id: format!("{}@v{}", id, version) })
        };
        let from = find(from_version)?;
        let to = find(to_version)?;

        let keys = self.audit.keys();
        let terms_changed = if from.encrypted_terms == to.encrypted_terms {
            false
        } else {
            keys.decrypt::<String>(&from.encrypted_terms)? != keys.decrypt::<String>(&to.encrypted_terms)?
        };

        // revision_history[n] produced version n + 1
        let revisions = agreement
            .revision_history
            .iter()
            .skip(from_version as usize)
            .take((to_version - from_version) as usize)
            .cloned()
            .collect();

        Ok(AgreementDiff {
            agreement_id: id.to_string(),
            from_version,
            to_version,
            status_change: (from.status != to.status).then_some((from.status, to.status)),
            effective_date_changed: from.effective_date != to.effective_date,
            expiration_date_changed: from.expiration_date != to.expiration_date,
            terms_changed,
            revisions,
        })
    }

    /// Decrypt an agreement's terms; admin only, and the read is audited
    pub async fn read_terms(&self, id: &str, actor: &Actor) -> Result<String> {
        self.require_admin(actor, "read agreement terms")?;

        let agreement = self.get(id).await?;
        let terms: String = self.audit.keys().decrypt(&agreement.encrypted_terms)?;

        let request = AccessRequest {
            sensitivity: Sensitivity::Confidential,
            required_permission: Some("agreements:read_terms".to_string()),
            extra: json!({ "agreement_id": agreement.id, "version": agreement.version }),
            ..Default::default()
        };
        let outcome = self.audit.track_access(&agreement.id, AccessAction::View, actor, request).await?;
        note_dropped(&agreement, outcome);

        Ok(terms)
    }

    async fn transition(
        &self,
        id: &str,
        new_status: AgreementStatus,
        reason: Option<String>,
        actor: &Actor,
        audit_type: AuditType,
    ) -> Result<BusinessAssociateAgreement> {
        let mut agreement = self.get(id).await?;

        self.require_admin(actor, "change agreement status")?;

        if !agreement.status.can_transition_to(new_status) {
            return Err(ComplianceError::InvalidTransition {
                from: agreement.status,
                to: new_status,
            });
        }

        let action = if new_status == AgreementStatus::Terminated && reason.is_some() {
            "terminated"
        } else {
            "status_changed"
        };
        let revision = RevisionRecord::new(actor, action, self.clock.now())
            .with_transition(agreement.status, new_status)
            .with_reason(reason.clone());
        let previous = agreement.apply_transition(new_status, revision);

        self.store.update(&agreement).await?;

        tracing::info!(
            agreement_id = %agreement.id,
            from = %previous,
            to = %new_status,
            version = agreement.version,
            actor_id = %actor.id,
            "Agreement status changed"
        );

        let details = json!({
            "agreement_id": agreement.id,
            "associate_id": agreement.associate_id,
            "previous_status": previous,
            "new_status": new_status,
            "version": agreement.version,
            "reason": reason,
        });
        let outcome = self
            .audit
            .create_entry_with(audit_type, &details, actor, resource(&agreement))
            .await?;
        note_dropped(&agreement, outcome);

        Ok(agreement)
    }

    fn require_admin(&self, actor: &Actor, operation: &str) -> Result<()> {
        if actor.is_admin() {
            Ok(())
        } else {
            tracing::warn!(actor_id = %actor.id, role = %actor.role, operation, "Rejected non-admin agreement operation");
            Err(ComplianceError::unauthorized(actor, operation))
        }
    }

    fn default_expiration(&self, effective_date: DateTime<Utc>) -> DateTime<Utc> {
        effective_date
            .checked_add_months(Months::new(self.config.default_term_months))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

fn resource(agreement: &BusinessAssociateAgreement) -> EntryAttributes {
    EntryAttributes {
        resource_id: Some(agreement.id.clone()),
        ..Default::default()
    }
}

fn note_dropped(agreement: &BusinessAssociateAgreement, outcome: AuditOutcome) {
    if let Err(dropped) = outcome {
        tracing::debug!(
            agreement_id = %agreement.id,
            entry_id = %dropped.entry_id,
            "Agreement change kept without audit entry"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::tests::UnavailableAuditStore;
    use crate::adapters::{
        AuditQuery, AuditStore, InMemoryAgreementStore, InMemoryAuditStore, RecordingNotifier, StoreError,
    };
    use crate::clock::FixedClock;
    use crate::models::{AgreementSnapshot, KeyManager, Role};
    use async_trait::async_trait;
    use chrono::TimeZone;

    const TEST_ITERATIONS: u32 = 1000;
    const TERMS: &str = "Associate shall safeguard PHI per 45 CFR 164.504(e).";

    struct Harness {
        manager: AgreementManager,
        store: InMemoryAgreementStore,
        audit_store: InMemoryAuditStore,
        notifier: RecordingNotifier,
        clock: FixedClock,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn keys() -> Arc<KeyManager> {
        Arc::new(KeyManager::single("baa-secret", b"baa-salt", TEST_ITERATIONS).unwrap())
    }

    fn harness() -> Harness {
        let clock = FixedClock::new(t0());
        let store = InMemoryAgreementStore::new();
        let audit_store = InMemoryAuditStore::new();
        let notifier = RecordingNotifier::new();
        let audit = Arc::new(AuditLogger::new(
            Arc::new(audit_store.clone()),
            keys(),
            Arc::new(clock.clone()),
            "portal-test",
        ));
        let manager = AgreementManager::new(
            Arc::new(store.clone()),
            Arc::new(notifier.clone()),
            audit,
            Arc::new(clock.clone()),
        );
        Harness {
            manager,
            store,
            audit_store,
            notifier,
            clock,
        }
    }

    fn admin() -> Actor {
        Actor::new("admin-1", Role::Admin)
    }

    fn acme() -> Associate {
        Associate::new("BA1", "Acme Billing")
    }

    #[tokio::test]
    async fn test_agreement_lifecycle_end_to_end() {
        let h = harness();

        let created = h.manager.create(&acme(), TERMS, &admin()).await.unwrap();
        assert_eq!(created.status, AgreementStatus::Pending);
        assert_eq!(created.version, 1);
        assert_eq!(created.revision_history[0].action, "created");
        assert_eq!(created.expiration_date, Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());

        let active = h
            .manager
            .update_status(&created.id, AgreementStatus::Active, &admin())
            .await
            .unwrap();
        assert_eq!(active.status, AgreementStatus::Active);
        assert_eq!(active.version, 2);
        assert!(active.history_is_consistent());

        let nurse = Actor::new("nurse-1", Role::Nurse);
        let err = h
            .manager
            .update_status(&created.id, AgreementStatus::Expired, &nurse)
            .await
            .unwrap_err();
        assert!(matches!(err, ComplianceError::Authorization { .. }));
        assert_eq!(h.manager.get(&created.id).await.unwrap().status, AgreementStatus::Active);

        let types: Vec<AuditType> = h.audit_store.entries().iter().map(|e| e.audit_type).collect();
        assert_eq!(types, vec![AuditType::BaaCreated, AuditType::BaaUpdated]);

        let updated = &h.audit_store.entries()[1];
        let details: serde_json::Value = h.manager.audit.read_details(updated).unwrap();
        assert_eq!(details["previous_status"], "pending");
        assert_eq!(details["new_status"], "active");
        assert_eq!(details["version"], 2);
    }

    #[tokio::test]
    async fn test_create_validation_precedes_authorization() {
        let h = harness();
        let nurse = Actor::new("nurse-1", Role::Nurse);

        let err = h.manager.create(&Associate::new("BA1", " "), TERMS, &nurse).await.unwrap_err();
        assert!(matches!(err, ComplianceError::Validation(ValidationError::RequiredField(ref f)) if f == "associate_name"));

        let err = h.manager.create(&acme(), "", &admin()).await.unwrap_err();
        assert!(matches!(err, ComplianceError::Validation(_)));

        let err = h.manager.create(&acme(), TERMS, &nurse).await.unwrap_err();
        assert!(matches!(err, ComplianceError::Authorization { .. }));

        assert_eq!(h.store.len().await, 0);
        assert!(h.audit_store.is_empty());
    }

    #[tokio::test]
    async fn test_terms_are_encrypted_and_readable_by_admin() {
        let h = harness();
        let created = h.manager.create(&acme(), TERMS, &admin()).await.unwrap();
        assert!(!created.encrypted_terms.contains("PHI"));

        let billing = Actor::new("billing-1", Role::Billing);
        assert!(matches!(
            h.manager.read_terms(&created.id, &billing).await,
            Err(ComplianceError::Authorization { .. })
        ));

        assert_eq!(h.manager.read_terms(&created.id, &admin()).await.unwrap(), TERMS);

        let reads = h
            .audit_store
            .query(&AuditQuery::default().with_types(vec![AuditType::DocumentAccess]))
            .await
            .unwrap();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].resource_id.as_deref(), Some(created.id.as_str()));
    }

    #[tokio::test]
    async fn test_illegal_transitions_are_rejected() {
        let h = harness();
        let created = h.manager.create(&acme(), TERMS, &admin()).await.unwrap();

        let err = h
            .manager
            .update_status(&created.id, AgreementStatus::Expired, &admin())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ComplianceError::InvalidTransition { from: AgreementStatus::Pending, to: AgreementStatus::Expired }
        ));

        h.manager.terminate(&created.id, "vendor acquired", &admin()).await.unwrap();
        for next in [AgreementStatus::Active, AgreementStatus::Expired, AgreementStatus::Terminated] {
            assert!(h.manager.update_status(&created.id, next, &admin()).await.is_err());
        }

        let stored = h.manager.get(&created.id).await.unwrap();
        assert_eq!(stored.version, 2);
        assert!(stored.history_is_consistent());
    }

    #[tokio::test]
    async fn test_terminate_records_reason() {
        let h = harness();
        let created = h.manager.create(&acme(), TERMS, &admin()).await.unwrap();
        h.manager.update_status(&created.id, AgreementStatus::Active, &admin()).await.unwrap();

        let terminated = h.manager.terminate(&created.id, "breach of contract", &admin()).await.unwrap();
        assert_eq!(terminated.status, AgreementStatus::Terminated);
        assert_eq!(terminated.version, 3);

        let last = terminated.revision_history.last().unwrap();
        assert_eq!(last.action, "terminated");
        assert_eq!(last.reason.as_deref(), Some("breach of contract"));
        assert_eq!(last.previous_status, Some(AgreementStatus::Active));

        let entries = h.audit_store.entries();
        let entry = entries.last().unwrap();
        assert_eq!(entry.audit_type, AuditType::BaaTerminated);
        assert_eq!(entry.retention_expires_at, Utc.with_ymd_and_hms(2031, 3, 1, 9, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_agreement() {
        let h = harness();
        let err = h
            .manager
            .update_status("missing", AgreementStatus::Active, &admin())
            .await
            .unwrap_err();
        assert!(matches!(err, ComplianceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_audit_outage_does_not_block_changes() {
        let clock = FixedClock::new(t0());
        let store = InMemoryAgreementStore::new();
        let audit = Arc::new(AuditLogger::new(
            Arc::new(UnavailableAuditStore),
            keys(),
            Arc::new(clock.clone()),
            "portal-test",
        ));
        let manager = AgreementManager::new(
            Arc::new(store.clone()),
            Arc::new(RecordingNotifier::new()),
            audit,
            Arc::new(clock),
        );

        let created = manager.create(&acme(), TERMS, &admin()).await.unwrap();
        let active = manager.update_status(&created.id, AgreementStatus::Active, &admin()).await.unwrap();
        assert_eq!(active.version, 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_check_expirations_notifies_live_agreements() {
        let h = harness();
        let soon = h
            .manager
            .create_with_schedule(&acme(), TERMS, Some(t0()), Some(t0() + Duration::days(20)), &admin())
            .await
            .unwrap();
        let later = h
            .manager
            .create_with_schedule(&Associate::new("BA2", "Lab Co"), TERMS, Some(t0()), Some(t0() + Duration::days(200)), &admin())
            .await
            .unwrap();
        let ended = h
            .manager
            .create_with_schedule(&Associate::new("BA3", "Courier"), TERMS, Some(t0()), Some(t0() + Duration::days(10)), &admin())
            .await
            .unwrap();
        h.manager.terminate(&ended.id, "cancelled", &admin()).await.unwrap();

        let expiring = h.manager.check_expirations().await.unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].id, soon.id);
        assert_eq!(
            h.notifier.sent(),
            vec![Notification::AgreementExpiration {
                associate_id: "BA1".to_string(),
                agreement_id: soon.id.clone(),
                expiration_date: soon.expiration_date,
            }]
        );

        h.clock.advance(Duration::days(180));
        let expiring = h.manager.check_expirations().await.unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].id, later.id);
    }

    /// Agreement store whose writes can be switched off
    #[derive(Clone, Default)]
    struct BrokenWrites {
        inner: InMemoryAgreementStore,
        fail_insert: bool,
        fail_update: bool,
    }

    #[async_trait]
    impl AgreementStore for BrokenWrites {
        async fn insert(&self, agreement: &BusinessAssociateAgreement) -> std::result::Result<(), StoreError> {
            if self.fail_insert {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.inner.insert(agreement).await
        }

        async fn get(&self, id: &str) -> std::result::Result<Option<BusinessAssociateAgreement>, StoreError> {
            self.inner.get(id).await
        }

        async fn update(&self, agreement: &BusinessAssociateAgreement) -> std::result::Result<(), StoreError> {
            if self.fail_update {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.inner.update(agreement).await
        }

        async fn expiring_between(
            &self,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> std::result::Result<Vec<BusinessAssociateAgreement>, StoreError> {
            self.inner.expiring_between(from, to).await
        }

        async fn snapshots(&self, id: &str) -> std::result::Result<Vec<AgreementSnapshot>, StoreError> {
            self.inner.snapshots(id).await
        }
    }

    fn manager_over(store: BrokenWrites, audit_store: &InMemoryAuditStore) -> AgreementManager {
        let clock = FixedClock::new(t0());
        let audit = Arc::new(AuditLogger::new(
            Arc::new(audit_store.clone()),
            keys(),
            Arc::new(clock.clone()),
            "portal-test",
        ));
        AgreementManager::new(Arc::new(store), Arc::new(RecordingNotifier::new()), audit, Arc::new(clock))
    }

    #[tokio::test]
    async fn test_failed_insert_propagates_without_audit() {
        let audit_store = InMemoryAuditStore::new();
        let store = BrokenWrites {
            fail_insert: true,
            ..Default::default()
        };
        let manager = manager_over(store.clone(), &audit_store);

        let err = manager.create(&acme(), TERMS, &admin()).await.unwrap_err();
        assert!(matches!(err, ComplianceError::Storage(StoreError::Unavailable(_))));
        assert_eq!(store.inner.len().await, 0);
        assert!(audit_store.is_empty());
    }

    #[tokio::test]
    async fn test_failed_update_propagates_without_audit() {
        let audit_store = InMemoryAuditStore::new();
        let healthy = BrokenWrites::default();
        let created = manager_over(healthy.clone(), &audit_store)
            .create(&acme(), TERMS, &admin())
            .await
            .unwrap();

        let failing = BrokenWrites {
            fail_update: true,
            ..healthy
        };
        let manager = manager_over(failing.clone(), &audit_store);

        let err = manager
            .update_status(&created.id, AgreementStatus::Active, &admin())
            .await
            .unwrap_err();
        assert!(matches!(err, ComplianceError::Storage(StoreError::Unavailable(_))));

        let err = manager.terminate(&created.id, "vendor exit", &admin()).await.unwrap_err();
        assert!(matches!(err, ComplianceError::Storage(_)));

        let stored = manager.get(&created.id).await.unwrap();
        assert_eq!(stored.status, AgreementStatus::Pending);
        assert_eq!(stored.version, 1);

        let types: Vec<AuditType> = audit_store.entries().iter().map(|e| e.audit_type).collect();
        assert_eq!(types, vec![AuditType::BaaCreated]);
    }

    #[tokio::test]
    async fn test_oversized_notice_window_saturates() {
        let h = harness();
        let manager = h.manager.with_config(AgreementConfig {
            default_term_months: 12,
            expiration_notice_days: u32::MAX,
        });

        let created = manager.create(&acme(), TERMS, &admin()).await.unwrap();
        let expiring = manager.check_expirations().await.unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].id, created.id);
    }

    struct FlakyNotifier;

    #[async_trait]
    impl NotificationDispatcher for FlakyNotifier {
        async fn dispatch(&self, _notification: &Notification) -> std::result::Result<(), StoreError> {
            Err(StoreError::Unavailable("smtp down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_abort_check() {
        let clock = FixedClock::new(t0());
        let audit_store: Arc<dyn AuditStore> = Arc::new(InMemoryAuditStore::new());
        let audit = Arc::new(AuditLogger::new(audit_store, keys(), Arc::new(clock.clone()), "portal-test"));
        let manager = AgreementManager::new(
            Arc::new(InMemoryAgreementStore::new()),
            Arc::new(FlakyNotifier),
            audit,
            Arc::new(clock),
        );

        manager
            .create_with_schedule(&acme(), TERMS, Some(t0()), Some(t0() + Duration::days(5)), &admin())
            .await
            .unwrap();
        assert_eq!(manager.check_expirations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_diff_versions() {
        let h = harness();
        let created = h.manager.create(&acme(), TERMS, &admin()).await.unwrap();
        h.manager.update_status(&created.id, AgreementStatus::Active, &admin()).await.unwrap();
        h.manager.terminate(&created.id, "renegotiated", &admin()).await.unwrap();

        let diff = h.manager.diff_versions(&created.id, 1, 3).await.unwrap();
        assert_eq!(diff.status_change, Some((AgreementStatus::Pending, AgreementStatus::Terminated)));
        assert!(!diff.terms_changed);
        assert!(!diff.expiration_date_changed);
        assert_eq!(diff.revisions.len(), 2);
        assert_eq!(diff.revisions[1].action, "terminated");

        assert!(h.manager.diff_versions(&created.id, 2, 2).await.is_err());
        assert!(matches!(
            h.manager.diff_versions(&created.id, 1, 9).await,
            Err(ComplianceError::NotFound { .. })
        ));

        let history = h.manager.revision_history(&created.id).await.unwrap();
        assert_eq!(history.len(), 3);
    }
}
