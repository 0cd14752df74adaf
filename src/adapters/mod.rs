//! Collaborator boundaries for the compliance core.
//!
//! The core decides what to store and when; these traits are where the
//! bytes actually go. Reference implementations live in `memory` (for tests
//! and embedding) and `file` (append-only JSON lines for the audit trail).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AgreementSnapshot, AuditLogEntry, AuditType, BusinessAssociateAgreement};

pub mod file;
pub mod memory;

pub use file::JsonLinesAuditStore;
pub use memory::{InMemoryAgreementStore, InMemoryAuditStore, RecordingNotifier};

/// Errors raised by store and dispatcher implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found: {id}")]
    NotFound { id: String },

    #[error("Record already exists: {id}")]
    AlreadyExists { id: String },

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Filter for reading audit entries back
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub actor_id: Option<String>,
    /// Restrict to these types; `None` matches every type
    pub types: Option<Vec<AuditType>>,
    /// Inclusive lower bound
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub to: Option<DateTime<Utc>>,
}

impl AuditQuery {
    /// Entries with timestamps in `[from, to]`
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        }
    }

    pub fn for_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_types(mut self, types: Vec<AuditType>) -> Self {
        self.types = Some(types);
        self
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(actor_id) = &self.actor_id {
            if &entry.actor_id != actor_id {
                return false;
            }
        }
        if let Some(types) = &self.types {
            if !types.contains(&entry.audit_type) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.timestamp > to {
                return false;
            }
        }
        true
    }
}

/// Outbound notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    AgreementExpiration {
        associate_id: String,
        agreement_id: String,
        expiration_date: DateTime<Utc>,
    },
}

/// Append-only destination for audit entries.
///
/// There is intentionally no update or delete: entries are immutable and
/// must outlive their `retention_expires_at`.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError>;

    /// Entries matching `query`, oldest first
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError>;
}

/// Persistence for agreements and their per-version snapshots
#[async_trait]
pub trait AgreementStore: Send + Sync {
    /// Store a new agreement; fails with `AlreadyExists` on id collision
    async fn insert(&self, agreement: &BusinessAssociateAgreement) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<BusinessAssociateAgreement>, StoreError>;

    /// Replace the stored agreement wholesale; last write wins
    async fn update(&self, agreement: &BusinessAssociateAgreement) -> Result<(), StoreError>;

    /// Agreements whose expiration date lies in `[from, to]`
    async fn expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BusinessAssociateAgreement>, StoreError>;

    /// One snapshot per persisted version, oldest first
    async fn snapshots(&self, id: &str) -> Result<Vec<AgreementSnapshot>, StoreError>;
}

/// Outbound notification channel (email, queue, pager...)
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: &Notification) -> Result<(), StoreError>;
}
