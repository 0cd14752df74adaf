//! Business Associate Agreement model and its status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::actor::{Actor, Role};

/// Lifecycle status of an agreement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgreementStatus {
    /// Drafted, not yet in force
    Pending,
    /// In force
    Active,
    /// Lapsed at its expiration date
    Expired,
    /// Ended early or closed out; terminal
    Terminated,
}

impl AgreementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgreementStatus::Pending => "pending",
            AgreementStatus::Active => "active",
            AgreementStatus::Expired => "expired",
            AgreementStatus::Terminated => "terminated",
        }
    }

    /// Statuses reachable in one step
    pub fn allowed_transitions(&self) -> &'static [AgreementStatus] {
        match self {
            AgreementStatus::Pending => &[AgreementStatus::Active, AgreementStatus::Terminated],
            AgreementStatus::Active => &[AgreementStatus::Expired, AgreementStatus::Terminated],
            AgreementStatus::Expired => &[AgreementStatus::Terminated],
            AgreementStatus::Terminated => &[],
        }
    }

    pub fn can_transition_to(&self, next: AgreementStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgreementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(AgreementStatus::Pending),
            "active" => Ok(AgreementStatus::Active),
            "expired" => Ok(AgreementStatus::Expired),
            "terminated" => Ok(AgreementStatus::Terminated),
            other => Err(format!("Unknown agreement status '{}'", other)),
        }
    }
}

/// Third party the agreement is signed with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Associate {
    pub id: String,
    pub name: String,
}

impl Associate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One entry in an agreement's revision history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevisionRecord {
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub actor_role: Role,
    /// "created", "status_changed" or "terminated"
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<AgreementStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_status: Option<AgreementStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RevisionRecord {
    pub fn new(actor: &Actor, action: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            actor_id: actor.id.clone(),
            actor_role: actor.role.clone(),
            action: action.to_string(),
            previous_status: None,
            new_status: None,
            reason: None,
        }
    }

    pub fn with_transition(mut self, previous: AgreementStatus, new: AgreementStatus) -> Self {
        self.previous_status = Some(previous);
        self.new_status = Some(new);
        self
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}

/// A versioned Business Associate Agreement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessAssociateAgreement {
    pub id: String,
    pub associate_id: String,
    pub associate_name: String,
    pub effective_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub status: AgreementStatus,
    /// Contract terms, encrypted with the key manager
    pub encrypted_terms: String,
    /// Starts at 1 and grows by exactly 1 per mutation
    pub version: u32,
    /// One record per version, oldest first
    pub revision_history: Vec<RevisionRecord>,
}

impl BusinessAssociateAgreement {
    /// Apply a status transition, bumping the version and appending history.
    ///
    /// Returns the previous status. The caller is responsible for checking
    /// legality first; this method only records the mutation.
    pub fn apply_transition(&mut self, next: AgreementStatus, revision: RevisionRecord) -> AgreementStatus {
        let previous = self.status;
        self.status = next;
        self.version += 1;
        self.revision_history.push(revision);
        previous
    }

    /// `version` and history length agree
    pub fn history_is_consistent(&self) -> bool {
        self.revision_history.len() == self.version as usize
    }

    pub fn snapshot(&self, taken_at: DateTime<Utc>) -> AgreementSnapshot {
        AgreementSnapshot {
            agreement_id: self.id.clone(),
            version: self.version,
            status: self.status,
            effective_date: self.effective_date,
            expiration_date: self.expiration_date,
            encrypted_terms: self.encrypted_terms.clone(),
            taken_at,
        }
    }
}

/// State of an agreement at one version, kept by the store for diffing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgreementSnapshot {
    pub agreement_id: String,
    pub version: u32,
    pub status: AgreementStatus,
    pub effective_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub encrypted_terms: String,
    pub taken_at: DateTime<Utc>,
}

/// Differences between two versions of an agreement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgreementDiff {
    pub agreement_id: String,
    pub from_version: u32,
    pub to_version: u32,
    /// (from, to) when the status differs
    pub status_change: Option<(AgreementStatus, AgreementStatus)>,
    pub effective_date_changed: bool,
    pub expiration_date_changed: bool,
    /// Compared on decrypted terms, not ciphertext
    pub terms_changed: bool,
    /// Revisions recorded after `from_version` up to `to_version`
    pub revisions: Vec<RevisionRecord>,
}
