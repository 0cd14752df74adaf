use crate::adapters::StoreError;
use crate::models::encryption::EncryptionError;
use crate::models::validation::ValidationError;
use crate::models::{AgreementStatus, Role};

/// Result type for compliance core operations
pub type Result<T> = std::result::Result<T, ComplianceError>;

/// Errors surfaced to callers of the compliance core.
///
/// Audit transport failures are not represented here; they are reported
/// through `audit::AuditOutcome` and never abort the calling operation.
#[derive(Debug, thiserror::Error)]
pub enum ComplianceError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Actor '{actor_id}' with role '{role}' is not authorized to {operation}")]
    Authorization {
        actor_id: String,
        role: Role,
        operation: String,
    },

    #[error("Invalid agreement transition from {from} to {to}")]
    InvalidTransition {
        from: AgreementStatus,
        to: AgreementStatus,
    },

    #[error("Agreement not found: {id}")]
    NotFound { id: String },

    #[error("Storage operation failed: {0}")]
    Storage(#[from] StoreError),

    #[error("Cryptographic operation failed: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("Report computation failed: {0}")]
    Computation(String),
}

impl ComplianceError {
    /// Build an authorization error for an actor attempting `operation`
    pub fn unauthorized(actor: &crate::models::Actor, operation: &str) -> Self {
        Self::Authorization {
            actor_id: actor.id.clone(),
            role: actor.role.clone(),
            operation: operation.to_string(),
        }
    }
}
