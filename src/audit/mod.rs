//! Audit logger
//!
//! Builds immutable, attributed audit entries and hands them to the
//! configured `AuditStore`. Logging is best-effort: a store failure is
//! reported through `AuditOutcome` and never aborts the caller, while an
//! encryption failure always does.

pub mod device;
pub mod logger;
pub mod session;

pub use logger::{
    AccessRequest, AuditDropped, AuditLogger, AuditOutcome, AuditReceipt, EntryAttributes,
    LoginEvent, ResourceKind, UNKNOWN_LOCATION,
};
