//! Business Associate Agreement lifecycle
//!
//! Agreements move through `Pending -> Active -> Expired -> Terminated`
//! under admin control. Each change bumps the version, appends a revision
//! record and is written to the audit trail after it is persisted.

pub mod manager;

pub use manager::{AgreementManager, MAX_ASSOCIATE_NAME};
