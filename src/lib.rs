//! Carelog - compliance and audit core for the patient portal
//!
//! The crate covers the parts of the portal that carry legal weight:
//! - `models::encryption`: versioned field-level encryption
//! - `audit`: audit entry construction with mandated retention
//! - `agreements`: Business Associate Agreement lifecycle
//! - `compliance`: report generation, risk scoring and pattern detection
//!
//! Persistence, notification delivery and transport live behind the traits
//! in `adapters`.

pub mod adapters;
pub mod agreements;
pub mod audit;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod compliance;
pub mod configuration;
pub mod error;
pub mod models;

pub use error::{ComplianceError, Result};
