//! Verification Audit
//!
//! Reconciles billed services against biometric verification events and
//! reports, per bill, whether the patient was verified, never verified,
//! only attempted, or verified too far from the billing time.
//!
//! # Architecture
//!
//! - **Sources**: billing and verification stores behind async traits
//! - **Engine**: pure single-pass matching, no I/O, no shared state
//! - **Service**: concurrent fetch, reconcile, aggregate, status filter
//! - **Export**: CSV rendering of audit entries

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod reconciliation;
pub mod service;
pub mod sources;
pub mod summary;
pub mod types;

// Re-exports
pub use config::{Config, FetchStrategy};
pub use error::{DataSource, Error, Result};
pub use filter::{AuditFilter, BillingQuery, VerificationQuery};
pub use reconciliation::{reconcile, Reconciliation, ReconciliationEngine, ReconciliationPolicy};
pub use service::{AuditReport, AuditService};
pub use sources::{
    BillingSource, InMemoryBillingSource, InMemoryVerificationSource, JsonFileSource,
    VerificationSource,
};
pub use summary::{AuditSummary, DepartmentSummary, StatusCounts};
pub use types::*;
