//! Audit query filters
//!
//! Date range, department and search text select which bills are reconciled
//! and are applied by the billing store before matching. The status filter
//! only trims the returned entries after matching.

use crate::types::{AuditEntry, BillingEvent, PatientId, VerificationEvent, VerificationStatus};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Filter for one audit query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Earliest billing timestamp (inclusive)
    pub date_from: Option<DateTime<Utc>>,

    /// Latest billing timestamp (inclusive)
    pub date_to: Option<DateTime<Utc>>,

    /// Only bills from this department
    pub department: Option<String>,

    /// Free text over patient, service and provider
    pub search_text: Option<String>,

    /// Only return entries with this status (summary is unaffected)
    pub status: Option<VerificationStatus>,
}

impl AuditFilter {
    /// Reject inconsistent filters
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(Error::InvalidFilter(format!(
                    "date_from {} is after date_to {}",
                    from, to
                )));
            }
        }
        Ok(())
    }

    /// Billing store query (applied before reconciliation)
    pub fn billing_query(&self) -> BillingQuery {
        BillingQuery {
            date_from: self.date_from,
            date_to: self.date_to,
            department: self.department.clone(),
            search_text: self.search_text.clone(),
        }
    }

    /// Verification store query covering the same window, widened by `margin`.
    /// A bound that would leave the representable range is left open.
    pub fn verification_query(&self, margin: Duration) -> VerificationQuery {
        VerificationQuery {
            subject_ids: None,
            date_from: self.date_from.and_then(|from| from.checked_sub_signed(margin)),
            date_to: self.date_to.and_then(|to| to.checked_add_signed(margin)),
        }
    }

    /// Apply the status filter to reconciled entries
    pub fn retain_status(&self, entries: Vec<AuditEntry>) -> Vec<AuditEntry> {
        match self.status {
            Some(status) => entries.into_iter().filter(|e| e.status == status).collect(),
            None => entries,
        }
    }
}

/// Query against the billing store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingQuery {
    /// Earliest billing timestamp (inclusive)
    pub date_from: Option<DateTime<Utc>>,
    /// Latest billing timestamp (inclusive)
    pub date_to: Option<DateTime<Utc>>,
    /// Department
    pub department: Option<String>,
    /// Free text
    pub search_text: Option<String>,
}

impl BillingQuery {
    /// Whether a billing event satisfies this query
    pub fn matches(&self, event: &BillingEvent) -> bool {
        if let Some(from) = self.date_from {
            if event.billed_at < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if event.billed_at > to {
                return false;
            }
        }
        if let Some(department) = &self.department {
            if !event.department.eq_ignore_ascii_case(department) {
                return false;
            }
        }
        if let Some(search) = &self.search_text {
            if !event.matches_search(search) {
                return false;
            }
        }
        true
    }
}

/// Query against the verification store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationQuery {
    /// Restrict to these subjects (`None` = every subject in the window)
    pub subject_ids: Option<BTreeSet<PatientId>>,
    /// Earliest capture timestamp (inclusive)
    pub date_from: Option<DateTime<Utc>>,
    /// Latest capture timestamp (inclusive)
    pub date_to: Option<DateTime<Utc>>,
}

impl VerificationQuery {
    /// Scope the query to the given subjects
    pub fn with_subjects(mut self, subject_ids: BTreeSet<PatientId>) -> Self {
        self.subject_ids = Some(subject_ids);
        self
    }

    /// Whether a verification event satisfies this query
    pub fn matches(&self, event: &VerificationEvent) -> bool {
        if let Some(subjects) = &self.subject_ids {
            if !subjects.contains(&event.subject_id) {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if event.verified_at < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if event.verified_at > to {
                return false;
            }
        }
        true
    }
}
