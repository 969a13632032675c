//! Summary statistics over a reconciliation pass

use crate::types::{AuditEntry, VerificationStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status counters shared by the overall and per-department summaries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Entries counted
    pub total: usize,
    /// Verified within tolerance
    pub verified: usize,
    /// No verification attempt
    pub missing: usize,
    /// Attempted, not confirmed
    pub pending: usize,
    /// Matched outside tolerance
    pub time_mismatches: usize,
    /// Sum of billed amounts
    pub billed_amount: Decimal,
    /// Sum of billed amounts not verified
    pub unverified_amount: Decimal,
}

impl StatusCounts {
    fn record(&mut self, entry: &AuditEntry) {
        self.total += 1;
        self.billed_amount += entry.billing.amount;
        match entry.status {
            VerificationStatus::Verified => self.verified += 1,
            VerificationStatus::Missing => self.missing += 1,
            VerificationStatus::Pending => self.pending += 1,
            VerificationStatus::TimeMismatch => self.time_mismatches += 1,
        }
        if entry.status != VerificationStatus::Verified {
            self.unverified_amount += entry.billing.amount;
        }
    }

    /// verified / total, 0.0 when there is nothing to verify
    pub fn verification_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.verified as f64 / self.total as f64
        }
    }

    /// Verification rate as a whole percentage
    pub fn verification_rate_percent(&self) -> u8 {
        (self.verification_rate() * 100.0).round() as u8
    }
}

/// Per-department breakdown
pub type DepartmentSummary = StatusCounts;

/// Aggregates over a completed audit pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    /// Counters over every entry in the pass
    #[serde(flatten)]
    pub counts: StatusCounts,
    /// verified / total (0.0 for an empty pass)
    pub verification_rate: f64,
    /// Counters per department
    pub by_department: BTreeMap<String, DepartmentSummary>,
}

impl AuditSummary {
    /// Aggregate a sequence of audit entries
    pub fn from_entries(entries: &[AuditEntry]) -> Self {
        let mut counts = StatusCounts::default();
        let mut by_department: BTreeMap<String, DepartmentSummary> = BTreeMap::new();

        for entry in entries {
            counts.record(entry);
            by_department
                .entry(entry.billing.department.clone())
                .or_default()
                .record(entry);
        }

        Self {
            verification_rate: counts.verification_rate(),
            counts,
            by_department,
        }
    }

    /// Verification rate as a whole percentage
    pub fn verification_rate_percent(&self) -> u8 {
        self.counts.verification_rate_percent()
    }

    /// Entries that need follow-up (missing, pending or mismatched)
    pub fn flagged(&self) -> usize {
        self.counts.missing + self.counts.pending + self.counts.time_mismatches
    }
}
