//! Billing/verification reconciliation
//!
//! One pass classifies every billing event as verified, missing, pending or
//! time_mismatch by matching it to the nearest unconsumed successful
//! verification of the same patient.
//!
//! # Invariants
//!
//! - Exhaustive: exactly one entry per billing event
//! - No double-spend: a verification backs at most one entry per pass
//! - Deterministic: same inputs in the same order give the same entries

use crate::summary::AuditSummary;
use crate::types::{
    AuditEntry, BillingEvent, ConfidenceScore, MatchedVerification, PatientId, Tolerance,
    VerificationEvent, VerificationOutcome, VerificationStatus,
};
use crate::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Matching rules for one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconciliationPolicy {
    /// Maximum accepted |verified_at - billed_at|
    pub tolerance: Tolerance,

    /// Successful scans below this score are treated as unconfirmed attempts
    pub min_confidence: Option<ConfidenceScore>,
}

impl ReconciliationPolicy {
    /// Policy with the given tolerance and no confidence floor
    pub fn with_tolerance_minutes(minutes: i64) -> Result<Self> {
        Ok(Self {
            tolerance: Tolerance::from_minutes(minutes)?,
            min_confidence: None,
        })
    }
}

/// Output of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// One entry per billing event, in ascending `billed_at` order
    pub entries: Vec<AuditEntry>,

    /// Aggregates over `entries`
    pub summary: AuditSummary,
}

/// Reconcile with a raw tolerance in minutes; negative values are rejected
/// before any matching happens.
pub fn reconcile(
    billing_events: &[BillingEvent],
    verification_events: &[VerificationEvent],
    tolerance_minutes: i64,
) -> Result<Reconciliation> {
    let policy = ReconciliationPolicy::with_tolerance_minutes(tolerance_minutes)?;
    Ok(ReconciliationEngine::new(policy).reconcile(billing_events, verification_events))
}

/// Pure, single-pass reconciliation engine. Holds no state between passes.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    policy: ReconciliationPolicy,
}

impl ReconciliationEngine {
    /// Create new engine
    pub fn new(policy: ReconciliationPolicy) -> Self {
        Self { policy }
    }

    /// Matching policy
    pub fn policy(&self) -> &ReconciliationPolicy {
        &self.policy
    }

    /// Run one pass over already-fetched events
    pub fn reconcile(
        &self,
        billing_events: &[BillingEvent],
        verification_events: &[VerificationEvent],
    ) -> Reconciliation {
        let mut by_subject: HashMap<&PatientId, Vec<usize>> = HashMap::new();
        for (idx, event) in verification_events.iter().enumerate() {
            by_subject.entry(&event.subject_id).or_default().push(idx);
        }

        // Stable sort keeps input order for bills with equal timestamps
        let mut order: Vec<usize> = (0..billing_events.len()).collect();
        order.sort_by_key(|&idx| billing_events[idx].billed_at);

        let mut consumed = vec![false; verification_events.len()];
        let mut entries = Vec::with_capacity(billing_events.len());

        for idx in order {
            let bill = &billing_events[idx];
            let candidates = by_subject
                .get(&bill.patient_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let mut best: Option<(usize, Duration)> = None;
            let mut attempted = false;

            for &v_idx in candidates {
                let verification = &verification_events[v_idx];
                if !self.is_confirmed(&verification.outcome) {
                    attempted = true;
                    continue;
                }
                if consumed[v_idx] {
                    continue;
                }

                let distance = (verification.verified_at - bill.billed_at).abs();
                let closer = match best {
                    None => true,
                    Some((best_idx, best_distance)) => {
                        distance < best_distance
                            || (distance == best_distance
                                && verification.verified_at
                                    < verification_events[best_idx].verified_at)
                    }
                };
                if closer {
                    best = Some((v_idx, distance));
                }
            }

            let entry = match best {
                Some((v_idx, _)) => {
                    consumed[v_idx] = true;
                    self.matched_entry(bill, &verification_events[v_idx])
                }
                None => {
                    let status = if attempted {
                        VerificationStatus::Pending
                    } else {
                        VerificationStatus::Missing
                    };
                    debug!(
                        billing_event = %bill.id,
                        patient = %bill.patient_id,
                        status = %status,
                        "No usable verification for bill"
                    );
                    AuditEntry {
                        billing: bill.clone(),
                        matched_verification: None,
                        status,
                        time_difference_minutes: None,
                        verification_hash: None,
                    }
                }
            };

            entries.push(entry);
        }

        let summary = AuditSummary::from_entries(&entries);
        info!(
            total = summary.counts.total,
            verified = summary.counts.verified,
            missing = summary.counts.missing,
            pending = summary.counts.pending,
            time_mismatches = summary.counts.time_mismatches,
            tolerance_minutes = self.policy.tolerance.minutes(),
            "Reconciliation pass complete"
        );

        Reconciliation { entries, summary }
    }

    /// Successful and above the confidence floor, if one is configured
    fn is_confirmed(&self, outcome: &VerificationOutcome) -> bool {
        match (outcome, self.policy.min_confidence) {
            (VerificationOutcome::Failure, _) => false,
            (VerificationOutcome::Success { .. }, None) => true,
            (VerificationOutcome::Success { confidence_score }, Some(floor)) => {
                *confidence_score >= floor
            }
        }
    }

    fn matched_entry(&self, bill: &BillingEvent, verification: &VerificationEvent) -> AuditEntry {
        let delta = verification.verified_at - bill.billed_at;
        let (status, time_difference_minutes) = if self.policy.tolerance.admits(delta) {
            (VerificationStatus::Verified, None)
        } else {
            (VerificationStatus::TimeMismatch, Some(delta.num_minutes()))
        };

        debug!(
            billing_event = %bill.id,
            verification_event = %verification.id,
            delta_seconds = delta.num_seconds(),
            status = %status,
            "Matched bill to verification"
        );

        AuditEntry {
            billing: bill.clone(),
            matched_verification: Some(MatchedVerification::from(verification)),
            status,
            time_difference_minutes,
            verification_hash: Some(verification.id.verification_hash()),
        }
    }
}
