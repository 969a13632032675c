//! Audit orchestration: fetch both stores, reconcile, aggregate

use crate::config::{Config, FetchStrategy};
use crate::filter::AuditFilter;
use crate::reconciliation::{ReconciliationEngine, ReconciliationPolicy};
use crate::sources::{BillingSource, VerificationSource};
use crate::summary::AuditSummary;
use crate::types::{AuditEntry, PatientId};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Result of one audit query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// When the report was produced
    pub generated_at: DateTime<Utc>,

    /// Filter the report was produced for
    pub filter: AuditFilter,

    /// Entries after the status filter
    pub entries: Vec<AuditEntry>,

    /// Aggregates over every reconciled bill (status filter not applied)
    pub summary: AuditSummary,
}

/// Verification audit service
#[derive(Debug)]
pub struct AuditService<B, V> {
    billing: B,
    verification: V,
    engine: ReconciliationEngine,
    fetch_strategy: FetchStrategy,
    matching_margin: Duration,
}

impl<B: BillingSource, V: VerificationSource> AuditService<B, V> {
    /// Create service from configuration
    pub fn new(billing: B, verification: V, config: &Config) -> Result<Self> {
        let matching_margin = config.sources.matching_margin()?;
        Ok(Self {
            billing,
            verification,
            engine: ReconciliationEngine::new(config.policy()),
            fetch_strategy: config.sources.fetch_strategy,
            matching_margin,
        })
    }

    /// Matching policy in effect
    pub fn policy(&self) -> &ReconciliationPolicy {
        self.engine.policy()
    }

    /// Run one audit. A failure of either store aborts the audit.
    pub async fn run_audit(&self, filter: &AuditFilter) -> Result<AuditReport> {
        filter.validate()?;

        let billing_query = filter.billing_query();
        let verification_query = filter.verification_query(self.matching_margin);

        let (billing_events, verification_events) = match self.fetch_strategy {
            FetchStrategy::Concurrent => tokio::try_join!(
                self.billing.list_billing_events(&billing_query),
                self.verification.list_verification_events(&verification_query),
            )
            .map_err(log_fetch_failure)?,
            FetchStrategy::SubjectScoped => {
                let billing_events = self
                    .billing
                    .list_billing_events(&billing_query)
                    .await
                    .map_err(log_fetch_failure)?;

                let subjects: BTreeSet<PatientId> =
                    billing_events.iter().map(|e| e.patient_id.clone()).collect();

                let verification_events = if subjects.is_empty() {
                    Vec::new()
                } else {
                    self.verification
                        .list_verification_events(&verification_query.with_subjects(subjects))
                        .await
                        .map_err(log_fetch_failure)?
                };
                (billing_events, verification_events)
            }
        };

        info!(
            billing_events = billing_events.len(),
            verification_events = verification_events.len(),
            strategy = ?self.fetch_strategy,
            "Fetched audit inputs"
        );

        let reconciliation = self.engine.reconcile(&billing_events, &verification_events);
        let entries = filter.retain_status(reconciliation.entries);

        Ok(AuditReport {
            generated_at: Utc::now(),
            filter: filter.clone(),
            entries,
            summary: reconciliation.summary,
        })
    }
}

fn log_fetch_failure(err: Error) -> Error {
    warn!("Audit aborted, no partial reconciliation: {}", err);
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{InMemoryBillingSource, InMemoryVerificationSource};
    use crate::types::{
        ActorId, BillingEvent, BillingEventId, ConfidenceScore, VerificationEvent,
        VerificationEventId, VerificationMethod, VerificationOutcome, VerificationStatus,
    };
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn bill(patient: &str, department: &str, minute: u32) -> BillingEvent {
        BillingEvent {
            id: BillingEventId::generate(),
            patient_id: PatientId::new(patient),
            patient_name: format!("Patient {}", patient),
            billed_by: ActorId::new("Dr. Chebet"),
            billed_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, minute, 0).unwrap(),
            department: department.to_string(),
            service_code: "CON001".to_string(),
            service_description: "General Consultation".to_string(),
            amount: dec!(3500),
        }
    }

    fn scan(patient: &str, minute: u32) -> VerificationEvent {
        VerificationEvent {
            id: VerificationEventId::generate(),
            subject_id: PatientId::new(patient),
            verified_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, minute, 0).unwrap(),
            verified_by: ActorId::new("Clerk Njeri"),
            method: VerificationMethod::FingerprintScan,
            outcome: VerificationOutcome::Success {
                confidence_score: ConfidenceScore::new(93),
            },
        }
    }

    #[tokio::test]
    async fn test_department_filter_does_not_hide_match() {
        // Verifications are fetched without the department filter
        let billing = InMemoryBillingSource::with_events(vec![
            bill("P1", "Outpatient", 30),
            bill("P2", "Pharmacy", 30),
        ])
        .unwrap();
        let verification = InMemoryVerificationSource::with_events(vec![scan("P1", 28)]);

        let service = AuditService::new(billing, verification, &Config::default()).unwrap();
        let filter = AuditFilter {
            department: Some("Outpatient".to_string()),
            ..Default::default()
        };
        let report = service.run_audit(&filter).await.unwrap();

        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].status, VerificationStatus::Verified);
    }

    #[tokio::test]
    async fn test_status_filter_keeps_full_summary() {
        let billing = InMemoryBillingSource::with_events(vec![
            bill("P1", "Outpatient", 30),
            bill("P2", "Outpatient", 30),
        ])
        .unwrap();
        let verification = InMemoryVerificationSource::with_events(vec![scan("P1", 30)]);

        let service = AuditService::new(billing, verification, &Config::default()).unwrap();
        let filter = AuditFilter {
            status: Some(VerificationStatus::Missing),
            ..Default::default()
        };
        let report = service.run_audit(&filter).await.unwrap();

        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].billing.patient_id, PatientId::new("P2"));
        assert_eq!(report.summary.counts.total, 2);
        assert_eq!(report.summary.counts.verified, 1);
    }

    #[tokio::test]
    async fn test_subject_scoped_strategy() {
        let billing =
            InMemoryBillingSource::with_events(vec![bill("P1", "Outpatient", 30)]).unwrap();
        let verification =
            InMemoryVerificationSource::with_events(vec![scan("P1", 31), scan("P9", 30)]);

        let mut config = Config::default();
        config.sources.fetch_strategy = FetchStrategy::SubjectScoped;

        let service = AuditService::new(billing, verification, &config).unwrap();
        let report = service.run_audit(&AuditFilter::default()).await.unwrap();
        assert_eq!(report.summary.counts.verified, 1);
    }

    #[tokio::test]
    async fn test_verification_outage_aborts_audit() {
        let billing =
            InMemoryBillingSource::with_events(vec![bill("P1", "Outpatient", 30)]).unwrap();
        let verification = Arc::new(InMemoryVerificationSource::new());
        verification.set_available(false);

        let service =
            AuditService::new(billing, verification.clone(), &Config::default()).unwrap();
        let err = service.run_audit(&AuditFilter::default()).await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));

        verification.set_available(true);
        let report = service.run_audit(&AuditFilter::default()).await.unwrap();
        assert_eq!(report.summary.counts.missing, 1);
    }

    #[test]
    fn test_oversized_matching_margin_rejected() {
        let mut config = Config::default();
        config.sources.matching_margin_minutes = i64::MAX;

        let result = AuditService::new(
            InMemoryBillingSource::new(),
            InMemoryVerificationSource::new(),
            &config,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_window_at_calendar_limits_runs() {
        let billing =
            InMemoryBillingSource::with_events(vec![bill("P1", "Outpatient", 30)]).unwrap();
        let verification = InMemoryVerificationSource::with_events(vec![scan("P1", 29)]);

        let service = AuditService::new(billing, verification, &Config::default()).unwrap();
        let filter = AuditFilter {
            date_from: Some(DateTime::<Utc>::MIN_UTC),
            date_to: Some(DateTime::<Utc>::MAX_UTC),
            ..Default::default()
        };
        let report = service.run_audit(&filter).await.unwrap();

        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].status, VerificationStatus::Verified);
    }
}
