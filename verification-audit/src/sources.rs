//! Billing and verification stores
//!
//! The audit reads both stores through these traits. Implementations must
//! return an error rather than an empty list when the store cannot be read,
//! so an outage is never mistaken for "no verifications exist".

use crate::filter::{BillingQuery, VerificationQuery};
use crate::types::{BillingEvent, VerificationEvent};
use crate::{DataSource, Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Read access to billed-service records
#[async_trait]
pub trait BillingSource: Send + Sync {
    /// Billing events matching the query
    async fn list_billing_events(&self, query: &BillingQuery) -> Result<Vec<BillingEvent>>;
}

/// Read access to biometric capture events
#[async_trait]
pub trait VerificationSource: Send + Sync {
    /// Verification events matching the query
    async fn list_verification_events(
        &self,
        query: &VerificationQuery,
    ) -> Result<Vec<VerificationEvent>>;
}

#[async_trait]
impl<T: BillingSource + ?Sized> BillingSource for Arc<T> {
    async fn list_billing_events(&self, query: &BillingQuery) -> Result<Vec<BillingEvent>> {
        (**self).list_billing_events(query).await
    }
}

#[async_trait]
impl<T: VerificationSource + ?Sized> VerificationSource for Arc<T> {
    async fn list_verification_events(
        &self,
        query: &VerificationQuery,
    ) -> Result<Vec<VerificationEvent>> {
        (**self).list_verification_events(query).await
    }
}

/// In-memory billing store (test double and embedding helper)
#[derive(Debug, Default)]
pub struct InMemoryBillingSource {
    events: RwLock<Vec<BillingEvent>>,
    unavailable: AtomicBool,
}

impl InMemoryBillingSource {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store pre-loaded with events
    pub fn with_events(events: Vec<BillingEvent>) -> Result<Self> {
        for event in &events {
            event.validate()?;
        }
        Ok(Self {
            events: RwLock::new(events),
            unavailable: AtomicBool::new(false),
        })
    }

    /// Append a billing event
    pub async fn append(&self, event: BillingEvent) -> Result<()> {
        event.validate()?;
        self.events.write().await.push(event);
        Ok(())
    }

    /// Simulate the store going down or coming back
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }
}

#[async_trait]
impl BillingSource for InMemoryBillingSource {
    async fn list_billing_events(&self, query: &BillingQuery) -> Result<Vec<BillingEvent>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::source_unavailable(DataSource::Billing, "in-memory store offline"));
        }

        let events = self.events.read().await;
        Ok(events.iter().filter(|e| query.matches(e)).cloned().collect())
    }
}

/// In-memory verification store (test double and embedding helper)
#[derive(Debug, Default)]
pub struct InMemoryVerificationSource {
    events: RwLock<Vec<VerificationEvent>>,
    unavailable: AtomicBool,
}

impl InMemoryVerificationSource {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store pre-loaded with events
    pub fn with_events(events: Vec<VerificationEvent>) -> Self {
        Self {
            events: RwLock::new(events),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Append a verification event
    pub async fn append(&self, event: VerificationEvent) {
        self.events.write().await.push(event);
    }

    /// Simulate the store going down or coming back
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }
}

#[async_trait]
impl VerificationSource for InMemoryVerificationSource {
    async fn list_verification_events(
        &self,
        query: &VerificationQuery,
    ) -> Result<Vec<VerificationEvent>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::source_unavailable(
                DataSource::Verification,
                "in-memory store offline",
            ));
        }

        let events = self.events.read().await;
        Ok(events.iter().filter(|e| query.matches(e)).cloned().collect())
    }
}

/// Store backed by a JSON array file, re-read on every query
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    /// Create source for the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load<T: DeserializeOwned>(&self, store: DataSource) -> Result<Vec<T>> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            warn!("Failed to read {} store {}: {}", store, self.path.display(), e);
            Error::source_unavailable(store, format!("{}: {}", self.path.display(), e))
        })?;

        let events: Vec<T> = serde_json::from_slice(&raw).map_err(|e| {
            warn!("Failed to parse {} store {}: {}", store, self.path.display(), e);
            Error::source_unavailable(store, format!("{}: {}", self.path.display(), e))
        })?;

        debug!("Loaded {} {} events from {}", events.len(), store, self.path.display());
        Ok(events)
    }
}

#[async_trait]
impl BillingSource for JsonFileSource {
    async fn list_billing_events(&self, query: &BillingQuery) -> Result<Vec<BillingEvent>> {
        let events: Vec<BillingEvent> = self.load(DataSource::Billing).await?;
        for event in &events {
            event.validate()?;
        }
        Ok(events.into_iter().filter(|e| query.matches(e)).collect())
    }
}

#[async_trait]
impl VerificationSource for JsonFileSource {
    async fn list_verification_events(
        &self,
        query: &VerificationQuery,
    ) -> Result<Vec<VerificationEvent>> {
        let events: Vec<VerificationEvent> = self.load(DataSource::Verification).await?;
        Ok(events.into_iter().filter(|e| query.matches(e)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActorId, BillingEventId, PatientId};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn bill(amount: rust_decimal::Decimal) -> BillingEvent {
        BillingEvent {
            id: BillingEventId::generate(),
            patient_id: PatientId::new("P1"),
            patient_name: "Peter Njoroge".to_string(),
            billed_by: ActorId::new("Dr. Wekesa"),
            billed_at: Utc::now(),
            department: "Physiotherapy".to_string(),
            service_code: "PHY002".to_string(),
            service_description: "Physiotherapy Session".to_string(),
            amount,
        }
    }

    #[tokio::test]
    async fn test_in_memory_rejects_negative_amount() {
        let source = InMemoryBillingSource::new();
        assert!(source.append(bill(dec!(2500))).await.is_ok());
        assert!(matches!(source.append(bill(dec!(-1))).await, Err(Error::InvalidEvent(_))));
    }

    #[tokio::test]
    async fn test_offline_store_reports_unavailable() {
        let source = InMemoryVerificationSource::new();
        source.set_available(false);

        let err = source
            .list_verification_events(&VerificationQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SourceUnavailable { store: DataSource::Verification, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable_not_empty() {
        let source = JsonFileSource::new("/nonexistent/billing.json");
        let err = source.list_billing_events(&BillingQuery::default()).await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { store: DataSource::Billing, .. }));
    }

    #[tokio::test]
    async fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("billing.json");
        let events = vec![bill(dec!(2500))];
        std::fs::write(&path, serde_json::to_vec(&events).unwrap()).unwrap();

        let source = JsonFileSource::new(&path);
        let loaded = source.list_billing_events(&BillingQuery::default()).await.unwrap();
        assert_eq!(loaded, events);
    }
}
