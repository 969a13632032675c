//! Core types for verification audit

use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Patient identifier (billing `patient_id`, verification `subject_id`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(String);

impl PatientId {
    /// Create new patient ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Actor performing a billing or a verification (provider, clerk, device operator)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Create new actor ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Billing event identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillingEventId(pub Uuid);

impl BillingEventId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for BillingEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verification event identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationEventId(pub Uuid);

impl VerificationEventId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Display token for the audit trail: `0x` + SHA-256 of the identifier
    pub fn verification_hash(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        format!("0x{:x}", digest)
    }
}

impl fmt::Display for VerificationEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Billed service record. Append-only: never modified once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingEvent {
    /// Unique billing event ID
    pub id: BillingEventId,

    /// Patient the service was billed to
    pub patient_id: PatientId,

    /// Patient display name
    pub patient_name: String,

    /// Provider that billed the service
    pub billed_by: ActorId,

    /// Billing timestamp
    pub billed_at: DateTime<Utc>,

    /// Department (Outpatient, Pharmacy, Laboratory, ...)
    pub department: String,

    /// Service code
    pub service_code: String,

    /// Human readable service description
    pub service_description: String,

    /// Billed amount (non-negative)
    pub amount: Decimal,
}

impl BillingEvent {
    /// Check data model invariants
    pub fn validate(&self) -> Result<()> {
        if self.amount < Decimal::ZERO {
            return Err(Error::InvalidEvent(format!(
                "Billing event {} has negative amount {}",
                self.id, self.amount
            )));
        }
        Ok(())
    }

    /// Case-insensitive match over patient name, service and provider
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        [
            self.patient_name.as_str(),
            self.service_description.as_str(),
            self.service_code.as_str(),
            self.billed_by.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// Biometric confidence score (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct ConfidenceScore(u8);

impl ConfidenceScore {
    /// Similarity floor the fingerprint matcher accepts as a positive match
    pub const RECOMMENDED_FLOOR: ConfidenceScore = ConfidenceScore(85);

    /// Create new confidence score (0-100)
    pub fn new(score: u8) -> Self {
        Self(score.min(100))
    }

    /// Get raw score
    pub fn score(&self) -> u8 {
        self.0
    }
}

impl From<u8> for ConfidenceScore {
    fn from(score: u8) -> Self {
        Self::new(score)
    }
}

impl From<ConfidenceScore> for u8 {
    fn from(score: ConfidenceScore) -> Self {
        score.0
    }
}

/// How the subject was verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationMethod {
    /// Live scan on a capture device
    FingerprintScan,
    /// Fingerprint image uploaded from a capture app
    FingerprintUpload,
    /// One-time password fallback
    Otp,
}

/// Result of a biometric capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Subject confirmed
    Success {
        /// Matcher confidence
        confidence_score: ConfidenceScore,
    },
    /// Scan attempted but not confirmed
    Failure,
}

impl VerificationOutcome {
    /// Confidence, present only on success
    pub fn confidence_score(&self) -> Option<ConfidenceScore> {
        match self {
            VerificationOutcome::Success { confidence_score } => Some(*confidence_score),
            VerificationOutcome::Failure => None,
        }
    }

    /// Whether the capture succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, VerificationOutcome::Success { .. })
    }
}

/// Biometric capture event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationEvent {
    /// Unique verification event ID
    pub id: VerificationEventId,

    /// Verified patient
    pub subject_id: PatientId,

    /// Capture timestamp
    pub verified_at: DateTime<Utc>,

    /// Actor performing or confirming the scan
    pub verified_by: ActorId,

    /// Capture method
    pub method: VerificationMethod,

    /// Capture result
    #[serde(flatten)]
    pub outcome: VerificationOutcome,
}

/// Verification status of a billed service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Matched within the tolerance window
    Verified,
    /// No verification attempt for the patient
    Missing,
    /// Attempted but never successfully confirmed
    Pending,
    /// Matched, but outside the tolerance window
    TimeMismatch,
}

impl VerificationStatus {
    /// Wire name (`verified`, `missing`, `pending`, `time_mismatch`)
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::Missing => "missing",
            VerificationStatus::Pending => "pending",
            VerificationStatus::TimeMismatch => "time_mismatch",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verified" => Ok(VerificationStatus::Verified),
            "missing" => Ok(VerificationStatus::Missing),
            "pending" => Ok(VerificationStatus::Pending),
            "time_mismatch" | "time-mismatch" => Ok(VerificationStatus::TimeMismatch),
            other => Err(Error::InvalidFilter(format!("Unknown verification status: {}", other))),
        }
    }
}

/// Maximum accepted |verified_at - billed_at|, in whole minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Tolerance {
    minutes: i64,
    window: Duration,
}

impl Tolerance {
    /// Default workflow tolerance
    pub const DEFAULT_MINUTES: i64 = 5;

    /// Create a tolerance window; negative or unrepresentable values are rejected
    pub fn from_minutes(minutes: i64) -> Result<Self> {
        if minutes < 0 {
            return Err(Error::InvalidTolerance(format!(
                "Tolerance must be non-negative, got {} minutes",
                minutes
            )));
        }
        let window = Duration::try_minutes(minutes).ok_or_else(|| {
            Error::InvalidTolerance(format!("Tolerance of {} minutes is out of range", minutes))
        })?;
        Ok(Self { minutes, window })
    }

    /// Parse a configured tolerance such as `"5"`
    pub fn parse(raw: &str) -> Result<Self> {
        let minutes = raw.trim().parse::<i64>().map_err(|_| {
            Error::InvalidTolerance(format!(
                "Tolerance must be a whole number of minutes, got {:?}",
                raw
            ))
        })?;
        Self::from_minutes(minutes)
    }

    /// Window size in minutes
    pub fn minutes(&self) -> i64 {
        self.minutes
    }

    /// Window size as a duration
    pub fn as_duration(&self) -> Duration {
        self.window
    }

    /// Whether a signed delta falls inside the window (inclusive)
    pub fn admits(&self, delta: Duration) -> bool {
        delta.abs() <= self.window
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            minutes: Self::DEFAULT_MINUTES,
            window: Duration::minutes(Self::DEFAULT_MINUTES),
        }
    }
}

impl TryFrom<i64> for Tolerance {
    type Error = Error;

    fn try_from(minutes: i64) -> Result<Self> {
        Self::from_minutes(minutes)
    }
}

impl From<Tolerance> for i64 {
    fn from(tolerance: Tolerance) -> Self {
        tolerance.minutes
    }
}

/// Verification consumed by an audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedVerification {
    /// Verification event ID
    pub id: VerificationEventId,

    /// Actor that performed the scan
    pub verified_by: ActorId,

    /// Capture timestamp
    pub verified_at: DateTime<Utc>,

    /// Capture method
    pub method: VerificationMethod,

    /// Matcher confidence
    pub confidence_score: Option<ConfidenceScore>,
}

impl From<&VerificationEvent> for MatchedVerification {
    fn from(event: &VerificationEvent) -> Self {
        Self {
            id: event.id,
            verified_by: event.verified_by.clone(),
            verified_at: event.verified_at,
            method: event.method,
            confidence_score: event.outcome.confidence_score(),
        }
    }
}

/// Reconciliation result for one billed service. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Reconciled billing event
    pub billing: BillingEvent,

    /// Verification consumed by this entry
    pub matched_verification: Option<MatchedVerification>,

    /// Classification
    pub status: VerificationStatus,

    /// Signed verified_at - billed_at in minutes, only for time mismatches
    pub time_difference_minutes: Option<i64>,

    /// Display token derived from the matched verification ID
    pub verification_hash: Option<String>,
}

impl AuditEntry {
    /// Billing event ID
    pub fn billing_event_id(&self) -> BillingEventId {
        self.billing.id
    }

    /// Matched verification ID, if any
    pub fn matched_verification_id(&self) -> Option<VerificationEventId> {
        self.matched_verification.as_ref().map(|v| v.id)
    }
}
