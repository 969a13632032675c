//! Configuration for verification audit

use crate::reconciliation::ReconciliationPolicy;
use crate::types::{ConfidenceScore, Tolerance};
use crate::{Error, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Verification audit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Matching rules
    pub reconciliation: ReconciliationConfig,

    /// Billing/verification collaborators
    pub sources: SourcesConfig,

    /// CSV export
    pub export: ExportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "verification-audit".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            reconciliation: ReconciliationConfig::default(),
            sources: SourcesConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

/// Matching rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Tolerance window (minutes, inclusive, symmetric)
    pub tolerance_minutes: Tolerance,

    /// Successful scans below this confidence count as unconfirmed attempts
    pub min_confidence: Option<ConfidenceScore>,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            tolerance_minutes: Tolerance::default(), // 5 minutes
            min_confidence: None,                    // informational only
        }
    }
}

/// How the two stores are queried for one audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Fetch both stores in parallel; verifications scoped by time window only
    #[default]
    Concurrent,
    /// Fetch bills first, then verifications for the billed patients only
    SubjectScoped,
}

/// Collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// JSON array of billing events
    pub billing_path: PathBuf,

    /// JSON array of verification events
    pub verification_path: PathBuf,

    /// Widening of the verification query window on each side (minutes)
    pub matching_margin_minutes: i64,

    /// Fetch strategy
    pub fetch_strategy: FetchStrategy,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            billing_path: PathBuf::from("./data/billing_events.json"),
            verification_path: PathBuf::from("./data/verification_events.json"),
            matching_margin_minutes: 24 * 60, // one day
            fetch_strategy: FetchStrategy::Concurrent,
        }
    }
}

impl SourcesConfig {
    /// Verification query widening as a duration
    pub fn matching_margin(&self) -> Result<Duration> {
        let minutes = self.matching_margin_minutes;
        if minutes < 0 {
            return Err(Error::Config(format!(
                "matching_margin_minutes must be non-negative, got {}",
                minutes
            )));
        }
        Duration::try_minutes(minutes).ok_or_else(|| {
            Error::Config(format!("matching_margin_minutes of {} is out of range", minutes))
        })
    }
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory CSV reports are written to
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data/exports"),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(raw) = std::env::var("AUDIT_TOLERANCE_MINUTES") {
            config.reconciliation.tolerance_minutes = Tolerance::parse(&raw)?;
        }

        if let Ok(raw) = std::env::var("AUDIT_MIN_CONFIDENCE") {
            let score = raw.trim().parse::<u8>().map_err(|_| {
                Error::Config(format!("AUDIT_MIN_CONFIDENCE must be 0-100, got {:?}", raw))
            })?;
            config.reconciliation.min_confidence = Some(ConfidenceScore::new(score));
        }

        if let Ok(path) = std::env::var("AUDIT_BILLING_PATH") {
            config.sources.billing_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("AUDIT_VERIFICATION_PATH") {
            config.sources.verification_path = PathBuf::from(path);
        }

        if let Ok(raw) = std::env::var("AUDIT_MATCHING_MARGIN_MINUTES") {
            config.sources.matching_margin_minutes = raw.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "AUDIT_MATCHING_MARGIN_MINUTES must be a number, got {:?}",
                    raw
                ))
            })?;
        }

        if let Ok(raw) = std::env::var("AUDIT_FETCH_STRATEGY") {
            config.sources.fetch_strategy = match raw.trim() {
                "concurrent" => FetchStrategy::Concurrent,
                "subject_scoped" => FetchStrategy::SubjectScoped,
                other => {
                    return Err(Error::Config(format!("Unknown fetch strategy: {}", other)));
                }
            };
        }

        if let Ok(dir) = std::env::var("AUDIT_EXPORT_DIR") {
            config.export.output_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the audit cannot run with
    pub fn validate(&self) -> Result<()> {
        self.sources.matching_margin().map(|_| ())
    }

    /// Matching policy for the reconciliation engine
    pub fn policy(&self) -> ReconciliationPolicy {
        ReconciliationPolicy {
            tolerance: self.reconciliation.tolerance_minutes,
            min_confidence: self.reconciliation.min_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "verification-audit");
        assert_eq!(config.reconciliation.tolerance_minutes.minutes(), 5);
        assert!(config.reconciliation.min_confidence.is_none());
        assert_eq!(config.sources.fetch_strategy, FetchStrategy::Concurrent);
    }

    #[test]
    fn test_toml_round_trip_with_overrides() {
        let raw = r#"
            service_name = "verification-audit"
            service_version = "0.1.0"

            [reconciliation]
            tolerance_minutes = 10
            min_confidence = 85

            [sources]
            billing_path = "bills.json"
            verification_path = "scans.json"
            matching_margin_minutes = 60
            fetch_strategy = "subject_scoped"

            [export]
            output_dir = "out"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.reconciliation.tolerance_minutes.minutes(), 10);
        assert_eq!(
            config.reconciliation.min_confidence,
            Some(ConfidenceScore::RECOMMENDED_FLOOR)
        );
        assert_eq!(config.sources.fetch_strategy, FetchStrategy::SubjectScoped);
        assert_eq!(config.policy().tolerance.minutes(), 10);
    }

    #[test]
    fn test_negative_tolerance_in_file_rejected() {
        let raw = r#"
            service_name = "verification-audit"
            service_version = "0.1.0"

            [reconciliation]
            tolerance_minutes = -5

            [sources]
            billing_path = "bills.json"
            verification_path = "scans.json"
            matching_margin_minutes = 60
            fetch_strategy = "concurrent"

            [export]
            output_dir = "out"
        "#;
        assert!(toml::from_str::<Config>(raw).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.toml");
        let config = Config::default();
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(
            loaded.reconciliation.tolerance_minutes,
            config.reconciliation.tolerance_minutes
        );
    }

    #[test]
    fn test_matching_margin_out_of_range_rejected() {
        let mut config = Config::default();
        config.sources.matching_margin_minutes = -1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.sources.matching_margin_minutes = i64::MAX;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.sources.matching_margin_minutes = 60;
        assert_eq!(config.sources.matching_margin().unwrap(), Duration::minutes(60));
    }

    const ENV_KEYS: [&str; 7] = [
        "AUDIT_TOLERANCE_MINUTES",
        "AUDIT_MIN_CONFIDENCE",
        "AUDIT_BILLING_PATH",
        "AUDIT_VERIFICATION_PATH",
        "AUDIT_MATCHING_MARGIN_MINUTES",
        "AUDIT_FETCH_STRATEGY",
        "AUDIT_EXPORT_DIR",
    ];

    fn with_env(vars: &[(&str, &str)], check: impl FnOnce(Result<Config>)) {
        let saved: Vec<_> = ENV_KEYS.iter().map(|k| (*k, std::env::var(k).ok())).collect();
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
        for (key, value) in vars {
            std::env::set_var(key, value);
        }

        check(Config::from_env());

        for (key, value) in saved {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }

    // Single test so no other test races on the process environment
    #[test]
    fn test_from_env() {
        with_env(&[], |config| {
            let config = config.unwrap();
            assert_eq!(config.reconciliation.tolerance_minutes, Tolerance::default());
            assert_eq!(config.sources.fetch_strategy, FetchStrategy::Concurrent);
        });

        with_env(
            &[
                ("AUDIT_TOLERANCE_MINUTES", "10"),
                ("AUDIT_MIN_CONFIDENCE", "85"),
                ("AUDIT_BILLING_PATH", "bills.json"),
                ("AUDIT_MATCHING_MARGIN_MINUTES", "90"),
                ("AUDIT_FETCH_STRATEGY", "subject_scoped"),
                ("AUDIT_EXPORT_DIR", "out"),
            ],
            |config| {
                let config = config.unwrap();
                assert_eq!(config.reconciliation.tolerance_minutes.minutes(), 10);
                assert_eq!(
                    config.reconciliation.min_confidence,
                    Some(ConfidenceScore::RECOMMENDED_FLOOR)
                );
                assert_eq!(config.sources.billing_path, PathBuf::from("bills.json"));
                assert_eq!(config.sources.matching_margin_minutes, 90);
                assert_eq!(config.sources.fetch_strategy, FetchStrategy::SubjectScoped);
                assert_eq!(config.export.output_dir, PathBuf::from("out"));
            },
        );

        with_env(&[("AUDIT_TOLERANCE_MINUTES", "five")], |config| {
            assert!(matches!(config, Err(Error::InvalidTolerance(_))));
        });
        with_env(&[("AUDIT_TOLERANCE_MINUTES", "-5")], |config| {
            assert!(matches!(config, Err(Error::InvalidTolerance(_))));
        });
        with_env(&[("AUDIT_FETCH_STRATEGY", "eventually")], |config| {
            assert!(matches!(config, Err(Error::Config(_))));
        });
        with_env(&[("AUDIT_MIN_CONFIDENCE", "high")], |config| {
            assert!(matches!(config, Err(Error::Config(_))));
        });
        let huge = i64::MAX.to_string();
        with_env(&[("AUDIT_MATCHING_MARGIN_MINUTES", huge.as_str())], |config| {
            assert!(matches!(config, Err(Error::Config(_))));
        });
    }
}
