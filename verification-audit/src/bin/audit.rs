//! Verification audit CLI
//!
//! Usage: `verification-audit [config.toml]`
//!
//! Without a config file, settings come from `AUDIT_*` environment
//! variables. The audit filter is read from `AUDIT_DATE_FROM`,
//! `AUDIT_DATE_TO` (RFC 3339 or `YYYY-MM-DD`), `AUDIT_DEPARTMENT`,
//! `AUDIT_SEARCH` and `AUDIT_STATUS`.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use verification_audit::{
    export, AuditFilter, AuditService, Config, JsonFileSource, VerificationStatus,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => Config::from_env()?,
    };

    tracing::info!(
        "Starting {} v{} (tolerance {} min)",
        config.service_name,
        config.service_version,
        config.reconciliation.tolerance_minutes.minutes()
    );

    let filter = filter_from_env()?;

    let service = AuditService::new(
        JsonFileSource::new(&config.sources.billing_path),
        JsonFileSource::new(&config.sources.verification_path),
        &config,
    )?;

    let report = service.run_audit(&filter).await?;
    let summary = &report.summary;

    tracing::info!(
        "Audit complete: {} bills, {} verified, {} missing, {} pending, {} time mismatches ({}% verified)",
        summary.counts.total,
        summary.counts.verified,
        summary.counts.missing,
        summary.counts.pending,
        summary.counts.time_mismatches,
        summary.verification_rate_percent()
    );

    for entry in report.entries.iter().filter(|e| e.status == VerificationStatus::TimeMismatch) {
        if let Some(minutes) = entry.time_difference_minutes {
            tracing::warn!(
                "{} billed {} for {}: verification {} min {} billing",
                entry.billing.billed_by,
                entry.billing.service_code,
                entry.billing.patient_name,
                minutes.abs(),
                if minutes > 0 { "after" } else { "before" }
            );
        }
    }

    let path = export::export_to_dir(
        &config.export.output_dir,
        report.generated_at.date_naive(),
        &report.entries,
    )?;

    println!("{}", serde_json::to_string_pretty(summary)?);
    tracing::info!("Report written to {}", path.display());
    Ok(())
}

fn filter_from_env() -> Result<AuditFilter> {
    let mut filter = AuditFilter::default();

    if let Ok(raw) = std::env::var("AUDIT_DATE_FROM") {
        let start_of_day = NaiveTime::from_hms_opt(0, 0, 0).context("start of day")?;
        filter.date_from = Some(parse_bound(&raw, start_of_day)?);
    }
    if let Ok(raw) = std::env::var("AUDIT_DATE_TO") {
        let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).context("end of day")?;
        filter.date_to = Some(parse_bound(&raw, end_of_day)?);
    }
    if let Ok(department) = std::env::var("AUDIT_DEPARTMENT") {
        filter.department = Some(department);
    }
    if let Ok(search) = std::env::var("AUDIT_SEARCH") {
        filter.search_text = Some(search);
    }
    if let Ok(raw) = std::env::var("AUDIT_STATUS") {
        filter.status = Some(raw.parse()?);
    }

    Ok(filter)
}

/// RFC 3339 timestamp, or a bare date completed with `time_of_day`
fn parse_bound(raw: &str, time_of_day: NaiveTime) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date {:?}", raw))?;
    Ok(Utc.from_utc_datetime(&date.and_time(time_of_day)))
}
