//! CSV export of audit entries

use crate::types::AuditEntry;
use crate::Result;
use chrono::{NaiveDate, SecondsFormat};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Column header of the audit export
pub const CSV_HEADER: [&str; 10] = [
    "Patient Name",
    "Service",
    "Billed By",
    "Billed At",
    "Verified By",
    "Fingerprint Status",
    "Timestamp",
    "Department",
    "Amount",
    "Service Code",
];

/// Write entries as CSV (header + one row per entry)
pub fn write_csv<W: Write>(writer: W, entries: &[AuditEntry]) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(CSV_HEADER)?;

    for entry in entries {
        let (verified_by, timestamp) = match &entry.matched_verification {
            Some(v) => (
                v.verified_by.to_string(),
                v.verified_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            None => (String::new(), String::new()),
        };
        let billed_at = entry.billing.billed_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let amount = entry.billing.amount.to_string();

        out.write_record([
            entry.billing.patient_name.as_str(),
            entry.billing.service_description.as_str(),
            entry.billing.billed_by.as_str(),
            billed_at.as_str(),
            verified_by.as_str(),
            entry.status.as_str(),
            timestamp.as_str(),
            entry.billing.department.as_str(),
            amount.as_str(),
            entry.billing.service_code.as_str(),
        ])?;
    }

    out.flush()?;
    Ok(())
}

/// Render entries as a CSV string
pub fn to_csv_string(entries: &[AuditEntry]) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(&mut buf, entries)?;
    String::from_utf8(buf).map_err(|e| crate::Error::Export(e.to_string()))
}

/// `verification-audit-YYYY-MM-DD.csv`
pub fn default_file_name(date: NaiveDate) -> String {
    format!("verification-audit-{}.csv", date.format("%Y-%m-%d"))
}

/// Write entries to `<dir>/verification-audit-<date>.csv`, creating `dir` if needed
pub fn export_to_dir(dir: &Path, date: NaiveDate, entries: &[AuditEntry]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(default_file_name(date));
    let file = std::fs::File::create(&path)?;
    write_csv(std::io::BufWriter::new(file), entries)?;

    info!("Exported {} audit entries to {}", entries.len(), path.display());
    Ok(path)
}
