//! Spreadsheet export of merged findings as CSV.
//!
//! Models are free to add fields beyond the three the engine reads
//! (`regulation_reference`, `severity`, ...), so the header is the union of
//! every key seen, in first-seen order, followed by `from_model`.

use crate::error::AuditError;
use crate::finding::{MergedFinding, SOURCE_KEY};
use crate::pipeline::annotate::write_atomic;
use serde_json::Value;
use std::path::Path;
use tracing::info;

/// Column names for `findings`.
pub fn header(findings: &[MergedFinding]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for finding in findings {
        for key in finding.raw.fields().keys() {
            if key != SOURCE_KEY && !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns.push(SOURCE_KEY.to_string());
    columns
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Serialise `findings` to CSV bytes.
pub fn findings_to_csv(findings: &[MergedFinding]) -> Result<Vec<u8>, csv::Error> {
    let columns = header(findings);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;

    for finding in findings {
        let row = columns.iter().map(|column| {
            if column == SOURCE_KEY {
                finding.source_tag.clone()
            } else {
                cell(finding.raw.fields().get(column))
            }
        });
        writer.write_record(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Write the findings spreadsheet to `path`.
pub fn write_findings_csv(path: &Path, findings: &[MergedFinding]) -> Result<(), AuditError> {
    let bytes = findings_to_csv(findings).map_err(|e| AuditError::SpreadsheetFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    write_atomic(path, &bytes)?;
    info!("Findings spreadsheet written to {} ({} rows)", path.display(), findings.len());
    Ok(())
}
