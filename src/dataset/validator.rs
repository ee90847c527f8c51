//! Turns raw rows into deliverable recipient records.
//!
//! Validation is a pure function of the raw dataset and the column names, so
//! running it twice yields identical records and an identical report.

use tracing::{debug, warn};

use crate::config::ColumnNames;
use crate::dataset::phone::{is_valid_phone, looks_like_phone};
use crate::dataset::{RawDataset, RecipientRecord, SkippedRow, ValidatedDataset, ValidationReport};

/// Platform ceiling for a single message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Cell values treated as missing after trimming (case-insensitive).
const BLANK_MARKERS: [&str; 3] = ["nan", "none", "null"];

fn is_blank(value: &str) -> bool {
    value.is_empty() || BLANK_MARKERS.iter().any(|m| value.eq_ignore_ascii_case(m))
}

/// Validates raw rows against the configured contact/message columns.
#[derive(Debug, Clone)]
pub struct DatasetValidator {
    columns: ColumnNames,
    row_diagnostics: bool,
}

impl DatasetValidator {
    pub fn new(columns: ColumnNames) -> Self {
        Self {
            columns,
            row_diagnostics: false,
        }
    }

    /// Also emit one warning per dropped row instead of aggregate counts only.
    pub fn with_row_diagnostics(mut self, enabled: bool) -> Self {
        self.row_diagnostics = enabled;
        self
    }

    /// Validate `raw`, returning the cleaned dataset or the blocking report.
    pub fn validate(&self, raw: &RawDataset) -> Result<ValidatedDataset, ValidationReport> {
        let mut report = ValidationReport {
            total_rows: raw.len(),
            ..Default::default()
        };

        let contact_idx = raw.column_index(&self.columns.contact);
        let message_idx = raw.column_index(&self.columns.message);
        if contact_idx.is_none() {
            report
                .issues
                .push(format!("Missing required column: {}", self.columns.contact));
        }
        if message_idx.is_none() {
            report
                .issues
                .push(format!("Missing required column: {}", self.columns.message));
        }
        let (Some(contact_idx), Some(message_idx)) = (contact_idx, message_idx) else {
            warn!(issues = ?report.issues, available = ?raw.columns, "Dataset rejected");
            return Err(report);
        };

        let mut records = Vec::new();
        let mut skipped = Vec::new();
        let mut empty_contacts = 0usize;
        let mut empty_messages = 0usize;
        let mut long_messages = 0usize;
        let mut malformed_phones = 0usize;

        for row_index in 0..raw.len() {
            let identifier = raw.cell(row_index, contact_idx).trim();
            let message = raw.cell(row_index, message_idx).trim();
            let contact_blank = is_blank(identifier);
            let message_blank = is_blank(message);

            if contact_blank {
                empty_contacts += 1;
            }
            if message_blank {
                empty_messages += 1;
            }
            if message.chars().count() > MAX_MESSAGE_CHARS {
                long_messages += 1;
            }

            if contact_blank || message_blank {
                let reason = match (contact_blank, message_blank) {
                    (true, true) => "missing contact and message",
                    (true, false) => "missing contact",
                    _ => "missing message",
                };
                if self.row_diagnostics {
                    report
                        .warnings
                        .push(format!("Row {}: {reason}", row_index + 1));
                }
                debug!(row = row_index + 1, reason, "Row excluded");
                skipped.push(SkippedRow {
                    record: RecipientRecord::new(identifier, message, row_index),
                    reason: reason.to_string(),
                });
                continue;
            }

            if looks_like_phone(identifier) && !is_valid_phone(identifier) {
                malformed_phones += 1;
            }
            records.push(RecipientRecord::new(identifier, message, row_index));
        }

        report.valid_rows = records.len();

        if empty_contacts > 0 {
            report
                .warnings
                .push(format!("{empty_contacts} rows have empty contacts"));
        }
        if empty_messages > 0 {
            report
                .warnings
                .push(format!("{empty_messages} rows have empty messages"));
        }
        if long_messages > 0 {
            report.warnings.push(format!(
                "{long_messages} messages are longer than {MAX_MESSAGE_CHARS} characters"
            ));
        }
        if malformed_phones > 0 {
            report.warnings.push(format!(
                "{malformed_phones} contacts look like malformed phone numbers"
            ));
        }

        if records.is_empty() {
            report.issues.push("No valid rows found".to_string());
            warn!(total_rows = report.total_rows, "Dataset has no valid rows");
            return Err(report);
        }

        debug!(
            valid = report.valid_rows,
            skipped = skipped.len(),
            warnings = report.warnings.len(),
            "Dataset validated"
        );

        Ok(ValidatedDataset {
            records,
            skipped,
            report,
        })
    }
}

/// Validate with the default (aggregate-only) diagnostics.
pub fn validate(
    raw: &RawDataset,
    contact_field: &str,
    message_field: &str,
) -> Result<ValidatedDataset, ValidationReport> {
    DatasetValidator::new(ColumnNames {
        contact: contact_field.to_string(),
        message: message_field.to_string(),
    })
    .validate(raw)
}
