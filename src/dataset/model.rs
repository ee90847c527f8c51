//! Dataset types.

use serde::{Deserialize, Serialize};

/// Tabular input as read from disk: a header row plus string cells.
///
/// Rows shorter than the header are padded with empty cells on access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawDataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Build a dataset from `(column, value)` pairs per row.
    pub fn from_records(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One validated (identifier, message) pair awaiting delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRecord {
    /// Contact name or phone number.
    pub identifier: String,
    pub message_body: String,
    /// Zero-based position in the source file (header excluded).
    pub row_index: usize,
}

impl RecipientRecord {
    pub fn new(identifier: impl Into<String>, message_body: impl Into<String>, row_index: usize) -> Self {
        Self {
            identifier: identifier.into(),
            message_body: message_body.into(),
            row_index,
        }
    }

    /// One-based row number for humans.
    pub fn row_number(&self) -> usize {
        self.row_index + 1
    }
}

/// A row excluded during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    /// Whatever the row held, trimmed; fields may be empty.
    pub record: RecipientRecord,
    pub reason: String,
}

/// Result of checking a dataset before delivery.
///
/// `issues` block the run; `warnings` are informational.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty() && self.valid_rows > 0
    }
}

/// A dataset that passed validation, ready for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedDataset {
    /// Deliverable records in source order.
    pub records: Vec<RecipientRecord>,
    /// Rows excluded for missing data; they are classified as skipped.
    pub skipped: Vec<SkippedRow>,
    pub report: ValidationReport,
}

impl ValidatedDataset {
    /// Rows the campaign will account for: deliverable records plus skipped
    /// rows. Not the deliverable count, which is `records.len()`.
    pub fn accounted_rows(&self) -> usize {
        self.records.len() + self.skipped.len()
    }
}
