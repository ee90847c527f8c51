//! Human-readable preview of what a campaign will send.

use std::fmt;

use serde::Serialize;

use super::model::ValidatedDataset;

const PREVIEW_MESSAGE_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewEntry {
    pub row_number: usize,
    pub identifier: String,
    /// Message body, cut to 100 characters.
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub entries: Vec<PreviewEntry>,
    pub remaining: usize,
    pub skipped: usize,
}

/// First `limit` deliverable records of `dataset`.
pub fn preview(dataset: &ValidatedDataset, limit: usize) -> Preview {
    let entries = dataset
        .records
        .iter()
        .take(limit)
        .map(|record| PreviewEntry {
            row_number: record.row_number(),
            identifier: record.identifier.clone(),
            message: truncate(&record.message_body, PREVIEW_MESSAGE_CHARS),
        })
        .collect::<Vec<_>>();
    Preview {
        remaining: dataset.records.len().saturating_sub(entries.len()),
        skipped: dataset.skipped.len(),
        entries,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

impl fmt::Display for Preview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}. To: {}", entry.row_number, entry.identifier)?;
            writeln!(f, "   Message: {}", entry.message)?;
        }
        if self.remaining > 0 {
            writeln!(f, "... and {} more recipients", self.remaining)?;
        }
        if self.skipped > 0 {
            writeln!(f, "({} rows will be skipped)", self.skipped)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{RawDataset, validate};

    #[test]
    fn limits_entries_and_truncates() {
        let long = "x".repeat(150);
        let raw = RawDataset::from_records(
            &["contact", "message"],
            &[&["A", "hi"], &["B", long.as_str()], &["", "no"], &["C", "yo"]],
        );
        let dataset = validate(&raw, "contact", "message").unwrap();

        let preview = preview(&dataset, 2);
        assert_eq!(preview.entries.len(), 2);
        assert_eq!(preview.entries[1].message.chars().count(), 103);
        assert!(preview.entries[1].message.ends_with("..."));
        assert_eq!(preview.remaining, 1);
        assert_eq!(preview.skipped, 1);

        let text = preview.to_string();
        assert!(text.starts_with("1. To: A\n"));
        assert!(text.contains("... and 1 more recipients"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "é".repeat(101);
        let cut = truncate(&s, 100);
        assert_eq!(cut.chars().count(), 103);
        assert_eq!(truncate("short", 100), "short");
    }
}
