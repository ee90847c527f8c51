//! Reading recipient datasets from disk.

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use serde_json::Value;
use tracing::{debug, info};

use crate::dataset::RawDataset;
use crate::error::DatasetError;

/// Sample rows written by [`write_sample_dataset`].
const SAMPLE_ROWS: [(&str, &str); 5] = [
    (
        "John Doe",
        "Hello John! This is a test message from our automation tool. Hope you are doing well!",
    ),
    (
        "+1234567890",
        "Hi there! This is an automated message to test our bulk messaging system.",
    ),
    (
        "Jane Smith",
        "Hey Jane! Just wanted to reach out and say hello. This message was sent automatically.",
    ),
    (
        "Mike Johnson",
        "Hi Mike! Hope you are having a great day. This is a sample automated message.",
    ),
    (
        "+9876543210",
        "Hello! This is a test of our messaging system. Please ignore this message.",
    ),
];

/// Load a dataset, picking the parser from the file extension.
///
/// Supported: `.csv`/`.txt` (comma), `.tsv` (tab), `.json` (array of objects),
/// and spreadsheets (`.xlsx`, `.xlsm`, `.xls`, `.ods`; first sheet only).
pub fn load_dataset(path: &Path) -> Result<RawDataset, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let dataset = match extension.as_str() {
        "csv" | "txt" => read_delimited(path, b',')?,
        "tsv" => read_delimited(path, b'\t')?,
        "json" => read_json(path)?,
        "xlsx" | "xlsm" | "xls" | "ods" => read_spreadsheet(path)?,
        _ => {
            return Err(DatasetError::UnsupportedFormat {
                extension: if extension.is_empty() {
                    "(none)".to_string()
                } else {
                    format!(".{extension}")
                },
            });
        }
    };

    info!(
        path = %path.display(),
        rows = dataset.len(),
        columns = ?dataset.columns,
        "Loaded dataset"
    );
    Ok(dataset)
}

fn unreadable(path: &Path, reason: impl std::fmt::Display) -> DatasetError {
    DatasetError::UnreadableSource {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<RawDataset, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(|e| unreadable(path, e))?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| unreadable(path, e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    if columns.iter().all(String::is_empty) {
        return Err(unreadable(path, "missing header row"));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| unreadable(path, e))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    debug!(path = %path.display(), rows = rows.len(), "Parsed delimited file");
    Ok(RawDataset::new(columns, rows))
}

fn read_spreadsheet(path: &Path) -> Result<RawDataset, DatasetError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| unreadable(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| unreadable(path, "workbook has no sheets"))?
        .map_err(|e| unreadable(path, e))?;

    let mut rows = range.rows();
    let columns: Vec<String> = rows
        .next()
        .map(|header| header.iter().map(|c| cell_text(c).trim().to_string()).collect())
        .unwrap_or_default();
    if columns.iter().all(String::is_empty) {
        return Err(unreadable(path, "missing header row"));
    }

    let rows: Vec<Vec<String>> = rows
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    debug!(path = %path.display(), rows = rows.len(), "Parsed spreadsheet");
    Ok(RawDataset::new(columns, rows))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string(),
    }
}

fn read_json(path: &Path) -> Result<RawDataset, DatasetError> {
    let text = std::fs::read_to_string(path).map_err(|e| unreadable(path, e))?;
    let value: Value = serde_json::from_str(&text).map_err(|e| unreadable(path, e))?;
    let Value::Array(items) = value else {
        return Err(unreadable(path, "expected a JSON array of objects"));
    };

    let mut columns: Vec<String> = Vec::new();
    for item in &items {
        let Value::Object(map) = item else {
            return Err(unreadable(path, "expected a JSON array of objects"));
        };
        for key in map.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let rows = items
        .iter()
        .map(|item| {
            columns
                .iter()
                .map(|column| match item.get(column) {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                })
                .collect()
        })
        .collect();

    Ok(RawDataset::new(columns, rows))
}

/// Write the sample contacts file used to bootstrap a campaign.
pub fn write_sample_dataset(path: &Path) -> Result<(), DatasetError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| DatasetError::Io(e.into()))?;
    writer
        .write_record(["contact", "message"])
        .map_err(|e| DatasetError::Io(e.into()))?;
    for (contact, message) in SAMPLE_ROWS {
        writer
            .write_record([contact, message])
            .map_err(|e| DatasetError::Io(e.into()))?;
    }
    writer.flush()?;
    info!(path = %path.display(), "Sample contacts file created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn loads_csv_with_quoted_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.csv");
        fs::write(
            &path,
            "contact,message\nAnn,\"Hi, Ann!\"\n\"Bob\",\"line one\nline two\"\n",
        )
        .unwrap();

        let raw = load_dataset(&path).unwrap();
        assert_eq!(raw.columns, vec!["contact", "message"]);
        assert_eq!(raw.len(), 2);
        assert_eq!(raw.cell(0, 1), "Hi, Ann!");
        assert_eq!(raw.cell(1, 1), "line one\nline two");
    }

    #[test]
    fn loads_tsv_and_strips_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.tsv");
        fs::write(&path, "\u{feff}contact\tmessage\nAnn\thello\n").unwrap();

        let raw = load_dataset(&path).unwrap();
        assert_eq!(raw.columns, vec!["contact", "message"]);
        assert_eq!(raw.cell(0, 0), "Ann");
    }

    #[test]
    fn loads_json_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.json");
        fs::write(
            &path,
            r#"[{"contact": "Ann", "message": "hi"}, {"contact": 5551234, "message": null, "name": "x"}]"#,
        )
        .unwrap();

        let raw = load_dataset(&path).unwrap();
        assert_eq!(raw.columns, vec!["contact", "message", "name"]);
        assert_eq!(raw.cell(1, 0), "5551234");
        assert_eq!(raw.cell(1, 1), "");
        assert_eq!(raw.cell(0, 2), "");
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_dataset(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::NotFound { .. }));
    }

    #[test]
    fn loads_first_sheet_of_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "contact").unwrap();
        sheet.write_string(0, 1, "message").unwrap();
        sheet.write_string(1, 0, "Ann").unwrap();
        sheet.write_string(1, 1, "hello").unwrap();
        sheet.write_number(2, 0, 5551234.0).unwrap();
        sheet.write_string(2, 1, "hi").unwrap();
        workbook.save(&path).unwrap();

        let raw = load_dataset(&path).unwrap();
        assert_eq!(raw.columns, vec!["contact", "message"]);
        assert_eq!(raw.len(), 2);
        assert_eq!(raw.cell(0, 0), "Ann");
        assert_eq!(raw.cell(1, 0), "5551234");
    }

    #[test]
    fn corrupt_workbook_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.xlsx");
        fs::write(&path, b"PK\x03\x04").unwrap();

        let err = load_dataset(&path).unwrap_err();
        assert!(matches!(err, DatasetError::UnreadableSource { .. }));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.docx");
        fs::write(&path, b"nope").unwrap();

        let err = load_dataset(&path).unwrap_err();
        assert!(matches!(err, DatasetError::UnsupportedFormat { ref extension } if extension == ".docx"));
    }

    #[test]
    fn malformed_json_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.json");
        fs::write(&path, r#"{"contact": "Ann"}"#).unwrap();

        let err = load_dataset(&path).unwrap_err();
        assert!(matches!(err, DatasetError::UnreadableSource { .. }));
    }

    #[test]
    fn invalid_utf8_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.csv");
        fs::write(&path, b"contact,message\n\xff\xfe,hi\n").unwrap();

        let err = load_dataset(&path).unwrap_err();
        assert!(matches!(err, DatasetError::UnreadableSource { .. }));
    }

    #[test]
    fn sample_file_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");
        write_sample_dataset(&path).unwrap();

        let raw = load_dataset(&path).unwrap();
        assert_eq!(raw.columns, vec!["contact", "message"]);
        assert_eq!(raw.len(), 5);
        assert_eq!(raw.cell(1, 0), "+1234567890");
    }
}
