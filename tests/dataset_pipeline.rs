//! Load, template and validate contact files from disk.

use std::collections::HashMap;
use std::fs;

use bulk_courier::config::ColumnNames;
use bulk_courier::dataset::{DatasetValidator, load_dataset, write_sample_dataset};
use bulk_courier::error::DatasetError;
use bulk_courier::templates::{apply_template, builtin};

#[test]
fn sample_file_validates_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample_contacts.csv");
    write_sample_dataset(&path).unwrap();

    let raw = load_dataset(&path).unwrap();
    let dataset = DatasetValidator::new(ColumnNames::default())
        .validate(&raw)
        .unwrap();
    assert_eq!(dataset.records.len(), 5);
    assert!(dataset.skipped.is_empty());
    assert_eq!(dataset.report.valid_rows, 5);
}

#[test]
fn validation_is_idempotent_on_loaded_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contacts.csv");
    fs::write(&path, "contact,message\n A ,hi\n,hi\nB,\nnan,x\n").unwrap();

    let raw = load_dataset(&path).unwrap();
    let validator = DatasetValidator::new(ColumnNames::default());
    let first = validator.validate(&raw).unwrap();
    let second = validator.validate(&raw).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.records.len(), 1);
    assert_eq!(first.records[0].identifier, "A");
    assert_eq!(first.skipped.len(), 3);
}

#[test]
fn custom_columns_and_missing_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contacts.json");
    fs::write(&path, r#"[{"name": "Ann", "text": "hello"}]"#).unwrap();
    let raw = load_dataset(&path).unwrap();

    let custom = ColumnNames {
        contact: "name".into(),
        message: "text".into(),
    };
    assert_eq!(DatasetValidator::new(custom).validate(&raw).unwrap().records.len(), 1);

    let report = DatasetValidator::new(ColumnNames::default())
        .validate(&raw)
        .unwrap_err();
    assert!(report.issues.iter().any(|i| i == "Missing required column: contact"));
    let err = DatasetError::Rejected(report);
    assert!(err.to_string().starts_with("Dataset rejected: Missing required column"));
}

#[test]
fn spreadsheet_rows_validate_like_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contacts.xlsx");
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "contact").unwrap();
    sheet.write_string(0, 1, "message").unwrap();
    sheet.write_string(1, 0, "+15550001111").unwrap();
    sheet.write_string(1, 1, "Hello!").unwrap();
    sheet.write_string(2, 1, "no contact").unwrap();
    workbook.save(&path).unwrap();

    let raw = load_dataset(&path).unwrap();
    let dataset = DatasetValidator::new(ColumnNames::default())
        .validate(&raw)
        .unwrap();
    assert_eq!(dataset.records.len(), 1);
    assert_eq!(dataset.records[0].identifier, "+15550001111");
    assert_eq!(dataset.skipped.len(), 1);
}

#[test]
fn unknown_extensions_are_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contacts.pdf");
    fs::write(&path, b"%PDF-1.4").unwrap();
    assert!(matches!(
        load_dataset(&path),
        Err(DatasetError::UnsupportedFormat { .. })
    ));
}

#[test]
fn template_builds_message_column_before_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contacts.csv");
    fs::write(&path, "contact,name,event,date\n+15550001111,Ann,launch,Friday\n").unwrap();
    let raw = load_dataset(&path).unwrap();

    let defaults: HashMap<String, String> = HashMap::new();
    let raw = apply_template(&raw, builtin("reminder").unwrap(), "message", &defaults).unwrap();
    let dataset = DatasetValidator::new(ColumnNames::default())
        .validate(&raw)
        .unwrap();
    assert_eq!(
        dataset.records[0].message_body,
        "Hello Ann, This is a friendly reminder about launch scheduled for Friday. Looking forward to seeing you there!"
    );
}
