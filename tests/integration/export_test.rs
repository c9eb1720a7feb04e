//! Export integration tests.
//!
//! Writes per-target and combined CSV files and reads them back.

use pretty_assertions::assert_eq;
use sql_fanout::db::{Table, Value};
use sql_fanout::export::CsvExporter;
use sql_fanout::reconcile::combine;
use tempfile::tempdir;

fn read_back(path: &std::path::Path, delimiter: u8) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect()
}

#[test]
fn test_combined_file_round_trips() {
    let dir = tempdir().unwrap();
    let a = Table::with_data(
        ["Id", "Note"],
        vec![vec![Value::Int(1), Value::from("multi\nline")]],
    );
    let b = Table::with_data(["Id", "Flag"], vec![vec![Value::Int(2), Value::Bool(false)]]);

    let path = dir.path().join("out").join("combined.csv");
    CsvExporter::default()
        .write_file(&combine([("A", &a), ("B", &b)]), &path)
        .unwrap();

    assert_eq!(
        read_back(&path, b','),
        vec![
            vec!["ServerName", "Id", "Note", "Flag"],
            vec!["A", "1", "multi\nline", ""],
            vec!["B", "2", "", "false"],
        ]
    );
}

#[test]
fn test_semicolon_delimiter() {
    let dir = tempdir().unwrap();
    let table = Table::with_data(["a", "b"], vec![vec![Value::Float(2.5), Value::from("x;y")]]);
    let path = dir.path().join("t.csv");

    CsvExporter::new(b';').write_file(&table, &path).unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a;b\r\n2.5;\"x;y\"\r\n");
    assert_eq!(read_back(&path, b';'), vec![vec!["a", "b"], vec!["2.5", "x;y"]]);
}

#[test]
fn test_per_target_names_are_sanitized() {
    let dir = tempdir().unwrap();
    let table = Table::with_data(["x"], vec![vec![Value::Int(1)]]);

    let paths = CsvExporter::default()
        .export_per_target(&[("db/1", &table), ("db:1", &table), ("plain", &table)], dir.path())
        .unwrap();

    let names: Vec<String> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["db_1.csv", "db_1_2.csv", "plain.csv"]);
}

#[test]
fn test_unwritable_destination_is_export_error() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "not a directory").unwrap();

    let result = CsvExporter::default().write_file(&Table::new(), &blocker.join("out.csv"));
    assert!(matches!(
        result,
        Err(sql_fanout::error::FanoutError::Export(_))
    ));
}
