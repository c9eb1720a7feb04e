//! End-to-end fan-out tests against SQLite databases.
//!
//! Runs the real driver connector, then reconciles and exports the results.

use super::{seed_sqlite, sqlite_target};
use pretty_assertions::assert_eq;
use sql_fanout::db::{DriverConnector, MockConnector, MockScript, Table, Value};
use sql_fanout::error::FanoutError;
use sql_fanout::export::CsvExporter;
use sql_fanout::query::{QueryRunner, RunStatus};
use sql_fanout::reconcile::combine;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn runner() -> QueryRunner {
    QueryRunner::new(Arc::new(DriverConnector::new(Duration::from_secs(5))))
}

fn render(table: &Table) -> String {
    let mut buf = Vec::new();
    CsvExporter::default().write_to(table, &mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}

#[tokio::test]
async fn test_union_of_different_schemas() {
    let dir = tempdir().unwrap();
    let a = seed_sqlite(
        dir.path(),
        "a",
        "CREATE TABLE users (Id INTEGER, Name TEXT); INSERT INTO users VALUES (1, 'Alice');",
    )
    .await;
    let b = seed_sqlite(
        dir.path(),
        "b",
        "CREATE TABLE users (id INTEGER, Email TEXT); INSERT INTO users VALUES (2, 'bob@x.com');",
    )
    .await;
    let targets = vec![sqlite_target("A", &a), sqlite_target("B", &b)];

    let results = runner()
        .execute_on_all(&targets, "SELECT * FROM users")
        .await
        .unwrap();
    assert_eq!(results.status(), RunStatus::Complete);

    let combined = combine(results.successes());
    assert_eq!(combined.columns, vec!["ServerName", "Id", "Name", "Email"]);
    assert_eq!(
        render(&combined),
        "ServerName,Id,Name,Email\r\nA,1,Alice,\r\nB,2,,bob@x.com\r\n"
    );
}

#[tokio::test]
async fn test_one_connection_failure_among_three() {
    let dir = tempdir().unwrap();
    let seed = "CREATE TABLE t (Id INTEGER); INSERT INTO t VALUES (1), (2);";
    let a = seed_sqlite(dir.path(), "a", seed).await;
    let c = seed_sqlite(dir.path(), "c", seed).await;
    let missing = dir.path().join("missing.db");
    let targets = vec![
        sqlite_target("A", &a),
        sqlite_target("B", &missing),
        sqlite_target("C", &c),
    ];

    let results = runner()
        .execute_on_all(&targets, "SELECT Id FROM t ORDER BY Id")
        .await
        .unwrap();

    assert_eq!(results.status(), RunStatus::Partial);
    let failures = results.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "B");
    assert!(matches!(failures[0].1, FanoutError::Connection(_)));

    let out = dir.path().join("per");
    let exporter = CsvExporter::default();
    let paths = exporter
        .export_per_target(&results.successes(), &out)
        .unwrap();
    assert_eq!(paths, vec![out.join("A.csv"), out.join("C.csv")]);

    let combined = combine(results.successes());
    assert_eq!(combined.row_count(), 4);
    let origins: Vec<&Value> = combined.rows.iter().map(|r| &r[0]).collect();
    assert_eq!(
        origins,
        vec![
            &Value::from("A"),
            &Value::from("A"),
            &Value::from("C"),
            &Value::from("C"),
        ]
    );
}

#[tokio::test]
async fn test_zero_row_target_contributes_columns() {
    let dir = tempdir().unwrap();
    let a = seed_sqlite(
        dir.path(),
        "a",
        "CREATE TABLE users (Id INTEGER, Name TEXT); INSERT INTO users VALUES (1, 'Alice');",
    )
    .await;
    let b = seed_sqlite(dir.path(), "b", "CREATE TABLE users (Id INTEGER, Email TEXT);").await;
    let targets = vec![sqlite_target("A", &a), sqlite_target("B", &b)];

    let results = runner()
        .execute_on_all(&targets, "SELECT * FROM users")
        .await
        .unwrap();

    let empty = results.get("B").and_then(|r| r.table()).unwrap();
    assert_eq!(render(empty), "Id,Email\r\n");

    let combined = combine(results.successes());
    assert_eq!(combined.columns, vec!["ServerName", "Id", "Name", "Email"]);
    assert_eq!(combined.row_count(), 1);
}

#[tokio::test]
async fn test_case_variant_columns_merge() {
    let dir = tempdir().unwrap();
    let a = seed_sqlite(dir.path(), "a", "CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1);").await;
    let b = seed_sqlite(dir.path(), "b", "CREATE TABLE t (ID INTEGER); INSERT INTO t VALUES (2);").await;
    let targets = vec![sqlite_target("a", &a), sqlite_target("b", &b)];

    let results = runner().execute_on_all(&targets, "SELECT * FROM t").await.unwrap();
    let combined = combine(results.successes());

    assert_eq!(combined.columns, vec!["ServerName", "id"]);
    assert_eq!(render(&combined), "ServerName,id\r\na,1\r\nb,2\r\n");
}

#[tokio::test]
async fn test_repeated_runs_are_byte_identical() {
    let dir = tempdir().unwrap();
    let a = seed_sqlite(
        dir.path(),
        "a",
        "CREATE TABLE t (x INTEGER, y REAL, z TEXT); INSERT INTO t VALUES (1, 1.5, 'a,b'), (2, NULL, 'q\"');",
    )
    .await;
    let b = seed_sqlite(dir.path(), "b", "CREATE TABLE t (z TEXT, w INTEGER); INSERT INTO t VALUES ('c', 7);").await;
    let targets = vec![sqlite_target("one", &a), sqlite_target("two", &b)];

    let mut outputs = Vec::new();
    for _ in 0..3 {
        let results = runner().execute_on_all(&targets, "SELECT * FROM t").await.unwrap();
        outputs.push(render(&combine(results.successes())));
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
    assert_eq!(
        outputs[0],
        "ServerName,x,y,z,w\r\none,1,1.5,\"a,b\",\r\none,2,,\"q\"\"\",\r\ntwo,,,c,7\r\n"
    );
}

#[tokio::test]
async fn test_query_error_is_isolated() {
    let dir = tempdir().unwrap();
    let a = seed_sqlite(dir.path(), "a", "CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);").await;
    let b = seed_sqlite(dir.path(), "b", "CREATE TABLE other (x INTEGER);").await;
    let targets = vec![sqlite_target("a", &a), sqlite_target("b", &b)];

    let results = runner().execute_on_all(&targets, "SELECT x FROM t").await.unwrap();

    assert!(results.get("a").unwrap().is_success());
    assert!(matches!(
        results.get("b").and_then(|r| r.error()),
        Some(FanoutError::Query(_))
    ));
}

#[tokio::test]
async fn test_cancellation_releases_every_connection() {
    let connector = MockConnector::new()
        .with_table("fast", Table::with_data(["x"], vec![vec![Value::Int(1)]]))
        .with_script("slow-1", MockScript::Table(Table::new()), Duration::from_secs(60))
        .with_script("slow-2", MockScript::Table(Table::new()), Duration::from_secs(60))
        .with_connection_failure("down", "refused");
    let stats = connector.stats();
    let runner = QueryRunner::new(Arc::new(connector));
    let cancel = runner.cancellation_token();

    let targets: Vec<_> = ["fast", "slow-1", "slow-2", "down"]
        .iter()
        .map(|name| super::sqlite_target(name, std::path::Path::new("unused.db")))
        .collect();

    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });
    let results = runner.execute_on_all(&targets, "SELECT x").await.unwrap();
    handle.await.unwrap();

    assert!(results.get("fast").unwrap().is_success());
    assert_eq!(results.get("slow-1").and_then(|r| r.error()), Some(&FanoutError::Cancelled));
    assert_eq!(results.get("slow-2").and_then(|r| r.error()), Some(&FanoutError::Cancelled));
    assert!(matches!(
        results.get("down").and_then(|r| r.error()),
        Some(FanoutError::Connection(_))
    ));
    assert_eq!(stats.connects(), 3);
    assert_eq!(stats.releases(), 3);
}
