//! Registry integration tests.
//!
//! Registers SQLite targets in a registry file and runs a query on the snapshot.

use super::seed_sqlite;
use pretty_assertions::assert_eq;
use sql_fanout::config::ConnectionConfig;
use sql_fanout::db::{DatabaseBackend, DriverConnector};
use sql_fanout::query::{QueryRunner, RunStatus};
use sql_fanout::registry::{PasswordStorage, Registry, SecretStorage, ServerEntry};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn sqlite_entry(name: &str, path: &Path) -> ServerEntry {
    ServerEntry::new(
        name,
        ConnectionConfig {
            backend: DatabaseBackend::Sqlite,
            database: path.display().to_string(),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_snapshot_drives_a_run_in_registry_order() {
    let dir = tempdir().unwrap();
    let seed = "CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);";
    let first = seed_sqlite(dir.path(), "first", seed).await;
    let second = seed_sqlite(dir.path(), "second", seed).await;

    let registry = Registry::open(dir.path().join("servers.json"), SecretStorage::disabled());
    registry.add(sqlite_entry("zeta", &first), None).unwrap();
    registry.add(sqlite_entry("alpha", &second), None).unwrap();

    let targets = registry.snapshot().unwrap();
    let runner = QueryRunner::new(Arc::new(DriverConnector::new(Duration::from_secs(5))));
    let results = runner.execute_on_all(&targets, "SELECT x FROM t").await.unwrap();

    assert_eq!(results.status(), RunStatus::Complete);
    let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["zeta", "alpha"]);
}

#[test]
fn test_registry_file_is_readable_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("servers.json");
    let registry = Registry::open(&path, SecretStorage::disabled()).allow_plaintext(true);

    registry
        .add(
            ServerEntry::new(
                "prod",
                ConnectionConfig {
                    host: "db1".to_string(),
                    database: "Sales".to_string(),
                    user: Some("reader".to_string()),
                    ..Default::default()
                },
            ),
            Some("pw"),
        )
        .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let entry = &json[0];
    assert_eq!(entry["name"], "prod");
    assert_eq!(entry["backend"], "sqlserver");
    assert_eq!(entry["host"], "db1");
    assert_eq!(entry["password_storage"], "plaintext");
    assert_eq!(entry["password"], "pw");
}

#[test]
fn test_reopened_registry_sees_changes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("servers.json");

    let writer = Registry::open(&path, SecretStorage::disabled());
    writer.add(sqlite_entry("a", Path::new("a.db")), None).unwrap();
    writer.add(sqlite_entry("b", Path::new("b.db")), None).unwrap();
    writer.remove("A").unwrap();

    let reader = Registry::open(&path, SecretStorage::disabled());
    let entries = reader.load().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "b");
    assert_eq!(entries[0].password_storage, PasswordStorage::None);
}
