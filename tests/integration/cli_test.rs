//! Command-line tests against the built binary.

use super::seed_sqlite;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Runs the binary with an isolated config and registry.
    fn run(&self, args: &[&str]) -> (i32, String, String) {
        let output = Command::new(env!("CARGO_BIN_EXE_sql-fanout"))
            .arg("--config")
            .arg(self.path("config.toml"))
            .arg("--registry")
            .arg(self.path("servers.json"))
            .args(args)
            .env_remove("SQL_FANOUT_REGISTRY")
            .env("RUST_LOG", "warn")
            .output()
            .expect("Failed to execute command");

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        (exit_code, stdout, stderr)
    }

    fn add_sqlite(&self, name: &str, db: &Path) -> i32 {
        let db = db.display().to_string();
        self.run(&[
            "add-server",
            "--name",
            name,
            "--database",
            &db,
            "--backend",
            "sqlite",
        ])
        .0
    }
}

#[test]
fn test_list_servers_empty() {
    let ws = Workspace::new();
    let (code, stdout, _) = ws.run(&["list-servers"]);

    assert_eq!(code, 0);
    assert!(stdout.contains("No servers configured"));
}

#[test]
fn test_add_list_remove() {
    let ws = Workspace::new();

    let (code, stdout, _) = ws.run(&[
        "add-server",
        "--name",
        "prod",
        "--host",
        "db1.example.com",
        "--database",
        "Sales",
        "--user",
        "reader",
    ]);
    assert_eq!(code, 0);
    assert!(stdout.contains("prod"));

    let (code, stdout, _) = ws.run(&["list-servers"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("- prod: db1.example.com; DB=Sales; User=reader"));

    let (code, _, stderr) = ws.run(&[
        "add-server",
        "--name",
        "PROD",
        "--host",
        "db2",
        "--database",
        "Sales",
    ]);
    assert_eq!(code, 3, "Duplicate name should fail");
    assert!(stderr.contains("already exists"));

    let (code, _, _) = ws.run(&[
        "add-server",
        "--name",
        "PROD",
        "--host",
        "db2",
        "--database",
        "Sales",
        "--replace",
    ]);
    assert_eq!(code, 0);
    let (_, stdout, _) = ws.run(&["list-servers"]);
    assert!(stdout.contains("- PROD: db2; DB=Sales; User="));
    assert!(!stdout.contains("db1.example.com"));

    let (code, stdout, _) = ws.run(&["remove-server", "--name", "prod"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Removed server 'prod'"));

    let (code, stdout, _) = ws.run(&["remove-server", "--name", "prod"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No server named 'prod' was found."));
}

#[test]
fn test_usage_error_exit_code() {
    let ws = Workspace::new();
    let (code, _, _) = ws.run(&["add-server", "--name", "x"]);
    assert_eq!(code, 2);

    let (code, _, _) = ws.run(&["no-such-command"]);
    assert_eq!(code, 2);
}

#[test]
fn test_execute_query_missing_file() {
    let ws = Workspace::new();
    let query = ws.path("missing.sql").display().to_string();
    let output = ws.path("out.csv").display().to_string();

    let (code, _, stderr) = ws.run(&["execute-query", "--query-file", &query, "--output-file", &output]);
    assert_eq!(code, 4);
    assert!(stderr.contains("Query file not found"));
}

#[test]
fn test_execute_query_without_servers() {
    let ws = Workspace::new();
    std::fs::write(ws.path("q.sql"), "SELECT 1").unwrap();
    let query = ws.path("q.sql").display().to_string();
    let output = ws.path("out.csv").display().to_string();

    let (code, _, stderr) = ws.run(&["execute-query", "--query-file", &query, "--output-file", &output]);
    assert_eq!(code, 5);
    assert!(stderr.contains("No servers configured"));
}

#[tokio::test]
async fn test_execute_query_end_to_end() {
    let ws = Workspace::new();
    let a = seed_sqlite(
        ws.dir.path(),
        "a",
        "CREATE TABLE users (Id INTEGER, Name TEXT); INSERT INTO users VALUES (1, 'Alice');",
    )
    .await;
    let b = seed_sqlite(
        ws.dir.path(),
        "b",
        "CREATE TABLE users (id INTEGER, Email TEXT); INSERT INTO users VALUES (2, 'bob@x.com');",
    )
    .await;
    assert_eq!(ws.add_sqlite("A", &a), 0);
    assert_eq!(ws.add_sqlite("B", &b), 0);
    assert_eq!(ws.add_sqlite("C", &ws.path("missing.db")), 0);

    std::fs::write(ws.path("q.sql"), "SELECT * FROM users").unwrap();
    let query = ws.path("q.sql").display().to_string();
    let output = ws.path("combined.csv").display().to_string();
    let per_dir = ws.path("per").display().to_string();

    let (code, stdout, stderr) = ws.run(&[
        "execute-query",
        "--query-file",
        &query,
        "--output-file",
        &output,
        "--per-server-dir",
        &per_dir,
    ]);

    assert_eq!(code, 0, "Partial success should exit 0: {stderr}");
    assert!(stdout.contains("2 of 3 server(s) succeeded"));
    assert!(stderr.contains("[failed] C:"));
    assert_eq!(
        std::fs::read_to_string(ws.path("combined.csv")).unwrap(),
        "ServerName,Id,Name,Email\r\nA,1,Alice,\r\nB,2,,bob@x.com\r\n"
    );
    assert_eq!(
        std::fs::read_to_string(ws.path("per").join("A.csv")).unwrap(),
        "Id,Name\r\n1,Alice\r\n"
    );
    assert!(ws.path("per").join("B.csv").exists());
    assert!(!ws.path("per").join("C.csv").exists());
}

#[tokio::test]
async fn test_execute_query_all_failed() {
    let ws = Workspace::new();
    let a = seed_sqlite(ws.dir.path(), "a", "CREATE TABLE t (x INTEGER);").await;
    assert_eq!(ws.add_sqlite("A", &a), 0);

    std::fs::write(ws.path("q.sql"), "SELECT * FROM nowhere").unwrap();
    let query = ws.path("q.sql").display().to_string();
    let output = ws.path("combined.csv").display().to_string();

    let (code, _, stderr) = ws.run(&["execute-query", "--query-file", &query, "--output-file", &output]);
    assert_eq!(code, 6);
    assert!(stderr.contains("[failed] A:"));
    assert!(!ws.path("combined.csv").exists());
}

#[test]
fn test_invalid_config_file() {
    let ws = Workspace::new();
    std::fs::write(ws.path("config.toml"), "[export]\ndelimiter = \"\\n\"\n").unwrap();

    let (code, _, _) = ws.run(&["list-servers"]);
    assert_eq!(code, 2);
}
