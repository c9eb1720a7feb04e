//! Integration tests for sql-fanout.

pub mod cli_test;
pub mod export_test;
pub mod fanout_test;
pub mod registry_test;

use sql_fanout::config::ConnectionConfig;
use sql_fanout::db::DatabaseBackend;
use sql_fanout::registry::Target;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::Connection;
use std::path::{Path, PathBuf};

/// Creates `<dir>/<name>.db` and runs `seed` against it.
pub async fn seed_sqlite(dir: &Path, name: &str, seed: &str) -> PathBuf {
    let path = dir.join(format!("{name}.db"));
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
    sqlx::raw_sql(seed).execute(&mut conn).await.unwrap();
    conn.close().await.unwrap();
    path
}

/// A SQLite target for the database file at `path`.
pub fn sqlite_target(name: &str, path: &Path) -> Target {
    Target::new(
        name,
        ConnectionConfig {
            backend: DatabaseBackend::Sqlite,
            database: path.display().to_string(),
            ..Default::default()
        },
    )
}
