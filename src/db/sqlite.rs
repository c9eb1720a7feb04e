//! SQLite database client implementation.
//!
//! The `database` field of the connection config is the database file path.
//! The file must already exist.

use crate::config::ConnectionConfig;
use crate::db::{DatabaseClient, Row, Table, Value};
use crate::error::{FanoutError, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Either, Executor, Row as SqlxRow, Statement, TypeInfo, ValueRef};
use tracing::debug;

/// Text layouts SQLite applications commonly use for date-time columns.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// SQLite database client owning one connection.
#[derive(Debug)]
pub struct SqliteClient {
    conn: Option<SqliteConnection>,
}

impl SqliteClient {
    /// Opens the database file named by `config.database`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database)
            .create_if_missing(false);

        let conn = SqliteConnection::connect_with(&options).await.map_err(|e| {
            FanoutError::connection(format!("Cannot open {}: {e}", config.database))
        })?;

        debug!("Opened {}", config.display_string());
        Ok(Self { conn: Some(conn) })
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    async fn execute_query(&mut self, sql: &str) -> Result<Table> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| FanoutError::internal("Connection already closed"))?;

        // Drain the whole batch so later statements still run. Rows are kept
        // from the first statement that produced any.
        let mut rows: Vec<SqliteRow> = Vec::new();
        let mut first_done = false;
        {
            let mut stream = sqlx::raw_sql(sql).fetch_many(&mut *conn);
            while let Some(item) = stream
                .try_next()
                .await
                .map_err(|e| FanoutError::query(e.to_string()))?
            {
                match item {
                    Either::Left(_) if !rows.is_empty() => first_done = true,
                    Either::Left(_) => {}
                    Either::Right(row) if !first_done => rows.push(row),
                    Either::Right(_) => {}
                }
            }
        }

        let columns: Vec<String> = match rows.first() {
            Some(first_row) => first_row
                .columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect(),
            None => match (&mut *conn).prepare(sql).await {
                Ok(statement) => statement
                    .columns()
                    .iter()
                    .map(|col| col.name().to_string())
                    .collect(),
                Err(e) => {
                    debug!("Could not describe empty result: {}", e);
                    Vec::new()
                }
            },
        };

        let rows: Vec<Row> = rows.iter().map(convert_row).collect();
        Ok(Table::with_data(columns, rows))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .await
                .map_err(|e| FanoutError::connection(format!("Failed to close connection: {e}")))?;
        }
        Ok(())
    }
}

fn convert_row(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Storage class of the value decides the variant; the declared column type
/// only refines INTEGER into booleans and TEXT into timestamps.
fn convert_value(row: &SqliteRow, index: usize, declared: &str) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };
    let declared = declared.to_uppercase();

    match storage.as_str() {
        "INTEGER" | "INT8" | "BOOLEAN" => match row.try_get_unchecked::<i64, _>(index) {
            Ok(v) if declared == "BOOLEAN" => Value::Bool(v != 0),
            Ok(v) => Value::Int(v),
            Err(_) => Value::Null,
        },
        "REAL" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(|b| Value::binary(&b))
            .unwrap_or(Value::Null),
        _ => match row.try_get_unchecked::<String, _>(index) {
            Ok(text) if matches!(declared.as_str(), "DATETIME" | "TIMESTAMP" | "DATE") => {
                parse_datetime(&text).map(Value::Timestamp).unwrap_or(Value::Text(text))
            }
            Ok(text) => Value::Text(text),
            Err(_) => Value::Null,
        },
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
