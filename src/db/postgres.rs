//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx.

use crate::config::{AuthMode, ConnectionConfig};
use crate::db::{DatabaseClient, Row, Table, Value};
use crate::error::{FanoutError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Either, Executor, Row as SqlxRow, Statement, TypeInfo};
use tracing::debug;

/// PostgreSQL database client owning one connection.
#[derive(Debug)]
pub struct PostgresClient {
    conn: Option<PgConnection>,
}

impl PostgresClient {
    /// Opens a single connection for the target.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut options = PgConnectOptions::new()
            .host(config.effective_host())
            .port(config.effective_port())
            .database(&config.database)
            .application_name("sql-fanout");

        if let Some(user) = &config.user {
            options = options.username(user);
        }
        if config.auth == AuthMode::Sql {
            if let Some(password) = &config.password {
                options = options.password(password);
            }
        }

        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(|e| map_connection_error(e, config))?;

        debug!("Successfully connected to {}", config.display_string());
        Ok(Self { conn: Some(conn) })
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn execute_query(&mut self, sql: &str) -> Result<Table> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| FanoutError::internal("Connection already closed"))?;

        // Simple-query protocol so the whole batch runs. Rows are kept from the
        // first statement that produced any; later result sets are discarded.
        let mut rows: Vec<PgRow> = Vec::new();
        let mut first_done = false;
        {
            let mut stream = sqlx::raw_sql(sql).fetch_many(&mut *conn);
            while let Some(item) = stream
                .try_next()
                .await
                .map_err(|e| FanoutError::query(format_query_error(e)))?
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
            // Empty result: describe the statement to recover its columns.
            // Fails (and yields no columns) for multi-statement batches.
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

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(index)
            .ok()
            .flatten()
            .map(|d| Value::Text(d.to_string()))
            .unwrap_or_else(|| text_value(row, index)),

        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(Value::Timestamp)
            .unwrap_or_else(|| text_value(row, index)),

        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .ok()
            .flatten()
            .map(|dt| Value::Text(dt.to_rfc3339()))
            .unwrap_or_else(|| text_value(row, index)),

        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .ok()
            .flatten()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(Value::Timestamp)
            .unwrap_or_else(|| text_value(row, index)),

        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(index)
            .ok()
            .flatten()
            .map(|t| Value::Text(t.format("%H:%M:%S%.f").to_string()))
            .unwrap_or_else(|| text_value(row, index)),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(|b| Value::binary(&b))
            .unwrap_or(Value::Null),

        // Everything else (uuid, json, inet, enums, ...) arrives in text format
        _ => text_value(row, index),
    }
}

fn text_value(row: &PgRow, index: usize) -> Value {
    row.try_get_unchecked::<Option<String>, _>(index)
        .ok()
        .flatten()
        .map(Value::Text)
        .unwrap_or(Value::Null)
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> FanoutError {
    let host = config.effective_host();
    let port = config.effective_port();
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = &config.database;

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        FanoutError::connection(format!(
            "Cannot connect to {host}:{port}: connection refused. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        FanoutError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        FanoutError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        FanoutError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        FanoutError::connection(format!("{host}:{port}: {error}"))
    }
}

/// Formats a query error with hints if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
