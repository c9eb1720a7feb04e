//! Database abstraction layer for sql-fanout.
//!
//! Provides a trait-based interface for running one statement against one
//! target, allowing different database backends to be used interchangeably.

mod mock;
mod postgres;
mod sqlite;
mod sqlserver;
mod types;

pub use mock::{MockConnector, MockDatabaseClient, MockScript, MockStats};
pub use postgres::PostgresClient;
pub use sqlite::SqliteClient;
pub use sqlserver::SqlServerClient;
pub use types::{column_key, Row, Table, Value, TIMESTAMP_FORMAT};
pub(crate) use types::next_free_name;

use crate::config::ConnectionConfig;
use crate::error::{FanoutError, Result};
use crate::registry::Target;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum number of connection attempts per target.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    SqlServer,
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend as a string for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlServer => "sqlserver",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlserver" | "mssql" => Some(Self::SqlServer),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Returns the default port for this backend (0 for file-based backends).
    pub fn default_port(&self) -> u16 {
        match self {
            Self::SqlServer => 1433,
            Self::Postgres => 5432,
            Self::Sqlite => 0,
        }
    }
}

/// Trait defining the interface for a single, exclusively owned connection.
#[async_trait]
pub trait DatabaseClient: Send {
    /// Executes `sql` as one batch and materializes its first result set.
    ///
    /// No statement timeout is applied.
    async fn execute_query(&mut self, sql: &str) -> Result<Table>;

    /// Closes the connection. Dropping a client without closing it also
    /// releases the connection, without the graceful goodbye.
    async fn close(&mut self) -> Result<()>;
}

/// Opens connections for targets.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Acquires a connection for `target`.
    async fn connect(&self, target: &Target) -> Result<Box<dyn DatabaseClient>>;
}

/// Connector backed by the real drivers.
#[derive(Debug, Clone)]
pub struct DriverConnector {
    connect_timeout: Duration,
}

impl DriverConnector {
    /// Creates a connector bounding connection acquisition by `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for DriverConnector {
    async fn connect(&self, target: &Target) -> Result<Box<dyn DatabaseClient>> {
        let config = &target.connection;
        tokio::time::timeout(self.connect_timeout, connect_with_retry(config))
            .await
            .map_err(|_| {
                FanoutError::connection(format!(
                    "Connection to {} timed out after {} seconds",
                    config.display_string(),
                    self.connect_timeout.as_secs()
                ))
            })?
    }
}

/// Creates a database client for the given backend and configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn DatabaseClient>> {
    match config.backend {
        DatabaseBackend::SqlServer => Ok(Box::new(SqlServerClient::connect(config).await?)),
        DatabaseBackend::Postgres => Ok(Box::new(PostgresClient::connect(config).await?)),
        DatabaseBackend::Sqlite => Ok(Box::new(SqliteClient::connect(config).await?)),
    }
}

async fn connect_with_retry(config: &ConnectionConfig) -> Result<Box<dyn DatabaseClient>> {
    let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
    let mut attempt = 1;

    loop {
        debug!(
            "Connection attempt {} of {} to {}",
            attempt,
            MAX_RETRY_ATTEMPTS,
            config.display_string()
        );

        match connect(config).await {
            Ok(client) => return Ok(client),
            Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                warn!(
                    "Connection attempt {} failed (transient error), retrying in {:?}: {}",
                    attempt, delay, e
                );
                tokio::time::sleep(delay).await;
                delay *= 2; // Exponential backoff
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Determines if a connection error is transient and worth retrying.
fn is_transient_error(error: &FanoutError) -> bool {
    let FanoutError::Connection(msg) = error else {
        return false;
    };
    let msg = msg.to_lowercase();

    // Authentication and missing-database errors never heal on their own
    if msg.contains("authentication failed")
        || msg.contains("login failed")
        || msg.contains("does not exist")
        || msg.contains("unable to open database")
    {
        return false;
    }

    msg.contains("connection refused")
        || msg.contains("timed out")
        || msg.contains("temporarily unavailable")
        || msg.contains("connection reset")
        || msg.contains("broken pipe")
}
