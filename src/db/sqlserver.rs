//! SQL Server database client implementation.
//!
//! Provides the `SqlServerClient` struct that implements the `DatabaseClient`
//! trait for Microsoft SQL Server (including Azure SQL) using tiberius.

use crate::config::{AuthMode, ConnectionConfig};
use crate::db::{DatabaseClient, Row, Table, Value};
use crate::error::{FanoutError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

type MssqlClient = Client<Compat<TcpStream>>;

/// Application name reported to the server.
const APPLICATION_NAME: &str = "sql-fanout";

/// SQL Server database client owning one TDS connection.
pub struct SqlServerClient {
    client: Option<MssqlClient>,
}

impl SqlServerClient {
    /// Opens a connection, following Azure SQL gateway redirects once.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let tib_config = build_config(config)?;

        let client = match connect_raw(tib_config.clone(), config).await {
            Err(RawConnectError::Routing { host, port }) => {
                debug!("Server redirected connection to {}:{}", host, port);
                let mut redirected = tib_config;
                redirected.host(&host);
                redirected.port(port);
                connect_raw(redirected, config)
                    .await
                    .map_err(|e| e.into_error(config))?
            }
            other => other.map_err(|e| e.into_error(config))?,
        };

        Ok(Self {
            client: Some(client),
        })
    }
}

#[async_trait]
impl DatabaseClient for SqlServerClient {
    async fn execute_query(&mut self, sql: &str) -> Result<Table> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| FanoutError::internal("Connection already closed"))?;

        let mut stream = client
            .simple_query(sql)
            .await
            .map_err(|e| FanoutError::query(e.to_string()))?;

        // Metadata of the first result set; None when the batch returns no rows at all
        let columns: Vec<String> = stream
            .columns()
            .await
            .map_err(|e| FanoutError::query(e.to_string()))?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| FanoutError::query(e.to_string()))?;

        let rows: Vec<Row> = rows.iter().map(convert_row).collect();
        Ok(Table::with_data(columns, rows))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| FanoutError::connection(format!("Failed to close connection: {e}")))?;
        }
        Ok(())
    }
}

/// Build a tiberius Config from a ConnectionConfig.
fn build_config(config: &ConnectionConfig) -> Result<Config> {
    let mut tib_config = Config::new();
    tib_config.host(config.effective_host());
    tib_config.port(config.effective_port());
    tib_config.application_name(APPLICATION_NAME);
    if !config.database.is_empty() {
        tib_config.database(&config.database);
    }

    match config.auth {
        AuthMode::Sql => tib_config.authentication(AuthMethod::sql_server(
            config.user.as_deref().unwrap_or_default(),
            config.password.as_deref().unwrap_or_default(),
        )),
        AuthMode::Integrated => tib_config.authentication(integrated_auth()?),
    }

    tib_config.encryption(EncryptionLevel::Required);
    if config.trust_server_certificate {
        tib_config.trust_cert();
    }

    Ok(tib_config)
}

#[cfg(windows)]
fn integrated_auth() -> Result<AuthMethod> {
    Ok(AuthMethod::Integrated)
}

#[cfg(not(windows))]
fn integrated_auth() -> Result<AuthMethod> {
    Err(FanoutError::connection(
        "Integrated authentication is only available on Windows",
    ))
}

enum RawConnectError {
    Routing { host: String, port: u16 },
    Tcp(std::io::Error),
    Tds(tiberius::error::Error),
}

impl RawConnectError {
    fn into_error(self, config: &ConnectionConfig) -> FanoutError {
        let host = config.effective_host();
        let port = config.effective_port();
        match self {
            Self::Routing { host: to_host, port: to_port } => FanoutError::connection(format!(
                "Server {host}:{port} redirected more than once (last to {to_host}:{to_port})"
            )),
            Self::Tcp(e) => FanoutError::connection(format!("Cannot connect to {host}:{port}: {e}")),
            Self::Tds(e) => FanoutError::connection(format!("{host}:{port}: {e}")),
        }
    }
}

async fn connect_raw(
    tib_config: Config,
    config: &ConnectionConfig,
) -> std::result::Result<MssqlClient, RawConnectError> {
    let tcp = TcpStream::connect(tib_config.get_addr())
        .await
        .map_err(RawConnectError::Tcp)?;
    tcp.set_nodelay(true).ok();

    debug!("TCP connection established to {}", config.display_string());

    match Client::connect(tib_config, tcp.compat_write()).await {
        Ok(client) => Ok(client),
        Err(tiberius::error::Error::Routing { host, port }) => {
            Err(RawConnectError::Routing { host, port })
        }
        Err(e) => Err(RawConnectError::Tds(e)),
    }
}

/// Converts a tiberius Row to our Row type.
fn convert_row(row: &tiberius::Row) -> Row {
    row.cells()
        .enumerate()
        .map(|(i, (_col, data))| convert_value(row, i, data))
        .collect()
}

/// Exact text of a DECIMAL/NUMERIC cell at its declared scale.
///
/// SQL Server allows 38 digits, more than a 96-bit `Decimal` holds, so wide
/// values are formatted from the raw integer instead.
fn numeric_text(value: i128, scale: u8) -> String {
    if let Ok(decimal) = Decimal::try_from_i128_with_scale(value, u32::from(scale)) {
        return decimal.to_string();
    }

    let digits = value.unsigned_abs().to_string();
    let scale = usize::from(scale);
    let sign = if value < 0 { "-" } else { "" };
    if scale == 0 {
        return format!("{sign}{digits}");
    }

    let padded = format!("{digits:0>width$}", width = scale + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    format!("{sign}{int_part}.{frac_part}")
}

/// Converts one cell. Date/time types go through the typed getters.
fn convert_value(row: &tiberius::Row, index: usize, data: &ColumnData<'_>) -> Value {
    match data {
        ColumnData::Bit(Some(b)) => Value::Bool(*b),
        ColumnData::U8(Some(v)) => Value::Int(*v as i64),
        ColumnData::I16(Some(v)) => Value::Int(*v as i64),
        ColumnData::I32(Some(v)) => Value::Int(*v as i64),
        ColumnData::I64(Some(v)) => Value::Int(*v),
        ColumnData::F32(Some(v)) => Value::Float(*v as f64),
        ColumnData::F64(Some(v)) => Value::Float(*v),
        ColumnData::String(Some(s)) => Value::Text(s.to_string()),
        ColumnData::Guid(Some(g)) => Value::Text(g.to_string()),
        ColumnData::Binary(Some(b)) => Value::binary(b),
        ColumnData::Xml(Some(xml)) => Value::Text(xml.to_string()),
        ColumnData::Numeric(Some(n)) => Value::Text(numeric_text(n.value(), n.scale())),
        ColumnData::DateTime(Some(_))
        | ColumnData::SmallDateTime(Some(_))
        | ColumnData::DateTime2(Some(_)) => row
            .try_get::<NaiveDateTime, _>(index)
            .ok()
            .flatten()
            .map(Value::Timestamp)
            .unwrap_or(Value::Null),
        ColumnData::DateTimeOffset(Some(_)) => row
            .try_get::<DateTime<Utc>, _>(index)
            .ok()
            .flatten()
            .map(|dt| Value::Text(dt.to_rfc3339()))
            .unwrap_or(Value::Null),
        ColumnData::Date(Some(_)) => row
            .try_get::<NaiveDate, _>(index)
            .ok()
            .flatten()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(Value::Timestamp)
            .unwrap_or(Value::Null),
        ColumnData::Time(Some(_)) => row
            .try_get::<NaiveTime, _>(index)
            .ok()
            .flatten()
            .map(|t| Value::Text(t.format("%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null),
        // All None variants
        _ => Value::Null,
    }
}
