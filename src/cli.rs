//! Command-line argument parsing for sql-fanout.

use clap::{Args, Parser, Subcommand};
use sql_fanout::config::{AuthMode, Config, ConnectionConfig};
use sql_fanout::db::DatabaseBackend;
use sql_fanout::registry::ServerEntry;
use std::path::{Path, PathBuf};

/// Run one SQL batch against many databases and merge the results into CSV.
#[derive(Parser, Debug)]
#[command(name = "sql-fanout")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Registry file path (overrides the config file)
    #[arg(long, value_name = "PATH", env = "SQL_FANOUT_REGISTRY", global = true)]
    pub registry: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a server
    AddServer(AddServerArgs),

    /// Remove a registered server
    RemoveServer {
        /// Server name (case-insensitive)
        #[arg(long)]
        name: String,
    },

    /// List registered servers
    ListServers,

    /// Run a query file on every registered server
    ExecuteQuery(ExecuteQueryArgs),
}

#[derive(Args, Debug)]
pub struct AddServerArgs {
    /// Unique server name
    #[arg(long)]
    pub name: String,

    /// Host name or address (not used for sqlite)
    #[arg(long)]
    pub host: Option<String>,

    /// Database name, or the database file for sqlite
    #[arg(long)]
    pub database: String,

    /// Login user
    #[arg(long)]
    pub user: Option<String>,

    /// Login password
    #[arg(long)]
    pub password: Option<String>,

    /// Database backend: sqlserver, postgres or sqlite
    #[arg(long, default_value = "sqlserver", value_parser = parse_backend)]
    pub backend: DatabaseBackend,

    /// Port (defaults to the backend's standard port)
    #[arg(long)]
    pub port: Option<u16>,

    /// Authentication mode: sql or integrated
    #[arg(long, default_value = "sql", value_parser = parse_auth)]
    pub auth: AuthMode,

    /// Store the password in the registry file when the OS keyring is unavailable
    #[arg(long)]
    pub allow_plaintext: bool,

    /// Replace an existing server with the same name (keeps its password unless --password is given)
    #[arg(long)]
    pub replace: bool,
}

impl AddServerArgs {
    /// Builds the registry entry. The password is handled separately.
    pub fn to_entry(&self) -> std::result::Result<ServerEntry, String> {
        let host = match (&self.host, self.backend) {
            (Some(host), _) => host.clone(),
            (None, DatabaseBackend::Sqlite) => String::new(),
            (None, backend) => {
                return Err(format!("--host is required for {} servers", backend.as_str()))
            }
        };

        Ok(ServerEntry::new(
            self.name.clone(),
            ConnectionConfig {
                backend: self.backend,
                host,
                port: self.port,
                database: self.database.clone(),
                user: self.user.clone(),
                password: None,
                auth: self.auth,
                ..Default::default()
            },
        ))
    }
}

#[derive(Args, Debug)]
pub struct ExecuteQueryArgs {
    /// File containing the SQL batch
    #[arg(long, value_name = "PATH")]
    pub query_file: PathBuf,

    /// Combined CSV output
    #[arg(long, value_name = "PATH")]
    pub output_file: PathBuf,

    /// Also write one CSV per server into this directory
    #[arg(long, value_name = "DIR")]
    pub per_server_dir: Option<PathBuf>,
}

fn parse_backend(s: &str) -> std::result::Result<DatabaseBackend, String> {
    DatabaseBackend::parse(s).ok_or_else(|| {
        format!("Invalid backend: {s}. Expected: sqlserver, postgres, or sqlite")
    })
}

fn parse_auth(s: &str) -> std::result::Result<AuthMode, String> {
    AuthMode::parse(s).ok_or_else(|| format!("Invalid auth mode: {s}. Expected: sql or integrated"))
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Registry override from `--registry` or `SQL_FANOUT_REGISTRY`.
    pub fn registry_override(&self) -> Option<&Path> {
        self.registry.as_deref()
    }
}
