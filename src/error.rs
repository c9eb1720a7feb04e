//! Error types for sql-fanout.
//!
//! Defines the main error enum used throughout the application.

use std::path::Path;
use thiserror::Error;

/// Main error type for sql-fanout operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FanoutError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, constraint violations, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// The run was cancelled while this target was still in flight.
    #[error("Cancelled")]
    Cancelled,

    /// Filesystem failures while writing CSV output.
    #[error("Export error: {0}")]
    Export(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Target registry errors (duplicate names, unreadable registry file, etc.)
    #[error("Registry error: {0}")]
    Registry(String),

    /// OS keyring failures.
    #[error("Secret storage error: {0}")]
    Secret(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FanoutError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates an export error with the given message.
    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    /// Creates an export error for a failed write to `path`.
    pub fn export_io(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Export(format!("{}: {err}", path.display()))
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a registry error with the given message.
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    /// Creates a secret storage error with the given message.
    pub fn secret(msg: impl Into<String>) -> Self {
        Self::Secret(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Cancelled => "Cancelled",
            Self::Export(_) => "Export Error",
            Self::Config(_) => "Configuration Error",
            Self::Registry(_) => "Registry Error",
            Self::Secret(_) => "Secret Storage Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using FanoutError.
pub type Result<T> = std::result::Result<T, FanoutError>;
