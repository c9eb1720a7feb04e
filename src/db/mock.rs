//! Mock database connector for testing.
//!
//! Scripts per-target behavior (tables, failures, delays) and counts how many
//! connections were acquired and released.

use super::{Connector, DatabaseClient, Table};
use crate::error::{FanoutError, Result};
use crate::registry::Target;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a mocked target does when connected to and queried.
#[derive(Debug, Clone)]
pub enum MockScript {
    /// Return this table.
    Table(Table),
    /// Fail while connecting.
    ConnectionFailure(String),
    /// Connect, then fail the statement.
    QueryFailure(String),
}

#[derive(Debug, Clone)]
struct MockTarget {
    script: MockScript,
    query_delay: Duration,
}

/// Connection bookkeeping shared by a connector and its clients.
#[derive(Debug, Default)]
pub struct MockStats {
    connects: AtomicUsize,
    releases: AtomicUsize,
    queries: Mutex<Vec<(String, String)>>,
}

impl MockStats {
    /// Number of successfully acquired connections.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of connections released (closed or dropped).
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// `(target, sql)` pairs in the order statements started.
    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }
}

/// A connector that serves scripted targets.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    targets: HashMap<String, MockTarget>,
    stats: Arc<MockStats>,
}

impl MockConnector {
    /// Creates a connector with no scripted targets; unknown targets fail to connect.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts `name` to return `table`.
    pub fn with_table(self, name: &str, table: Table) -> Self {
        self.with_script(name, MockScript::Table(table), Duration::ZERO)
    }

    /// Scripts `name` to fail while connecting.
    pub fn with_connection_failure(self, name: &str, msg: &str) -> Self {
        self.with_script(
            name,
            MockScript::ConnectionFailure(msg.to_string()),
            Duration::ZERO,
        )
    }

    /// Scripts `name` to fail its statement.
    pub fn with_query_failure(self, name: &str, msg: &str) -> Self {
        self.with_script(name, MockScript::QueryFailure(msg.to_string()), Duration::ZERO)
    }

    /// Scripts `name` with an explicit delay before the statement completes.
    pub fn with_script(mut self, name: &str, script: MockScript, query_delay: Duration) -> Self {
        self.targets
            .insert(name.to_string(), MockTarget { script, query_delay });
        self
    }

    /// Shared connection statistics.
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, target: &Target) -> Result<Box<dyn DatabaseClient>> {
        let scripted = self.targets.get(&target.name).cloned().ok_or_else(|| {
            FanoutError::connection(format!("Cannot connect to {}: unknown host", target.name))
        })?;

        if let MockScript::ConnectionFailure(msg) = &scripted.script {
            return Err(FanoutError::connection(msg.clone()));
        }

        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDatabaseClient {
            name: target.name.clone(),
            script: scripted.script,
            query_delay: scripted.query_delay,
            stats: Arc::clone(&self.stats),
        }))
    }
}

/// A mock database client that returns its scripted result.
pub struct MockDatabaseClient {
    name: String,
    script: MockScript,
    query_delay: Duration,
    stats: Arc<MockStats>,
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&mut self, sql: &str) -> Result<Table> {
        if let Ok(mut queries) = self.stats.queries.lock() {
            queries.push((self.name.clone(), sql.to_string()));
        }

        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }

        match &self.script {
            MockScript::Table(table) => Ok(table.clone()),
            MockScript::QueryFailure(msg) => Err(FanoutError::query(msg.clone())),
            MockScript::ConnectionFailure(msg) => Err(FanoutError::connection(msg.clone())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Drop for MockDatabaseClient {
    fn drop(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}
