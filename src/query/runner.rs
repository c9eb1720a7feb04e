//! Fan-out query runner.
//!
//! Runs one SQL batch against every target concurrently, one task per target,
//! and collects the outcomes in registry order. A failing target never
//! affects its siblings.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::{Connector, Table};
use crate::error::{FanoutError, Result};
use crate::registry::{ensure_unique_names, Target};

/// Outcome of running the batch against one target.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// The first result set, fully materialized.
    Success(Table),
    /// Why this target produced no table.
    Failure(FanoutError),
}

impl ExecutionResult {
    /// Returns the table when successful.
    pub fn table(&self) -> Option<&Table> {
        match self {
            Self::Success(table) => Some(table),
            Self::Failure(_) => None,
        }
    }

    /// Returns the error when failed.
    pub fn error(&self) -> Option<&FanoutError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(e) => Some(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<Result<Table>> for ExecutionResult {
    fn from(result: Result<Table>) -> Self {
        match result {
            Ok(table) => Self::Success(table),
            Err(e) => Self::Failure(e),
        }
    }
}

/// A target name paired with its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetResult {
    pub name: String,
    pub result: ExecutionResult,
}

/// Overall classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every target succeeded.
    Complete,
    /// At least one target succeeded and at least one failed.
    Partial,
    /// No target succeeded.
    Failed,
}

/// Outcomes of one run, in registry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResults {
    entries: Vec<TargetResult>,
}

impl ExecutionResults {
    /// Builds results from `(name, outcome)` pairs, keeping their order.
    pub fn from_entries(entries: Vec<TargetResult>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All outcomes in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &TargetResult> {
        self.entries.iter()
    }

    /// Looks up a target's outcome by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&ExecutionResult> {
        let key = name.to_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.name.to_lowercase() == key)
            .map(|entry| &entry.result)
    }

    /// Successful targets and their tables, in registry order.
    pub fn successes(&self) -> Vec<(&str, &Table)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.result.table().map(|t| (entry.name.as_str(), t)))
            .collect()
    }

    /// Failed targets and their errors, in registry order.
    pub fn failures(&self) -> Vec<(&str, &FanoutError)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.result.error().map(|e| (entry.name.as_str(), e)))
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// Classifies the run. An empty run counts as complete.
    pub fn status(&self) -> RunStatus {
        let successes = self.success_count();
        if successes == self.len() {
            RunStatus::Complete
        } else if successes == 0 {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        }
    }
}

/// Executes a batch on many targets at once.
#[derive(Clone)]
pub struct QueryRunner {
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
}

impl QueryRunner {
    /// Creates a runner with a fresh cancellation token.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` instead of the runner's own token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels every in-flight target of this runner.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs `sql` on every target concurrently.
    ///
    /// Fails only when target names repeat (case-insensitive); failing targets
    /// are reported in the returned results instead.
    pub async fn execute_on_all(&self, targets: &[Target], sql: &str) -> Result<ExecutionResults> {
        ensure_unique_names(targets.iter().map(|t| t.name.as_str()))?;

        info!("Executing query on {} target(s)", targets.len());
        let start = Instant::now();
        let sql: Arc<str> = Arc::from(sql);

        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let connector = Arc::clone(&self.connector);
            let cancel = self.cancel.clone();
            let target = target.clone();
            let sql = Arc::clone(&sql);

            handles.push(tokio::spawn(async move {
                run_target(connector, target, sql, cancel).await
            }));
        }

        let mut entries = Vec::with_capacity(handles.len());
        for (handle, target) in handles.into_iter().zip(targets) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Task for '{}' panicked: {e}", target.name);
                    ExecutionResult::Failure(FanoutError::internal(format!(
                        "Target task panicked: {e}"
                    )))
                }
            };
            entries.push(TargetResult {
                name: target.name.clone(),
                result,
            });
        }

        let results = ExecutionResults::from_entries(entries);
        info!(
            "Query finished in {:?}: {} succeeded, {} failed",
            start.elapsed(),
            results.success_count(),
            results.failure_count()
        );
        Ok(results)
    }
}

async fn run_target(
    connector: Arc<dyn Connector>,
    target: Target,
    sql: Arc<str>,
    cancel: CancellationToken,
) -> ExecutionResult {
    let start = Instant::now();

    // Dropping the losing branch drops its connection, which releases it.
    let outcome = tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(FanoutError::Cancelled),
        result = execute_single(connector.as_ref(), &target, &sql) => result,
    };

    match &outcome {
        Ok(table) => debug!(
            "'{}' returned {} row(s) in {:?}",
            target.name,
            table.row_count(),
            start.elapsed()
        ),
        Err(e) => warn!("'{}' failed: {e}", target.name),
    }

    outcome.into()
}

async fn execute_single(connector: &dyn Connector, target: &Target, sql: &str) -> Result<Table> {
    let mut client = connector.connect(target).await?;
    debug!("Connected to '{}' ({})", target.name, target.connection.display_string());

    let result = client.execute_query(sql).await;

    if let Err(e) = client.close().await {
        debug!("Closing connection to '{}' failed: {e}", target.name);
    }
    result
}
