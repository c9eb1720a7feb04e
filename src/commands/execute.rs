//! The execute-query command.

use std::path::PathBuf;
use std::sync::Arc;

use super::{EXIT_EXECUTION, EXIT_NO_SERVERS, EXIT_OK, EXIT_QUERY_FILE, EXIT_REGISTRY, EXIT_USAGE};
use crate::cli::ExecuteQueryArgs;
use sql_fanout::config::Config;
use sql_fanout::db::{Connector, DriverConnector};
use sql_fanout::error::Result;
use sql_fanout::export::CsvExporter;
use sql_fanout::query::{ExecutionResult, ExecutionResults, QueryRunner, RunStatus};
use sql_fanout::reconcile::combine;
use sql_fanout::registry::{Registry, Target};
use tracing::{error, info, warn};

pub async fn execute_query(registry: &Registry, config: &Config, args: &ExecuteQueryArgs) -> u8 {
    if !args.query_file.is_file() {
        eprintln!("Query file not found: {}", args.query_file.display());
        return EXIT_QUERY_FILE;
    }
    let sql = match std::fs::read_to_string(&args.query_file) {
        Ok(sql) => sql,
        Err(e) => {
            eprintln!("Cannot read query file {}: {e}", args.query_file.display());
            return EXIT_QUERY_FILE;
        }
    };

    let targets = match registry.snapshot() {
        Ok(targets) => targets,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_REGISTRY;
        }
    };
    if targets.is_empty() {
        eprintln!("No servers configured.");
        return EXIT_NO_SERVERS;
    }

    let exporter = match config.export.delimiter_byte() {
        Ok(delimiter) => CsvExporter::new(delimiter),
        Err(e) => {
            eprintln!("{e}");
            return EXIT_USAGE;
        }
    };

    let connector = Arc::new(DriverConnector::new(config.execution.connect_timeout()));
    run(connector, &targets, &sql, args, exporter).await
}

/// Runs the batch, reports per-target outcomes and writes the CSV files.
pub(crate) async fn run(
    connector: Arc<dyn Connector>,
    targets: &[Target],
    sql: &str,
    args: &ExecuteQueryArgs,
    exporter: CsvExporter,
) -> u8 {
    let runner = QueryRunner::new(connector);

    let cancel = runner.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight servers");
            cancel.cancel();
        }
    });

    println!("Executing query on {} server(s)...", targets.len());
    let outcome = runner.execute_on_all(targets, sql).await;
    interrupt.abort();

    let results = match outcome {
        Ok(results) => results,
        Err(e) => {
            error!("{}: {}", e.category(), e);
            eprintln!("Error executing query: {e}");
            return EXIT_EXECUTION;
        }
    };

    report(&results);

    if results.status() == RunStatus::Failed {
        eprintln!("No server returned results; nothing exported.");
        return EXIT_EXECUTION;
    }

    match export(&results, args, exporter) {
        Ok(paths) => {
            for path in paths {
                println!("Saved: {}", path.display());
            }
            EXIT_OK
        }
        Err(e) => {
            error!("{}: {}", e.category(), e);
            eprintln!("{e}");
            EXIT_EXECUTION
        }
    }
}

fn report(results: &ExecutionResults) {
    for entry in results.iter() {
        match &entry.result {
            ExecutionResult::Success(table) => {
                println!("[ok] {}: {} row(s)", entry.name, table.row_count())
            }
            ExecutionResult::Failure(e) => eprintln!("[failed] {}: {e}", entry.name),
        }
    }
    println!(
        "{} of {} server(s) succeeded.",
        results.success_count(),
        results.len()
    );
}

fn export(
    results: &ExecutionResults,
    args: &ExecuteQueryArgs,
    exporter: CsvExporter,
) -> Result<Vec<PathBuf>> {
    let successes = results.successes();
    let mut written = Vec::new();

    if let Some(dir) = &args.per_server_dir {
        written.extend(exporter.export_per_target(&successes, dir)?);
    }

    let combined = combine(successes.iter().copied());
    exporter.write_file(&combined, &args.output_file)?;
    info!(
        "Combined {} row(s) from {} server(s) into {}",
        combined.row_count(),
        successes.len(),
        args.output_file.display()
    );
    written.push(args.output_file.clone());

    Ok(written)
}
