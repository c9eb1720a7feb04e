//! sql-fanout - run one SQL batch against many databases at once.

mod cli;
mod commands;

use cli::Cli;
use sql_fanout::logging;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    ExitCode::from(commands::run(cli).await)
}
