//! Command handlers.
//!
//! Each handler prints user-facing output to stdout/stderr and returns the
//! process exit code.

mod execute;
mod servers;

use crate::cli::{Cli, Command};
use sql_fanout::config::Config;
use sql_fanout::registry::{Registry, SecretStorage};
use tracing::{error, info};

/// Success, including partial success.
pub const EXIT_OK: u8 = 0;
/// Invalid arguments or configuration.
pub const EXIT_USAGE: u8 = 2;
/// The registry could not be read or updated.
pub const EXIT_REGISTRY: u8 = 3;
/// The query file is missing or unreadable.
pub const EXIT_QUERY_FILE: u8 = 4;
/// The registry has no servers.
pub const EXIT_NO_SERVERS: u8 = 5;
/// Execution or export failed, or no server succeeded.
pub const EXIT_EXECUTION: u8 = 6;

/// Dispatches the parsed command line.
pub async fn run(cli: Cli) -> u8 {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = match Config::load_from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{}: {}", e.category(), e);
            eprintln!("{e}");
            return EXIT_USAGE;
        }
    };

    let registry_path = config.registry_path(cli.registry_override());
    info!("Using registry: {}", registry_path.display());

    match cli.command {
        Command::AddServer(args) => {
            // Only probe the keyring when there is something to store
            let secrets = if args.password.is_some() {
                SecretStorage::new()
            } else {
                SecretStorage::disabled()
            };
            let registry = Registry::open(registry_path, secrets).allow_plaintext(args.allow_plaintext);
            servers::add_server(&registry, &args)
        }
        Command::RemoveServer { name } => {
            let registry = Registry::open(registry_path, SecretStorage::new());
            servers::remove_server(&registry, &name)
        }
        Command::ListServers => {
            let registry = Registry::open(registry_path, SecretStorage::disabled());
            servers::list_servers(&registry)
        }
        Command::ExecuteQuery(args) => {
            let registry = Registry::open(registry_path, SecretStorage::new());
            execute::execute_query(&registry, &config, &args).await
        }
    }
}
