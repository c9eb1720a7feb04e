//! Registry management commands.

use super::{EXIT_OK, EXIT_REGISTRY, EXIT_USAGE};
use crate::cli::AddServerArgs;
use sql_fanout::registry::{Registry, ServerEntry};
use tracing::{error, info};

pub fn add_server(registry: &Registry, args: &AddServerArgs) -> u8 {
    let entry = match args.to_entry() {
        Ok(entry) => entry,
        Err(msg) => {
            eprintln!("{msg}");
            return EXIT_USAGE;
        }
    };

    let name = entry.name.clone();
    let password = args.password.as_deref();
    let result = if args.replace {
        registry.add_or_update(entry, password)
    } else {
        registry.add(entry, password)
    };

    match result {
        Ok(()) => {
            info!("Registered '{name}' in {}", registry.path().display());
            println!("Server '{name}' saved.");
            EXIT_OK
        }
        Err(e) => {
            error!("Failed to add '{name}': {e}");
            eprintln!("{e}");
            EXIT_REGISTRY
        }
    }
}

pub fn remove_server(registry: &Registry, name: &str) -> u8 {
    match registry.remove(name) {
        Ok(true) => {
            println!("Removed server '{name}'.");
            EXIT_OK
        }
        Ok(false) => {
            println!("No server named '{name}' was found.");
            EXIT_OK
        }
        Err(e) => {
            eprintln!("{e}");
            EXIT_REGISTRY
        }
    }
}

pub fn list_servers(registry: &Registry) -> u8 {
    let entries = match registry.load() {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_REGISTRY;
        }
    };

    if entries.is_empty() {
        println!("No servers configured. Use 'add-server' to add one.");
        return EXIT_OK;
    }

    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    EXIT_OK
}

fn format_entry(entry: &ServerEntry) -> String {
    let conn = &entry.connection;
    format!(
        "- {}: {}; DB={}; User={}",
        entry.name,
        conn.host,
        conn.database,
        conn.user.as_deref().unwrap_or_default()
    )
}
