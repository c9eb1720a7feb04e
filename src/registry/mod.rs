//! Target registry.
//!
//! An ordered list of uniquely named server entries persisted as JSON. The
//! query runner only ever sees an immutable snapshot (`Vec<Target>`).

pub mod secrets;

pub use secrets::SecretStorage;

use crate::config::ConnectionConfig;
use crate::error::{FanoutError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One configured database endpoint, ready for the query runner.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    /// Display name, unique under case-insensitive comparison.
    pub name: String,
    /// Connection parameters with the password resolved.
    pub connection: ConnectionConfig,
}

impl Target {
    /// Creates a target.
    pub fn new(name: impl Into<String>, connection: ConnectionConfig) -> Self {
        Self {
            name: name.into(),
            connection,
        }
    }
}

/// Password storage method for an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordStorage {
    /// No password stored.
    #[default]
    None,
    /// Password stored in OS keyring.
    Keyring,
    /// Password stored in the registry file (with user consent).
    Plaintext,
}

/// A persisted registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    /// Target name.
    pub name: String,

    /// Connection parameters (without password).
    #[serde(flatten)]
    pub connection: ConnectionConfig,

    /// Where the password lives.
    #[serde(default)]
    pub password_storage: PasswordStorage,

    /// Plaintext password, only for `PasswordStorage::Plaintext`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ServerEntry {
    /// Creates an entry without a password.
    pub fn new(name: impl Into<String>, connection: ConnectionConfig) -> Self {
        Self {
            name: name.into(),
            connection,
            password_storage: PasswordStorage::None,
            password: None,
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// File-backed target registry.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
    secrets: SecretStorage,
    allow_plaintext: bool,
}

impl Registry {
    /// Opens the registry at `path`. The file is created on first save.
    pub fn open(path: impl Into<PathBuf>, secrets: SecretStorage) -> Self {
        Self {
            path: path.into(),
            secrets,
            allow_plaintext: false,
        }
    }

    /// Allows passwords to be written into the registry file when the keyring is unavailable.
    pub fn allow_plaintext(mut self, allow: bool) -> Self {
        self.allow_plaintext = allow;
        self
    }

    /// Registry file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all entries in file order. A missing file is an empty registry.
    pub fn load(&self) -> Result<Vec<ServerEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            FanoutError::registry(format!("Failed to read {}: {e}", self.path.display()))
        })?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries: Vec<ServerEntry> = serde_json::from_str(&content).map_err(|e| {
            FanoutError::registry(format!("Invalid registry file {}: {e}", self.path.display()))
        })?;

        ensure_unique_names(entries.iter().map(|e| e.name.as_str()))?;
        Ok(entries)
    }

    /// Replaces the registry contents.
    pub fn save(&self, entries: &[ServerEntry]) -> Result<()> {
        ensure_unique_names(entries.iter().map(|e| e.name.as_str()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    FanoutError::registry(format!("Failed to create {}: {e}", parent.display()))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| FanoutError::internal(format!("Failed to serialize registry: {e}")))?;
        std::fs::write(&self.path, json).map_err(|e| {
            FanoutError::registry(format!("Failed to write {}: {e}", self.path.display()))
        })?;

        debug!("Saved {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }

    /// Adds a new entry. Fails if the name is already taken (case-insensitive).
    pub fn add(&self, entry: ServerEntry, password: Option<&str>) -> Result<()> {
        let mut entries = self.load()?;
        if entries.iter().any(|e| e.matches(&entry.name)) {
            return Err(FanoutError::registry(format!(
                "Server with name '{}' already exists.",
                entry.name
            )));
        }

        let entry = self.with_password(entry, password)?;
        entries.push(entry);
        self.save(&entries)
    }

    /// Replaces the entry with the same name in place, or appends it.
    ///
    /// Without a new password the replaced entry keeps its stored password.
    pub fn add_or_update(&self, entry: ServerEntry, password: Option<&str>) -> Result<()> {
        let mut entries = self.load()?;

        let Some(index) = entries.iter().position(|e| e.matches(&entry.name)) else {
            entries.push(self.with_password(entry, password)?);
            return self.save(&entries);
        };

        let previous = &entries[index];
        let entry = match password {
            None => ServerEntry {
                password_storage: previous.password_storage,
                password: previous.password.clone(),
                ..entry
            },
            Some(_) => {
                let had_keyring = previous.password_storage == PasswordStorage::Keyring;
                let entry = self.with_password(entry, password)?;
                if had_keyring && entry.password_storage != PasswordStorage::Keyring {
                    self.secrets
                        .delete(&SecretStorage::target_password_key(&entry.name));
                }
                entry
            }
        };

        entries[index] = entry;
        self.save(&entries)
    }

    /// Removes the named entry. Returns false when no entry matched.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut entries = self.load()?;
        let before = entries.len();
        entries.retain(|e| !e.matches(name));

        if entries.len() == before {
            return Ok(false);
        }

        self.save(&entries)?;
        self.secrets.delete(&SecretStorage::target_password_key(name));
        Ok(true)
    }

    /// Immutable snapshot of all targets with passwords resolved.
    pub fn snapshot(&self) -> Result<Vec<Target>> {
        self.load()?
            .into_iter()
            .map(|entry| self.resolve(entry))
            .collect()
    }

    fn resolve(&self, entry: ServerEntry) -> Result<Target> {
        let mut connection = entry.connection;
        connection.password = match entry.password_storage {
            PasswordStorage::None => None,
            PasswordStorage::Plaintext => entry.password,
            PasswordStorage::Keyring => {
                let key = SecretStorage::target_password_key(&entry.name);
                let password = self.secrets.retrieve(&key)?;
                if password.is_none() {
                    warn!("No keyring password found for '{}'", entry.name);
                }
                password
            }
        };
        Ok(Target::new(entry.name, connection))
    }

    fn with_password(&self, mut entry: ServerEntry, password: Option<&str>) -> Result<ServerEntry> {
        match password {
            None => {
                entry.password_storage = PasswordStorage::None;
                entry.password = None;
            }
            Some(pw) if self.secrets.is_secure() => {
                let key = SecretStorage::target_password_key(&entry.name);
                self.secrets.store(&key, pw)?;
                entry.password_storage = PasswordStorage::Keyring;
                entry.password = None;
            }
            Some(pw) if self.allow_plaintext => {
                entry.password_storage = PasswordStorage::Plaintext;
                entry.password = Some(pw.to_string());
            }
            Some(_) => {
                return Err(FanoutError::secret(
                    "OS keyring is unavailable. Use --allow-plaintext to store the password in the registry file.",
                ))
            }
        }
        Ok(entry)
    }
}

/// Fails on the first name that repeats under case-insensitive comparison.
pub fn ensure_unique_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.to_lowercase()) {
            return Err(FanoutError::registry(format!(
                "Duplicate target name '{name}' (names are case-insensitive)"
            )));
        }
    }
    Ok(())
}
