//! Secure password storage using the OS keyring.
//!
//! Registry entries reference keyring secrets by target name. When the
//! keyring is unavailable, passwords can only be kept in the registry file
//! with explicit consent.

use crate::error::{FanoutError, Result};
use keyring::Entry;
use tracing::warn;

const SERVICE_NAME: &str = "sql-fanout";

/// Manages secure storage of target passwords.
#[derive(Debug, Clone)]
pub struct SecretStorage {
    keyring_available: bool,
}

impl Default for SecretStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStorage {
    /// Creates a new secret storage instance, probing keyring availability.
    pub fn new() -> Self {
        Self {
            keyring_available: Self::probe_keyring(),
        }
    }

    /// Creates a storage that never touches the keyring.
    pub fn disabled() -> Self {
        Self {
            keyring_available: false,
        }
    }

    /// Probes whether the OS keyring is available.
    fn probe_keyring() -> bool {
        let test_entry = match Entry::new(SERVICE_NAME, "__probe__") {
            Ok(e) => e,
            Err(_) => return false,
        };

        match test_entry.set_password("test") {
            Ok(()) => {
                let _ = test_entry.delete_credential();
                true
            }
            Err(_) => false,
        }
    }

    /// Returns whether secure storage (keyring) is available.
    pub fn is_secure(&self) -> bool {
        self.keyring_available
    }

    /// Stores a secret in the keyring.
    pub fn store(&self, key: &str, secret: &str) -> Result<()> {
        if !self.keyring_available {
            return Err(FanoutError::secret("Keyring unavailable"));
        }

        let entry = Entry::new(SERVICE_NAME, key)
            .map_err(|e| FanoutError::secret(format!("Failed to create keyring entry: {e}")))?;

        entry
            .set_password(secret)
            .map_err(|e| FanoutError::secret(format!("Failed to store secret: {e}")))
    }

    /// Retrieves a secret from the keyring.
    pub fn retrieve(&self, key: &str) -> Result<Option<String>> {
        if !self.keyring_available {
            return Ok(None);
        }

        let entry = Entry::new(SERVICE_NAME, key)
            .map_err(|e| FanoutError::secret(format!("Failed to access keyring: {e}")))?;

        match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(FanoutError::secret(format!("Failed to retrieve secret: {e}"))),
        }
    }

    /// Deletes a secret from the keyring. Failures are logged, not returned.
    pub fn delete(&self, key: &str) {
        if !self.keyring_available {
            return;
        }

        let entry = match Entry::new(SERVICE_NAME, key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to access keyring: {e}");
                return;
            }
        };

        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => warn!("Failed to delete secret from keyring: {e}"),
        }
    }

    /// Keyring key for a target password. Target names are case-insensitive.
    pub fn target_password_key(target_name: &str) -> String {
        format!("target:{}", target_name.to_lowercase())
    }
}
