use keyring::Entry;
use tracing::debug;

use super::store::{TokenStorage, TOKEN_KEY};
use super::StorageError;

/// Session token storage backed by the OS keychain.
///
/// The token lives under a single keychain entry keyed by `TOKEN_KEY`, so
/// writing a new token replaces the previous one. The entry is resolved once
/// and reused for every read and write.
pub struct KeyringStorage {
    service: String,
    entry: Entry,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Result<Self, StorageError> {
        let service = service.into();
        let entry = Entry::new(&service, TOKEN_KEY)?;
        Ok(Self { service, entry })
    }
}

impl TokenStorage for KeyringStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        match self.entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, value: &str) -> Result<(), StorageError> {
        self.entry.set_password(value)?;
        debug!(service = %self.service, "Stored session token in keychain");
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
