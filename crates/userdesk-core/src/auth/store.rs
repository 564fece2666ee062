use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tracing::{debug, info};

use super::{SessionToken, StorageError};

/// Fixed key the session token is persisted under.
pub const TOKEN_KEY: &str = "token";

/// A durable single-value slot for the session token.
///
/// `write` replaces whatever was there; `remove` succeeds when the slot is
/// already empty.
pub trait TokenStorage: Send + Sync {
    fn read(&self) -> Result<Option<String>, StorageError>;
    fn write(&self, value: &str) -> Result<(), StorageError>;
    fn remove(&self) -> Result<(), StorageError>;
}

/// Holds at most one session credential for this application instance.
pub struct CredentialStore {
    backend: Box<dyn TokenStorage>,
}

impl CredentialStore {
    pub fn new(backend: impl TokenStorage + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::default())
    }

    /// Normalize and persist a credential, replacing any prior one.
    pub fn save(&self, raw: &Value) -> Result<SessionToken, StorageError> {
        let token = SessionToken::from_raw(raw).ok_or(StorageError::EmptyCredential)?;
        self.save_token(&token)?;
        Ok(token)
    }

    pub fn save_token(&self, token: &SessionToken) -> Result<(), StorageError> {
        self.backend.write(token.as_str())?;
        info!("Session token saved");
        Ok(())
    }

    pub fn load(&self) -> Result<Option<SessionToken>, StorageError> {
        Ok(self
            .backend
            .read()?
            .and_then(|stored| SessionToken::from_stored(&stored)))
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.backend.remove()?;
        debug!("Session token cleared");
        Ok(())
    }
}

/// Token kept in a plain file, by default under the user's data directory.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStorage for FileStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, value: &str) -> Result<(), StorageError> {
        write_atomic(&self.path, value)
    }

    fn remove(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write through a temp file and rename so a crash never leaves a torn token.
/// The file is owner read/write only on unix.
fn write_atomic(path: &Path, value: &str) -> Result<(), StorageError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let tmp_path = dir.join(format!(".{}.tmp.{}", TOKEN_KEY, std::process::id()));
    fs::write(&tmp_path, value)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, path)?;
    debug!(path = %path.display(), "Persisted session token");
    Ok(())
}

#[derive(Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<String>>,
}

impl TokenStorage for MemoryStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        Ok(self.slot.lock().map_err(|_| StorageError::Poisoned)?.clone())
    }

    fn write(&self, value: &str) -> Result<(), StorageError> {
        *self.slot.lock().map_err(|_| StorageError::Poisoned)? = Some(value.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        self.slot.lock().map_err(|_| StorageError::Poisoned)?.take();
        Ok(())
    }
}
