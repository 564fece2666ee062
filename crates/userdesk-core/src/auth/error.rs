use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential contains no usable token")]
    EmptyCredential,

    #[error("Credential storage lock poisoned")]
    Poisoned,
}
