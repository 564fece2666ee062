//! Authentication module for managing the session token.
//!
//! This module provides:
//! - `SessionToken`: the normalized session credential and its JWT claims
//! - `CredentialStore`: single-slot persistence of the token across restarts
//! - `TokenStorage` backends: plain file, OS keychain (via keyring), memory
//!
//! Every write path stores the already-normalized token string, so a fresh
//! value loads back verbatim. Values written by older builds in other shapes
//! are still normalized on load.

pub mod credentials;
pub mod error;
pub mod session;
pub mod store;

pub use credentials::KeyringStorage;
pub use error::StorageError;
pub use session::{SessionToken, TokenClaims};
pub use store::{CredentialStore, FileStorage, MemoryStorage, TokenStorage, TOKEN_KEY};
