//! Core library for userdesk.
//!
//! Holds everything below the front end: the session token store, the
//! authenticated API gateway, the user models, and configuration. Front ends
//! own their view state and call into `ApiClient` for every remote action.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ClientOptions};
pub use auth::{CredentialStore, SessionToken};
pub use config::Config;
pub use models::{NewUser, Registration, UserId, UserRecord, UserUpdate};
