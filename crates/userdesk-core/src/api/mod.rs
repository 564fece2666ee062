//! REST API client module for the user service.
//!
//! This module provides the `ApiClient` for logging in, registering, and
//! managing users. Authenticated calls carry the stored session token in
//! the Authorization header; a 401 from the server clears that token.

pub mod client;
pub mod error;

pub use client::{ApiClient, ClientOptions, DEFAULT_API_ENDPOINT, REQUEST_TIMEOUT_SECS};
pub use error::{Access, ApiError};
