//! Data models for the user service.
//!
//! - `UserRecord`, `UserId`: remote user entities as listed by the API
//! - `Registration`, `NewUser`, `UserUpdate`, `Credentials`: outgoing forms,
//!   each validated locally before anything is sent
//! - `ValidationError`, `Field`: field-level validation failures

pub mod user;

pub use user::{
    Credentials, Field, NewUser, Registration, UserId, UserRecord, UserUpdate, ValidationError,
    MIN_PASSWORD_LENGTH,
};
