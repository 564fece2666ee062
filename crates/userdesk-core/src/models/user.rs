use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Shortest password the registration form accepts
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Server-assigned user identifier.
///
/// The API returns numeric ids today, but nothing promises that, so any JSON
/// string or integer is accepted and kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<i64> for UserId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => UserId(n.to_string()),
            Raw::Text(s) => UserId(s),
        })
    }
}

/// A user as returned by `GET /user`. Passwords are never read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserRecord {
    #[serde(rename = "user_id", alias = "userId", alias = "id")]
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub user_id: UserId,
    #[serde(rename = "fullname", default)]
    pub full_name: String,
    #[serde(default)]
    pub username: String,
}

/// Form field a validation failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    FullName,
    Username,
    Password,
    ConfirmPassword,
}

impl Field {
    pub fn label(&self) -> &'static str {
        match self {
            Field::FullName => "Full name",
            Field::Username => "Username",
            Field::Password => "Password",
            Field::ConfirmPassword => "Confirm password",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: Field,
    pub reason: String,
}

impl ValidationError {
    fn new(field: Field, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    fn required(field: Field) -> Self {
        Self::new(field, "is required")
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn require(field: Field, value: &str) -> Result<(), ValidationError> {
    if is_blank(value) {
        Err(ValidationError::required(field))
    } else {
        Ok(())
    }
}

/// Body of `POST /auth/login`
#[derive(Debug, Serialize)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

impl Credentials<'_> {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(Field::Username, self.username)?;
        require(Field::Password, self.password)
    }
}

/// Registration form as the user filled it in
#[derive(Debug)]
pub struct Registration<'a> {
    pub full_name: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub confirm_password: &'a str,
}

impl<'a> Registration<'a> {
    /// Check the form and produce the request body.
    ///
    /// Order matters for the message shown: missing fields first, then the
    /// confirmation mismatch, then password strength.
    pub fn validate(&self) -> Result<NewUser<'a>, ValidationError> {
        require(Field::FullName, self.full_name)?;
        require(Field::Username, self.username)?;
        require(Field::Password, self.password)?;
        require(Field::ConfirmPassword, self.confirm_password)?;

        if self.password != self.confirm_password {
            return Err(ValidationError::new(Field::ConfirmPassword, "passwords don't match"));
        }

        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ValidationError::new(
                Field::Password,
                format!("must be at least {} characters long", MIN_PASSWORD_LENGTH),
            ));
        }

        Ok(NewUser {
            full_name: self.full_name,
            username: self.username,
            password: self.password,
        })
    }
}

/// Body of `POST /auth/register` and `POST /user`
#[derive(Debug, Serialize)]
pub struct NewUser<'a> {
    #[serde(rename = "fullname")]
    pub full_name: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

impl NewUser<'_> {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(Field::FullName, self.full_name)?;
        require(Field::Username, self.username)?;
        require(Field::Password, self.password)
    }
}

/// Body of `PUT /user/{id}`.
///
/// A blank password is dropped from the payload entirely: the server reads
/// an absent field as "keep the current password".
#[derive(Debug, Serialize)]
pub struct UserUpdate<'a> {
    #[serde(rename = "fullname")]
    pub full_name: &'a str,
    pub username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<&'a str>,
}

impl<'a> UserUpdate<'a> {
    pub fn new(full_name: &'a str, username: &'a str, password: Option<&'a str>) -> Self {
        Self {
            full_name,
            username,
            password: password.filter(|p| !is_blank(p)),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require(Field::FullName, self.full_name)?;
        require(Field::Username, self.username)
    }

    /// The record as it looks after this update, for patching local state
    pub fn apply_to(&self, user_id: UserId) -> UserRecord {
        UserRecord {
            user_id,
            full_name: self.full_name.to_string(),
            username: self.username.to_string(),
        }
    }
}
