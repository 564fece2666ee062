use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON pointers tried, in order, when a credential arrives as structured data.
const TOKEN_POINTERS: [&str; 3] = ["/data/token", "/token", "/accessToken"];

/// Normalized session credential.
///
/// Always a non-empty string. The value itself never appears in `Debug`
/// output so it can sit inside logged structs.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap an already-normalized token string. Empty strings are rejected.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Normalize a credential in whatever shape the server handed it over:
    /// a bare string, `{token}`, `{accessToken}`, `{data: {token}}`, or some
    /// other structure, which is kept as its JSON text.
    pub fn from_raw(raw: &Value) -> Option<Self> {
        normalize_value(raw).and_then(Self::new)
    }

    /// Normalize a persisted value.
    ///
    /// Current builds persist the bare token, but older ones wrote it
    /// JSON-encoded or wrapped, so the stored text is parsed first and used
    /// verbatim only when it isn't JSON.
    pub fn from_stored(stored: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(stored) {
            Ok(Value::Null) => None,
            Ok(value @ (Value::String(_) | Value::Object(_) | Value::Array(_))) => {
                Self::from_raw(&value)
            }
            Ok(_) | Err(_) => Self::new(stored),
        }
    }

    /// Locate the credential inside a login or registration response body.
    ///
    /// Unlike `from_raw`, an object without any token field yields `None`
    /// instead of being stringified.
    pub fn find_in_response(body: &Value) -> Option<&Value> {
        fn present(value: &&Value) -> bool {
            match value {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            }
        }

        if let Some(token) = body.get("token").filter(present) {
            return Some(token);
        }
        TOKEN_POINTERS
            .iter()
            .filter_map(|pointer| body.pointer(pointer))
            .find(present)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the JWT payload without verifying the signature.
    /// Returns `None` for opaque tokens.
    pub fn claims(&self) -> Option<TokenClaims> {
        TokenClaims::decode(&self.0)
    }

    /// True only when the token is a JWT whose `exp` lies in the past.
    /// Opaque tokens never expire locally; the server decides.
    pub fn is_expired(&self) -> bool {
        self.claims()
            .map(|c| c.is_expired_at(Utc::now()))
            .unwrap_or(false)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

fn normalize_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(_) => {
            for pointer in TOKEN_POINTERS {
                if let Some(found) = value.pointer(pointer).and_then(normalize_candidate) {
                    return Some(found);
                }
            }
            Some(value.to_string())
        }
        Value::Bool(true) | Value::Array(_) => Some(value.to_string()),
    }
}

/// A token field only counts when it holds something usable; empty strings
/// and nulls fall through to the next candidate.
fn normalize_candidate(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::String(_) | Value::Number(_) | Value::Object(_) => normalize_value(value),
        _ => None,
    }
}

/// Claims carried in a JWT session token.
///
/// The backend is not consistent about where it puts the user id, so all of
/// the common spellings are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl TokenClaims {
    pub fn decode(token: &str) -> Option<Self> {
        let mut parts = token.split('.');
        let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// The signed-in user's id, whichever claim carries it.
    pub fn subject(&self) -> Option<String> {
        [&self.user_id, &self.id, &self.sub]
            .into_iter()
            .flatten()
            .find_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|at| at <= now).unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) fn make_jwt(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}
