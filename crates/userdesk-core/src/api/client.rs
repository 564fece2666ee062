//! API client for the user service REST API.
//!
//! `ApiClient` is the authenticated request gateway: it reads the session
//! token from the `CredentialStore`, attaches it to each call, and turns
//! every failure into an `ApiError` the front end can show.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{CredentialStore, SessionToken};
use crate::models::{Credentials, NewUser, Registration, UserId, UserRecord, UserUpdate};

use super::error::Access;
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Used when neither the environment nor the config file names an endpoint
pub const DEFAULT_API_ENDPOINT: &str = "https://backend-8-br78.onrender.com/api";

/// HTTP request timeout in seconds.
/// The backend runs on a host that cold-starts slowly, so 30s rather than less.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

const AUTH_SEGMENT: &str = "auth";
const USER_SEGMENT: &str = "user";

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout: Duration,
    /// Scheme placed before the token in the Authorization header.
    /// `None` sends the bare token, which is what the backend expects today.
    pub auth_scheme: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_ENDPOINT.to_string(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            auth_scheme: None,
        }
    }
}

/// API client for the user service.
/// Clone is cheap - reqwest::Client and the store are both shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    auth_scheme: Option<String>,
    store: Arc<CredentialStore>,
}

impl ApiClient {
    /// Create a new API client over the given credential store
    pub fn new(options: ClientOptions, store: Arc<CredentialStore>) -> anyhow::Result<Self> {
        let base_url = Url::parse(options.base_url.trim_end_matches('/'))
            .with_context(|| format!("Invalid API endpoint: {}", options.base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("API endpoint cannot carry a path: {}", base_url);
        }

        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            auth_scheme: options.auth_scheme,
            store,
        })
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ===== Session =====

    /// Whether a usable token is stored, so the login screen can be skipped
    pub fn has_session(&self) -> Result<bool, ApiError> {
        Ok(self.store.load()?.map(|t| !t.is_expired()).unwrap_or(false))
    }

    /// The stored token, if any
    pub fn session(&self) -> Result<Option<SessionToken>, ApiError> {
        Ok(self.store.load()?)
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.store.clear()?;
        info!("Logged out");
        Ok(())
    }

    /// Log in and persist the returned session token
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionToken, ApiError> {
        let credentials = Credentials { username, password };
        credentials.validate()?;

        let url = self.endpoint(&[AUTH_SEGMENT, "login"])?;
        debug!(url = %url, "Sending login request");
        let response = self
            .send(self.client.post(url).json(&credentials), Access::Public)
            .await?;

        let token = self.store_session(response, "login").await?;
        info!(username, "Login successful");
        Ok(token)
    }

    /// Register a new account. The form is checked locally first and nothing
    /// is sent when it fails.
    pub async fn register(&self, form: &Registration<'_>) -> Result<SessionToken, ApiError> {
        let body = form.validate()?;

        let url = self.endpoint(&[AUTH_SEGMENT, "register"])?;
        debug!(url = %url, "Sending registration request");
        let response = self
            .send(self.client.post(url).json(&body), Access::Public)
            .await?;

        let token = self.store_session(response, "registration").await?;
        info!(username = form.username, "Registration successful");
        Ok(token)
    }

    async fn store_session(&self, response: Response, what: &str) -> Result<SessionToken, ApiError> {
        let body: Value = Self::read_json(response, what).await?;
        let raw = SessionToken::find_in_response(&body).ok_or_else(|| {
            ApiError::UnexpectedServer(format!("The {} response carried no token", what))
        })?;
        Ok(self.store.save(raw)?)
    }

    // ===== Users =====

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, ApiError> {
        let url = self.endpoint(&[USER_SEGMENT])?;
        let response = self.authenticated(self.client.get(url)).await?;
        let users: Vec<UserRecord> = Self::read_json(response, "user list").await?;
        debug!(count = users.len(), "Fetched users");
        Ok(users)
    }

    pub async fn create_user(&self, user: &NewUser<'_>) -> Result<UserRecord, ApiError> {
        user.validate()?;

        let url = self.endpoint(&[USER_SEGMENT])?;
        let response = self.authenticated(self.client.post(url).json(user)).await?;
        let created: UserRecord = Self::read_json(response, "created user").await?;
        info!(user_id = %created.user_id, "User created");
        Ok(created)
    }

    /// Update a user. The server answers with a message rather than the
    /// record, so the returned record is built from the update unless the
    /// response happens to contain one.
    pub async fn update_user(
        &self,
        user_id: &UserId,
        update: &UserUpdate<'_>,
    ) -> Result<UserRecord, ApiError> {
        update.validate()?;

        let url = self.endpoint(&[USER_SEGMENT, user_id.as_str()])?;
        debug!(%user_id, password_changed = update.password.is_some(), "Updating user");
        let response = self.authenticated(self.client.put(url).json(update)).await?;

        let body: Value = Self::read_json_or_null(response).await?;
        if let Some(message) = body.get("message").and_then(Value::as_str) {
            info!(%user_id, message, "User updated");
        }
        Ok(serde_json::from_value::<UserRecord>(body)
            .unwrap_or_else(|_| update.apply_to(user_id.clone())))
    }

    /// Delete a user. Deleting an id that is already gone yields `NotFound`.
    pub async fn delete_user(&self, user_id: &UserId) -> Result<(), ApiError> {
        let url = self.endpoint(&[USER_SEGMENT, user_id.as_str()])?;
        self.authenticated(self.client.delete(url)).await?;
        info!(%user_id, "User deleted");
        Ok(())
    }

    // ===== Request plumbing =====

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::UnexpectedServer(format!("Invalid API endpoint: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Header value for the stored token.
    /// A missing, locally expired, or unsendable token means there is no
    /// session, and nothing goes over the wire.
    fn auth_header(&self) -> Result<header::HeaderValue, ApiError> {
        let Some(token) = self.store.load()? else {
            debug!("No stored session token");
            return Err(ApiError::SessionExpired);
        };

        if token.is_expired() {
            info!("Stored session token has expired, clearing");
            self.store.clear()?;
            return Err(ApiError::SessionExpired);
        }

        let value = match self.auth_scheme {
            Some(ref scheme) => format!("{} {}", scheme, token.as_str()),
            None => token.as_str().to_string(),
        };

        match header::HeaderValue::from_str(&value) {
            Ok(mut value) => {
                value.set_sensitive(true);
                Ok(value)
            }
            Err(_) => {
                warn!("Stored session token is not a valid header value, clearing");
                self.store.clear()?;
                Err(ApiError::SessionExpired)
            }
        }
    }

    async fn authenticated(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let auth = self.auth_header()?;
        let request = request
            .header(header::AUTHORIZATION, auth)
            .header(header::ACCEPT, "application/json");
        self.send(request, Access::Authenticated).await
    }

    async fn send(&self, request: RequestBuilder, access: Access) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "Request failed without a response");
            ApiError::from_transport(e)
        })?;
        self.check_response(response, access).await
    }

    /// Check if response is successful, returning a classified error if not.
    /// A 401 clears the stored token whichever call received it.
    async fn check_response(&self, response: Response, access: Access) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            match self.store.clear() {
                Ok(()) => info!("Server rejected the session, stored token cleared"),
                Err(e) => warn!(error = %e, "Failed to clear rejected session token"),
            }
        }

        let err = ApiError::from_status(status, &body, access);
        debug!(%status, error = %err, "Request rejected");
        Err(err)
    }

    async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, ApiError> {
        let text = response.text().await.map_err(ApiError::from_transport)?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::UnexpectedServer(format!("Failed to parse {}: {}", what, e)))
    }

    /// Like `read_json` but an empty body is `null` instead of an error
    async fn read_json_or_null(response: Response) -> Result<Value, ApiError> {
        let text = response.text().await.map_err(ApiError::from_transport)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}
