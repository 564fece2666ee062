//! Application state management for userdesk.
//!
//! `App` wires config, the credential store, and the API client together and
//! carries out each command. `HomeState` is the in-memory user list the home
//! screen shows: refreshed wholesale after login, patched in place after
//! local changes, never reconciled against other clients' edits.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use userdesk_core::auth::TokenClaims;
use userdesk_core::{
    ApiClient, ApiError, Config, NewUser, Registration, UserId, UserRecord, UserUpdate,
};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable consulted before prompting for a password
const PASSWORD_ENV: &str = "USERDESK_PASSWORD";

/// Maximum length for username input.
const MAX_USERNAME_LENGTH: usize = 50;

/// Column width for full names in the user table
const NAME_COLUMN_WIDTH: usize = 24;

// ============================================================================
// Home state
// ============================================================================

#[derive(Debug, Default)]
pub struct HomeState {
    pub users: Vec<UserRecord>,
    pub current_user: Option<TokenClaims>,
}

impl HomeState {
    /// Replace the list with the server's copy.
    ///
    /// On failure the previous list stays as it was and the error goes back
    /// to the caller; a `SessionExpired` means the caller must send the user
    /// back to login.
    pub async fn refresh(&mut self, api: &ApiClient) -> Result<(), ApiError> {
        match api.list_users().await {
            Ok(users) => {
                debug!(count = users.len(), "User list refreshed");
                self.users = users;
                self.current_user = api.session()?.and_then(|t| t.claims());
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh user list");
                Err(e)
            }
        }
    }

    pub fn find(&self, user_id: &UserId) -> Option<&UserRecord> {
        self.users.iter().find(|u| &u.user_id == user_id)
    }

    pub fn user_created(&mut self, record: UserRecord) {
        self.users.push(record);
    }

    /// Only name fields are patched; a record missing locally is left alone
    pub fn user_updated(&mut self, record: &UserRecord) {
        if let Some(existing) = self.users.iter_mut().find(|u| u.user_id == record.user_id) {
            existing.full_name = record.full_name.clone();
            existing.username = record.username.clone();
        }
    }

    pub fn user_deleted(&mut self, user_id: &UserId) {
        self.users.retain(|u| &u.user_id != user_id);
    }

    pub fn clear(&mut self) {
        self.users.clear();
        self.current_user = None;
    }
}

/// Render the user list as a plain-text table
pub fn render_users(users: &[UserRecord]) -> String {
    if users.is_empty() {
        return "No users found.".to_string();
    }

    let id_width = users
        .iter()
        .map(|u| u.user_id.as_str().len())
        .max()
        .unwrap_or(0)
        .max(2);

    let mut out = format!("{:<id_width$}  {:<NAME_COLUMN_WIDTH$}  USERNAME\n", "ID", "FULL NAME");
    for user in users {
        out.push_str(&format!(
            "{:<id_width$}  {:<NAME_COLUMN_WIDTH$}  @{}\n",
            user.user_id.as_str(),
            truncate(&user.full_name, NAME_COLUMN_WIDTH),
            user.username,
        ));
    }
    out.pop();
    out
}

/// Truncate a string to a maximum length, adding ellipsis if needed
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// App
// ============================================================================

pub struct App {
    pub config: Config,
    pub api: ApiClient,
    pub home: HomeState,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        debug!(storage = ?config.storage, "Config loaded");

        let store = config.open_store().context("Failed to open credential store")?;
        let api = ApiClient::new(config.client_options(), Arc::new(store))?;
        info!(endpoint = %api.base_url(), "Using API endpoint");

        Ok(Self::with_parts(config, api))
    }

    pub fn with_parts(config: Config, api: ApiClient) -> Self {
        Self {
            config,
            api,
            home: HomeState::default(),
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username {
            Some(u) => u,
            None => Self::prompt_username(self.config.last_username.as_deref())?,
        };
        let password = match std::env::var(PASSWORD_ENV) {
            Ok(p) if !p.is_empty() => p,
            _ => Self::prompt_password("Password: ")?,
        };

        self.api.login(&username, &password).await?;

        self.config.last_username = Some(username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        println!("Login successful!");
        self.list_users().await
    }

    pub async fn register(&mut self, full_name: &str, username: &str) -> Result<()> {
        let password = Self::prompt_password("Password: ")?;
        let confirm_password = Self::prompt_password("Confirm password: ")?;

        let form = Registration {
            full_name,
            username,
            password: &password,
            confirm_password: &confirm_password,
        };
        self.api.register(&form).await?;

        println!("Registration successful! You are now signed in.");
        Ok(())
    }

    pub fn logout(&mut self) -> Result<()> {
        self.api.logout()?;
        self.home.clear();
        println!("You have been logged out successfully.");
        Ok(())
    }

    /// Show who the stored token belongs to
    pub fn whoami(&self) -> Result<()> {
        let Some(token) = self.api.session()? else {
            println!("Not logged in.");
            return Ok(());
        };

        if token.is_expired() {
            println!("The saved session has expired. Please login again.");
            return Ok(());
        }

        match token.claims() {
            Some(claims) => {
                if let Some(username) = claims.username.as_deref() {
                    println!("Username: {}", username);
                }
                if let Some(id) = claims.subject() {
                    println!("User ID:  {}", id);
                }
                if let Some(expires) = claims.expires_at() {
                    println!("Expires:  {}", expires.format("%b %d, %Y %H:%M UTC"));
                }
            }
            None => println!("Logged in (opaque session token)."),
        }
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn list_users(&mut self) -> Result<()> {
        self.home.refresh(&self.api).await?;
        println!("{}", render_users(&self.home.users));
        Ok(())
    }

    pub async fn create_user(&mut self, full_name: &str, username: &str, password: &str) -> Result<()> {
        let user = NewUser {
            full_name,
            username,
            password,
        };
        user.validate().map_err(ApiError::from)?;

        self.refresh_before_change().await?;
        let created = self.api.create_user(&user).await?;
        println!("User created successfully.");
        self.home.user_created(created);
        println!("{}", render_users(&self.home.users));
        Ok(())
    }

    /// Update a user. Fields left out keep their current values, which are
    /// looked up from a fresh copy of the list; a blank password keeps the
    /// current one.
    pub async fn update_user(
        &mut self,
        user_id: &UserId,
        full_name: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<()> {
        let (full_name, username) = match (full_name, username) {
            (Some(full_name), Some(username)) => {
                UserUpdate::new(&full_name, &username, password.as_deref())
                    .validate()
                    .map_err(ApiError::from)?;
                self.refresh_before_change().await?;
                (full_name, username)
            }
            (full_name, username) => {
                self.home.refresh(&self.api).await?;
                let selected = self
                    .home
                    .find(user_id)
                    .ok_or_else(|| anyhow::anyhow!("No user with ID {}", user_id))?;
                (
                    full_name.unwrap_or_else(|| selected.full_name.clone()),
                    username.unwrap_or_else(|| selected.username.clone()),
                )
            }
        };

        let update = UserUpdate::new(&full_name, &username, password.as_deref());
        let record = self.api.update_user(user_id, &update).await?;
        println!("User successfully updated.");
        self.home.user_updated(&record);
        println!("{}", render_users(&self.home.users));
        Ok(())
    }

    pub async fn delete_user(&mut self, user_id: &UserId, confirmed: bool) -> Result<()> {
        if !confirmed && !Self::confirm("Are you sure you want to delete this user? This action cannot be undone.")? {
            println!("Cancelled.");
            return Ok(());
        }

        self.refresh_before_change().await?;
        match self.api.delete_user(user_id).await {
            Ok(()) => println!("User successfully deleted."),
            // Already gone is as good as deleted
            Err(ApiError::NotFound(_)) => println!("User was already deleted."),
            Err(e) => return Err(e.into()),
        }
        self.home.user_deleted(user_id);
        println!("{}", render_users(&self.home.users));
        Ok(())
    }

    /// Load the list so the table printed after a change is complete.
    ///
    /// Only a dead session stops the change; any other list failure is
    /// logged and the change goes ahead against the list as it is.
    async fn refresh_before_change(&mut self) -> Result<(), ApiError> {
        match self.home.refresh(&self.api).await {
            Err(ApiError::SessionExpired) => Err(ApiError::SessionExpired),
            Err(e) => {
                debug!(error = %e, "Continuing without a fresh user list");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    // =========================================================================
    // Prompts
    // =========================================================================

    fn prompt_username(last_username: Option<&str>) -> Result<String> {
        match last_username {
            Some(last) => print!("Username [{}]: ", last),
            None => print!("Username: "),
        }
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        let username = match (input.is_empty(), last_username) {
            (true, Some(last)) => last.to_string(),
            _ => input.to_string(),
        };
        Ok(username.chars().take(MAX_USERNAME_LENGTH).collect())
    }

    pub(crate) fn prompt_password(prompt: &str) -> Result<String> {
        let password = rpassword::prompt_password(prompt)?;
        Ok(password)
    }

    fn confirm(question: &str) -> Result<bool> {
        print!("{} [y/N]: ", question);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use userdesk_core::{ClientOptions, CredentialStore};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user(id: i64, full_name: &str, username: &str) -> UserRecord {
        UserRecord {
            user_id: UserId::from(id),
            full_name: full_name.to_string(),
            username: username.to_string(),
        }
    }

    async fn api_for(server: &MockServer) -> ApiClient {
        let options = ClientOptions {
            base_url: format!("{}/api", server.uri()),
            ..ClientOptions::default()
        };
        ApiClient::new(options, Arc::new(CredentialStore::in_memory())).unwrap()
    }

    // -------------------------------------------------------------------------
    // HomeState Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_home_patches() {
        let mut home = HomeState {
            users: vec![user(1, "Alice", "alice"), user(2, "Bob", "bob")],
            current_user: None,
        };

        home.user_created(user(3, "Carol", "carol"));
        assert_eq!(home.users.len(), 3);

        home.user_updated(&user(2, "Robert", "rob"));
        let bob = home.find(&UserId::from(2)).unwrap();
        assert_eq!(bob.full_name, "Robert");
        assert_eq!(bob.username, "rob");

        // Unknown ids are ignored rather than appended
        home.user_updated(&user(99, "Ghost", "ghost"));
        assert_eq!(home.users.len(), 3);

        home.user_deleted(&UserId::from(1));
        assert!(home.find(&UserId::from(1)).is_none());
        home.user_deleted(&UserId::from(1));
        assert_eq!(home.users.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_replaces_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"user_id": 10, "fullname": "Dana", "username": "dana"}
            ])))
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        api.store().save(&json!("tok")).unwrap();

        let mut home = HomeState {
            users: vec![user(1, "Stale", "stale")],
            current_user: None,
        };
        home.refresh(&api).await.unwrap();
        assert_eq!(home.users, vec![user(10, "Dana", "dana")]);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "db down"})))
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        api.store().save(&json!("tok")).unwrap();

        let mut home = HomeState {
            users: vec![user(1, "Alice", "alice")],
            current_user: None,
        };
        assert_matches!(home.refresh(&api).await, Err(ApiError::RemoteRejected(_)));
        assert_eq!(home.users.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_without_session() {
        let server = MockServer::start().await;
        let api = api_for(&server).await;

        let mut home = HomeState::default();
        assert_matches!(home.refresh(&api).await, Err(ApiError::SessionExpired));
    }

    // -------------------------------------------------------------------------
    // Command Tests
    // -------------------------------------------------------------------------

    async fn requests(server: &MockServer) -> usize {
        server.received_requests().await.map(|r| r.len()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_list_with_expired_token_clears_session() {
        let server = MockServer::start().await;
        let api = api_for(&server).await;
        // {"alg":"HS256"} . {"exp":1}
        api.store()
            .save(&json!("eyJhbGciOiJIUzI1NiJ9.eyJleHAiOjF9.sig"))
            .unwrap();

        let mut app = App::with_parts(Config::default(), api);
        let err = app.list_users().await.unwrap_err();

        assert_matches!(err.downcast_ref::<ApiError>(), Some(ApiError::SessionExpired));
        assert!(app.api.store().load().unwrap().is_none());
        assert_eq!(requests(&server).await, 0);
    }

    #[tokio::test]
    async fn test_create_validates_before_any_request() {
        let server = MockServer::start().await;
        let api = api_for(&server).await;
        api.store().save(&json!("tok")).unwrap();

        let mut app = App::with_parts(Config::default(), api);
        let err = app.create_user("", "carol", "secret1").await.unwrap_err();

        assert_matches!(err.downcast_ref::<ApiError>(), Some(ApiError::Validation(_)));
        assert_eq!(requests(&server).await, 0);
    }

    #[tokio::test]
    async fn test_create_survives_failed_list_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "db down"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/user"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!(
                {"user_id": 3, "fullname": "Carol", "username": "carol"}
            )))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        api.store().save(&json!("tok")).unwrap();

        let mut app = App::with_parts(Config::default(), api);
        app.create_user("Carol", "carol", "secret1").await.unwrap();
        assert_eq!(app.home.users, vec![user(3, "Carol", "carol")]);
    }

    #[tokio::test]
    async fn test_update_with_all_fields_survives_failed_list_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/user/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "updated"})))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        api.store().save(&json!("tok")).unwrap();

        let mut app = App::with_parts(Config::default(), api);
        app.update_user(
            &UserId::from(2),
            Some("Robert".to_string()),
            Some("rob".to_string()),
            None,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_update_rejects_blank_name_before_any_request() {
        let server = MockServer::start().await;
        let api = api_for(&server).await;
        api.store().save(&json!("tok")).unwrap();

        let mut app = App::with_parts(Config::default(), api);
        let err = app
            .update_user(&UserId::from(2), Some(" ".to_string()), Some("rob".to_string()), None)
            .await
            .unwrap_err();

        assert_matches!(err.downcast_ref::<ApiError>(), Some(ApiError::Validation(_)));
        assert_eq!(requests(&server).await, 0);
    }

    #[tokio::test]
    async fn test_delete_survives_failed_list_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/user/7"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        api.store().save(&json!("tok")).unwrap();

        let mut app = App::with_parts(Config::default(), api);
        app.delete_user(&UserId::from(7), true).await.unwrap();
    }

    // -------------------------------------------------------------------------
    // Rendering Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_render_users() {
        let table = render_users(&[user(1, "Alice", "alice"), user(22, "Bob", "bob")]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].contains("Alice"));
        assert!(lines[2].ends_with("@bob"));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_users(&[]), "No users found.");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Hello", 10), "Hello");
        assert_eq!(truncate("Hello World", 8), "Hello...");
    }
}
