use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::storage::config::GoogleConfig;
use crate::storage::event_store::StoreError;
use crate::sync::google_api::{AccountApi, ApiError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to read authorization code: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("OAuth error: {0}")]
    OAuthError(String),
    #[error("Consent was not granted: {0}")]
    ConsentDenied(String),
    #[error("Session storage error: {0}")]
    StoreError(#[from] StoreError),
}

/// Persistence for the two session values. Both are opaque strings with no
/// expiry metadata; they are only removed by explicit invalidation or sign-out.
pub trait TokenStore: Send + Sync {
    fn load_token(&self) -> Result<Option<String>, StoreError>;
    fn save_token(&self, token: &str) -> Result<(), StoreError>;
    fn clear_token(&self) -> Result<(), StoreError>;
    fn load_primary_identity(&self) -> Result<Option<String>, StoreError>;
    fn save_primary_identity(&self, identity: &str) -> Result<(), StoreError>;
    fn clear_primary_identity(&self) -> Result<(), StoreError>;
}

/// Shows the consent URL to the user and returns the authorization code they
/// paste back. Implemented by the binary, which owns the terminal.
pub trait AuthorizationPrompt: Send + Sync {
    fn authorization_code(&self, auth_url: &str) -> std::io::Result<String>;
}

/// Interactive grant of a fresh access token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    async fn request_access_token(&self) -> Result<String, AuthError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub primary_identity: Option<String>,
}

/// Process-wide credential lifecycle: absent, acquired, in use, invalidated.
///
/// Validity is never predicted locally. A token is trusted until a remote call
/// is rejected with a 401, at which point [`AuthSession::invalidate_token`]
/// drops it unless a newer token has been granted in the meantime.
pub struct AuthSession {
    store: Arc<dyn TokenStore>,
    account: Arc<dyn AccountApi>,
    consent: Arc<dyn ConsentFlow>,
    installed_token: Mutex<Option<String>>,
    consent_gate: tokio::sync::Mutex<()>,
}

impl AuthSession {
    pub fn new(
        store: Arc<dyn TokenStore>,
        account: Arc<dyn AccountApi>,
        consent: Arc<dyn ConsentFlow>,
    ) -> Self {
        Self {
            store,
            account,
            consent,
            installed_token: Mutex::new(None),
            consent_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn installed(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.installed_token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stored_token(&self) -> Option<String> {
        match self.store.load_token() {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::error!("Failed to read stored access token: {}", e);
                None
            }
        }
    }

    /// Local-only check: a token is stored and installed for remote calls.
    /// May be a false positive for a token the service has silently expired.
    pub fn has_session(&self) -> bool {
        self.access_token().is_some()
    }

    /// The token to present on the next remote call, reinstalling the stored
    /// one when the in-memory copy is stale.
    pub fn access_token(&self) -> Option<String> {
        let stored = self.stored_token();
        let mut installed = self.installed();
        if *installed != stored {
            if stored.is_some() {
                tracing::debug!("Installing stored access token");
            }
            *installed = stored.clone();
        }
        stored
    }

    pub fn primary_identity(&self) -> Option<String> {
        match self.store.load_primary_identity() {
            Ok(identity) => identity.filter(|i| !i.is_empty()),
            Err(e) => {
                tracing::warn!("Failed to read cached primary identity: {}", e);
                None
            }
        }
    }

    /// Reuses a stored token the service still accepts, otherwise asks for
    /// consent. Concurrent callers share one interactive prompt.
    pub async fn acquire(&self) -> Result<Session, AuthError> {
        let _gate = self.consent_gate.lock().await;

        if let Some(token) = self.access_token() {
            match self.account.primary_identity(&token).await {
                Ok(identity) => {
                    tracing::info!("Reusing stored access token");
                    if self.primary_identity().is_none() {
                        self.cache_primary_identity(&identity);
                    }
                    return Ok(self.session_for(token));
                }
                Err(e) if e.is_auth_failure() => {
                    tracing::warn!("Stored access token was rejected, requesting consent");
                    self.invalidate_token(&token);
                }
                Err(e) => {
                    tracing::warn!("Could not validate stored token ({}), reusing it", e);
                    return Ok(self.session_for(token));
                }
            }
        }

        let token = self.consent.request_access_token().await?;
        self.store.save_token(&token)?;
        *self.installed() = Some(token.clone());
        tracing::info!("Access token granted");

        match self.account.primary_identity(&token).await {
            Ok(identity) => self.cache_primary_identity(&identity),
            Err(e) => tracing::warn!("Could not resolve primary calendar identity: {}", e),
        }

        Ok(self.session_for(token))
    }

    /// Drops the stored token unconditionally.
    pub fn invalidate(&self) {
        let mut installed = self.installed();
        self.drop_token(&mut installed);
    }

    /// Drops `used_token` after the service rejected it. A token granted
    /// while that call was in flight stays in place; returns whether the
    /// session was actually dropped.
    pub fn invalidate_token(&self, used_token: &str) -> bool {
        let mut installed = self.installed();
        let stored = self.stored_token();
        if let Some(current) = stored.as_deref()
            && current != used_token
        {
            tracing::info!("Ignoring 401 for a superseded access token");
            *installed = stored;
            return false;
        }
        self.drop_token(&mut installed);
        true
    }

    fn drop_token(&self, installed: &mut Option<String>) {
        if let Err(e) = self.store.clear_token() {
            tracing::error!("Failed to clear stored access token: {}", e);
        }
        *installed = None;
        tracing::warn!("Access token invalidated; re-authentication required");
    }

    pub fn sign_out(&self) -> Result<(), AuthError> {
        self.store.clear_token()?;
        self.store.clear_primary_identity()?;
        *self.installed() = None;
        tracing::info!("Signed out");
        Ok(())
    }

    /// Invalidates the session if `error` is a 401 for `used_token`, returning
    /// whether the session ended.
    pub fn observe(&self, error: &ApiError, used_token: &str) -> bool {
        error.is_auth_failure() && self.invalidate_token(used_token)
    }

    fn cache_primary_identity(&self, identity: &str) {
        match self.store.save_primary_identity(identity) {
            Ok(()) => tracing::info!("Cached primary calendar identity {}", identity),
            Err(e) => tracing::warn!("Failed to cache primary calendar identity: {}", e),
        }
    }

    fn session_for(&self, access_token: String) -> Session {
        Session {
            access_token,
            primary_identity: self.primary_identity(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// OAuth authorization-code flow for an installed app: the user opens the
/// consent URL, then pastes the code the redirect carries.
pub struct GoogleConsentFlow {
    config: GoogleConfig,
    client: reqwest::Client,
    prompt: Arc<dyn AuthorizationPrompt>,
}

impl GoogleConsentFlow {
    pub fn new(config: GoogleConfig, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            prompt,
        }
    }

    pub fn auth_url(&self) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&prompt=consent",
            self.config.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&self.config.scope)
        )
    }

    pub async fn exchange_code_for_token(&self, code: &str) -> Result<String, AuthError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self.client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::OAuthError(error_text));
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(token_response.access_token)
    }
}

#[async_trait]
impl ConsentFlow for GoogleConsentFlow {
    async fn request_access_token(&self) -> Result<String, AuthError> {
        if !self.config.has_credentials() {
            return Err(AuthError::OAuthError(
                "Missing Google OAuth client id or secret in config".to_string(),
            ));
        }

        let prompt = self.prompt.clone();
        let auth_url = self.auth_url();
        let code = tokio::task::spawn_blocking(move || prompt.authorization_code(&auth_url))
            .await
            .map_err(|e| AuthError::ConsentDenied(e.to_string()))??;

        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::ConsentDenied("no authorization code entered".to_string()));
        }

        self.exchange_code_for_token(code).await
    }
}
