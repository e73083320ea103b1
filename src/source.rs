//! Token sources: providers of a current, possibly refreshed, token.
//!
//! The usual stack built by [`crate::PersistentConfig::token_source`] is
//!
//! ```text
//! ReuseTokenSource -> StorageTokenSource -> RefreshTokenSource -> provider
//! ```
//!
//! so the provider is only contacted when the held token is missing or
//! expired, and every token it hands out is persisted first.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::TokenError;
use crate::providers::OAuthProvider;
use crate::store::TokenStorage;
use crate::token::Token;

/// Anything that can hand out a token on demand.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<Token, TokenError>;
}

/// Always returns the same token. It never refreshes.
pub struct StaticTokenSource {
    token: Token,
}

impl StaticTokenSource {
    pub fn new(token: Token) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<Token, TokenError> {
        Ok(self.token.clone())
    }
}

/// Obtains a new token from the provider's refresh grant on every call.
pub struct RefreshTokenSource {
    provider: Arc<dyn OAuthProvider>,
    refresh_token: Mutex<String>,
}

impl RefreshTokenSource {
    pub fn new(provider: Arc<dyn OAuthProvider>, refresh_token: String) -> Self {
        Self {
            provider,
            refresh_token: Mutex::new(refresh_token),
        }
    }
}

#[async_trait]
impl TokenSource for RefreshTokenSource {
    async fn token(&self) -> Result<Token, TokenError> {
        let mut refresh_token = self.refresh_token.lock().await;
        if refresh_token.is_empty() {
            return Err(TokenError::RefreshFailed(
                "token expired and refresh token is not set".into(),
            ));
        }

        let set = self.provider.refresh_token(&refresh_token).await?;
        let mut token = Token::from_token_set(set, Utc::now());

        // Providers may omit the refresh token on refresh; keep using the old one.
        if token.refresh_token.is_empty() {
            token.refresh_token = refresh_token.clone();
        } else if *refresh_token != token.refresh_token {
            *refresh_token = token.refresh_token.clone();
        }

        info!("Refreshed {} token", self.provider.id());
        Ok(token)
    }
}

/// Persists every token the wrapped source yields before returning it.
///
/// Has no expiry logic of its own: put it behind a [`ReuseTokenSource`] so the
/// wrapped source only runs when a new token is actually needed.
pub struct StorageTokenSource {
    source: Box<dyn TokenSource>,
    storage: Arc<dyn TokenStorage>,
}

impl StorageTokenSource {
    pub fn new(source: Box<dyn TokenSource>, storage: Arc<dyn TokenStorage>) -> Self {
        Self { source, storage }
    }
}

#[async_trait]
impl TokenSource for StorageTokenSource {
    async fn token(&self) -> Result<Token, TokenError> {
        let token = self.source.token().await?;
        if let Err(e) = self.storage.store_token(&token).await {
            warn!("Obtained a token but failed to persist it: {e}");
            return Err(e);
        }
        debug!("Persisted token from wrapped source");
        Ok(token)
    }
}

/// Holds the current token and only asks the wrapped source for a new one
/// once the held token is missing or expired.
pub struct ReuseTokenSource {
    current: Mutex<Option<Token>>,
    source: Box<dyn TokenSource>,
}

impl ReuseTokenSource {
    pub fn new(token: Option<Token>, source: Box<dyn TokenSource>) -> Self {
        Self {
            current: Mutex::new(token),
            source,
        }
    }
}

#[async_trait]
impl TokenSource for ReuseTokenSource {
    async fn token(&self) -> Result<Token, TokenError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.clone());
        }

        let token = self.source.token().await?;
        *current = Some(token.clone());
        Ok(token)
    }
}
