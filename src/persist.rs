use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::TokenError;
use crate::providers::OAuthProvider;
use crate::source::{RefreshTokenSource, ReuseTokenSource, StorageTokenSource, TokenSource};
use crate::store::TokenStorage;
use crate::token::Token;

/// An OAuth2 client configuration whose tokens are persisted as soon as
/// they are obtained or refreshed.
#[derive(Clone)]
pub struct PersistentConfig {
    provider: Arc<dyn OAuthProvider>,
    redirect_uri: String,
    scopes: Vec<String>,
    storage: Arc<dyn TokenStorage>,
    http: reqwest::Client,
}

impl PersistentConfig {
    pub fn new(
        provider: Arc<dyn OAuthProvider>,
        redirect_uri: impl Into<String>,
        storage: Arc<dyn TokenStorage>,
    ) -> Self {
        Self {
            provider,
            redirect_uri: redirect_uri.into(),
            scopes: Vec::new(),
            storage,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// HTTP client used by [`PersistentConfig::client`].
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn storage(&self) -> &Arc<dyn TokenStorage> {
        &self.storage
    }

    /// URL of the provider's consent page.
    pub fn auth_code_url(&self, state: &str) -> String {
        self.provider.auth_url(&self.scopes, state, &self.redirect_uri)
    }

    /// Exchange an authorization code and persist the resulting token.
    ///
    /// If storing fails the token is dropped and the storage error returned,
    /// even though the exchange itself succeeded.
    pub async fn exchange(&self, code: &str) -> Result<Token, TokenError> {
        let set = self.provider.exchange_code(code, &self.redirect_uri).await?;
        let token = Token::from_token_set(set, Utc::now());

        if let Err(e) = self.storage.store_token(&token).await {
            warn!("Exchanged {} code but failed to persist token: {e}", self.provider.id());
            return Err(e);
        }

        info!("Exchanged and stored {} token", self.provider.id());
        Ok(token)
    }

    /// A token source seeded with `token` that refreshes through the provider
    /// and persists each refreshed token. A still-valid token is handed back
    /// without refreshing or storing.
    pub fn token_source(&self, token: Token) -> Arc<dyn TokenSource> {
        let refresh = RefreshTokenSource::new(self.provider.clone(), token.refresh_token.clone());
        let storing = StorageTokenSource::new(Box::new(refresh), self.storage.clone());
        Arc::new(ReuseTokenSource::new(Some(token), Box::new(storing)))
    }

    /// Reload the last stored token and build a token source from it.
    pub async fn restore_token_source(&self) -> Result<Arc<dyn TokenSource>, TokenError> {
        let token = self.storage.restore_token().await?;
        Ok(self.token_source(token))
    }

    /// Revoke the stored token with the provider, then delete it from storage.
    ///
    /// The refresh token is revoked when there is one, otherwise the access
    /// token. A failed revocation leaves the stored token in place.
    pub async fn revoke(&self) -> Result<(), TokenError> {
        let token = self.storage.restore_token().await?;
        let credential = if token.refresh_token.is_empty() {
            &token.access_token
        } else {
            &token.refresh_token
        };

        self.provider.revoke(credential).await?;
        self.storage.delete_token().await?;
        info!("Revoked and deleted {} token", self.provider.id());
        Ok(())
    }

    /// An HTTP client that authorizes requests with `token`, refreshing and
    /// persisting it as needed.
    pub fn client(&self, token: Token) -> AuthorizedClient {
        AuthorizedClient::new(self.http.clone(), self.token_source(token))
    }
}

/// HTTP client that attaches the current token to every request.
#[derive(Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    source: Arc<dyn TokenSource>,
}

impl AuthorizedClient {
    pub fn new(http: reqwest::Client, source: Arc<dyn TokenSource>) -> Self {
        Self { http, source }
    }

    pub fn token_source(&self) -> &Arc<dyn TokenSource> {
        &self.source
    }

    /// Start a request carrying an `Authorization` header for the current token.
    pub async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
    ) -> Result<reqwest::RequestBuilder, TokenError> {
        let token = self.source.token().await?;
        Ok(self
            .http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, token.authorization_header()))
    }

    pub async fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, TokenError> {
        self.request(reqwest::Method::GET, url).await
    }

    pub async fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, TokenError> {
        self.request(reqwest::Method::POST, url).await
    }
}
