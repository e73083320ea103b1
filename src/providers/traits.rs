use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TokenError;

/// A set of tokens returned from an OAuth provider after code exchange or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
}

/// The upstream OAuth2 client: everything that talks to the provider's
/// authorization and token endpoints.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Short identifier used in logs (e.g., "google", "standard").
    fn id(&self) -> &str;

    /// Build the authorization URL that the user should be redirected to.
    ///
    /// - `scopes`: The OAuth scopes to request.
    /// - `state`: An opaque string for CSRF protection.
    /// - `redirect_uri`: The callback URL registered with the provider.
    fn auth_url(&self, scopes: &[String], state: &str, redirect_uri: &str) -> String;

    /// Exchange an authorization code for an access token (and optionally refresh token).
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, TokenError>;

    /// Obtain a fresh access token using a refresh token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, TokenError>;

    /// Revoke an access or refresh token. Not all providers support this.
    async fn revoke(&self, _token: &str) -> Result<(), TokenError> {
        Ok(())
    }
}
