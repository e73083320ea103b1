use async_trait::async_trait;
use serde::Deserialize;

use super::traits::{OAuthProvider, TokenSet};
use crate::error::TokenError;

/// Authorization and token endpoint URLs of a provider.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub auth_url: String,
    pub token_url: String,
    /// Optional RFC 7009 revocation endpoint.
    pub revoke_url: Option<String>,
}

/// OAuth 2.0 provider speaking the plain RFC 6749 token endpoint dialect.
///
/// Client credentials go in an HTTP Basic `Authorization` header; grants are
/// form-encoded. This covers most providers without per-provider quirks.
pub struct StandardProvider {
    client_id: String,
    client_secret: String,
    endpoint: Endpoint,
    http: reqwest::Client,
}

// Raw token response from the token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: String,
    expires_in: Option<u64>,
    scope: Option<String>,
}

// RFC 6749 §5.2 error body
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    error_description: Option<String>,
}

impl From<TokenResponse> for TokenSet {
    fn from(resp: TokenResponse) -> Self {
        TokenSet {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            token_type: resp.token_type,
            expires_in: resp.expires_in,
            scope: resp.scope,
        }
    }
}

impl StandardProvider {
    pub fn new(client_id: String, client_secret: String, endpoint: Endpoint) -> Self {
        Self::with_http_client(client_id, client_secret, endpoint, reqwest::Client::new())
    }

    pub fn with_http_client(
        client_id: String,
        client_secret: String,
        endpoint: Endpoint,
        http: reqwest::Client,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            endpoint,
            http,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet, String> {
        let resp = self
            .http
            .post(&self.endpoint.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| format!("token request failed: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(describe_error(status, &body));
        }

        let token_resp: TokenResponse = resp
            .json()
            .await
            .map_err(|e| format!("failed to parse token response: {e}"))?;

        if token_resp.access_token.is_empty() {
            return Err("server response missing access_token".into());
        }

        Ok(token_resp.into())
    }
}

#[async_trait]
impl OAuthProvider for StandardProvider {
    fn id(&self) -> &str {
        "standard"
    }

    fn auth_url(&self, scopes: &[String], state: &str, redirect_uri: &str) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline");
        if !redirect_uri.is_empty() {
            query.append_pair("redirect_uri", redirect_uri);
        }
        if !scopes.is_empty() {
            query.append_pair("scope", &scopes.join(" "));
        }
        query.append_pair("state", state);

        let sep = if self.endpoint.auth_url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.endpoint.auth_url, sep, query.finish())
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, TokenError> {
        let mut form = vec![("grant_type", "authorization_code"), ("code", code)];
        if !redirect_uri.is_empty() {
            form.push(("redirect_uri", redirect_uri));
        }
        self.token_request(&form).await.map_err(TokenError::FlowError)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, TokenError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
        .map_err(TokenError::RefreshFailed)
    }

    async fn revoke(&self, token: &str) -> Result<(), TokenError> {
        let Some(revoke_url) = &self.endpoint.revoke_url else {
            return Ok(());
        };

        let resp = self
            .http
            .post(revoke_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| TokenError::FlowError(format!("Revoke request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TokenError::FlowError(describe_error(status, &body)));
        }

        Ok(())
    }
}

fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            error,
            error_description: Some(desc),
        }) => format!("{status}: {error}: {desc}"),
        Ok(ErrorResponse { error, .. }) => format!("{status}: {error}"),
        Err(_) => format!("{status}: {body}"),
    }
}
