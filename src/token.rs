use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::error::TokenError;
use crate::providers::TokenSet;

/// Tokens are treated as expired this long before their actual expiry, so a
/// request started just before the deadline does not carry a dead token.
const EXPIRY_DELTA_SECS: i64 = 10;

/// The persisted form of an OAuth2 credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    /// Empty when the provider issued no refresh token.
    pub refresh_token: String,
    /// `None` means the access token does not expire.
    pub expiry: Option<DateTime<Utc>>,
    pub token_type: String,
}

impl Token {
    /// Build a token from a provider response, anchoring `expires_in` at `now`.
    ///
    /// An `expires_in` that does not fit in a timestamp is treated as no expiry.
    pub fn from_token_set(set: TokenSet, now: DateTime<Utc>) -> Self {
        Self {
            access_token: set.access_token,
            refresh_token: set.refresh_token.unwrap_or_default(),
            expiry: set
                .expires_in
                .filter(|secs| *secs > 0)
                .and_then(|secs| expiry_after(now, secs)),
            token_type: set.token_type,
        }
    }

    /// Whether the access token is present and not about to expire.
    pub fn is_valid(&self) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry
                .checked_sub_signed(Duration::seconds(EXPIRY_DELTA_SECS))
                .is_some_and(|deadline| deadline > Utc::now()),
            None => true,
        }
    }

    /// Token type normalized for the `Authorization` header.
    ///
    /// Providers disagree on casing ("bearer", "Bearer"); an empty type
    /// defaults to `Bearer`.
    pub fn auth_scheme(&self) -> &str {
        let t = self.token_type.as_str();
        if t.is_empty() || t.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else if t.eq_ignore_ascii_case("mac") {
            "MAC"
        } else if t.eq_ignore_ascii_case("basic") {
            "Basic"
        } else {
            t
        }
    }

    /// Value for an `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.auth_scheme(), self.access_token)
    }

    /// Rejects tokens that must never reach a storage backend.
    pub(crate) fn check_storable(&self) -> Result<(), TokenError> {
        if self.access_token.is_empty() {
            return Err(TokenError::Data("refusing to store a token without an access token".into()));
        }
        Ok(())
    }
}

fn expiry_after(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let expiry = i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta));
    if expiry.is_none() {
        warn!("Ignoring out-of-range expires_in of {secs}s");
    }
    expiry
}
