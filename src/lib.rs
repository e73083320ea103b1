//! Persist OAuth2 tokens so a client does not repeat the authorization-code
//! exchange on every run.
//!
//! [`PersistentConfig`] wraps a provider and a [`TokenStorage`] backend: the
//! token from a code exchange, and every token obtained by refreshing it, is
//! written to storage before the caller sees it. A later run restores the
//! token with [`PersistentConfig::restore_token_source`].

pub mod config;
pub mod error;
pub mod persist;
pub mod providers;
pub mod source;
pub mod store;
pub mod token;

pub use config::Config;
pub use error::TokenError;
pub use persist::{AuthorizedClient, PersistentConfig};
pub use providers::{Endpoint, OAuthProvider, StandardProvider, TokenSet};
pub use source::{
    RefreshTokenSource, ReuseTokenSource, StaticTokenSource, StorageTokenSource, TokenSource,
};
pub use store::{FileTokenStorage, SqlTokenStorage, TokenStorage};
pub use token::Token;
