//! Token storage backends.
//!
//! - `file`: one CSV record per identifier under a directory
//! - `db`: one row per identifier in an SQLite table

pub mod db;
pub mod file;

pub use db::SqlTokenStorage;
pub use file::FileTokenStorage;

use async_trait::async_trait;

use crate::error::TokenError;
use crate::token::Token;

/// Persists a single token for one identifier and recreates it later.
///
/// Implementations own their on-disk representation. Every call goes to the
/// backend; nothing is cached between calls.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Persist `token`, replacing whatever was stored for the identifier.
    async fn store_token(&self, token: &Token) -> Result<(), TokenError>;

    /// Read back the most recently stored token.
    async fn restore_token(&self) -> Result<Token, TokenError>;

    /// Remove the stored token.
    async fn delete_token(&self) -> Result<(), TokenError>;
}
