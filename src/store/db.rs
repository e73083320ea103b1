//! SQLite-backed token storage.
//!
//! Expects a table (default name `oauth2_tokens`) with the columns below.
//! The schema is owned by whoever provisions the database; [`SqlTokenStorage::migrate`]
//! only exists to bootstrap a fresh one (local dev, tests).
//!
//! ```sql
//! CREATE TABLE oauth2_tokens (
//!     id            INTEGER PRIMARY KEY,
//!     access_token  TEXT NOT NULL,
//!     refresh_token TEXT NOT NULL,
//!     expiry        DATETIME,
//!     token_type    TEXT
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::TokenStorage;
use crate::error::TokenError;
use crate::token::Token;

pub const DEFAULT_TABLE: &str = "oauth2_tokens";

/// Token storage backed by an SQLite pool.
#[derive(Debug, Clone)]
pub struct SqlTokenStorage {
    pool: SqlitePool,
    /// Row id of the token. Required for restore and delete; when unset,
    /// [`SqlTokenStorage::save`] allocates one.
    id: Option<i64>,
    table: String,
}

impl SqlTokenStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            id: None,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Open a pool for `db_url` (e.g. `sqlite://tokens.db?mode=rwc`).
    pub async fn connect(db_url: &str) -> Result<Self, TokenError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .map_err(|e| TokenError::Database(format!("Failed to connect to {db_url}: {e}")))?;

        Ok(Self::new(pool))
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Use a table other than `oauth2_tokens`.
    pub fn with_table(mut self, table: &str) -> Result<Self, TokenError> {
        let valid = !table.is_empty()
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !table.starts_with(|c: char| c.is_ascii_digit());
        if !valid {
            return Err(TokenError::Configuration(format!(
                "invalid table name {table:?}"
            )));
        }
        self.table = table.to_string();
        Ok(self)
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Expose the pool for direct use by callers.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the token table if it does not exist.
    pub async fn migrate(&self) -> Result<(), TokenError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id              INTEGER PRIMARY KEY,
                access_token    TEXT NOT NULL,
                refresh_token   TEXT NOT NULL,
                expiry          DATETIME,
                token_type      TEXT
            )
            "#,
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {table}_access_token_uindex ON {table}(access_token)",
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert `token` as a new row and return the generated id.
    ///
    /// Does not touch this handle's id; see [`SqlTokenStorage::save`].
    pub async fn insert_token(&self, token: &Token) -> Result<i64, TokenError> {
        token.check_storable()?;

        let result = sqlx::query(&format!(
            "INSERT INTO {} (access_token, refresh_token, expiry, token_type) VALUES (?1, ?2, ?3, ?4)",
            self.table
        ))
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(token.expiry)
        .bind(&token.token_type)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Inserted token row {id} into {}", self.table);
        Ok(id)
    }

    /// Store `token`, allocating an id on first use.
    ///
    /// Without an id this inserts and remembers the new id on this handle,
    /// so the next call upserts the same row. Returns the id in use.
    pub async fn save(&mut self, token: &Token) -> Result<i64, TokenError> {
        match self.id {
            Some(id) => {
                self.upsert(id, token).await?;
                Ok(id)
            }
            None => {
                let id = self.insert_token(token).await?;
                self.id = Some(id);
                Ok(id)
            }
        }
    }

    async fn upsert(&self, id: i64, token: &Token) -> Result<(), TokenError> {
        token.check_storable()?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, access_token, refresh_token, expiry, token_type)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expiry = excluded.expiry,
                token_type = excluded.token_type
            "#,
            self.table
        ))
        .bind(id)
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(token.expiry)
        .bind(&token.token_type)
        .execute(&self.pool)
        .await?;

        debug!("Upserted token row {id} in {}", self.table);
        Ok(())
    }

    fn require_id(&self, action: &str) -> Result<i64, TokenError> {
        self.id.ok_or_else(|| {
            TokenError::Configuration(format!("cannot {action} token: SqlTokenStorage id not set"))
        })
    }
}

#[async_trait]
impl TokenStorage for SqlTokenStorage {
    async fn store_token(&self, token: &Token) -> Result<(), TokenError> {
        let id = self.require_id("store")?;
        self.upsert(id, token).await
    }

    async fn restore_token(&self) -> Result<Token, TokenError> {
        let id = self.require_id("restore")?;

        let row = sqlx::query(&format!(
            "SELECT access_token, refresh_token, expiry, token_type FROM {} WHERE id = ?1",
            self.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Err(TokenError::NotFound(format!("token {id}"))),
        };

        let access_token: String = row.try_get(0)?;
        let refresh_token: String = row.try_get(1)?;
        let expiry: Option<DateTime<Utc>> = row.try_get(2)?;
        let token_type: Option<String> = row.try_get(3)?;

        debug!("Restored token row {id} from {}", self.table);
        Ok(Token {
            access_token,
            refresh_token,
            expiry,
            token_type: token_type.unwrap_or_default(),
        })
    }

    async fn delete_token(&self) -> Result<(), TokenError> {
        let id = self.require_id("delete")?;

        let affected = sqlx::query(&format!("DELETE FROM {} WHERE id = ?1", self.table))
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(TokenError::NotFound(format!("token {id}")));
        }

        debug!("Deleted token row {id} from {}", self.table);
        Ok(())
    }
}
