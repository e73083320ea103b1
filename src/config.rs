use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::persist::PersistentConfig;
use crate::providers::{Endpoint, StandardProvider};
use crate::store::{FileTokenStorage, SqlTokenStorage, TokenStorage};

/// Where tokens are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// `<path>/<token_id>.csv`
    File {
        path: PathBuf,
        token_id: Option<String>,
    },
    /// Row `id` in `oauth2_tokens`.
    Sql { database_url: String, id: i64 },
}

/// Client configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── OAuth client ────────────────────────────────────────────────────
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: Option<String>,
    pub redirect_url: String,
    pub scopes: Vec<String>,

    // ── Storage ─────────────────────────────────────────────────────────
    pub storage: StorageConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup (the environment, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let storage = match var("TOKEN_STORAGE").as_deref().unwrap_or("file") {
            "file" => StorageConfig::File {
                path: var("TOKEN_STORAGE_PATH")
                    .map(PathBuf::from)
                    .context("TOKEN_STORAGE_PATH is required for file storage")?,
                token_id: var("TOKEN_ID"),
            },
            "sql" => StorageConfig::Sql {
                database_url: var("DATABASE_URL")
                    .context("DATABASE_URL is required for sql storage")?,
                // Row ids are allocated by SqlTokenStorage::save, not here.
                id: var("TOKEN_ID")
                    .context("TOKEN_ID is required for sql storage")?
                    .parse::<i64>()
                    .context("TOKEN_ID must be an integer for sql storage")?,
            },
            other => bail!("Unknown TOKEN_STORAGE {other:?} (expected \"file\" or \"sql\")"),
        };

        Ok(Config {
            client_id: var("OAUTH_CLIENT_ID").context("OAUTH_CLIENT_ID is required")?,
            client_secret: var("OAUTH_CLIENT_SECRET").unwrap_or_default(),
            auth_url: var("OAUTH_AUTH_URL").context("OAUTH_AUTH_URL is required")?,
            token_url: var("OAUTH_TOKEN_URL").context("OAUTH_TOKEN_URL is required")?,
            revoke_url: var("OAUTH_REVOKE_URL"),
            redirect_url: var("OAUTH_REDIRECT_URL").unwrap_or_default(),
            scopes: var("OAUTH_SCOPES")
                .map(|s| {
                    s.split([' ', ','])
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            storage,
        })
    }

    /// Open the configured storage backend.
    pub async fn open_storage(&self) -> Result<Arc<dyn TokenStorage>> {
        match &self.storage {
            StorageConfig::File { path, token_id } => {
                let mut store = FileTokenStorage::default().with_storage_path(path);
                store.token_id = token_id.clone();
                info!("Using file token storage in {}", path.display());
                Ok(Arc::new(store))
            }
            StorageConfig::Sql { database_url, id } => {
                let store = SqlTokenStorage::connect(database_url)
                    .await
                    .context("Failed to open token database")?
                    .with_id(*id);
                info!("Using SQL token storage (id: {id})");
                Ok(Arc::new(store))
            }
        }
    }

    /// Build the provider and storage and wrap them in a [`PersistentConfig`].
    pub async fn build(&self) -> Result<PersistentConfig> {
        let storage = self.open_storage().await?;
        let provider = StandardProvider::new(
            self.client_id.clone(),
            self.client_secret.clone(),
            Endpoint {
                auth_url: self.auth_url.clone(),
                token_url: self.token_url.clone(),
                revoke_url: self.revoke_url.clone(),
            },
        );

        Ok(PersistentConfig::new(Arc::new(provider), self.redirect_url.clone(), storage)
            .with_scopes(self.scopes.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const CLIENT: [(&str, &str); 3] = [
        ("OAUTH_CLIENT_ID", "client"),
        ("OAUTH_AUTH_URL", "https://example.com/auth"),
        ("OAUTH_TOKEN_URL", "https://example.com/token"),
    ];

    #[test]
    fn test_file_storage_defaults() {
        let mut pairs = CLIENT.to_vec();
        pairs.push(("TOKEN_STORAGE_PATH", "testtokens"));
        pairs.push(("TOKEN_ID", "123"));
        pairs.push(("OAUTH_SCOPES", "read, write profile"));

        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::File {
                path: PathBuf::from("testtokens"),
                token_id: Some("123".into()),
            }
        );
        assert_eq!(config.scopes, vec!["read", "write", "profile"]);
        assert_eq!(config.client_secret, "");
    }

    #[test]
    fn test_sql_storage_parses_id() {
        let mut pairs = CLIENT.to_vec();
        pairs.push(("TOKEN_STORAGE", "sql"));
        pairs.push(("DATABASE_URL", "sqlite::memory:"));
        pairs.push(("TOKEN_ID", "5"));

        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::Sql {
                database_url: "sqlite::memory:".into(),
                id: 5,
            }
        );

        pairs.pop();
        pairs.push(("TOKEN_ID", "abc"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_sql_storage_requires_id() {
        let mut pairs = CLIENT.to_vec();
        pairs.push(("TOKEN_STORAGE", "sql"));
        pairs.push(("DATABASE_URL", "sqlite::memory:"));

        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("TOKEN_ID is required"));
    }

    #[tokio::test]
    async fn test_build_sql_backed_config_stores_under_id() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("cfg.sqlite").display());
        let mut pairs: Vec<(&str, &str)> = CLIENT.to_vec();
        pairs.push(("TOKEN_STORAGE", "sql"));
        pairs.push(("DATABASE_URL", url.as_str()));
        pairs.push(("TOKEN_ID", "9"));

        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        SqlTokenStorage::connect(&url).await.unwrap().migrate().await.unwrap();
        let persistent = config.build().await.unwrap();

        let token = crate::token::Token {
            access_token: "abc".into(),
            refresh_token: String::new(),
            expiry: None,
            token_type: "bearer".into(),
        };
        persistent.storage().store_token(&token).await.unwrap();

        let reopened = SqlTokenStorage::connect(&url).await.unwrap().with_id(9);
        assert_eq!(reopened.restore_token().await.unwrap(), token);
    }

    #[test]
    fn test_missing_required_values() {
        let err = Config::from_lookup(lookup(&CLIENT)).unwrap_err();
        assert!(err.to_string().contains("TOKEN_STORAGE_PATH"));

        let err = Config::from_lookup(lookup(&[("TOKEN_STORAGE_PATH", "x")])).unwrap_err();
        assert!(err.to_string().contains("OAUTH_CLIENT_ID"));

        let mut pairs = CLIENT.to_vec();
        pairs.push(("TOKEN_STORAGE", "redis"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[tokio::test]
    async fn test_build_file_backed_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().display().to_string();
        let mut pairs: Vec<(&str, &str)> = CLIENT.to_vec();
        pairs.push(("TOKEN_STORAGE_PATH", path.as_str()));
        pairs.push(("OAUTH_REDIRECT_URL", "http://localhost/cb"));

        let persistent = Config::from_lookup(lookup(&pairs)).unwrap().build().await.unwrap();
        let url = persistent.auth_code_url("xyz");
        assert!(url.starts_with("https://example.com/auth?"));
        assert!(url.contains("state=xyz"));

        // No TOKEN_ID configured
        assert!(persistent.storage().restore_token().await.is_err());
    }
}
