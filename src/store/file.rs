//! File-backed token storage.
//!
//! Each identifier gets one file, `<storage_path>/<token_id>.csv`, holding a
//! single CSV record:
//!
//! ```text
//! access_token,refresh_token,expiry,token_type
//! ```
//!
//! `expiry` uses [`EXPIRY_FORMAT`] in UTC and is empty for tokens that never
//! expire. Changing the layout breaks every file written before the change.

use std::fmt::Display;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::TokenStorage;
use crate::error::TokenError;
use crate::token::Token;

/// Layout of the expiry field.
pub const EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f %z";

const FIELD_COUNT: usize = 4;

/// Stores tokens as CSV files in a directory.
#[derive(Debug, Clone, Default)]
pub struct FileTokenStorage {
    /// Directory the token file lives in. Must already exist.
    pub storage_path: PathBuf,
    /// Unique identifier for a token, usually a user id.
    pub token_id: Option<String>,
}

impl FileTokenStorage {
    pub fn new(storage_path: impl Into<PathBuf>, token_id: impl Display) -> Self {
        Self {
            storage_path: storage_path.into(),
            token_id: Some(token_id.to_string()),
        }
    }

    pub fn with_storage_path(mut self, storage_path: impl Into<PathBuf>) -> Self {
        self.storage_path = storage_path.into();
        self
    }

    pub fn with_token_id(mut self, token_id: impl Display) -> Self {
        self.token_id = Some(token_id.to_string());
        self
    }

    /// Resolve the token file path, checking configuration first.
    ///
    /// `action` is "store", "restore" or "delete" and only feeds the message.
    pub fn token_file(&self, action: &str) -> Result<PathBuf, TokenError> {
        if self.storage_path.as_os_str().is_empty() {
            return Err(TokenError::Configuration(format!(
                "cannot {action} token: storage path not set"
            )));
        }

        let id = match self.token_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => {
                return Err(TokenError::Configuration(format!(
                    "cannot {action} token: token id not set"
                )))
            }
        };

        if id == "." || id == ".." || id.contains(['/', '\\']) {
            return Err(TokenError::Configuration(format!(
                "cannot {action} token: token id {id:?} is not a valid file name"
            )));
        }

        Ok(self.storage_path.join(format!("{id}.csv")))
    }
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
    async fn store_token(&self, token: &Token) -> Result<(), TokenError> {
        let path = self.token_file("store")?;
        token.check_storable()?;

        tokio::fs::write(&path, encode_record(token)).await?;
        debug!("Stored token in {}", path.display());
        Ok(())
    }

    async fn restore_token(&self) -> Result<Token, TokenError> {
        let path = self.token_file("restore")?;

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| not_found_or_io(e, &path))?;

        let token = decode_record(&contents)?;
        debug!("Restored token from {}", path.display());
        Ok(token)
    }

    async fn delete_token(&self) -> Result<(), TokenError> {
        let path = self.token_file("delete")?;

        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(e, &path))?;
        debug!("Deleted token file {}", path.display());
        Ok(())
    }
}

fn not_found_or_io(e: std::io::Error, path: &Path) -> TokenError {
    if e.kind() == ErrorKind::NotFound {
        TokenError::NotFound(format!("token file {}", path.display()))
    } else {
        TokenError::Io(e)
    }
}

// ── Record codec ─────────────────────────────────────────────────────────────

fn encode_record(token: &Token) -> String {
    let expiry = token
        .expiry
        .map(|e| e.format(EXPIRY_FORMAT).to_string())
        .unwrap_or_default();

    let fields = [
        token.access_token.as_str(),
        token.refresh_token.as_str(),
        expiry.as_str(),
        token.token_type.as_str(),
    ];

    let mut line = fields.map(quote_field).join(",");
    line.push('\n');
    line
}

fn decode_record(contents: &str) -> Result<Token, TokenError> {
    let fields = parse_first_record(contents)?;
    if fields.len() < FIELD_COUNT {
        return Err(TokenError::Data(format!(
            "cannot restore token: file does not contain all fields (found {}, need {FIELD_COUNT})",
            fields.len()
        )));
    }

    let mut fields = fields.into_iter();
    let access_token = fields.next().unwrap_or_default();
    let refresh_token = fields.next().unwrap_or_default();
    let expiry = parse_expiry(&fields.next().unwrap_or_default())?;
    let token_type = fields.next().unwrap_or_default();

    Ok(Token {
        access_token,
        refresh_token,
        expiry,
        token_type,
    })
}

fn parse_expiry(field: &str) -> Result<Option<DateTime<Utc>>, TokenError> {
    if field.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_str(field, EXPIRY_FORMAT)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|e| TokenError::Data(format!("invalid expiry {field:?}: {e}")))
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) || field.starts_with(' ') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Parse the first CSV record of `input` (RFC 4180 quoting).
fn parse_first_record(input: &str) -> Result<Vec<String>, TokenError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = input.chars().peekable();
    let mut in_quotes = false;
    let mut at_field_start = true;

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if at_field_start => {
                in_quotes = true;
                at_field_start = false;
            }
            ',' => {
                fields.push(std::mem::take(&mut field));
                at_field_start = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => break,
            _ => {
                field.push(c);
                at_field_start = false;
            }
        }
    }

    if in_quotes {
        return Err(TokenError::Data("unterminated quoted field".into()));
    }

    if fields.is_empty() && field.is_empty() {
        return Ok(fields);
    }
    fields.push(field);
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_token() -> Token {
        Token {
            access_token: "abc".into(),
            refresh_token: "def".into(),
            expiry: Some(Utc::now() + Duration::hours(1)),
            token_type: "bearer".into(),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_storage_path() {
        let store = FileTokenStorage::default();
        let token = sample_token();

        let err = store.store_token(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::Configuration(_)));
        assert!(err.to_string().contains("storage path not set"));

        let err = store.restore_token().await.unwrap_err();
        assert!(err.to_string().contains("storage path not set"));

        let err = store.delete_token().await.unwrap_err();
        assert!(matches!(err, TokenError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_token_id() {
        let store = FileTokenStorage::default().with_storage_path("fakeFolder");
        let token = sample_token();

        let err = store.store_token(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::Configuration(_)));
        assert!(err.to_string().contains("token id not set"));

        let err = store.restore_token().await.unwrap_err();
        assert!(err.to_string().contains("token id not set"));

        let err = store.delete_token().await.unwrap_err();
        assert!(err.to_string().contains("token id not set"));

        let store = store.with_token_id("");
        let err = store.store_token(&token).await.unwrap_err();
        assert!(err.to_string().contains("token id not set"));
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStorage::new(dir.path().join("fakeFolder"), 123);

        let err = store.store_token(&sample_token()).await.unwrap_err();
        assert!(matches!(err, TokenError::Io(_)));

        let err = store.restore_token().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_store_restore_delete() {
        let dir = tempfile::tempdir().unwrap();
        let testtokens = dir.path().join("testtokens");
        std::fs::create_dir(&testtokens).unwrap();

        let store = FileTokenStorage::new(&testtokens, 123);
        let token = sample_token();

        store.store_token(&token).await.unwrap();
        assert!(testtokens.join("123.csv").exists());

        let restored = store.restore_token().await.unwrap();
        assert_eq!(restored, token);

        store.delete_token().await.unwrap();
        assert!(store.restore_token().await.unwrap_err().is_not_found());
        assert!(store.delete_token().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_store_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStorage::new(dir.path(), "user-7");

        store.store_token(&sample_token()).await.unwrap();

        let newer = Token {
            access_token: "new,access".into(),
            refresh_token: String::new(),
            expiry: None,
            token_type: "Bearer".into(),
        };
        store.store_token(&newer).await.unwrap();

        assert_eq!(store.restore_token().await.unwrap(), newer);
    }

    #[tokio::test]
    async fn test_rejects_empty_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStorage::new(dir.path(), 1);
        let mut token = sample_token();
        token.access_token.clear();

        let err = store.store_token(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::Data(_)));
        assert!(!dir.path().join("1.csv").exists());
    }

    #[tokio::test]
    async fn test_truncated_file_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("9.csv"), "abc,def\n").unwrap();

        let store = FileTokenStorage::new(dir.path(), 9);
        let err = store.restore_token().await.unwrap_err();
        assert!(matches!(err, TokenError::Data(_)));
        assert!(err.to_string().contains("does not contain all fields"));
    }

    #[tokio::test]
    async fn test_bad_expiry_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("9.csv"), "abc,def,tomorrow,bearer\n").unwrap();

        let store = FileTokenStorage::new(dir.path(), 9);
        let err = store.restore_token().await.unwrap_err();
        assert!(matches!(err, TokenError::Data(_)));
    }

    #[test]
    fn test_token_id_cannot_escape_directory() {
        let store = FileTokenStorage::new("tokens", "../etc/passwd");
        assert!(matches!(store.token_file("store"), Err(TokenError::Configuration(_))));

        let store = FileTokenStorage::new("tokens", "..");
        assert!(store.token_file("store").is_err());
    }

    #[test]
    fn test_record_layout() {
        let expiry = DateTime::parse_from_rfc3339("2026-10-19T12:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let token = Token {
            access_token: "a\"b".into(),
            refresh_token: "r".into(),
            expiry: Some(expiry),
            token_type: "bearer".into(),
        };

        let line = encode_record(&token);
        assert_eq!(
            line,
            "\"a\"\"b\",r,2026-10-19 12:00:00.500000000 +0000,bearer\n"
        );
        assert_eq!(decode_record(&line).unwrap(), token);
    }

    #[test]
    fn test_parse_quoted_newline_and_crlf() {
        let fields = parse_first_record("\"x\ny\",,,t\r\nignored,line\n").unwrap();
        assert_eq!(fields, vec!["x\ny", "", "", "t"]);

        assert!(parse_first_record("\"open").is_err());
        assert!(parse_first_record("").unwrap().is_empty());
    }
}
