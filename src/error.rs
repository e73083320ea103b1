/// Unified error type for token persistence and the OAuth flows around it.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    // ── Storage Errors ──────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Malformed token data: {0}")]
    Data(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    // ── Provider Errors ─────────────────────────────────────────────────
    #[error("OAuth flow error: {0}")]
    FlowError(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
}

impl TokenError {
    /// True for the error returned when no record exists for an identifier.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TokenError::NotFound(_))
    }
}

impl From<sqlx::Error> for TokenError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => TokenError::NotFound("token".into()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                tracing::error!("Stored token could not be decoded: {e}");
                TokenError::Data(e.to_string())
            }
            _ => {
                tracing::error!("Database error: {e}");
                TokenError::Database(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = TokenError::from(sqlx::Error::RowNotFound);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TokenError = io.into();
        assert!(matches!(err, TokenError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}
