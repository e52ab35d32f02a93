use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::fmt;

/// Everything a spin operation can report back to a caller, plus the two
/// internal failure shapes (storage unavailable, invariant broken) that must
/// never be disguised as a plausible empty state.
#[derive(Debug)]
pub enum SpinError {
    InvalidWager(i64),
    InsufficientFunds { balance: i64, wager: i64 },
    SessionBusy,
    Forbidden,
    NotAuthenticated,
    /// Lost a race on a conditional update after preconditions could not be
    /// re-validated. Retryable by the caller.
    StorageConflict,
    /// A stored invariant does not hold, e.g. a settled session without a
    /// result index.
    Corrupt(&'static str),
    Database(sqlx::Error),
}

impl fmt::Display for SpinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWager(wager) => write!(f, "Unsupported wager tier: {}", wager),
            Self::InsufficientFunds { balance, wager } => {
                write!(f, "Balance {} is below the {} coin wager", balance, wager)
            }
            Self::SessionBusy => write!(f, "The wheel is already spinning"),
            Self::Forbidden => write!(f, "Not allowed to release this spin"),
            Self::NotAuthenticated => write!(f, "Authentication required"),
            Self::StorageConflict => write!(f, "Lost a storage race, please retry"),
            Self::Corrupt(detail) => write!(f, "Session invariant violated: {}", detail),
            Self::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for SpinError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for SpinError {
    fn from(err: sqlx::Error) -> Self {
        // Postgres serialization failures are retryable conflicts, not
        // hard storage errors.
        if let Some(db) = err.as_database_error() {
            if db.code().as_deref() == Some("40001") {
                return Self::StorageConflict;
            }
        }
        Self::Database(err)
    }
}

impl SpinError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidWager(_) => "invalid_wager",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::SessionBusy => "session_busy",
            Self::Forbidden => "forbidden",
            Self::NotAuthenticated => "not_authenticated",
            Self::StorageConflict => "storage_conflict",
            Self::Corrupt(_) => "internal",
            Self::Database(_) => "internal",
        }
    }
}

impl IntoResponse for SpinError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Self::InvalidWager(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientFunds { .. } => StatusCode::CONFLICT,
            Self::SessionBusy => StatusCode::CONFLICT,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::StorageConflict => StatusCode::CONFLICT,
            Self::Corrupt(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            // Internal detail stays in the logs, not on the wire.
            Self::Corrupt(detail) => {
                tracing::error!("wheel invariant violation: {}", detail);
                "Internal error".to_string()
            }
            Self::Database(e) => {
                tracing::error!("database error: {}", e);
                "Internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": self.code(), "message": message }))).into_response()
    }
}
