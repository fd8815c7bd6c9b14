//! Error types for the circulation server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable numeric error codes exposed to API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchData = 4,
    BadValue = 5,
    Authentication = 6,
    NotAvailable = 10,
    AlreadyBorrowed = 11,
    LimitReached = 12,
    HeldForOther = 13,
    AlreadyReserved = 14,
    DirectlyAvailable = 15,
    InvalidState = 16,
    RenewalBlocked = 17,
    RenewalCapReached = 18,
    FeeAlreadySettled = 19,
    AlreadyReturned = 20,
    StoreConflict = 21,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("No copy of this title is available")]
    NotAvailable,

    #[error("User already has an active loan for this title")]
    AlreadyBorrowed,

    #[error("Maximum loans reached ({current}/{max})")]
    LimitReached { current: i64, max: i32 },

    #[error("Title is held for a reader ahead in the reservation queue")]
    HeldForOther,

    #[error("User already holds an active reservation for this title")]
    AlreadyReserved,

    #[error("A copy is available; borrow it instead of reserving")]
    DirectlyAvailable,

    #[error("Loan already returned")]
    AlreadyReturned,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Renewal blocked by a pending reservation")]
    RenewalBlocked,

    #[error("Maximum renewals reached ({0})")]
    RenewalCapReached(i32),

    #[error("Late fee already settled")]
    FeeAlreadySettled,

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Concurrent update conflict, retry the operation")]
    StoreConflict,

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Only serialization conflicts may be retried by callers
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StoreConflict)
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::NotAvailable => ErrorCode::NotAvailable,
            AppError::AlreadyBorrowed => ErrorCode::AlreadyBorrowed,
            AppError::LimitReached { .. } => ErrorCode::LimitReached,
            AppError::HeldForOther => ErrorCode::HeldForOther,
            AppError::AlreadyReserved => ErrorCode::AlreadyReserved,
            AppError::DirectlyAvailable => ErrorCode::DirectlyAvailable,
            AppError::AlreadyReturned => ErrorCode::AlreadyReturned,
            AppError::InvalidState(_) => ErrorCode::InvalidState,
            AppError::RenewalBlocked => ErrorCode::RenewalBlocked,
            AppError::RenewalCapReached(_) => ErrorCode::RenewalCapReached,
            AppError::FeeAlreadySettled => ErrorCode::FeeAlreadySettled,
            AppError::NotAuthorized(_) => ErrorCode::NotAuthorized,
            AppError::Authentication(_) => ErrorCode::Authentication,
            AppError::StoreConflict => ErrorCode::StoreConflict,
            AppError::NotFound(_) => ErrorCode::NoSuchData,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            // Serialization failure and deadlock are the retry signals
            match db.code().as_deref() {
                Some("40001") | Some("40P01") => return AppError::StoreConflict,
                _ => {}
            }
            match db.constraint() {
                Some("loans_active_unique") => return AppError::AlreadyBorrowed,
                Some("reservations_active_unique") => return AppError::AlreadyReserved,
                _ => {}
            }
        }
        AppError::Database(e)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::LimitReached { .. } | AppError::RenewalCapReached(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::StoreConflict => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::CONFLICT,
        };

        let code = self.code();
        let message = match &self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(AppError::StoreConflict.is_retryable());
        assert!(!AppError::NotAvailable.is_retryable());
        assert!(!AppError::Internal("boom".to_string()).is_retryable());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(AppError::NotAvailable.into_response().status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::LimitReached { current: 5, max: 5 }.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::NotAuthorized("staff only".to_string()).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::NotFound("loan 1".to_string()).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_authentication_has_its_own_code() {
        let error = AppError::Authentication("Missing authorization header".to_string());
        assert_eq!(error.code(), ErrorCode::Authentication);
        assert_eq!(error.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::NotAuthorized("staff only".to_string()).code(),
            ErrorCode::NotAuthorized
        );
    }
}
