use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;

use crate::auth_token::TokenError;
use crate::db::StoreError;
use crate::services::email::NotifyError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("Email already taken")]
    EmailTaken,

    #[error("Password reset failed")]
    PasswordResetFailed,

    #[error("Email verification failed")]
    EmailVerificationFailed,

    #[error("Too many requests")]
    RateLimited,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotifyError),

    #[error("Token signing error: {0}")]
    Token(#[from] TokenError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        AppError::Unauthenticated(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        AppError::PermissionDenied(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        AppError::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    /// Status class reported to callers next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) | AppError::InvalidCredentials => "UNAUTHENTICATED",
            AppError::PermissionDenied(_) => "PERMISSION_DENIED",
            AppError::InvalidArgument(_)
            | AppError::EmailTaken
            | AppError::PasswordResetFailed
            | AppError::EmailVerificationFailed => "INVALID_ARGUMENT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::RateLimited => "RESOURCE_EXHAUSTED",
            AppError::Store(StoreError::DuplicateEmail) => "INVALID_ARGUMENT",
            AppError::Store(_)
            | AppError::PasswordHash(_)
            | AppError::Notification(_)
            | AppError::Token(_)
            | AppError::Config(_)
            | AppError::Internal(_) => "INTERNAL",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    code: &'static str,
    error: String,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self.code() {
            "UNAUTHENTICATED" => StatusCode::UNAUTHORIZED,
            "PERMISSION_DENIED" => StatusCode::FORBIDDEN,
            "INVALID_ARGUMENT" => StatusCode::BAD_REQUEST,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "RESOURCE_EXHAUSTED" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Collaborator faults never leak their details to the caller.
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(status).json(ErrorResponse {
            success: false,
            code: self.code(),
            error,
        })
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
