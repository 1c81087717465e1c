use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::identity::IdentityError;
use crate::services::admin::AdminError;
use crate::services::checkout::CheckoutError;
use crate::services::handoff::HandoffError;
use crate::services::reservation::ReservationError;
use crate::services::storage::StorageError;
use crate::store::StoreError;
use crate::utils::format::encode_component;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Sign in required to access {return_path}")]
    LoginRequired { return_path: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Administrator access required")]
    AdminOnly,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn login_required(return_path: impl Into<String>) -> Self {
        AppError::LoginRequired {
            return_path: return_path.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) | AppError::LoginRequired { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::AdminOnly => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StoreError(e) => match e {
                StoreError::PermissionDenied(_) => StatusCode::FORBIDDEN,
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::Conflict(_) => StatusCode::CONFLICT,
                StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::LoginRequired { .. } => "LOGIN_REQUIRED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::AdminOnly => "ADMIN_ONLY",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::StoreError(e) => match e {
                StoreError::PermissionDenied(_) => "PERMISSION_DENIED",
                StoreError::NotFound(_) => "NOT_FOUND",
                StoreError::Conflict(_) => "CONFLICT",
                StoreError::Backend(_) => "DATABASE_ERROR",
            },
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => {
                warn!(code = self.code(), message = %msg, "Request rejected");
            }
            AppError::LoginRequired { return_path } => {
                warn!(code = self.code(), return_path = %return_path, "Request rejected");
            }
            AppError::AdminOnly => {
                warn!(code = self.code(), "Non-admin session attempted an admin action");
            }
            AppError::ExternalServiceError(msg) | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::StoreError(e) => {
                error!(error = ?e, "Store error");
            }
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::LoginRequired { return_path } => Some(json!({
                "login_url": format!("/login?redirect={}", encode_component(return_path)),
            })),
            AppError::AdminOnly => Some(json!({ "redirect": "/" })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Store failures carry the backend's own text so the user can act on it.
        let public_message = match &self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::ExternalServiceError(msg) => msg.clone(),
            AppError::LoginRequired { .. } => "You must sign in to continue".to_string(),
            AppError::AdminOnly => "Access restricted to the administrator".to_string(),
            AppError::StoreError(e) => e.to_string(),
            AppError::InternalServerError(_) => "Internal server error".to_string(),
        };

        let details = self.details();

        error_response(code, public_message, details, status)
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials
            | IdentityError::InvalidToken
            | IdentityError::InvalidResetToken => AppError::AuthError(err.to_string()),
            IdentityError::EmailInUse
            | IdentityError::InvalidEmail
            | IdentityError::WeakPassword
            | IdentityError::PasswordMismatch
            | IdentityError::MissingField(_) => AppError::ValidationError(err.to_string()),
            IdentityError::UnknownUser => AppError::NotFound(err.to_string()),
            IdentityError::Store(e) => AppError::StoreError(e),
            IdentityError::Hashing(_) | IdentityError::Token(_) => {
                AppError::InternalServerError(err.to_string())
            }
        }
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::SignInRequired { event_id } => {
                AppError::login_required(format!("/api/events/{event_id}/seats"))
            }
            ReservationError::EmptySelection => AppError::ValidationError(err.to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::InvalidPayment(_) | CheckoutError::EmptySelection => {
                AppError::ValidationError(err.to_string())
            }
            CheckoutError::SignInRequired => AppError::login_required("/api/checkout"),
            CheckoutError::PermissionDenied(_) => AppError::Forbidden(err.to_string()),
            CheckoutError::Failed(_) => AppError::ExternalServiceError(err.to_string()),
            CheckoutError::Encoding(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::Validation(msg) => AppError::ValidationError(msg),
            AdminError::PriceJustificationRequired | AdminError::SelfDeletion => {
                AppError::ValidationError(err.to_string())
            }
            AdminError::NotFound(msg) => AppError::NotFound(msg),
            AdminError::Store(e) => AppError::StoreError(e),
            AdminError::Identity(e) => AppError::from(e),
        }
    }
}

impl From<HandoffError> for AppError {
    fn from(err: HandoffError) -> Self {
        match err {
            HandoffError::InvalidKey => AppError::ValidationError(err.to_string()),
            HandoffError::ReservedKey(_) => AppError::Forbidden(err.to_string()),
            HandoffError::Encoding(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidName(_) | StorageError::Empty => {
                AppError::ValidationError(err.to_string())
            }
            StorageError::Io(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}
