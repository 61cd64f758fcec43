use http::StatusCode;
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::FulfillmentStatus;

/// Closed set of failure categories surfaced to checkout callers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    VoucherInvalid,
    MismatchedSeller,
    OutOfStock,
    InsufficientBalance,
    NegativeBalance,
    NotFound,
    Validation,
    Unauthorized,
    Conflict,
    Internal,
}

/// Error body handed to transports (CLI output, HTTP adapters).
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind
    pub kind: ErrorKind,
    /// Human-readable error description
    pub message: String,
    /// Product name for stock failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    /// ISO 8601 timestamp when the error was produced
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid voucher: {0}")]
    VoucherInvalid(String),

    #[error("Cart item {cart_item_id} belongs to seller {actual}, not {expected}")]
    MismatchedSeller {
        cart_item_id: Uuid,
        expected: Uuid,
        actual: Uuid,
    },

    #[error("Out of stock: {product} (requested {requested}, available {available})")]
    OutOfStock {
        product: String,
        requested: i32,
        available: i32,
    },

    #[error("Insufficient balance: {balance} available, {required} required")]
    InsufficientBalance { balance: Decimal, required: Decimal },

    #[error("Negative balance: {0}")]
    NegativeBalance(String),

    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidStatusTransition {
        from: FulfillmentStatus,
        to: FulfillmentStatus,
    },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::VoucherInvalid(_) => ErrorKind::VoucherInvalid,
            Self::MismatchedSeller { .. } => ErrorKind::MismatchedSeller,
            Self::OutOfStock { .. } => ErrorKind::OutOfStock,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::NegativeBalance(_) => ErrorKind::NegativeBalance,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ValidationError(_) | Self::InvalidStatusTransition { .. } => {
                ErrorKind::Validation
            }
            Self::AuthError(_) => ErrorKind::Unauthorized,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation | ErrorKind::VoucherInvalid | ErrorKind::MismatchedSeller => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::OutOfStock => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::InsufficientBalance | ErrorKind::NegativeBalance => {
                StatusCode::PAYMENT_REQUIRED
            }
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for callers.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let product = match self {
            Self::OutOfStock { product, .. } => Some(product.clone()),
            _ => None,
        };

        ErrorResponse {
            kind: self.kind(),
            message: self.response_message(),
            product,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
