use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::models::order::OrderStatus;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A guarded reservation found fewer seats than requested.
    #[error("Not enough quota for {ticket_type}")]
    InsufficientQuota { ticket_type: String },

    /// The event behind a ticket type is not open for sale.
    #[error("Event unavailable: {0}")]
    EventUnavailable(String),

    /// The order already reached paid, cancelled or expired.
    #[error("Cannot {action} because the order is already {status}")]
    FinalState {
        action: &'static str,
        status: OrderStatus,
    },

    /// Every fingerprint code for a base amount is held by a pending order.
    #[error("Payment system is full for this amount, retry later")]
    PaymentCapacityExhausted,

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientQuota { .. } => StatusCode::CONFLICT,
            AppError::EventUnavailable(_) => StatusCode::BAD_REQUEST,
            AppError::FinalState { .. } => StatusCode::CONFLICT,
            AppError::PaymentCapacityExhausted => StatusCode::TOO_MANY_REQUESTS,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalServiceError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InsufficientQuota { .. } => "INSUFFICIENT_QUOTA",
            AppError::EventUnavailable(_) => "EVENT_UNAVAILABLE",
            AppError::FinalState { .. } => "ORDER_FINAL_STATE",
            AppError::PaymentCapacityExhausted => "PAYMENT_CAPACITY_EXHAUSTED",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Business-rule rejections are expected traffic; only infrastructure
    /// failures are logged at error level.
    fn log(&self) {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::EventUnavailable(msg) => {
                warn!(code = self.code(), message = %msg, "Request rejected");
            }
            AppError::InsufficientQuota { .. }
            | AppError::FinalState { .. }
            | AppError::PaymentCapacityExhausted => {
                warn!(code = self.code(), message = %self, "Business rule rejected request");
            }
            AppError::ExternalServiceError(msg) | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::EventUnavailable(msg)
            | AppError::ExternalServiceError(msg) => msg.clone(),
            AppError::InsufficientQuota { .. }
            | AppError::FinalState { .. }
            | AppError::PaymentCapacityExhausted => self.to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
        };

        error_response(code, public_message, None, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rule_status_codes() {
        let quota = AppError::InsufficientQuota {
            ticket_type: "VIP".to_string(),
        };
        assert_eq!(quota.status_code(), StatusCode::CONFLICT);
        assert_eq!(quota.to_string(), "Not enough quota for VIP");

        assert_eq!(
            AppError::PaymentCapacityExhausted.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_final_state_message_names_status() {
        let err = AppError::FinalState {
            action: "cancel",
            status: OrderStatus::Paid,
        };
        assert_eq!(err.code(), "ORDER_FINAL_STATE");
        assert_eq!(
            err.to_string(),
            "Cannot cancel because the order is already paid"
        );
    }
}
