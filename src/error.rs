use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::billing::error::BillingError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Billing(#[from] BillingError),
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Billing(err) => match err {
                BillingError::Conflict(_) | BillingError::InvalidState(_) => StatusCode::CONFLICT,
                BillingError::NotFound { .. } => StatusCode::NOT_FOUND,
                BillingError::LimitExceeded(_) => StatusCode::PAYMENT_REQUIRED,
                BillingError::Validation(_) => StatusCode::BAD_REQUEST,
                BillingError::Forbidden(_) => StatusCode::FORBIDDEN,
                BillingError::Database(_) | BillingError::Corrupt { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Billing(err) => match err {
                BillingError::Conflict(_) => "conflict",
                BillingError::InvalidState(_) => "invalid_state",
                BillingError::NotFound { .. } => "not_found",
                BillingError::LimitExceeded(_) => "limit_exceeded",
                BillingError::Validation(_) => "validation",
                BillingError::Forbidden(_) => "forbidden",
                BillingError::Database(_) | BillingError::Corrupt { .. } => "internal",
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Billing(BillingError::LimitExceeded(reason)) => json!({
                "error": self.kind(),
                "reason": reason,
                "message": reason.message(),
            }),
            _ if status.is_server_error() => json!({
                "error": self.kind(),
                "message": "internal server error",
            }),
            _ => json!({
                "error": self.kind(),
                "message": self.to_string(),
            }),
        };
        if status.is_server_error() {
            tracing::error!(?self);
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
