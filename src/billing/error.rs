use thiserror::Error;
use uuid::Uuid;

use super::quota::QuotaDenialReason;

/// key: billing-errors -> typed outcomes surfaced to callers
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },
    #[error("limit exceeded: {}", .0.as_str())]
    LimitExceeded(QuotaDenialReason),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored {column} has unrecognised value {value:?}")]
    Corrupt { column: &'static str, value: String },
}

impl BillingError {
    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        BillingError::NotFound { kind, id }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        BillingError::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
