//! Error type for billing operations.

use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BillingError {
    /// Request cannot be carried out as asked; nothing was changed.
    #[error("{0}")]
    Validation(String),

    /// Caller's role lacks the capability; checked before any mutation.
    #[error("Missing capability: {capability}")]
    PermissionDenied { capability: &'static str },

    /// A call to the clinic backend failed.
    #[error("{operation} failed: {source}")]
    Upstream {
        operation: &'static str,
        source: anyhow::Error,
    },

    #[error("Billing session {0} not found")]
    SessionNotFound(Uuid),
}

impl BillingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }

    pub fn upstream(operation: &'static str, source: anyhow::Error) -> Self {
        BillingError::Upstream { operation, source }
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation(msg) => AppError::Unprocessable(anyhow::anyhow!(msg)),
            BillingError::PermissionDenied { .. } => AppError::Forbidden(anyhow::anyhow!("{}", err)),
            BillingError::Upstream { .. } => AppError::BadGateway(err.to_string()),
            BillingError::SessionNotFound(_) => AppError::NotFound(anyhow::anyhow!("{}", err)),
        }
    }
}
