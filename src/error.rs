use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::automation::locator::LocatorExhausted;
use crate::device::DriverError;

/// Failures of the send pipeline
///
/// `NoDevice`, `InvalidPhone`, `MessageTooLong` and `EmptyMessage` reach the
/// caller. The rest end an attempt as `Failed` and are kept on its record.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("No device available: {0}")]
    NoDevice(String),

    #[error("Invalid phone number: {raw:?} does not normalize to 10 digits")]
    InvalidPhone { raw: String },

    #[error("Message too long: {length} characters (max {max})")]
    MessageTooLong { length: usize, max: usize },

    #[error("Message is empty after template expansion")]
    EmptyMessage,

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Pre-flight check failed: {0}")]
    PreflightFailed(String),

    #[error("Compose failed: {0}")]
    ComposeFailed(String),

    #[error(transparent)]
    LocatorExhausted(#[from] LocatorExhausted),

    #[error("Send not confirmed after tapping {0} candidate(s)")]
    Unconfirmed(usize),

    #[error("History store error: {0}")]
    History(#[from] anyhow::Error),
}

impl SendError {
    /// Rejected before any device interaction
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SendError::InvalidPhone { .. } | SendError::MessageTooLong { .. } | SendError::EmptyMessage
        )
    }

    /// Captured command output, when the failure came from the device
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            SendError::Driver(e) => Some(e.diagnostic()).filter(|d| !d.is_empty()),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No device: {0}")]
    NoDevice(String),

    #[error("Invalid request: {0}")]
    ValidationError(String),

    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SendError> for AppError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::NoDevice(detail) => AppError::NoDevice(detail),
            e if e.is_validation() => AppError::ValidationError(e.to_string()),
            SendError::History(e) => AppError::Internal(e),
            e => AppError::DeviceError(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::NoDevice(_) => (StatusCode::CONFLICT, "No Device"),
            AppError::ValidationError(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Unprocessable Entity"),
            AppError::DeviceError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Device Error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error"),
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_status_mapping() {
        let cases = [
            (SendError::NoDevice("none".into()), StatusCode::CONFLICT),
            (SendError::InvalidPhone { raw: "12".into() }, StatusCode::UNPROCESSABLE_ENTITY),
            (
                SendError::MessageTooLong { length: 1601, max: 1600 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (SendError::EmptyMessage, StatusCode::UNPROCESSABLE_ENTITY),
            (SendError::Unconfirmed(2), StatusCode::INTERNAL_SERVER_ERROR),
            (
                SendError::History(anyhow::anyhow!("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_not_found_status() {
        let response = AppError::NotFound("batch abc".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
