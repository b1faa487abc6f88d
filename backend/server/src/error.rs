use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{identity::IdentityError, store::StoreError};

pub type FieldErrors = BTreeMap<&'static str, Vec<String>>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Access denied")]
    Forbidden,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Invalid data")]
    Validation(FieldErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("The round could not be played, please try again")]
    TransactionFailed(#[source] StoreError),

    #[error("Identity provider error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound("Profile not found"),
            StoreError::Conflict(message) => AppError::Conflict(message),
            other => AppError::InternalError(Box::new(other)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MalformedPayload
            | AppError::Validation(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Identity(_) => StatusCode::BAD_GATEWAY,
            AppError::TransactionFailed(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = match &self {
            AppError::Validation(details) => json!({
                "error": self.to_string(),
                "details": { "fieldErrors": details },
            }),
            AppError::InternalError(e) => {
                error!("{e}");
                json!({ "error": "Internal server error" })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_keep_their_meaning() {
        assert!(matches!(
            AppError::from(StoreError::NotFound),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::Conflict("dup".to_string())),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::Overflow),
            AppError::InternalError(_)
        ));
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
            (AppError::NotFound("Profile not found"), StatusCode::NOT_FOUND),
            (AppError::Validation(FieldErrors::new()), StatusCode::BAD_REQUEST),
            (AppError::Conflict("dup".to_string()), StatusCode::CONFLICT),
            (
                AppError::TransactionFailed(StoreError::Overflow),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
