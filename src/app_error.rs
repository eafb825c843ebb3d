use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::{aliases::DieselError, gateway::GatewayError};

/// Application-level error taxonomy. Every handler returns `Result<_, AppError>`
/// and the `IntoResponse` impl decides the HTTP status.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    ForbiddenResource(String),

    #[error("resource not found")]
    NotFound,

    #[error("order is not cancellable")]
    NotCancellable,

    #[error("{0}")]
    InvalidTransition(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("{0} is unreachable")]
    ServiceUnreachable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<DieselError> for AppError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => AppError::NotFound,
            err => AppError::Other(err.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) | AppError::InvalidSignature => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ForbiddenResource(_) => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::NotCancellable | AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ServiceUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let message = match &self {
            // Internal detail stays in the logs, not in the response body.
            AppError::Other(_) => "internal server error".to_string(),
            err => err.to_string(),
        };

        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

/// Uniform response envelope used by every route.
#[derive(Serialize, ToSchema)]
pub struct StdResponse<T, M = &'static str> {
    pub data: Option<T>,
    pub message: Option<M>,
}

impl<T: Serialize, M: Serialize> IntoResponse for StdResponse<T, M> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
