use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use stratus_core::{auth::VerificationFailure, StratusError};

#[derive(Serialize, Deserialize)]
pub struct AppError {
    pub error: String,
}

pub struct AppErrorResponse(pub StatusCode, pub AppError);

impl AppErrorResponse {
    pub fn status(&self) -> StatusCode {
        self.0
    }
}

impl IntoResponse for AppErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (self.0, Json(self.1)).into_response()
    }
}

impl From<VerificationFailure> for AppErrorResponse {
    fn from(value: VerificationFailure) -> Self {
        AppErrorResponse(
            StatusCode::UNAUTHORIZED,
            AppError {
                error: value.to_string(),
            },
        )
    }
}

impl From<StratusError> for AppErrorResponse {
    fn from(value: StratusError) -> Self {
        let status = match &value {
            StratusError::Verification(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppErrorResponse(
            status,
            AppError {
                error: value.to_string(),
            },
        )
    }
}

impl From<StatusCode> for AppErrorResponse {
    fn from(value: StatusCode) -> Self {
        AppErrorResponse(
            value,
            AppError {
                error: value.to_string(),
            },
        )
    }
}

impl From<anyhow::Error> for AppErrorResponse {
    fn from(value: anyhow::Error) -> Self {
        AppErrorResponse(
            StatusCode::INTERNAL_SERVER_ERROR,
            AppError {
                error: value.to_string(),
            },
        )
    }
}
