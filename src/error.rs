use axum::{Json, extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("store: {0}")]
    Store(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn store(err: anyhow::Error) -> Self {
        Self::Store(format!("{err:#}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct Problem {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (code, msg) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".into()),
            ApiError::Store(e) => {
                tracing::error!(error = %e, "item store request failed");
                (StatusCode::BAD_GATEWAY, format!("store: {e}"))
            }
            ApiError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.clone()),
        };
        (code, Json(Problem { message: msg })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
