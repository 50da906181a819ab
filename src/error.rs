use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum AppError {
    #[error("Catalog unavailable: {0}")]
    DataSourceError(String),

    #[error("Catalog contains no usable tool records")]
    EmptyCorpusError,

    #[error("Index build failed: {0}")]
    IndexBuildError(String),

    #[error("Snapshot is corrupt: {0}")]
    SnapshotCorruptError(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Model inference failed: {0}")]
    ModelError(String),

    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error("Service temporarily unavailable: {0}")]
    ResourceError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::ValidationError(msg) => {
                tracing::warn!(error = %msg, "Validation error");
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::ResourceError(msg) => {
                tracing::warn!(error = %msg, "Resource error");
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }
            AppError::QueryError(msg) => {
                tracing::warn!(error = %msg, "Query error");
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::DataSourceError(msg)
            | AppError::IndexBuildError(msg)
            | AppError::SnapshotCorruptError(msg)
            | AppError::IoError(msg)
            | AppError::ModelError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::EmptyCorpusError => {
                tracing::error!("Catalog is empty");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

impl From<ort::Error> for AppError {
    fn from(err: ort::Error) -> Self {
        AppError::ModelError(err.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::DataSourceError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
