use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retrieval::embeddings::EmbeddingError;
use crate::retrieval::vector::types::VectorError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorError),

    #[error("Chat backend error: {0}")]
    Chat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", self);
        }

        HttpResponse::build(status).json(ErrorResponse {
            detail: self.to_string(),
        })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            AppError::Embedding(EmbeddingError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Embedding(EmbeddingError::Config(_)) => StatusCode::BAD_REQUEST,
            AppError::Embedding(_) => StatusCode::BAD_GATEWAY,
            AppError::VectorStore(VectorError::InvalidQuery(_)) => StatusCode::BAD_REQUEST,
            AppError::VectorStore(VectorError::DimensionMismatch { .. }) => {
                StatusCode::BAD_REQUEST
            }
            AppError::VectorStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Chat(_) => StatusCode::BAD_GATEWAY,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
