use std::io::Error as IoError;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use stwatch_service::api::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("Configuration error: {0}")]
    Config(#[from] stwatch_service::config::Error),
    #[error("{0:#}")]
    Startup(#[from] anyhow::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Api(ApiError::WatcherGone) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        tracing::error!("Request failed: {}", self);
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "err": self.to_string() }))
    }
}
