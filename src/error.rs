use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

use crate::hierarchy::HierarchyError;
use crate::repo::RepoError;

/// Every response, success or failure, is wrapped as `{code, response}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: u8,
    pub response: T,
}

pub fn ok<T: Serialize>(response: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope { code: 0, response })
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] NotFound(String),
    #[error("{0}")] Invalid(String),
    #[error("{0}")] BadRequest(String),
    #[error("{0}")] Conflict(String),
    #[error("unknown error")] Internal,
}

impl ApiError {
    pub fn code(&self) -> u8 {
        match self {
            ApiError::NotFound(_) => 1,
            ApiError::Invalid(_) => 2,
            ApiError::BadRequest(_) => 3,
            ApiError::Internal => 4,
            ApiError::Conflict(_) => 5,
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound("not found".into()),
            RepoError::Conflict => ApiError::Conflict("already exists".into()),
            RepoError::Internal(msg) => {
                log::error!("repository failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<HierarchyError> for ApiError {
    fn from(e: HierarchyError) -> Self {
        match e {
            HierarchyError::ParentNotFound(_) => ApiError::NotFound(e.to_string()),
            HierarchyError::Storage(inner) => inner.into(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        log::error!("serialization failure: {e}");
        ApiError::Internal
    }
}

impl ResponseError for ApiError {
    // failures travel in the envelope's `code`, the transport always succeeds
    fn status_code(&self) -> StatusCode {
        StatusCode::OK
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(Envelope { code: self.code(), response: self.to_string() })
    }
}
