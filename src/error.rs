//! JSON error responses for the HTTP API.

use crate::store::StoreError;
use log::error;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use serde::Serialize;

/// The `{ "message": ... }` body used by every plain API reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::BadRequest(_) => Status::BadRequest,
            ApiError::Forbidden(_) => Status::Forbidden,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Internal(_) => Status::InternalServerError,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        error!("{}", e);
        ApiError::Internal("Could not save changes, please try again.".to_string())
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        (status, Message::new(self.to_string())).respond_to(req)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Renders Rocket's own failures (guards, bad bodies, unknown routes) in the
/// same shape as [`ApiError`].
#[catch(default)]
pub fn default_catcher(status: Status, _req: &Request<'_>) -> (Status, Json<Message>) {
    let error = match status.code {
        403 => ApiError::Forbidden("Admin access required.".to_string()),
        404 => ApiError::NotFound("Not found.".to_string()),
        400..=499 => ApiError::BadRequest(status.reason_lossy().to_string()),
        _ => ApiError::Internal(status.reason_lossy().to_string()),
    };
    (status, Message::new(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::BadRequest("x".into()).status(), Status::BadRequest);
        assert_eq!(ApiError::Forbidden("x".into()).status(), Status::Forbidden);
        assert_eq!(ApiError::NotFound("x".into()).status(), Status::NotFound);
        assert_eq!(
            ApiError::Internal("x".into()).status(),
            Status::InternalServerError
        );
    }

    #[test]
    fn test_store_errors_hide_details() {
        let err: ApiError = StoreError::Io(std::io::Error::other("disk full")).into();
        assert!(matches!(err, ApiError::Internal(ref m) if !m.contains("disk full")));
    }
}
