use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use shared::constants::{
    INVALID_BIRTHDAY_ERROR, INVALID_EMAIL_ERROR, SAVE_FAILED_ERROR, SESSION_NOT_FOUND_ERROR,
};
use shared::shared_wheel_game::SessionError;
use tracing::error;

use crate::services::registration_service::RegistrationError;
use crate::services::sinks::SinkError;

#[derive(Debug)]
pub enum Error {
    Validation(&'static str),
    NotFound,
    Session(SessionError),
    LeadCapture(SinkError),
}

impl From<SessionError> for Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidEmail => Error::Validation(INVALID_EMAIL_ERROR),
            SessionError::InvalidBirthday => Error::Validation(INVALID_BIRTHDAY_ERROR),
            other => Error::Session(other),
        }
    }
}

impl From<SinkError> for Error {
    fn from(err: SinkError) -> Self {
        Error::LeadCapture(err)
    }
}

impl From<RegistrationError> for Error {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Session(e) => e.into(),
            RegistrationError::LeadCapture(e) => e.into(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Error::Validation(message) => (StatusCode::BAD_REQUEST, message.to_string()),
            Error::NotFound => (StatusCode::NOT_FOUND, SESSION_NOT_FOUND_ERROR.to_string()),
            Error::Session(e) => (StatusCode::CONFLICT, e.to_string()),
            Error::LeadCapture(e) => {
                error!("Lead capture failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, SAVE_FAILED_ERROR.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
