use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use shared::constants::{EMAIL_SAVED_MESSAGE, INVALID_BODY_ERROR, INVALID_EMAIL_ERROR, REQUIRED_FIELDS_ERROR};
use shared::shared_wheel_game::{PrizeListResponse, SaveEmailRequest, SaveEmailResponse, Submission};
use tracing::{debug, info};
use validator::Validate;

use crate::config::EnvReport;
use crate::error::Error;
use crate::request_context::RequestContext;
use crate::services::registration_service;
use crate::AppState;

/// Stateless lead capture for clients that keep the wheel on their side.
pub async fn save_email(
    State(state): State<AppState>,
    context: RequestContext,
    payload: Result<Json<SaveEmailRequest>, JsonRejection>,
) -> Result<Json<SaveEmailResponse>, Error> {
    let Json(mut request) = payload.map_err(|rejection| {
        debug!("Rejected save-email body: {}", rejection);
        Error::Validation(INVALID_BODY_ERROR)
    })?;

    request.email = request.email.trim().to_string();
    if request.email.is_empty() || request.prize_amount == 0 {
        return Err(Error::Validation(REQUIRED_FIELDS_ERROR));
    }
    request.validate().map_err(|_| Error::Validation(INVALID_EMAIL_ERROR))?;

    let submission = Submission::new(
        &request.email,
        request.prize_amount,
        request.birthday,
        context.client.clone(),
        Utc::now(),
    )?;

    registration_service::capture_lead(&submission, &context, &state.sinks).await?;
    info!("Saved email for a prize of {}", submission.prize_amount);

    Ok(Json(SaveEmailResponse {
        success: true,
        message: EMAIL_SAVED_MESSAGE.to_string(),
    }))
}

pub async fn list_prizes(State(state): State<AppState>) -> Json<PrizeListResponse> {
    Json(PrizeListResponse::from_table(&state.prize_table))
}

pub async fn env_check() -> Json<EnvReport> {
    Json(EnvReport::from_env())
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
