// src/handlers/attempts.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError, models::attempt::SubmitAnswerRequest, services::AttemptService,
    utils::jwt::Claims,
};

/// Starts a sitting for the quiz, or resumes the open one.
///
/// Returns 409 if the quiz allows a single attempt and the user has already completed it.
pub async fn start_attempt(
    State(attempts): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path((course_id, quiz_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let started = attempts.start_or_resume(user_id, quiz_id, course_id).await?;
    Ok((StatusCode::OK, Json(started)))
}

/// Submits the answer to the sitting's current question.
pub async fn submit_answer(
    State(attempts): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(sitting_id): Path<i64>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user_id = claims.user_id()?;
    let response = attempts
        .submit_answer(user_id, sitting_id, payload.question_id, payload.choice_id)
        .await?;
    Ok(Json(response))
}

/// Finishes the sitting and returns its result.
/// Practice sittings are gone after this call.
pub async fn finish(
    State(attempts): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(sitting_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let result = attempts.get_result(user_id, sitting_id).await?;
    Ok(Json(result))
}

/// Lists the caller's completed sittings, newest first.
pub async fn list_sittings(
    State(attempts): State<AttemptService>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    Ok(Json(attempts.history(user_id).await?))
}
