// src/handlers/grading.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{error::AppError, models::attempt::MarkIncorrectRequest, services::AttemptService};

/// Marks a question of a sitting as wrong.
/// Graders only.
pub async fn mark_incorrect(
    State(attempts): State<AttemptService>,
    Path(sitting_id): Path<i64>,
    Json(payload): Json<MarkIncorrectRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    Ok(Json(attempts.mark_incorrect(sitting_id, payload.question_id).await?))
}

/// Restores credit for a question marked wrong.
/// Graders only.
pub async fn restore_credit(
    State(attempts): State<AttemptService>,
    Path((sitting_id, question_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(attempts.restore_credit(sitting_id, question_id).await?))
}
