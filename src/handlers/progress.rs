// src/handlers/progress.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};

use crate::{error::AppError, services::AttemptService, utils::jwt::Claims};

/// Returns the caller's cumulative score per quiz.
pub async fn get_progress(
    State(attempts): State<AttemptService>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    Ok(Json(attempts.progress(user_id).await?))
}
