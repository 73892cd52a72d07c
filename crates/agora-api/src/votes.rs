use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use agora_db::models::{VoteDirection, VoteOutcome};
use agora_types::api::{MessageResponse, VoteRequest};
use agora_types::models::User;

use crate::error::ApiError;
use crate::extract;
use crate::state::{AppState, blocking};

/// POST /vote: `dir: 1` casts a vote, `dir: 0` withdraws it.
pub async fn vote(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    extract::Json(req): extract::Json<VoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let direction = match req.dir {
        1 => VoteDirection::Cast,
        0 => VoteDirection::Uncast,
        other => {
            return Err(ApiError::Validation(format!(
                "dir must be 0 or 1, got {other}"
            )));
        }
    };

    let db = state.db.clone();
    let user_id = user.id;
    let post_id = req.post_id;
    let outcome = blocking(move || db.cast_vote(user_id, post_id, direction)).await?;

    match outcome {
        VoteOutcome::Added => {
            info!("User {} voted on post {}", user_id, post_id);
            Ok((
                StatusCode::CREATED,
                Json(MessageResponse::new("successfully added vote")),
            ))
        }
        VoteOutcome::Removed => {
            info!("User {} withdrew vote on post {}", user_id, post_id);
            Ok((
                StatusCode::CREATED,
                Json(MessageResponse::new("successfully deleted vote")),
            ))
        }
        VoteOutcome::AlreadyVoted => Err(ApiError::Conflict(format!(
            "user {} has already voted on post {}",
            user_id, post_id
        ))),
        VoteOutcome::NotVoted => Err(ApiError::NotFound("Vote does not exist".into())),
        VoteOutcome::PostMissing => Err(ApiError::NotFound(format!(
            "post with id: {} does not exist",
            post_id
        ))),
        VoteOutcome::VoterMissing => Err(ApiError::Unauthenticated),
    }
}
