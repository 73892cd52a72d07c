use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use agora_db::models::{PostFields, PostMutation};
use agora_types::api::{PostCreate, PostOut, PostQuery};
use agora_types::models::{Post, User};

use crate::convert;
use crate::extract::{self, Path, Query};
use crate::error::ApiError;
use crate::state::{AppState, blocking};

// Reads require a caller but do not check ownership: any authenticated user
// may read any post. Only update and delete are owner-only.

/// GET /posts?limit=&skip=&search=
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
    Extension(_user): Extension<User>,
) -> Result<Json<Vec<PostOut>>, ApiError> {
    let db = state.db.clone();
    let rows = blocking(move || db.list_posts_with_votes(query.limit, query.skip, &query.search))
        .await?;

    Ok(Json(rows.into_iter().map(convert::post_out).collect()))
}

/// GET /posts/{id}
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(_user): Extension<User>,
) -> Result<Json<PostOut>, ApiError> {
    let db = state.db.clone();
    let row = blocking(move || db.get_post_with_votes(id)).await?;

    row.map(|r| Json(convert::post_out(r)))
        .ok_or_else(|| ApiError::NotFound(format!("post with id: {} was not found", id)))
}

/// POST /posts: the caller becomes the owner.
pub async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    extract::Json(req): extract::Json<PostCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let owner_id = user.id;
    let row = blocking(move || db.create_post(owner_id, &fields(&req)))
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    info!("User {} created post {}", owner_id, row.id);
    Ok((StatusCode::CREATED, Json::<Post>(convert::post(row))))
}

/// PUT /posts/{id}: replaces title, content and published.
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(user): Extension<User>,
    extract::Json(req): extract::Json<PostCreate>,
) -> Result<Json<Post>, ApiError> {
    let db = state.db.clone();
    let caller_id = user.id;
    let outcome = blocking(move || db.update_post(id, caller_id, &fields(&req))).await?;

    match outcome {
        PostMutation::Done(row) => {
            info!("User {} updated post {}", caller_id, id);
            Ok(Json(convert::post(row)))
        }
        PostMutation::Missing => Err(missing(id)),
        PostMutation::NotOwner => Err(ApiError::Forbidden),
    }
}

/// DELETE /posts/{id}
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, ApiError> {
    let db = state.db.clone();
    let caller_id = user.id;
    let outcome = blocking(move || db.delete_post(id, caller_id)).await?;

    match outcome {
        PostMutation::Done(()) => {
            info!("User {} deleted post {}", caller_id, id);
            Ok(StatusCode::NO_CONTENT)
        }
        PostMutation::Missing => Err(missing(id)),
        PostMutation::NotOwner => Err(ApiError::Forbidden),
    }
}

fn fields(req: &PostCreate) -> PostFields<'_> {
    PostFields {
        title: &req.title,
        content: &req.content,
        published: req.published,
    }
}

fn missing(id: i64) -> ApiError {
    ApiError::NotFound(format!("post with id: {} does not exist", id))
}
