use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use agora_db::models::Inserted;
use agora_types::api::{UserCreate, UserOut};

use crate::convert;
use crate::error::ApiError;
use crate::extract::{self, Path};
use crate::password;
use crate::state::{AppState, blocking};

/// POST /users: register an account. The password is hashed before it
/// reaches the store.
pub async fn create_user(
    State(state): State<AppState>,
    extract::Json(req): extract::Json<UserCreate>,
) -> Result<impl IntoResponse, ApiError> {
    validate_email(&req.email)?;
    if req.password.is_empty() {
        return Err(ApiError::Validation("password must not be empty".into()));
    }

    let db = state.db.clone();
    let email = req.email.clone();
    let inserted = blocking(move || {
        let digest = password::hash(&req.password)?;
        db.create_user(&req.email, &digest)
    })
    .await?;

    match inserted {
        Inserted::Created(row) => {
            info!("Registered user {}", row.id);
            Ok((StatusCode::CREATED, Json::<UserOut>(convert::user(row))))
        }
        Inserted::Duplicate => Err(ApiError::Conflict(format!(
            "user with email: {} already exists",
            email
        ))),
    }
}

/// GET /users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserOut>, ApiError> {
    let db = state.db.clone();
    let row = blocking(move || db.get_user_by_id(id)).await?;

    row.map(|r| Json(convert::user(r)))
        .ok_or_else(|| ApiError::NotFound(format!("user with id: {} was not found", id)))
}

/// Minimal address check: one `@`, a non-empty local part and a dotted domain.
fn validate_email(email: &str) -> Result<(), ApiError> {
    let invalid = || ApiError::Validation(format!("value is not a valid email address: {email}"));

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }
    Ok(())
}
