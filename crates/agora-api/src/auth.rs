use std::sync::Arc;

use axum::{Json, extract::State};
use thiserror::Error;
use tracing::{debug, info};

use agora_db::Database;
use agora_types::api::{LoginForm, TokenResponse};
use agora_types::models::User;

use crate::convert;
use crate::error::ApiError;
use crate::extract::Form;
use crate::password;
use crate::state::{AppState, blocking};
use crate::token::TokenCodec;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password. Callers cannot tell which.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("could not validate credentials")]
    Unauthenticated,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Login and per-request identity resolution over the user store.
pub struct Authenticator {
    db: Arc<Database>,
    tokens: TokenCodec,
}

impl Authenticator {
    pub fn new(db: Arc<Database>, tokens: TokenCodec) -> Self {
        Self { db, tokens }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Check credentials and issue an access token. Blocks on the store and
    /// on Argon2; call from a blocking context.
    pub fn login(&self, email: &str, plaintext: &str) -> Result<String, AuthError> {
        let user = self
            .db
            .get_user_by_email(email)?
            .ok_or(AuthError::InvalidCredentials)?;

        if !password::verify(plaintext, &user.password) {
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.tokens.issue(user.id)?;
        Ok(token)
    }

    /// Resolve a bearer token to the user it names. Runs once per protected
    /// request and never caches, so deleted users are rejected immediately.
    pub fn resolve(&self, token: &str) -> Result<User, AuthError> {
        let user_id = self.tokens.decode(token).map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            AuthError::Unauthenticated
        })?;

        let row = self.db.get_user_by_id(user_id)?.ok_or_else(|| {
            debug!("Token subject {} no longer exists", user_id);
            AuthError::Unauthenticated
        })?;

        Ok(convert::user(row))
    }
}

/// POST /login: OAuth2 password form; `username` carries the email.
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let st = state.clone();
    let token = blocking(move || st.auth.login(&form.username, &form.password)).await?;

    info!("Issued access token");
    Ok(Json(TokenResponse::bearer(token)))
}
