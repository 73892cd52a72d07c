use std::sync::Arc;

use agora_db::Database;

use crate::auth::Authenticator;
use crate::config::Settings;
use crate::error::ApiError;
use crate::speech::SpeechBackend;
use crate::token::TokenCodec;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub auth: Authenticator,
    /// `None` when no speech service is configured.
    pub speech: Option<Arc<dyn SpeechBackend>>,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        settings: &Settings,
        speech: Option<Arc<dyn SpeechBackend>>,
    ) -> AppState {
        let auth = Authenticator::new(db.clone(), TokenCodec::from_settings(settings));
        Arc::new(Self { db, auth, speech })
    }
}

/// Run blocking store or hashing work off the async runtime.
pub async fn blocking<F, T, E>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?.map_err(Into::into)
}
