use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use agora_api::config::Settings;
use agora_api::router;
use agora_api::speech::{HttpSpeechBackend, SpeechBackend};
use agora_api::state::AppStateInner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "agora=debug,agora_api=debug,agora_db=info,tower_http=debug".into()
            }),
        )
        .init();

    // Config
    let settings = Settings::from_env()?;

    // Init database
    let db = Arc::new(agora_db::Database::open(
        &settings.database_path,
        settings.db_readers,
    )?);

    let speech: Option<Arc<dyn SpeechBackend>> = match &settings.speech {
        Some(speech_settings) => {
            info!("Speech backend at {}", speech_settings.transcribe_url);
            Some(Arc::new(HttpSpeechBackend::new(speech_settings)) as Arc<dyn SpeechBackend>)
        }
        None => {
            info!("Speech backend not configured; /speech/transcribe will return 503");
            None
        }
    };

    let state = AppStateInner::new(db, &settings, speech);
    let app = router::build(state);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    info!("Agora server listening on {}", addr);
    info!(
        "Access tokens expire after {} minutes ({:?})",
        settings.access_token_expire_minutes, settings.algorithm
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
