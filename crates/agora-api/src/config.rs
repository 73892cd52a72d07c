use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use jsonwebtoken::Algorithm;
use tracing::info;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// One year.
const MAX_TOKEN_LIFETIME_MINUTES: i64 = 60 * 24 * 365;

/// Process-wide settings. Built once at startup and handed to whatever needs
/// them; nothing reads the environment after this point.
#[derive(Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub db_readers: usize,
    pub secret_key: String,
    pub algorithm: Algorithm,
    pub access_token_expire_minutes: i64,
    pub speech: Option<SpeechSettings>,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub transcribe_url: String,
    pub sentiment_url: String,
    pub language: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default = |key: &str, default: &str| {
            lookup(key).unwrap_or_else(|| {
                info!("{key} not set, using default: {default}");
                default.to_string()
            })
        };

        let secret_key = lookup("AGORA_SECRET_KEY").unwrap_or_default();
        if secret_key.is_empty() || PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
            bail!("AGORA_SECRET_KEY is unset or still a placeholder");
        }

        let algorithm = parse_algorithm(&or_default("AGORA_ALGORITHM", "HS256"))?;

        let access_token_expire_minutes: i64 = or_default("AGORA_ACCESS_TOKEN_EXPIRE_MINUTES", "30")
            .parse()
            .context("AGORA_ACCESS_TOKEN_EXPIRE_MINUTES must be an integer")?;
        if !(1..=MAX_TOKEN_LIFETIME_MINUTES).contains(&access_token_expire_minutes) {
            bail!(
                "AGORA_ACCESS_TOKEN_EXPIRE_MINUTES must be between 1 and {MAX_TOKEN_LIFETIME_MINUTES}"
            );
        }

        let port: u16 = or_default("AGORA_PORT", "8000")
            .parse()
            .context("AGORA_PORT must be a port number")?;

        let db_readers: usize = or_default("AGORA_DB_READERS", "4")
            .parse()
            .context("AGORA_DB_READERS must be an integer")?;

        let speech = match (
            lookup("AGORA_SPEECH_TRANSCRIBE_URL"),
            lookup("AGORA_SPEECH_SENTIMENT_URL"),
        ) {
            (Some(transcribe_url), Some(sentiment_url)) => Some(SpeechSettings {
                transcribe_url,
                sentiment_url,
                language: or_default("AGORA_SPEECH_LANGUAGE", "id-ID"),
            }),
            (None, None) => None,
            _ => bail!(
                "AGORA_SPEECH_TRANSCRIBE_URL and AGORA_SPEECH_SENTIMENT_URL must be set together"
            ),
        };

        Ok(Self {
            host: or_default("AGORA_HOST", "0.0.0.0"),
            port,
            database_path: or_default("AGORA_DB_PATH", "agora.db").into(),
            db_readers,
            secret_key,
            algorithm,
            access_token_expire_minutes,
            speech,
        })
    }
}

/// Tokens are signed with a shared secret, so only the HMAC family applies.
fn parse_algorithm(raw: &str) -> Result<Algorithm> {
    let algorithm =
        Algorithm::from_str(raw).map_err(|_| anyhow!("Unknown signing algorithm: {raw}"))?;
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => bail!("Signing algorithm {other:?} needs a key pair; use HS256, HS384 or HS512"),
    }
}
