use async_trait::async_trait;
use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use agora_db::models::Inserted;
use agora_types::api::{
    OverallSentiment, SentimentAnalysis, SpeechTranscription, TranscriptionResponse,
};
use agora_types::models::SentimentLabel;

use crate::config::SpeechSettings;
use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// 25 MB upload limit for call recordings
pub const MAX_AUDIO_SIZE: usize = 25 * 1024 * 1024;

const DEFAULT_RELATED_TO_ID: &str = "unlinked";

/// External speech-to-text and sentiment scoring.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// One transcript per recognised utterance.
    async fn transcribe(&self, audio: Bytes) -> anyhow::Result<Vec<String>>;

    /// Polarity in [-1, 1].
    async fn analyze(&self, text: &str) -> anyhow::Result<f64>;
}

/// `SpeechBackend` over two plain HTTP endpoints.
pub struct HttpSpeechBackend {
    client: reqwest::Client,
    transcribe_url: String,
    sentiment_url: String,
    language: String,
}

#[derive(Deserialize)]
struct TranscribeReply {
    transcripts: Vec<String>,
}

#[derive(Serialize)]
struct SentimentRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct SentimentReply {
    score: f64,
}

impl HttpSpeechBackend {
    pub fn new(settings: &SpeechSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            transcribe_url: settings.transcribe_url.clone(),
            sentiment_url: settings.sentiment_url.clone(),
            language: settings.language.clone(),
        }
    }
}

#[async_trait]
impl SpeechBackend for HttpSpeechBackend {
    async fn transcribe(&self, audio: Bytes) -> anyhow::Result<Vec<String>> {
        let reply: TranscribeReply = self
            .client
            .post(&self.transcribe_url)
            .query(&[("language", self.language.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(reply.transcripts)
    }

    async fn analyze(&self, text: &str) -> anyhow::Result<f64> {
        let reply: SentimentReply = self
            .client
            .post(&self.sentiment_url)
            .json(&SentimentRequest { text })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(reply.score.clamp(-1.0, 1.0))
    }
}

/// Score one transcript. A failed analysis counts as neutral rather than
/// failing the whole upload.
pub async fn analyze_sentiment(backend: &dyn SpeechBackend, text: &str) -> SentimentAnalysis {
    match backend.analyze(text).await {
        Ok(score) => SentimentAnalysis {
            sentiment: SentimentLabel::from_score(score),
            score,
        },
        Err(e) => {
            warn!("Sentiment analysis failed: {:#}", e);
            SentimentAnalysis {
                sentiment: SentimentLabel::Neutral,
                score: 0.0,
            }
        }
    }
}

/// Unweighted mean of the scores, classified by sign. No scores is neutral.
pub fn overall_sentiment(scores: &[f64]) -> OverallSentiment {
    let average_score = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    OverallSentiment {
        overall_sentiment: SentimentLabel::from_score(average_score),
        average_score,
    }
}

/// POST /speech/transcribe: multipart with a `file` part (its filename is
/// the call id) and an optional `related_to_id` text part.
pub async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let backend = state
        .speech
        .clone()
        .ok_or_else(|| ApiError::Unavailable("speech service is not configured".into()))?;

    let mut upload: Option<(String, Bytes)> = None;
    let mut related_to_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| ApiError::BadRequest("file part needs a filename".into()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
                upload = Some((filename, data));
            }
            "related_to_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("invalid related_to_id: {e}")))?;
                related_to_id = Some(text);
            }
            _ => {}
        }
    }

    let (filename, audio) =
        upload.ok_or_else(|| ApiError::BadRequest("missing file part".into()))?;
    if audio.is_empty() {
        return Err(ApiError::BadRequest("uploaded file is empty".into()));
    }

    let transcripts = backend.transcribe(audio).await.map_err(|e| {
        error!("Transcription failed for {}: {:#}", filename, e);
        ApiError::Internal(e)
    })?;

    let mut transcriptions = Vec::with_capacity(transcripts.len());
    for text in transcripts {
        let sentiment = analyze_sentiment(backend.as_ref(), &text).await;
        transcriptions.push(SpeechTranscription {
            transcription: text,
            sentiment,
        });
    }

    let scores: Vec<f64> = transcriptions.iter().map(|t| t.sentiment.score).collect();
    let overall = overall_sentiment(&scores);

    let db = state.db.clone();
    let call_id = filename.clone();
    let related_to_id = related_to_id.unwrap_or_else(|| DEFAULT_RELATED_TO_ID.to_string());
    let label = overall.overall_sentiment;
    let logged = blocking(move || db.insert_sentiment_log(&related_to_id, &call_id, label.as_str()))
        .await?;

    match logged {
        Inserted::Created(row) => info!(
            "Logged call {} as {} (log {})",
            row.call_id, row.overall_sentiment, row.id
        ),
        Inserted::Duplicate => {
            return Err(ApiError::Conflict(format!(
                "call {} has already been logged",
                filename
            )));
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(TranscriptionResponse {
            filename,
            transcriptions,
            overall_sentiment: overall,
        }),
    ))
}
