use serde::{Deserialize, Serialize};

use crate::models::{Post, SentimentLabel, User};

// -- JWT Claims --

/// Claims carried by every access token. `user_id` is the integer id cast to
/// a string; `exp` is a unix timestamp in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub exp: i64,
}

// -- Auth --

/// OAuth2 password-flow form. `username` carries the account email.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserCreate {
    pub email: String,
    pub password: String,
}

pub type UserOut = User;

// -- Posts --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostCreate {
    pub title: String,
    pub content: String,
    #[serde(default = "default_published")]
    pub published: bool,
}

fn default_published() -> bool {
    true
}

/// A post paired with the number of votes it has received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostOut {
    #[serde(rename = "Post")]
    pub post: Post,
    pub votes: i64,
}

#[derive(Debug, Deserialize)]
pub struct PostQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub skip: u32,
    #[serde(default)]
    pub search: String,
}

fn default_limit() -> u32 {
    10
}

// -- Votes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    pub post_id: i64,
    pub dir: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// -- Speech --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub sentiment: SentimentLabel,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechTranscription {
    pub transcription: String,
    pub sentiment: SentimentAnalysis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallSentiment {
    pub overall_sentiment: SentimentLabel,
    pub average_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub filename: String,
    pub transcriptions: Vec<SpeechTranscription>,
    pub overall_sentiment: OverallSentiment,
}
