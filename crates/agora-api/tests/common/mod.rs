#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use agora_api::config::Settings;
use agora_api::router;
use agora_api::speech::SpeechBackend;
use agora_api::state::{AppState, AppStateInner};
use agora_db::Database;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn settings() -> Settings {
    Settings::from_lookup(|key| match key {
        "AGORA_SECRET_KEY" => Some("integration-test-secret".to_string()),
        "AGORA_ACCESS_TOKEN_EXPIRE_MINUTES" => Some("30".to_string()),
        _ => None,
    })
    .unwrap()
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_speech(None)
    }

    pub fn with_speech(speech: Option<Arc<dyn SpeechBackend>>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("agora-it.db"), 2).unwrap());
        let state = AppStateInner::new(db, &settings(), speech);
        Self {
            router: router::build(state.clone()),
            state,
            _dir: dir,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Register through the API and return the `UserOut` body.
    pub async fn register(&self, email: &str, password: &str) -> Value {
        let res = self
            .send(json_request(
                Method::POST,
                "/users",
                None,
                serde_json::json!({ "email": email, "password": password }),
            ))
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "register {email}: {:?}", res.body);
        res.body
    }

    pub async fn login_response(&self, email: &str, password: &str) -> TestResponse {
        self.send(form_request("/login", &[("username", email), ("password", password)]))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let res = self.login_response(email, password).await;
        assert_eq!(res.status, StatusCode::OK, "login {email}: {:?}", res.body);
        assert_eq!(res.body["token_type"], "bearer");
        res.body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn create_post(&self, token: &str, title: &str) -> Value {
        let res = self
            .send(json_request(
                Method::POST,
                "/posts",
                Some(token),
                serde_json::json!({ "title": title, "content": format!("{title} body") }),
            ))
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "create post: {:?}", res.body);
        res.body
    }

    pub async fn vote(&self, token: &str, post_id: i64, dir: i64) -> TestResponse {
        self.send(json_request(
            Method::POST,
            "/vote",
            Some(token),
            serde_json::json!({ "post_id": post_id, "dir": dir }),
        ))
        .await
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn form_request(uri: &str, pairs: &[(&str, &str)]) -> Request<Body> {
    let encoded = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", form_encode(k), form_encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(encoded))
        .unwrap()
}

fn form_encode(raw: &str) -> String {
    raw.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}
