#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use review_backend::auth::sign_token_for_learner;
use review_backend::config::Config;
use review_backend::models::VocabularyItem;
use review_backend::seed::seed_vocabulary;
use review_backend::state::AppState;

pub const TEST_SECRET: &str = "review-test-secret";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    _dir: TempDir,
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(|_| {}).await
}

pub async fn create_test_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::for_sqlite(dir.path().join("review.db"));
    config.jwt_secret = Some(TEST_SECRET.to_string());
    configure(&mut config);

    let (app, state) = review_backend::create_app(config).await.unwrap();
    TestApp {
        app,
        state,
        _dir: dir,
    }
}

pub fn vocab(id: &str, text: &str, meaning: &str) -> VocabularyItem {
    VocabularyItem {
        id: id.to_string(),
        target_text: text.to_string(),
        transliteration: None,
        meaning: meaning.to_string(),
        example_sentence: None,
    }
}

pub async fn seed_vocab(state: &AppState, ids: &[&str]) {
    let items: Vec<VocabularyItem> = ids
        .iter()
        .map(|id| vocab(id, &format!("word-{id}"), &format!("meaning-{id}")))
        .collect();
    seed_vocabulary(state.db(), &items).await.unwrap();
}

pub fn token_for(learner_id: &str) -> String {
    sign_token_for_learner(learner_id, TEST_SECRET, Some("1h"))
        .unwrap()
        .0
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
