//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::{Arc, RwLock};

use axum::{Router, body::Body};

use study_buddy::ai::PersonalityRegistry;
use study_buddy::api::AppState;
use study_buddy::api::app;
use study_buddy::core::AppConfig;
use study_buddy::openai::OpenAiClient;

pub const HELLO_SSE: &str = r#"data: {"id":"chunk0","object":"chat.completion.chunk","model":"llama-3.3-70b-versatile","choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}

data: {"id":"chunk1","object":"chat.completion.chunk","model":"llama-3.3-70b-versatile","choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}

data: {"id":"chunk2","object":"chat.completion.chunk","model":"llama-3.3-70b-versatile","choices":[{"index":0,"delta":{"content":"lo"},"finish_reason":null}]}

data: {"id":"chunk3","object":"chat.completion.chunk","model":"llama-3.3-70b-versatile","choices":[{"index":0,"delta":{"content":"!"},"finish_reason":null}]}

data: {"id":"chunk4","object":"chat.completion.chunk","model":"llama-3.3-70b-versatile","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}

data: [DONE]

"#;

pub fn test_config(api_hostname: &str) -> AppConfig {
    AppConfig {
        openai_api_hostname: api_hostname.to_string(),
        openai_api_key: String::from("test-api-key"),
        openai_model: String::from("llama-3.3-70b-versatile"),
        temperature: 0.7,
        max_tokens: 2048,
    }
}

/// Creates a test application router that sends completion requests
/// to `api_hostname` (usually a `mockito` server). The shared state is
/// returned too so tests can inspect sessions directly.
pub fn test_app_with_state(api_hostname: &str) -> (Router, Arc<RwLock<AppState>>) {
    let config = test_config(api_hostname);
    let registry = PersonalityRegistry::new().expect("Failed to load personalities");
    let invoker = Arc::new(OpenAiClient::new(&config));
    let app_state = Arc::new(RwLock::new(AppState::new(config, registry, invoker)));
    (app(Arc::clone(&app_state)), app_state)
}

pub fn test_app(api_hostname: &str) -> Router {
    test_app_with_state(api_hostname).0
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not utf-8")
}
