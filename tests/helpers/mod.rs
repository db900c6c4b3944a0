//! Test helper utilities: a mocked Gemini endpoint and an in-process server.
#![allow(dead_code)]

use base64::Engine;
use metrics_exporter_prometheus::PrometheusBuilder;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use restyle_batch::app_state::AppState;
use restyle_batch::config::{ApiKey, SharedCredential};
use restyle_batch::models::api::ItemView;
use restyle_batch::routes;
use restyle_batch::services::backoff::{BackoffClient, RetryPolicy};
use restyle_batch::services::gemini::GeminiClient;
use restyle_batch::services::prompts::PromptSettings;
use restyle_batch::services::workbench::Workbench;

use crate::fixtures::ShirtFixture;

pub const API_KEY: &str = "test-api-key";
pub const MODEL: &str = "test-image-model";

/// Marker only present in the primary prompt.
pub const PRIMARY_MARKER: &str = "CASE 1: HUMAN MODEL";
/// Marker only present in the fallback prompt.
pub const FALLBACK_MARKER: &str = "REMOVE MODEL COMPLETELY";

pub fn endpoint_path() -> String {
    format!("/v1beta/models/{MODEL}:generateContent")
}

pub fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn image_response(output: &[u8]) -> Value {
    json!({
        "candidates": [{
            "finishReason": "STOP",
            "content": { "parts": [
                { "inlineData": { "mimeType": "image/png", "data": b64(output) } }
            ]}
        }]
    })
}

pub fn safety_response() -> Value {
    json!({ "candidates": [{ "finishReason": "IMAGE_SAFETY" }] })
}

/// Mount a response for one source image and one prompt variant.
pub async fn mount_generation(
    server: &MockServer,
    source: &[u8],
    prompt_marker: &str,
    response: Value,
    expected_calls: u64,
) {
    Mock::given(method("POST"))
        .and(path(endpoint_path()))
        .and(query_param("key", API_KEY))
        .and(body_string_contains(b64(source)))
        .and(body_string_contains(prompt_marker))
        .respond_with(ResponseTemplate::new(200).set_body_json(response))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Mount the scripted behaviour of every fixture, each expected exactly once.
pub async fn mount_fixtures(server: &MockServer, fixtures: &[ShirtFixture]) {
    for fixture in fixtures {
        if fixture.safety_rejected {
            mount_generation(server, fixture.source, PRIMARY_MARKER, safety_response(), 1).await;
            mount_generation(
                server,
                fixture.source,
                FALLBACK_MARKER,
                image_response(fixture.output),
                1,
            )
            .await;
        } else {
            mount_generation(
                server,
                fixture.source,
                PRIMARY_MARKER,
                image_response(fixture.output),
                1,
            )
            .await;
        }
    }
}

pub fn gemini_client(server: &MockServer, credential: SharedCredential) -> GeminiClient {
    gemini_client_at(server.uri(), credential)
}

pub fn gemini_client_at(api_base: String, credential: SharedCredential) -> GeminiClient {
    let policy = RetryPolicy {
        max_retries: 3,
        initial_delay: Duration::from_millis(1),
    };
    GeminiClient::new(
        BackoffClient::new(Client::new(), policy),
        api_base,
        MODEL,
        credential,
    )
}

pub fn workbench_for(server: &MockServer) -> Workbench {
    workbench_with_credential(server, ApiKey::new(API_KEY))
}

pub fn workbench_with_credential(server: &MockServer, key: Option<ApiKey>) -> Workbench {
    workbench_at(server.uri(), key)
}

pub fn workbench_at(api_base: String, key: Option<ApiKey>) -> Workbench {
    let credential = SharedCredential::new(key);
    Workbench::new(
        std::sync::Arc::new(gemini_client_at(api_base, credential.clone())),
        credential,
        PromptSettings::default(),
        Duration::ZERO,
    )
}

/// Base URL of a local port with no listener.
pub fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");
    drop(listener);
    format!("http://{addr}")
}

/// Serve the API router on an ephemeral port. Returns the base URL.
pub async fn spawn_app(workbench: Workbench) -> String {
    let metrics = PrometheusBuilder::new().build_recorder().handle();
    let app = routes::router(AppState::new(workbench, metrics), 10 * 1024 * 1024);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server error");
    });

    format!("http://{addr}")
}

/// Poll the item list until every item is terminal (with timeout).
pub async fn wait_for_terminal_items(
    client: &Client,
    base_url: &str,
    timeout_secs: u64,
) -> Result<Vec<ItemView>, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 20; // Poll every 50ms

    for _ in 0..max_attempts {
        let items: Vec<ItemView> = client
            .get(format!("{base_url}/api/v1/items"))
            .send()
            .await?
            .json()
            .await?;

        if !items.is_empty() && items.iter().all(|i| i.status.is_terminal()) {
            return Ok(items);
        }
        sleep(Duration::from_millis(50)).await;
    }

    Err(format!("Items did not finish within {timeout_secs} seconds").into())
}
