use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use restyle_batch::app_state::AppState;
use restyle_batch::config::{AppConfig, SharedCredential};
use restyle_batch::routes;
use restyle_batch::services::gemini::GeminiClient;
use restyle_batch::services::workbench::Workbench;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing restyle-batch server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    // Register application metrics
    metrics::describe_counter!("restyle_items_total", "Items finished, labelled by outcome");
    metrics::describe_histogram!(
        "restyle_item_processing_seconds",
        "Time to run one item through primary and fallback prompts"
    );
    metrics::describe_counter!(
        "restyle_http_retries_total",
        "Generation API calls retried after a transport failure or HTTP 429"
    );
    metrics::describe_counter!("restyle_batches_total", "Batch runs started");
    metrics::describe_gauge!("restyle_queue_pending", "Items still waiting in the running batch");

    if config.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; batches are refused until a key is supplied");
    }
    let credential = SharedCredential::new(config.gemini_api_key.clone());

    // Initialize Gemini client
    tracing::info!(model = %config.gemini_model, "Initializing Gemini client");
    let generator = GeminiClient::from_config(&config, credential.clone())
        .expect("Failed to initialize Gemini client");

    let workbench = Workbench::new(
        Arc::new(generator),
        credential,
        config.prompt_settings(),
        config.pacing(),
    );

    // Create shared application state
    let state = AppState::new(workbench, prometheus_handle);
    let app = routes::router(state, config.max_upload_bytes);

    tracing::info!("Starting restyle-batch on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
