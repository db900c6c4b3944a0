use parking_lot::RwLock;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::services::prompts::{
    PromptSettings, DEFAULT_BACKGROUND_PROMPT, DEFAULT_CONSISTENCY_DESCRIPTOR,
    DEFAULT_MODEL_PROMPT,
};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Ignored by the batch binary.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Gemini API key. May be left unset and supplied later through the settings API.
    /// A blank value counts as unset.
    #[serde(default, deserialize_with = "deserialize_api_key")]
    pub gemini_api_key: Option<ApiKey>,

    /// Base URL of the Generative Language API
    #[serde(default = "default_gemini_api_base")]
    pub gemini_api_base: String,

    /// Image-capable model used for every generation call
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Face description applied when the source shows a human model
    #[serde(default = "default_model_prompt")]
    pub model_prompt: String,

    /// Background styling applied to every output
    #[serde(default = "default_background_prompt")]
    pub background_prompt: String,

    /// Fixed identity traits shared by every item of a session
    #[serde(default = "default_consistency_descriptor")]
    pub consistency_descriptor: String,

    /// Retries after the first attempt on transport failure or HTTP 429
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubled after each retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Delay between two processed items of a batch
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Per-request timeout for the Generation API
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upper bound for a multipart upload body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash-image-preview".to_string()
}

fn default_model_prompt() -> String {
    DEFAULT_MODEL_PROMPT.to_string()
}

fn default_background_prompt() -> String {
    DEFAULT_BACKGROUND_PROMPT.to_string()
}

fn default_consistency_descriptor() -> String {
    DEFAULT_CONSISTENCY_DESCRIPTOR.to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_pacing_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_upload_bytes() -> usize {
    200 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn prompt_settings(&self) -> PromptSettings {
        PromptSettings {
            model_description: self.model_prompt.clone(),
            background_description: self.background_prompt.clone(),
            consistency_descriptor: self.consistency_descriptor.clone(),
        }
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn deserialize_api_key<'de, D>(deserializer: D) -> Result<Option<ApiKey>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.and_then(ApiKey::new))
}

/// Generation API credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for blank input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Credential handle shared by the workbench and the Gemini client.
///
/// The value is read on every outbound call. Replacing it while a batch is
/// running is undefined: in-flight items may use either key.
#[derive(Clone, Default)]
pub struct SharedCredential(Arc<RwLock<Option<ApiKey>>>);

impl SharedCredential {
    pub fn new(initial: Option<ApiKey>) -> Self {
        Self(Arc::new(RwLock::new(initial)))
    }

    pub fn get(&self) -> Option<ApiKey> {
        self.0.read().clone()
    }

    pub fn set(&self, key: Option<ApiKey>) {
        *self.0.write() = key;
    }

    pub fn is_configured(&self) -> bool {
        self.0.read().is_some()
    }
}
