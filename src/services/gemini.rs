use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{AppConfig, SharedCredential};
use crate::models::item::{GeneratedImage, SourceImage};
use crate::services::backoff::{BackoffClient, HttpError, RetryPolicy};

/// Finish reason of a candidate that ran to completion.
const FINISH_STOP: &str = "STOP";

/// Finish reasons reported when the provider refuses on content-policy grounds.
const SAFETY_FINISH_REASONS: [&str; 2] = ["SAFETY", "IMAGE_SAFETY"];

/// Harm categories sent with every request, each set to `BLOCK_NONE`.
/// Refusals are handled from the finish reason instead.
const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Produces one output image from a source image and prompt text.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(
        &self,
        image: &SourceImage,
        prompt: &str,
    ) -> Result<GeneratedImage, GenerationError>;
}

/// Client for the Gemini `generateContent` endpoint of an image-capable model.
pub struct GeminiClient {
    client: BackoffClient,
    api_base: String,
    model: String,
    credential: SharedCredential,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    finish_reason: Option<String>,
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

impl GeminiClient {
    pub fn new(
        client: BackoffClient,
        api_base: impl Into<String>,
        model: impl Into<String>,
        credential: SharedCredential,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            model: model.into(),
            credential,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        credential: SharedCredential,
    ) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GenerationError::Request(e.without_url()))?;

        let policy = RetryPolicy {
            max_retries: config.max_retries,
            initial_delay: config.initial_backoff(),
        };

        Ok(Self::new(
            BackoffClient::new(http, policy),
            &config.gemini_api_base,
            &config.gemini_model,
            credential,
        ))
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }

    fn build_payload(image: &SourceImage, prompt: &str) -> GenerateContentRequest {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);

        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(prompt.to_string()),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: image.media_type.clone(),
                            data: encoded,
                        }),
                    },
                ],
            }],
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate(
        &self,
        image: &SourceImage,
        prompt: &str,
    ) -> Result<GeneratedImage, GenerationError> {
        let api_key = self.credential.get().ok_or(GenerationError::MissingApiKey)?;

        let request = self
            .client
            .http()
            .post(self.endpoint())
            .query(&[("key", api_key.expose())])
            .json(&Self::build_payload(image, prompt))
            .build()
            .map_err(|e| GenerationError::Request(e.without_url()))?;

        let response = self.client.send(request).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Request(e.without_url()))?;

        let parsed: GenerateContentResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(GenerationError::Provider(format!("HTTP {status}")));
            }
            Err(e) => return Err(GenerationError::InvalidResponse(e)),
        };

        interpret_response(parsed)
    }
}

fn interpret_response(
    response: GenerateContentResponse,
) -> Result<GeneratedImage, GenerationError> {
    if let Some(error) = response.error {
        return Err(GenerationError::Provider(
            error.message.unwrap_or_else(|| "API Error".to_string()),
        ));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(GenerationError::NoCandidates)?;

    let reason = candidate.finish_reason.as_deref().unwrap_or("UNSPECIFIED");
    if reason != FINISH_STOP {
        if SAFETY_FINISH_REASONS.contains(&reason) {
            return Err(GenerationError::SafetyBlocked);
        }
        return Err(GenerationError::UnexpectedFinish(reason.to_string()));
    }

    let inline = candidate
        .content
        .unwrap_or_default()
        .parts
        .into_iter()
        .find_map(|part| part.inline_data)
        .ok_or(GenerationError::NoOutput)?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(inline.data.as_bytes())
        .map_err(GenerationError::Decode)?;

    Ok(GeneratedImage::new(inline.mime_type, bytes))
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("No API key configured")]
    MissingApiKey,

    #[error("Could not build request: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Network error: {0}")]
    Transport(#[source] HttpError),

    #[error("Too Many Requests: {0}")]
    RateLimited(#[source] HttpError),

    #[error("{0}")]
    Provider(String),

    #[error("SAFETY_BLOCK")]
    SafetyBlocked,

    #[error("Status: {0}")]
    UnexpectedFinish(String),

    #[error("No candidates returned.")]
    NoCandidates,

    #[error("No image returned.")]
    NoOutput,

    #[error("Malformed API response: {0}")]
    InvalidResponse(#[source] serde_json::Error),

    #[error("Generated image is not valid base64: {0}")]
    Decode(#[source] base64::DecodeError),
}

impl From<HttpError> for GenerationError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::RateLimited { .. } => Self::RateLimited(err),
            _ => Self::Transport(err),
        }
    }
}
