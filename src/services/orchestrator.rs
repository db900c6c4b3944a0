use std::sync::Arc;
use std::time::Instant;

use crate::models::item::{AttemptOutcome, SourceImage};
use crate::services::gemini::ImageGenerator;
use crate::services::prompts::PromptSettings;
use crate::services::safety::SafetyClassifier;

/// Error text stored when both the primary and the fallback prompt fail.
pub const DOUBLE_FAILURE_MESSAGE: &str =
    "Double failure: generation blocked by safety filtering on both primary and fallback prompts";

/// Runs the primary prompt and, after a safety rejection, exactly one
/// fallback attempt.
pub struct FallbackOrchestrator {
    generator: Arc<dyn ImageGenerator>,
    classifier: Arc<dyn SafetyClassifier>,
}

impl FallbackOrchestrator {
    pub fn new(generator: Arc<dyn ImageGenerator>, classifier: Arc<dyn SafetyClassifier>) -> Self {
        Self {
            generator,
            classifier,
        }
    }

    /// Drive one item from `Processing` to a terminal outcome.
    pub async fn run(&self, image: &SourceImage, prompts: &PromptSettings) -> AttemptOutcome {
        let start = Instant::now();
        let primary = self.generator.generate(image, &prompts.primary_prompt()).await;

        let outcome = match primary {
            Ok(result) => AttemptOutcome::Completed(result),
            Err(err) if self.classifier.is_safety_rejection(&err) => {
                tracing::info!(error = %err, "Safety rejection, retrying with fallback prompt");
                match self.generator.generate(image, &prompts.fallback_prompt()).await {
                    Ok(result) => AttemptOutcome::Fallback(result),
                    Err(fallback_err) => {
                        tracing::warn!(error = %fallback_err, "Fallback prompt failed");
                        AttemptOutcome::Failed(DOUBLE_FAILURE_MESSAGE.to_string())
                    }
                }
            }
            Err(err) => AttemptOutcome::Failed(err.to_string()),
        };

        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            outcome = %outcome.status(),
            "Generation attempt finished"
        );
        outcome
    }
}
