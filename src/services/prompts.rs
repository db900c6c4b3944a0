//! Prompt text sent alongside every source image.
//!
//! Two variants exist: the primary prompt restyles the shot (face swap for
//! human models, new background), and the fallback prompt is used after a
//! safety rejection and asks for a product detail shot with no person in it.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL_PROMPT: &str = "Korean female model, soft facial features, natural dark hair, elegant and trendy Korean beauty aesthetic";

pub const DEFAULT_BACKGROUND_PROMPT: &str = "warm cozy indoor living room, soft warm lighting, beige and brown tones, comfortable atmosphere, depth of field";

pub const DEFAULT_CONSISTENCY_DESCRIPTOR: &str = "Specific features: Oval face shape, slight natural makeup, straight long black hair parting in the middle, small beauty mark under left eye, calm expression.";

/// Prompt inputs for one batch run. Passed explicitly to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSettings {
    pub model_description: String,
    pub background_description: String,
    /// Invariant identity traits keeping generated faces consistent across a batch.
    pub consistency_descriptor: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            model_description: DEFAULT_MODEL_PROMPT.to_string(),
            background_description: DEFAULT_BACKGROUND_PROMPT.to_string(),
            consistency_descriptor: DEFAULT_CONSISTENCY_DESCRIPTOR.to_string(),
        }
    }
}

impl PromptSettings {
    pub fn primary_prompt(&self) -> String {
        compose_primary_prompt(
            &self.model_description,
            &self.background_description,
            &self.consistency_descriptor,
        )
    }

    pub fn fallback_prompt(&self) -> String {
        compose_fallback_prompt(&self.background_description)
    }
}

pub fn compose_primary_prompt(
    model_description: &str,
    background_description: &str,
    consistency_descriptor: &str,
) -> String {
    format!(
        "Context: Professional E-commerce Clothing Catalog. Product: Thermal Innerwear. Rating: G.\n\
         Task: Product Styling Update.\n\
         CRITICAL RULES: 1. MAINTAIN ASPECT RATIO. 2. NO NEW TEXT. 3. PRESERVE ORIGINAL TEXT.\n\
         Subject:\n\
         CASE 1: HUMAN MODEL: Completely REPLACE face with: {model_description}. \
         Identity Consistency: {consistency_descriptor}. Keep clothing exactly as is.\n\
         CASE 2: NO HUMAN MODEL: Keep product unchanged.\n\
         Background: {background_description}. Style: Commercial Studio."
    )
}

pub fn compose_fallback_prompt(background_description: &str) -> String {
    format!(
        "Task: Product Texture Detail Shot.\n\
         ACTION: REMOVE MODEL COMPLETELY. Close-up of CLOTHING FABRIC only.\n\
         Background: {background_description}."
    )
}
