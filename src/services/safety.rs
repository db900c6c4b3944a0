use crate::services::gemini::GenerationError;

/// Keywords that mark a failure detail as a content-safety refusal.
pub const SAFETY_KEYWORDS: [&str; 4] = ["safety", "blocked", "sensitive", "拦截"];

/// Decides whether a failed generation was a content-safety rejection and
/// should be retried with the fallback prompt.
pub trait SafetyClassifier: Send + Sync {
    fn is_safety_rejection(&self, error: &GenerationError) -> bool;
}

/// Keyword heuristic over the error text. Over- and under-matching are both
/// possible; swap the classifier rather than editing the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl SafetyClassifier for KeywordClassifier {
    fn is_safety_rejection(&self, error: &GenerationError) -> bool {
        if matches!(error, GenerationError::SafetyBlocked) {
            return true;
        }
        let message = error.to_string().to_lowercase();
        SAFETY_KEYWORDS.iter().any(|keyword| message.contains(keyword))
    }
}
