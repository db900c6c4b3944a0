pub mod backoff;
pub mod export;
pub mod gemini;
pub mod orchestrator;
pub mod prompts;
pub mod safety;
pub mod scheduler;
pub mod store;
pub mod workbench;
