//! Batch Product Photo Restyling
//!
//! This library provides the core functionality for the restyle-batch system,
//! which sends uploaded product photos through the Gemini image generation
//! API with a composed prompt, falls back to a detail-shot prompt when the
//! provider refuses on safety grounds, and exports the results as a zip
//! archive.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
