//! Google Gemini provider implementation
//!
//! Talks to the `generateContent` REST endpoint directly with reqwest.

pub mod client;
pub mod types;

pub use client::{GeminiClient, GeminiConfig, DEFAULT_BASE_URL};
pub use types::GenerationConfig;
