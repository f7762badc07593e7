//! Generation provider implementations
//!
//! Concrete implementations of [`crate::GenerationBackend`].

pub mod gemini;

pub use gemini::{GeminiClient, GeminiConfig};
