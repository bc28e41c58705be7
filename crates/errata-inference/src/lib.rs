//! # errata-inference
//!
//! Model access for the errata notebook.
//!
//! This crate provides:
//! - An OpenRouter client for chat, streaming chat and vision completions
//! - The model catalog and per-user tier resolution
//! - The vision pipeline (detect, crop, reconcile) and subject/tag suggestion
//! - Image cropping/downscaling and Markdown-fenced JSON reply parsing
//! - Prompt templates for detection, reconciliation, quizzes and chat
//!
//! # Feature Flags
//!
//! - `mock`: expose [`mock::MockCompletionBackend`] for other crates' tests
//!
//! # Example
//!
//! ```rust,no_run
//! use errata_inference::openrouter::OpenRouterClient;
//! use errata_inference::VisionPipeline;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = OpenRouterClient::from_env().unwrap();
//!     let pipeline = VisionPipeline::new(&client, "./uploads", "qwen/qwen3.5-397b-a17b");
//!     let outcome = pipeline.run(&["page1.jpg".to_string()]).await;
//!     println!("{} mistakes", outcome.mistakes.len());
//! }
//! ```

pub mod catalog;
pub mod image_ops;
pub mod json_reply;
pub mod openrouter;
pub mod pipeline;
pub mod prompts;
pub mod provider;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use catalog::{available_models, resolve_model};
pub use json_reply::{parse_json_reply, strip_fences};
pub use openrouter::{OpenRouterClient, OpenRouterConfig, StreamingCompletion, TokenStream};
pub use pipeline::{
    suggest_subject_and_tags, DetectedMistake, PipelineOutcome, SubjectSuggestion,
    VisionPipeline, NO_MISTAKES_MESSAGE,
};
pub use provider::CompletionProvider;
