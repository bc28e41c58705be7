//! OpenRouter backend.
//!
//! OpenRouter speaks the OpenAI chat completions protocol. Every request
//! carries the app attribution headers (`HTTP-Referer`, `X-Title`).
//!
//! # Example
//!
//! ```rust,no_run
//! use errata_core::{CompletionBackend, CompletionOptions, PromptMessage};
//! use errata_inference::openrouter::{OpenRouterClient, OpenRouterConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = OpenRouterClient::new(OpenRouterConfig::from_env()).unwrap();
//!     let client = server.with_api_key("sk-or-...");
//!     let reply = client
//!         .chat_completion(
//!             &[PromptMessage::user("Explain Newton's third law")],
//!             "openai/gpt-5-nano",
//!             CompletionOptions::chat(),
//!         )
//!         .await
//!         .unwrap();
//!     println!("{}", reply);
//! }
//! ```

mod client;
mod error;
mod streaming;
mod types;

pub use client::{OpenRouterClient, OpenRouterConfig};
pub use error::{to_errata_error, OpenRouterErrorCode};
pub use streaming::{parse_sse_stream, StreamingCompletion, TokenStream};
pub use types::*;
