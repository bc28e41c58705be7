//! Scripted completion backend for deterministic tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use errata_inference::mock::MockCompletionBackend;
//!
//! let backend = MockCompletionBackend::new()
//!     .with_vision_reply(r#"{"mistakes": []}"#)
//!     .with_chat_reply(r#"{"subject": "数学", "tags": []}"#);
//! ```
//!
//! Replies are consumed in order per kind. When a queue is empty the
//! default reply is returned.

use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use errata_core::{CompletionBackend, CompletionOptions, Error, PromptMessage, Result};

use crate::openrouter::{StreamingCompletion, TokenStream};

/// A recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    /// "chat", "chat_stream" or "vision".
    pub operation: String,
    pub model: String,
    /// Last message content (chat) or the prompt (vision).
    pub input: String,
    pub image_count: usize,
    pub options: CompletionOptions,
}

type Reply = std::result::Result<String, String>;

#[derive(Default)]
struct Script {
    chat: VecDeque<Reply>,
    vision: VecDeque<Reply>,
}

/// Completion backend returning queued replies.
#[derive(Clone)]
pub struct MockCompletionBackend {
    script: Arc<Mutex<Script>>,
    default_reply: String,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl Default for MockCompletionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCompletionBackend {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            default_reply: "Mock response".to_string(),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply used once the queues are exhausted.
    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Queue a chat (or streamed chat) reply.
    pub fn with_chat_reply(self, reply: impl Into<String>) -> Self {
        self.lock_script().chat.push_back(Ok(reply.into()));
        self
    }

    /// Queue a chat failure.
    pub fn with_chat_error(self, message: impl Into<String>) -> Self {
        self.lock_script().chat.push_back(Err(message.into()));
        self
    }

    /// Queue a vision reply.
    pub fn with_vision_reply(self, reply: impl Into<String>) -> Self {
        self.lock_script().vision.push_back(Ok(reply.into()));
        self
    }

    /// Queue a vision failure.
    pub fn with_vision_error(self, message: impl Into<String>) -> Self {
        self.lock_script().vision.push_back(Err(message.into()));
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Number of logged calls for `operation`.
    pub fn call_count(&self, operation: &str) -> usize {
        self.get_calls()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn log_call(&self, call: MockCall) {
        self.call_log
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(call);
    }

    fn next_chat(&self) -> Result<String> {
        let next = self.lock_script().chat.pop_front();
        self.resolve(next)
    }

    fn next_vision(&self) -> Result<String> {
        let next = self.lock_script().vision.pop_front();
        self.resolve(next)
    }

    fn resolve(&self, next: Option<Reply>) -> Result<String> {
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(Error::Inference(message)),
            None => Ok(self.default_reply.clone()),
        }
    }
}

#[async_trait]
impl CompletionBackend for MockCompletionBackend {
    async fn chat_completion(
        &self,
        messages: &[PromptMessage],
        model: &str,
        options: CompletionOptions,
    ) -> Result<String> {
        self.log_call(MockCall {
            operation: "chat".to_string(),
            model: model.to_string(),
            input: messages.last().map(|m| m.content.clone()).unwrap_or_default(),
            image_count: 0,
            options,
        });
        self.next_chat()
    }

    async fn vision_completion(
        &self,
        images_b64: &[String],
        prompt: &str,
        model: &str,
        options: CompletionOptions,
    ) -> Result<String> {
        self.log_call(MockCall {
            operation: "vision".to_string(),
            model: model.to_string(),
            input: prompt.to_string(),
            image_count: images_b64.len(),
            options,
        });
        self.next_vision()
    }
}

#[async_trait]
impl StreamingCompletion for MockCompletionBackend {
    /// Streams the next chat reply split after each space.
    async fn chat_completion_stream(
        &self,
        messages: &[PromptMessage],
        model: &str,
        options: CompletionOptions,
    ) -> Result<TokenStream> {
        self.log_call(MockCall {
            operation: "chat_stream".to_string(),
            model: model.to_string(),
            input: messages.last().map(|m| m.content.clone()).unwrap_or_default(),
            image_count: 0,
            options,
        });
        let reply = self.next_chat()?;
        let tokens: Vec<Result<String>> = reply
            .split_inclusive(' ')
            .map(|t| Ok(t.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(tokens)))
    }
}
