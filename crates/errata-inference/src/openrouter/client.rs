//! OpenRouter chat, streaming and vision client.

use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use errata_core::defaults::{
    CHAT_TIMEOUT_SECS, OPENROUTER_BASE_URL, OPENROUTER_REFERER, OPENROUTER_TITLE,
    VISION_TIMEOUT_SECS,
};
use errata_core::{CompletionBackend, CompletionOptions, Error, PromptMessage, Result};

use super::error::{to_errata_error, OpenRouterErrorCode};
use super::streaming::{parse_sse_stream, StreamingCompletion, TokenStream};
use super::types::*;

/// Connection settings shared by every per-user client.
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// Server-wide API key, used when a user has none of their own.
    pub api_key: String,
    /// Timeout for chat requests, streaming included.
    pub chat_timeout_secs: u64,
    /// Timeout for vision requests.
    pub vision_timeout_secs: u64,
    /// HTTP-Referer header for OpenRouter app attribution.
    pub http_referer: String,
    /// X-Title header for OpenRouter app attribution.
    pub x_title: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_key: String::new(),
            chat_timeout_secs: CHAT_TIMEOUT_SECS,
            vision_timeout_secs: VISION_TIMEOUT_SECS,
            http_referer: OPENROUTER_REFERER.to_string(),
            x_title: OPENROUTER_TITLE.to_string(),
        }
    }
}

impl OpenRouterConfig {
    /// Read `OPENROUTER_BASE_URL`, `OPENROUTER_API_KEY` and `OPENROUTER_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("OPENROUTER_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            chat_timeout_secs: std::env::var("OPENROUTER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.chat_timeout_secs),
            ..defaults
        }
    }
}

/// Client bound to one API key.
///
/// Cloning is cheap; [`OpenRouterClient::with_api_key`] shares the
/// underlying connection pool.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    config: OpenRouterConfig,
}

impl OpenRouterClient {
    /// Create a new client with the given configuration.
    pub fn new(config: OpenRouterConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openrouter",
            base_url = %config.base_url,
            has_server_key = !config.api_key.is_empty(),
            "Initializing OpenRouter client"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenRouterConfig::from_env())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }

    /// A client sending `api_key` instead of the configured one.
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            config: OpenRouterConfig {
                api_key: api_key.into(),
                ..self.config.clone()
            },
        }
    }

    fn build_request(&self, timeout_secs: u64) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        self.client
            .post(url)
            .timeout(Duration::from_secs(timeout_secs))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.config.http_referer)
            .header("X-Title", &self.config.x_title)
    }

    /// Send a request and turn non-2xx responses into classified errors.
    async fn send(&self, request: &ChatCompletionRequest, timeout_secs: u64) -> Result<Response> {
        let response = self
            .build_request(timeout_secs)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let (message, error_type) = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(parsed) if !parsed.error.message.is_empty() => {
                (parsed.error.message, parsed.error.error_type.unwrap_or_default())
            }
            _ if !body.trim().is_empty() => (body.trim().to_string(), String::new()),
            _ => (
                status.canonical_reason().unwrap_or("Unknown error").to_string(),
                String::new(),
            ),
        };
        let code = OpenRouterErrorCode::from_response(status.as_u16(), &error_type);
        warn!(
            subsystem = "inference",
            component = "openrouter",
            model = %request.model,
            status = status.as_u16(),
            error_code = ?code,
            retryable = code.is_retryable(),
            "OpenRouter request failed"
        );
        Err(to_errata_error(code, status.as_u16(), &message))
    }

    async fn complete(&self, request: ChatCompletionRequest, timeout_secs: u64, op: &str) -> Result<String> {
        let start = Instant::now();
        let response = self.send(&request, timeout_secs).await?;
        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Inference("Response contained no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();

        debug!(
            subsystem = "inference",
            component = "openrouter",
            op,
            model = %request.model,
            response_len = content.len(),
            total_tokens = result.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0),
            duration_ms = start.elapsed().as_millis() as u64,
            "Completion finished"
        );
        Ok(content)
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterClient {
    async fn chat_completion(
        &self,
        messages: &[PromptMessage],
        model: &str,
        options: CompletionOptions,
    ) -> Result<String> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages.iter().map(RequestMessage::from).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };
        self.complete(request, self.config.chat_timeout_secs, "chat_completion")
            .await
    }

    async fn vision_completion(
        &self,
        images_b64: &[String],
        prompt: &str,
        model: &str,
        options: CompletionOptions,
    ) -> Result<String> {
        let mut parts = Vec::with_capacity(images_b64.len() + 1);
        parts.push(ContentPart::Text {
            text: prompt.to_string(),
        });
        parts.extend(images_b64.iter().map(|b64| ContentPart::png_base64(b64)));

        debug!(
            subsystem = "inference",
            component = "openrouter",
            op = "vision_completion",
            model,
            image_count = images_b64.len(),
            prompt_len = prompt.len(),
            "Sending vision request"
        );

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![RequestMessage {
                role: "user".to_string(),
                content: MessageContent::Parts(parts),
            }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };
        self.complete(request, self.config.vision_timeout_secs, "vision_completion")
            .await
    }
}

#[async_trait]
impl StreamingCompletion for OpenRouterClient {
    async fn chat_completion_stream(
        &self,
        messages: &[PromptMessage],
        model: &str,
        options: CompletionOptions,
    ) -> Result<TokenStream> {
        debug!(
            subsystem = "inference",
            component = "openrouter",
            op = "chat_completion_stream",
            model,
            message_count = messages.len(),
            "Starting streaming completion"
        );
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages.iter().map(RequestMessage::from).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: true,
        };
        let response = self.send(&request, self.config.chat_timeout_secs).await?;
        Ok(parse_sse_stream(response.bytes_stream()))
    }
}
