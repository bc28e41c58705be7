//! OpenRouter (OpenAI-compatible) request and response types.

use serde::{Deserialize, Serialize};

use errata_core::PromptMessage;

// =============================================================================
// CHAT COMPLETION TYPES
// =============================================================================

/// Request body for the chat completions endpoint.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

/// One message in a request. Vision requests use multi-part content.
#[derive(Debug, Clone, Serialize)]
pub struct RequestMessage {
    pub role: String,
    pub content: MessageContent,
}

impl From<&PromptMessage> for RequestMessage {
    fn from(m: &PromptMessage) -> Self {
        Self {
            role: m.role.clone(),
            content: MessageContent::Text(m.content.clone()),
        }
    }
}

/// Plain text, or an ordered list of text and image parts.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A single part of multi-part message content.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    /// A PNG image part carrying `b64` as a data URL.
    pub fn png_base64(b64: &str) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/png;base64,{}", b64),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Response from the chat completions endpoint.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage reported with a completion.
#[derive(Debug, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

// =============================================================================
// STREAMING TYPES
// =============================================================================

/// Streaming chunk for chat completions.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChatChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChunkChoice {
    #[serde(default)]
    pub delta: ChatDelta,
}

/// Delta content in a streaming response.
#[derive(Debug, Default, Deserialize)]
pub struct ChatDelta {
    #[serde(default)]
    pub content: Option<String>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Error envelope returned by OpenRouter on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_request_serialization() {
        let req = ChatCompletionRequest {
            model: "m".to_string(),
            messages: vec![(&PromptMessage::user("hi")).into()],
            temperature: 0.7,
            max_tokens: 4096,
            stream: false,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["messages"][0], json!({"role": "user", "content": "hi"}));
        assert!(v.get("stream").is_none());
        assert_eq!(v["max_tokens"], 4096);
    }

    #[test]
    fn test_stream_flag_serialized_when_set() {
        let req = ChatCompletionRequest {
            model: "m".to_string(),
            messages: Vec::new(),
            temperature: 0.7,
            max_tokens: 1,
            stream: true,
        };
        assert_eq!(serde_json::to_value(&req).unwrap()["stream"], true);
    }

    #[test]
    fn test_multipart_content_serialization() {
        let msg = RequestMessage {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "look".to_string(),
                },
                ContentPart::png_base64("QUJD"),
            ]),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            v["content"],
            json!([
                {"type": "text", "text": "look"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,QUJD"}}
            ])
        );
    }

    #[test]
    fn test_response_with_null_content() {
        let r: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        }))
        .unwrap();
        assert!(r.choices[0].message.content.is_none());
    }

    #[test]
    fn test_error_response_parses_numeric_code() {
        let r: ErrorResponse =
            serde_json::from_value(json!({"error": {"message": "No credits", "code": 402}}))
                .unwrap();
        assert_eq!(r.error.message, "No credits");
        assert_eq!(r.error.code, Some(json!(402)));
    }
}
