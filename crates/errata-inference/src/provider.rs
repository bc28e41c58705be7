//! Per-user client selection.

use std::sync::Arc;

use crate::openrouter::{OpenRouterClient, StreamingCompletion};

/// Hands out completion clients bound to the right API key.
pub trait CompletionProvider: Send + Sync {
    /// A client for `api_key`, or for the server-wide key when `None`.
    fn client(&self, api_key: Option<&str>) -> Arc<dyn StreamingCompletion>;
}

impl CompletionProvider for OpenRouterClient {
    fn client(&self, api_key: Option<&str>) -> Arc<dyn StreamingCompletion> {
        match api_key {
            Some(key) => Arc::new(self.with_api_key(key)),
            None => Arc::new(self.clone()),
        }
    }
}

#[cfg(any(test, feature = "mock"))]
impl CompletionProvider for crate::mock::MockCompletionBackend {
    /// Every key shares the same script.
    fn client(&self, _api_key: Option<&str>) -> Arc<dyn StreamingCompletion> {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openrouter::OpenRouterConfig;

    #[test]
    fn test_openrouter_provider_builds_clients() {
        let server = OpenRouterClient::new(OpenRouterConfig {
            api_key: "server".to_string(),
            ..Default::default()
        })
        .unwrap();
        let _own = server.client(Some("user"));
        let _shared = server.client(None);
    }
}
