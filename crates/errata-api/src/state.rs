//! Shared application state.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use tracing::warn;

use errata_core::User;
use errata_crypto::ApiKeyCipher;
use errata_db::Database;
use errata_inference::{CompletionProvider, StreamingCompletion};
use errata_search::NoteIndex;

use crate::config::AppConfig;

/// Global rate limiter type (direct quota, no keyed bucketing).
pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Chunk index over users' notes for chat retrieval.
    pub index: NoteIndex,
    /// Hands out OpenRouter clients bound to the right key.
    pub provider: Arc<dyn CompletionProvider>,
    /// Seals and opens stored user API keys.
    pub cipher: Arc<ApiKeyCipher>,
    pub config: Arc<AppConfig>,
    /// Global rate limiter (None if rate limiting is disabled).
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(
        db: Database,
        provider: Arc<dyn CompletionProvider>,
        cipher: ApiKeyCipher,
        config: AppConfig,
    ) -> Self {
        let rate_limiter = build_rate_limiter(&config);
        Self {
            index: NoteIndex::from_database(&db),
            db,
            provider,
            cipher: Arc::new(cipher),
            config: Arc::new(config),
            rate_limiter,
        }
    }

    /// A completion client for `user`, plus whether it runs on the user's own key.
    ///
    /// A stored key that no longer opens (for example after an encryption
    /// key change) is ignored and the server key is used instead.
    pub fn client_for(&self, user: &User) -> (Arc<dyn StreamingCompletion>, bool) {
        let own_key = user
            .openrouter_api_key_enc
            .as_deref()
            .filter(|sealed| !sealed.is_empty())
            .and_then(|sealed| match self.cipher.open(sealed) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(
                        subsystem = "api",
                        user_id = %user.id,
                        error = %e,
                        "Stored API key could not be opened; using server key"
                    );
                    None
                }
            });

        match own_key {
            Some(key) => (self.provider.client(Some(&key)), true),
            None => (self.provider.client(None), false),
        }
    }
}

fn build_rate_limiter(config: &AppConfig) -> Option<Arc<GlobalRateLimiter>> {
    if !config.rate_limit_enabled {
        return None;
    }
    let burst = NonZeroU32::new(config.rate_limit_requests.min(u32::MAX as u64) as u32)?;
    let period = Duration::from_secs(config.rate_limit_period_secs.max(1));
    let quota = Quota::with_period(period / burst.get())?.allow_burst(burst);
    Some(Arc::new(RateLimiter::direct(quota)))
}
